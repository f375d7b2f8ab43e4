use crate::backend::{parse_instance_names, VBoxManage};
use std::sync::Arc;
use thiserror::Error;
use vmkeeper_executor::CommandOutput;

/// The backend could not be asked; says nothing about which instances exist.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Backend listing '{what}' failed: {detail}")]
pub struct ListingError {
    pub what: &'static str,
    pub detail: String,
}

/// Read-only view of the backend's instances. Nothing is cached; every call
/// asks the backend again.
#[derive(Clone)]
pub struct InstanceRegistry {
    backend: Arc<VBoxManage>,
}

impl InstanceRegistry {
    pub fn new(backend: Arc<VBoxManage>) -> Self {
        Self { backend }
    }

    /// All registered instances, oldest first, or why the backend could not
    /// list them. Blank output from a successful call is an empty registry.
    pub async fn query_instances(&self) -> Result<Vec<String>, ListingError> {
        parse_listing("vms", self.backend.list_vms().await)
    }

    pub async fn query_running(&self) -> Result<Vec<String>, ListingError> {
        parse_listing("runningvms", self.backend.list_running_vms().await)
    }

    /// Whether `name` is in the running set, if the backend answered.
    pub async fn running(&self, name: &str) -> Result<bool, ListingError> {
        Ok(self.query_running().await?.iter().any(|running| running == name))
    }

    /// Like [`query_instances`](Self::query_instances), with a failed listing
    /// read as "no data".
    pub async fn list_instances(&self) -> Vec<String> {
        self.query_instances().await.unwrap_or_default()
    }

    pub async fn list_running(&self) -> Vec<String> {
        self.query_running().await.unwrap_or_default()
    }

    /// Most recently registered instance.
    ///
    /// Positional heuristic: only meaningful while the backend holds a single
    /// instance of ours.
    pub async fn get_managed_instance(&self) -> Option<String> {
        self.list_instances().await.pop()
    }

    pub async fn is_running(&self, name: &str) -> bool {
        self.running(name).await.unwrap_or(false)
    }

    pub async fn instance_exists(&self, name: &str) -> bool {
        self.list_instances().await.iter().any(|known| known == name)
    }
}

fn parse_listing(what: &'static str, output: CommandOutput) -> Result<Vec<String>, ListingError> {
    if !output.success() {
        let detail = output.stderr.trim();
        return Err(ListingError {
            what,
            detail: if detail.is_empty() {
                "no details".to_string()
            } else {
                detail.to_string()
            },
        });
    }
    Ok(parse_instance_names(&output.stdout))
}
