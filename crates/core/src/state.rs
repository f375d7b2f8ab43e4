use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedHandle {
    pub instance: Option<String>,
    pub updated_at: i64,
}

/// Remembers which instance the supervisor owns across restarts.
#[derive(Debug, Clone)]
pub struct HandleStore {
    path: PathBuf,
}

impl HandleStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<Option<String>, StateError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = tokio::fs::read_to_string(&self.path).await?;
        let handle: PersistedHandle = serde_json::from_str(&content)?;
        Ok(handle.instance.filter(|name| !name.is_empty()))
    }

    /// Writes via a temp file and rename so a crash never leaves a torn file.
    pub async fn save(&self, instance: Option<&str>) -> Result<(), StateError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let handle = PersistedHandle {
            instance: instance.map(str::to_string),
            updated_at: chrono::Utc::now().timestamp(),
        };
        let json = serde_json::to_string_pretty(&handle)?;

        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}
