//! Stop, delete, import and start actions for a single instance.
//!
//! Actions are best effort: a backend failure is logged and counted, never
//! returned as an error. Callers learn about problems from the registry on
//! their next look.

use crate::backend::VBoxManage;
use crate::events::EventSink;
use crate::metrics::{ActionTimer, SupervisorMetrics};
use crate::registry::InstanceRegistry;
use crate::storage::Slot;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use vmkeeper_executor::CommandOutput;

#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    /// Appliance template imported into every fresh slot.
    pub template: PathBuf,
    pub stop_settle: Duration,
    pub delete_settle: Duration,
    /// When set, actions poll the backend after settling until the instance
    /// reaches the expected state or this much time has passed.
    pub convergence_timeout: Option<Duration>,
    pub convergence_poll: Duration,
}

impl LifecycleSettings {
    pub fn new(template: impl Into<PathBuf>) -> Self {
        Self {
            template: template.into(),
            stop_settle: Duration::from_secs(3),
            delete_settle: Duration::from_secs(2),
            convergence_timeout: None,
            convergence_poll: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expected {
    Stopped,
    Deleted,
    Running,
}

impl Expected {
    fn describe(self) -> &'static str {
        match self {
            Expected::Stopped => "stop",
            Expected::Deleted => "disappear",
            Expected::Running => "start running",
        }
    }
}

pub struct Lifecycle {
    backend: Arc<VBoxManage>,
    registry: InstanceRegistry,
    settings: LifecycleSettings,
    events: EventSink,
    metrics: Arc<SupervisorMetrics>,
}

impl Lifecycle {
    pub fn new(
        backend: Arc<VBoxManage>,
        settings: LifecycleSettings,
        events: EventSink,
        metrics: Arc<SupervisorMetrics>,
    ) -> Self {
        Self {
            registry: InstanceRegistry::new(Arc::clone(&backend)),
            backend,
            settings,
            events,
            metrics,
        }
    }

    pub fn settings(&self) -> &LifecycleSettings {
        &self.settings
    }

    /// Powers the instance off and waits for the backend to tear it down.
    pub async fn stop(&self, name: &str) -> bool {
        let _timer = ActionTimer::new("stop");
        self.events.info(format!("Powering off instance: {name}"));

        let output = self.backend.power_off(name).await;
        let ok = self.check("power off", name, &output);
        tokio::time::sleep(self.settings.stop_settle).await;
        self.await_convergence(name, Expected::Stopped).await;

        self.metrics.inc_stops();
        self.finished("Power off", name, ok);
        ok
    }

    /// Unregisters the instance and removes its files.
    pub async fn delete(&self, name: &str) -> bool {
        let _timer = ActionTimer::new("delete");
        self.events.info(format!("Removing instance: {name}"));

        let output = self.backend.unregister_and_delete(name).await;
        let ok = self.check("delete", name, &output);
        tokio::time::sleep(self.settings.delete_settle).await;
        self.await_convergence(name, Expected::Deleted).await;

        self.metrics.inc_deletes();
        self.finished("Removal", name, ok);
        ok
    }

    /// Imports the template into `slot` and returns the new instance's name.
    ///
    /// The new name is whatever appeared in the registry during the import.
    /// `None` means nothing new showed up. If the registry could not be listed
    /// beforehand, the newest registered instance is assumed.
    pub async fn import_into(&self, slot: &Slot) -> Option<String> {
        let _timer = ActionTimer::new("import");
        let before = match self.registry.query_instances().await {
            Ok(before) => Some(before),
            Err(e) => {
                self.events.warn(format!("{e}; the imported instance will be identified by position"));
                None
            }
        };
        self.events.info(format!(
            "Importing {} into {}",
            self.settings.template.display(),
            slot.path.display()
        ));

        let output = self.backend.import(&self.settings.template, &slot.path).await;
        self.check("import", &slot.path.display().to_string(), &output);
        self.metrics.inc_imports();

        let after = match self.registry.query_instances().await {
            Ok(after) => after,
            Err(e) => {
                self.events
                    .error(format!("Import finished but the result could not be read: {e}"));
                return None;
            }
        };
        let Some(before) = before else {
            let newest = after.last().cloned();
            match &newest {
                Some(name) => self
                    .events
                    .warn(format!("Assuming the newest instance {name} is the imported one")),
                None => self
                    .events
                    .error("Import finished but no instance is registered"),
            }
            return newest;
        };
        let fresh: Vec<String> = after
            .into_iter()
            .filter(|name| !before.contains(name))
            .collect();

        match fresh.as_slice() {
            [] => {
                self.events
                    .error("Import finished but no new instance was registered");
                None
            }
            [name] => {
                self.events.info(format!("Import finished: {name}"));
                Some(name.clone())
            }
            [.., newest] => {
                self.events.warn(format!(
                    "Import registered {} new instances; assuming the last one ({newest})",
                    fresh.len()
                ));
                Some(newest.clone())
            }
        }
    }

    /// Boots the instance without a display.
    pub async fn start(&self, name: &str) -> bool {
        let _timer = ActionTimer::new("start");
        self.events.info(format!("Starting instance: {name}"));

        let output = self.backend.start_headless(name).await;
        let ok = self.check("start", name, &output);
        self.await_convergence(name, Expected::Running).await;

        self.metrics.inc_starts();
        self.finished("Start", name, ok);
        ok
    }

    fn check(&self, action: &str, target: &str, output: &CommandOutput) -> bool {
        if output.success() {
            return true;
        }

        self.metrics.inc_action_failures();
        let detail = output.stderr.trim();
        self.events.warn(format!(
            "Backend reported failure for {action} of {target}: {}",
            if detail.is_empty() { "no details" } else { detail }
        ));
        false
    }

    fn finished(&self, action: &str, name: &str, ok: bool) {
        if ok {
            self.events.info(format!("{action} of {name} finished"));
        } else {
            self.events
                .warn(format!("{action} of {name} finished with errors"));
        }
    }

    /// A listing failure counts as not yet converged.
    async fn reached(&self, name: &str, expected: Expected) -> bool {
        match expected {
            Expected::Stopped => matches!(self.registry.running(name).await, Ok(false)),
            Expected::Deleted => self
                .registry
                .query_instances()
                .await
                .map(|instances| !instances.iter().any(|known| known == name))
                .unwrap_or(false),
            Expected::Running => matches!(self.registry.running(name).await, Ok(true)),
        }
    }

    async fn await_convergence(&self, name: &str, expected: Expected) {
        let Some(timeout) = self.settings.convergence_timeout else {
            return;
        };

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.reached(name, expected).await {
                return;
            }
            if tokio::time::Instant::now() >= deadline {
                self.events.warn(format!(
                    "Instance {name} did not {} within {:?}",
                    expected.describe(),
                    timeout
                ));
                return;
            }
            tokio::time::sleep(self.settings.convergence_poll).await;
        }
    }
}
