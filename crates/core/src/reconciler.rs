//! Supervisory state machine.
//!
//! Startup reconciliation brings the managed instance to a running state
//! once; afterwards [`Supervisor::run`] ticks forever, rotating the instance
//! at the scheduled minute and restarting it whenever it is found stopped.
//! All lifecycle actions happen on the task that owns the supervisor, so no
//! two actions on the managed instance ever overlap.

use crate::backend::VBoxManage;
use crate::events::EventSink;
use crate::lifecycle::{Lifecycle, LifecycleSettings};
use crate::metrics::SupervisorMetrics;
use crate::registry::{InstanceRegistry, ListingError};
use crate::schedule::{Clock, DailySchedule, ScheduleTime};
use crate::state::HandleStore;
use crate::storage::SlotAllocator;
use chrono::NaiveDateTime;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub schedule_time: ScheduleTime,
    pub poll_interval: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartupOutcome {
    /// Nothing was registered; a fresh instance was imported and started.
    Bootstrapped(String),
    /// The instance existed but was powered off.
    Started(String),
    AlreadyRunning(String),
    Failed(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub rotated: bool,
    pub recovered: Option<String>,
}

pub struct Supervisor {
    registry: InstanceRegistry,
    lifecycle: Lifecycle,
    slots: SlotAllocator,
    clock: Arc<dyn Clock>,
    schedule: DailySchedule,
    poll_interval: Duration,
    handle: Option<String>,
    state: Option<HandleStore>,
    events: EventSink,
    metrics: Arc<SupervisorMetrics>,
}

impl Supervisor {
    pub fn new(
        backend: Arc<VBoxManage>,
        slots: SlotAllocator,
        lifecycle: LifecycleSettings,
        settings: SupervisorSettings,
        clock: Arc<dyn Clock>,
        events: EventSink,
    ) -> Self {
        let metrics = SupervisorMetrics::new();
        Self {
            registry: InstanceRegistry::new(Arc::clone(&backend)),
            lifecycle: Lifecycle::new(backend, lifecycle, events.clone(), Arc::clone(&metrics)),
            slots,
            clock,
            schedule: DailySchedule::new(settings.schedule_time),
            poll_interval: settings.poll_interval,
            handle: None,
            state: None,
            events,
            metrics,
        }
    }

    pub fn with_state_store(mut self, store: HandleStore) -> Self {
        self.state = Some(store);
        self
    }

    pub fn metrics(&self) -> Arc<SupervisorMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Name of the instance the supervisor currently believes it owns.
    pub fn handle(&self) -> Option<&str> {
        self.handle.as_deref()
    }

    pub fn schedule(&self) -> &DailySchedule {
        &self.schedule
    }

    pub async fn reconcile_startup(&mut self) -> StartupOutcome {
        self.restore_handle().await;

        let managed = match self.managed_instance().await {
            Ok(managed) => managed,
            Err(e) => {
                self.events.error(format!("Cannot reconcile at startup: {e}"));
                return StartupOutcome::Failed(e.to_string());
            }
        };
        let Some(name) = managed else {
            self.events
                .info("No instance found. Importing a fresh instance...");
            return match self.provision().await {
                Some(name) => StartupOutcome::Bootstrapped(name),
                None => StartupOutcome::Failed("could not provision a fresh instance".to_string()),
            };
        };

        match self.registry.running(&name).await {
            Ok(true) => {
                self.events.info(format!("Instance {name} is already running"));
                return StartupOutcome::AlreadyRunning(name);
            }
            Ok(false) => {}
            Err(e) => {
                self.events.error(format!("Cannot reconcile at startup: {e}"));
                return StartupOutcome::Failed(e.to_string());
            }
        }

        self.events
            .info(format!("Instance {name} was powered off at startup. Starting..."));
        self.lifecycle.start(&name).await;
        StartupOutcome::Started(name)
    }

    /// One iteration of the steady loop.
    pub async fn tick(&mut self) -> TickReport {
        let now = self.clock.now();
        let mut report = TickReport::default();

        if self.schedule.should_fire(now) {
            report.rotated = self.rotate(now).await;
        }

        report.recovered = self.recover().await;
        report
    }

    /// Ticks until `shutdown` flips to `true` or its sender goes away.
    ///
    /// Shutdown is only observed while sleeping between ticks, so an action
    /// that has already reached the backend always finishes settling.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Supervisor loop started (schedule {}, poll every {:?})",
            self.schedule.at(),
            self.poll_interval
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let report = self.tick().await;
            debug!("Tick finished: {:?}", report);

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.events.info("Supervisor stopped");
    }

    /// Returns `false` without touching anything when the backend could not
    /// be listed; the schedule stays unmarked so a later tick in the same
    /// minute tries again.
    async fn rotate(&mut self, now: NaiveDateTime) -> bool {
        let (current, running) = match self.rotation_target().await {
            Ok(target) => target,
            Err(e) => {
                self.events.warn(format!("Daily rotation postponed: {e}"));
                return false;
            }
        };

        // Marked before acting so a failing rotation is not retried
        // within the same minute.
        self.schedule.mark_fired(now);
        self.events.info("===== Daily rotation started =====");
        self.metrics.inc_rotations();

        match current {
            Some(current) => {
                if running {
                    self.lifecycle.stop(&current).await;
                }
                self.lifecycle.delete(&current).await;
            }
            None => self
                .events
                .warn("No managed instance to retire; importing a fresh one"),
        }
        self.set_handle(None).await;

        match self.provision().await {
            Some(name) => self
                .events
                .info(format!("===== Daily rotation finished: {name} =====")),
            None => self
                .events
                .error("===== Daily rotation failed; no instance is running ====="),
        }
        true
    }

    async fn rotation_target(&mut self) -> Result<(Option<String>, bool), ListingError> {
        let current = self.managed_instance().await?;
        let running = match &current {
            Some(name) => self.registry.running(name).await?,
            None => false,
        };
        Ok((current, running))
    }

    async fn recover(&mut self) -> Option<String> {
        let name = match self.managed_instance().await {
            Ok(Some(name)) => name,
            Ok(None) => return None,
            Err(e) => {
                self.events.warn(format!("Health check skipped: {e}"));
                return None;
            }
        };
        match self.registry.running(&name).await {
            Ok(true) => return None,
            Ok(false) => {}
            Err(e) => {
                self.events.warn(format!("Health check skipped: {e}"));
                return None;
            }
        }

        self.events
            .warn(format!("Instance {name} stopped unexpectedly. Restarting..."));
        self.metrics.inc_recoveries();
        self.lifecycle.start(&name).await;
        Some(name)
    }

    /// Allocates a slot, imports into it and starts the result.
    async fn provision(&mut self) -> Option<String> {
        let slot = match self.slots.allocate_slot() {
            Ok(slot) => slot,
            Err(e) => {
                self.metrics.inc_action_failures();
                self.events.error(format!("Storage slot allocation failed: {e}"));
                return None;
            }
        };

        let name = self.lifecycle.import_into(&slot).await?;
        self.set_handle(Some(name.clone())).await;
        self.lifecycle.start(&name).await;
        Some(name)
    }

    /// The instance this supervisor owns.
    ///
    /// Prefers the tracked handle while the backend still knows it. Without a
    /// usable handle it falls back to the most recently registered instance,
    /// which is ambiguous when the backend holds several. A failed listing
    /// leaves the handle as it was.
    pub async fn managed_instance(&mut self) -> Result<Option<String>, ListingError> {
        let instances = self.registry.query_instances().await?;

        if let Some(handle) = &self.handle {
            if instances.iter().any(|name| name == handle) {
                return Ok(Some(handle.clone()));
            }
            self.events.warn(format!(
                "Tracked instance {handle} is no longer registered; falling back to the most recently registered instance"
            ));
        }

        let fallback = instances.last().cloned();
        if let (Some(name), true) = (&fallback, instances.len() > 1) {
            self.events.warn(format!(
                "Backend holds {} instances; assuming {name} is the managed one",
                instances.len()
            ));
        }

        self.set_handle(fallback.clone()).await;
        Ok(fallback)
    }

    async fn restore_handle(&mut self) {
        let Some(store) = &self.state else {
            return;
        };

        match store.load().await {
            Ok(Some(name)) => {
                info!("Restored managed instance handle: {}", name);
                self.handle = Some(name);
            }
            Ok(None) => {}
            Err(e) => self.events.warn(format!(
                "Ignoring unreadable state file {}: {e}",
                store.path().display()
            )),
        }
    }

    async fn set_handle(&mut self, handle: Option<String>) {
        if self.handle == handle {
            return;
        }
        self.handle = handle;

        if let Some(store) = &self.state {
            if let Err(e) = store.save(self.handle.as_deref()).await {
                self.events.error(format!(
                    "Failed to persist managed instance handle to {}: {e}",
                    store.path().display()
                ));
            }
        }
    }
}
