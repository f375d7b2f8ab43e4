use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Supervisor counters. Each increment is also forwarded to the `metrics`
/// facade so an installed exporter sees the same numbers.
#[derive(Debug, Default)]
pub struct SupervisorMetrics {
    rotations: AtomicU64,
    recoveries: AtomicU64,
    imports: AtomicU64,
    starts: AtomicU64,
    stops: AtomicU64,
    deletes: AtomicU64,
    action_failures: AtomicU64,
}

impl SupervisorMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn inc_rotations(&self) {
        self.rotations.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("vmkeeper_rotations_total", 1);
    }

    pub fn inc_recoveries(&self) {
        self.recoveries.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("vmkeeper_recoveries_total", 1);
    }

    pub fn inc_imports(&self) {
        self.imports.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("vmkeeper_actions_total", 1, "action" => "import");
    }

    pub fn inc_starts(&self) {
        self.starts.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("vmkeeper_actions_total", 1, "action" => "start");
    }

    pub fn inc_stops(&self) {
        self.stops.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("vmkeeper_actions_total", 1, "action" => "stop");
    }

    pub fn inc_deletes(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("vmkeeper_actions_total", 1, "action" => "delete");
    }

    pub fn inc_action_failures(&self) {
        self.action_failures.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("vmkeeper_action_failures_total", 1);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            rotations: self.rotations.load(Ordering::Relaxed),
            recoveries: self.recoveries.load(Ordering::Relaxed),
            imports: self.imports.load(Ordering::Relaxed),
            starts: self.starts.load(Ordering::Relaxed),
            stops: self.stops.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            action_failures: self.action_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub rotations: u64,
    pub recoveries: u64,
    pub imports: u64,
    pub starts: u64,
    pub stops: u64,
    pub deletes: u64,
    pub action_failures: u64,
}

/// Records wall time of one lifecycle action when dropped.
pub struct ActionTimer {
    start: Instant,
    action: &'static str,
}

impl ActionTimer {
    pub fn new(action: &'static str) -> Self {
        Self {
            start: Instant::now(),
            action,
        }
    }
}

impl Drop for ActionTimer {
    fn drop(&mut self) {
        let duration_ms = self.start.elapsed().as_secs_f64() * 1000.0;
        metrics::histogram!("vmkeeper_action_latency_ms", duration_ms, "action" => self.action);
    }
}
