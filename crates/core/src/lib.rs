//! Supervision of a single hypervisor-managed instance: startup
//! reconciliation, daily rotation into a fresh storage slot, and automatic
//! restart after unexpected stops.

pub mod backend;
pub mod events;
pub mod lifecycle;
pub mod metrics;
pub mod reconciler;
pub mod registry;
pub mod schedule;
pub mod state;
pub mod storage;

pub use backend::{parse_instance_names, VBoxManage, DEFAULT_VBOXMANAGE};
pub use events::{EventSink, LogEvent, LogLevel};
pub use lifecycle::{Lifecycle, LifecycleSettings};
pub use metrics::{MetricsSnapshot, SupervisorMetrics};
pub use reconciler::{StartupOutcome, Supervisor, SupervisorSettings, TickReport};
pub use registry::{InstanceRegistry, ListingError};
pub use schedule::{Clock, DailySchedule, ScheduleError, ScheduleTime, SystemClock};
pub use state::{HandleStore, StateError};
pub use storage::{Slot, SlotAllocator, StorageError, DEFAULT_SLOT_PREFIX};
