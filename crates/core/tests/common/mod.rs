#![allow(dead_code, clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! In-memory hypervisor and clock shared by the integration tests.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use vmkeeper_core::{
    Clock, EventSink, LifecycleSettings, LogEvent, LogLevel, SlotAllocator, Supervisor,
    SupervisorSettings, VBoxManage, DEFAULT_SLOT_PREFIX,
};
use vmkeeper_executor::{CommandOutput, CommandRunner};

#[derive(Default)]
struct FakeState {
    instances: Vec<String>,
    running: HashSet<String>,
    calls: Vec<Vec<String>>,
    imported: u32,
    fail_imports: bool,
    starts_ignored: bool,
    listing_failures: usize,
    running_listing_failures: usize,
}

/// Emulates the listing format and state changes of the real tool.
#[derive(Default)]
pub struct FakeHypervisor {
    state: Mutex<FakeState>,
}

impl FakeHypervisor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_instances(instances: &[&str], running: &[&str]) -> Arc<Self> {
        let fake = Self::default();
        {
            let mut state = fake.state.lock();
            state.instances = instances.iter().map(|s| s.to_string()).collect();
            state.running = running.iter().map(|s| s.to_string()).collect();
        }
        Arc::new(fake)
    }

    /// Simulates the instance shutting down on its own.
    pub fn crash(&self, name: &str) {
        self.state.lock().running.remove(name);
    }

    pub fn set_fail_imports(&self, fail: bool) {
        self.state.lock().fail_imports = fail;
    }

    /// The next `count` listings of any kind exit with an error.
    pub fn fail_next_listings(&self, count: usize) {
        self.state.lock().listing_failures = count;
    }

    /// The next `count` running-set listings exit with an error.
    pub fn fail_next_running_listings(&self, count: usize) {
        self.state.lock().running_listing_failures = count;
    }

    /// Start commands succeed but the instance never reaches a running state.
    pub fn set_starts_ignored(&self, ignored: bool) {
        self.state.lock().starts_ignored = ignored;
    }

    pub fn instances(&self) -> Vec<String> {
        self.state.lock().instances.clone()
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.state.lock().running.contains(name)
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.state.lock().calls.clone()
    }

    /// Number of invocations whose first argument is `verb`.
    pub fn count(&self, verb: &str) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|args| args.first().map(String::as_str) == Some(verb))
            .count()
    }

    /// Every call except listings, rendered as a single string.
    pub fn actions(&self) -> Vec<String> {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|args| args.first().map(String::as_str) != Some("list"))
            .map(|args| args.join(" "))
            .collect()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    fn listing(names: &[&String]) -> String {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| format!("\"{name}\" {{{i:08x}-0000-4000-8000-000000000000}}\n"))
            .collect()
    }
}

#[async_trait]
impl CommandRunner for FakeHypervisor {
    async fn execute(&self, _program: &str, args: &[String]) -> CommandOutput {
        let mut state = self.state.lock();
        state.calls.push(args.to_vec());

        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        if args.first() == Some(&"list") && state.listing_failures > 0 {
            state.listing_failures -= 1;
            return CommandOutput::failed("VBoxManage: error: Failed to create the VirtualBox object!");
        }
        if args.as_slice() == ["list", "runningvms"] && state.running_listing_failures > 0 {
            state.running_listing_failures -= 1;
            return CommandOutput::failed("VBoxManage: error: The object is not ready");
        }

        match args.as_slice() {
            ["list", "vms"] => {
                let all: Vec<&String> = state.instances.iter().collect();
                CommandOutput::ok(Self::listing(&all))
            }
            ["list", "runningvms"] => {
                let running: Vec<&String> = state
                    .instances
                    .iter()
                    .filter(|name| state.running.contains(*name))
                    .collect();
                CommandOutput::ok(Self::listing(&running))
            }
            ["controlvm", name, "poweroff"] => {
                if state.running.remove(*name) {
                    CommandOutput::ok("")
                } else {
                    CommandOutput::failed(format!("Machine '{name}' is not currently running"))
                }
            }
            ["unregistervm", name, "--delete"] => {
                match state.instances.iter().position(|known| known.as_str() == *name) {
                    Some(index) => {
                        state.instances.remove(index);
                        state.running.remove(*name);
                        CommandOutput::ok("")
                    }
                    None => CommandOutput::failed(format!("Could not find a registered machine named '{name}'")),
                }
            }
            ["import", _template, "--vsys", "0", "--basefolder", _dest, "--options", "keepallmacs"] => {
                if state.fail_imports {
                    return CommandOutput::failed("Appliance import failed");
                }
                state.imported += 1;
                let name = format!("appliance-{}", state.imported);
                state.instances.push(name);
                CommandOutput::ok("Successfully imported the appliance.")
            }
            ["startvm", name, "--type", "headless"] => {
                if !state.instances.iter().any(|known| known.as_str() == *name) {
                    return CommandOutput::failed(format!("Could not find a registered machine named '{name}'"));
                }
                if !state.starts_ignored {
                    state.running.insert(name.to_string());
                }
                CommandOutput::ok(format!("VM \"{name}\" has been successfully started."))
            }
            other => CommandOutput::failed(format!("unexpected command: {other:?}")),
        }
    }
}

/// Wall clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<NaiveDateTime>,
}

impl ManualClock {
    pub fn at(hour: u32, minute: u32, second: u32) -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(datetime(1, hour, minute, second)),
        })
    }

    pub fn set(&self, now: NaiveDateTime) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += chrono::Duration::from_std(by).unwrap();
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock()
    }
}

pub fn datetime(day: u32, hour: u32, minute: u32, second: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 6, day)
        .unwrap()
        .and_hms_opt(hour, minute, second)
        .unwrap()
}

pub fn fast_lifecycle() -> LifecycleSettings {
    let mut settings = LifecycleSettings::new("/images/appliance.ova");
    settings.stop_settle = Duration::ZERO;
    settings.delete_settle = Duration::ZERO;
    settings
}

pub fn supervisor(
    fake: &Arc<FakeHypervisor>,
    base_folder: &Path,
    clock: &Arc<ManualClock>,
) -> (Supervisor, UnboundedReceiver<LogEvent>) {
    let (events, rx) = EventSink::channel();
    let backend = Arc::new(VBoxManage::new("VBoxManage", fake.clone()));
    let supervisor = Supervisor::new(
        backend,
        SlotAllocator::new(base_folder, DEFAULT_SLOT_PREFIX),
        fast_lifecycle(),
        SupervisorSettings {
            schedule_time: "08:00".parse().unwrap(),
            poll_interval: Duration::from_millis(10),
        },
        clock.clone(),
        events,
    );
    (supervisor, rx)
}

pub fn drain(rx: &mut UnboundedReceiver<LogEvent>) -> Vec<LogEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn has_event(events: &[LogEvent], level: LogLevel, needle: &str) -> bool {
    events
        .iter()
        .any(|event| event.level == level && event.message.contains(needle))
}
