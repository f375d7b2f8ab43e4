use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use vmkeeper_core::{
    LifecycleSettings, ScheduleTime, SupervisorSettings, DEFAULT_SLOT_PREFIX, DEFAULT_VBOXMANAGE,
};

pub const DEFAULT_CONFIG_PATH: &str = "vmkeeper.yaml";

/// Everything is fixed at process start; there is no live reload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Appliance template imported on bootstrap and on every rotation.
    pub ova_path: PathBuf,
    /// Parent of the numbered storage slots.
    pub base_folder: PathBuf,
    #[serde(default = "default_vboxmanage")]
    pub vboxmanage: String,
    #[serde(default = "default_schedule_time")]
    pub schedule_time: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_stop_settle")]
    pub stop_settle_secs: u64,
    #[serde(default = "default_delete_settle")]
    pub delete_settle_secs: u64,
    #[serde(default)]
    pub command_timeout_secs: Option<u64>,
    #[serde(default)]
    pub convergence_timeout_secs: Option<u64>,
    #[serde(default = "default_slot_prefix")]
    pub slot_prefix: String,
    #[serde(default)]
    pub state_file: Option<PathBuf>,
}

fn default_vboxmanage() -> String {
    DEFAULT_VBOXMANAGE.to_string()
}

fn default_schedule_time() -> String {
    "08:00".to_string()
}

fn default_poll_interval() -> u64 {
    10
}

fn default_stop_settle() -> u64 {
    3
}

fn default_delete_settle() -> u64 {
    2
}

fn default_slot_prefix() -> String {
    DEFAULT_SLOT_PREFIX.to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let mut config = Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// `VMKEEPER_SCHEDULE_TIME` and `VMKEEPER_VBOXMANAGE` win over the file.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(time) = lookup("VMKEEPER_SCHEDULE_TIME").filter(|v| !v.trim().is_empty()) {
            self.schedule_time = time;
        }
        if let Some(program) = lookup("VMKEEPER_VBOXMANAGE").filter(|v| !v.trim().is_empty()) {
            self.vboxmanage = program;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.ova_path.as_os_str().is_empty() {
            bail!("ova_path cannot be empty");
        }
        if self.base_folder.as_os_str().is_empty() {
            bail!("base_folder cannot be empty");
        }
        if self.vboxmanage.trim().is_empty() {
            bail!("vboxmanage cannot be empty");
        }
        self.schedule_time()?;
        if self.poll_interval_secs == 0 {
            bail!("poll_interval_secs must be greater than zero");
        }
        if matches!(self.command_timeout_secs, Some(0)) {
            bail!("command_timeout_secs must be greater than zero when set");
        }

        let prefix = self.slot_prefix.as_str();
        if prefix.is_empty() {
            bail!("slot_prefix cannot be empty");
        }
        if prefix.contains(['/', '\\']) || prefix == "." || prefix == ".." {
            bail!("slot_prefix must be a plain file name, got '{}'", prefix);
        }
        Ok(())
    }

    pub fn schedule_time(&self) -> Result<ScheduleTime> {
        self.schedule_time
            .parse::<ScheduleTime>()
            .with_context(|| "schedule_time must be HH:MM".to_string())
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }

    pub fn lifecycle_settings(&self) -> LifecycleSettings {
        let mut settings = LifecycleSettings::new(self.ova_path.clone());
        settings.stop_settle = Duration::from_secs(self.stop_settle_secs);
        settings.delete_settle = Duration::from_secs(self.delete_settle_secs);
        settings.convergence_timeout = self.convergence_timeout_secs.map(Duration::from_secs);
        settings
    }

    pub fn supervisor_settings(&self) -> Result<SupervisorSettings> {
        Ok(SupervisorSettings {
            schedule_time: self.schedule_time()?,
            poll_interval: Duration::from_secs(self.poll_interval_secs),
        })
    }
}
