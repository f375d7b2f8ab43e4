//! Command vocabulary of the hypervisor control tool.

use std::path::Path;
use std::sync::Arc;
use vmkeeper_executor::{CommandOutput, CommandRunner};

pub const DEFAULT_VBOXMANAGE: &str = "VBoxManage";

pub struct VBoxManage {
    program: String,
    runner: Arc<dyn CommandRunner>,
}

impl VBoxManage {
    pub fn new(program: impl Into<String>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            program: program.into(),
            runner,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    async fn run(&self, args: &[&str]) -> CommandOutput {
        let args: Vec<String> = args.iter().map(|arg| arg.to_string()).collect();
        self.runner.execute(&self.program, &args).await
    }

    pub async fn list_vms(&self) -> CommandOutput {
        self.run(&["list", "vms"]).await
    }

    pub async fn list_running_vms(&self) -> CommandOutput {
        self.run(&["list", "runningvms"]).await
    }

    pub async fn power_off(&self, name: &str) -> CommandOutput {
        self.run(&["controlvm", name, "poweroff"]).await
    }

    pub async fn unregister_and_delete(&self, name: &str) -> CommandOutput {
        self.run(&["unregistervm", name, "--delete"]).await
    }

    pub async fn import(&self, template: &Path, base_folder: &Path) -> CommandOutput {
        let template = template.to_string_lossy().into_owned();
        let base_folder = base_folder.to_string_lossy().into_owned();
        self.run(&[
            "import",
            template.as_str(),
            "--vsys",
            "0",
            "--basefolder",
            base_folder.as_str(),
            "--options",
            "keepallmacs",
        ])
        .await
    }

    pub async fn start_headless(&self, name: &str) -> CommandOutput {
        self.run(&["startvm", name, "--type", "headless"]).await
    }
}

/// Extracts instance names from listing output.
///
/// Each line looks like `"name" {uuid}`; lines without a quoted name are
/// skipped.
pub fn parse_instance_names(listing: &str) -> Vec<String> {
    listing
        .lines()
        .filter_map(|line| {
            let rest = line.split_once('"')?.1;
            let name = rest.split_once('"')?.0;
            (!name.is_empty()).then(|| name.to_string())
        })
        .collect()
}
