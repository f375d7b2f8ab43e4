//! Wires configuration, the supervisor and the terminal view together.

use crate::config::Config;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use vmkeeper_core::{
    EventSink, HandleStore, SlotAllocator, StartupOutcome, Supervisor, SystemClock, VBoxManage,
};
use vmkeeper_executor::ProcessRunner;
use vmkeeper_interfaces::{pump, TerminalView};

pub fn build_supervisor(config: &Config, events: EventSink) -> Result<Supervisor> {
    let runner = Arc::new(ProcessRunner::with_timeout(config.command_timeout()));
    let backend = Arc::new(VBoxManage::new(config.vboxmanage.clone(), runner));
    let slots = SlotAllocator::new(&config.base_folder, config.slot_prefix.clone());

    let mut supervisor = Supervisor::new(
        backend,
        slots,
        config.lifecycle_settings(),
        config.supervisor_settings()?,
        Arc::new(SystemClock),
        events,
    );
    if let Some(path) = &config.state_file {
        supervisor = supervisor.with_state_store(HandleStore::new(path));
    }
    Ok(supervisor)
}

/// Reconciles once in the foreground, then supervises until Ctrl-C/SIGTERM.
pub async fn run(config: Config) -> Result<()> {
    let (events, rx) = EventSink::channel();
    let presenter = tokio::spawn(async move { pump(rx, &TerminalView::new()).await });

    let mut supervisor = build_supervisor(&config, events)?;
    let shutdown = spawn_shutdown_listener();

    let outcome = supervisor.reconcile_startup().await;
    if let StartupOutcome::Failed(reason) = &outcome {
        error!("Startup reconciliation failed: {}", reason);
    } else {
        info!("Startup reconciliation finished: {:?}", outcome);
    }

    let worker = tokio::spawn(async move {
        supervisor.run(shutdown).await;
    });
    worker.await.context("Supervisor task failed")?;

    let rendered = presenter.await.context("Event view task failed")?;
    info!("Shut down cleanly after {} log events", rendered);
    Ok(())
}

/// The sender is kept alive for the life of the process; dropping it would
/// read as a shutdown request.
fn spawn_shutdown_listener() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);

    tokio::spawn(async move {
        match wait_for_signal().await {
            Ok(()) => {
                info!("Shutdown requested; finishing the current cycle");
                let _ = tx.send(true);
            }
            Err(e) => error!("Failed to listen for shutdown signals: {}", e),
        }
        std::future::pending::<()>().await;
    });

    rx
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
