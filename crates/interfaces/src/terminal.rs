use crate::traits::EventView;
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use vmkeeper_core::LogEvent;

/// Prints one timestamped line per event on stdout.
pub struct TerminalView;

impl TerminalView {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TerminalView {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventView for TerminalView {
    async fn render(&self, event: &LogEvent) {
        let mut stdout = tokio::io::stdout();
        let _ = stdout.write_all(event.render().as_bytes()).await;
        let _ = stdout.write_all(b"\n").await;
        let _ = stdout.flush().await;
    }
}
