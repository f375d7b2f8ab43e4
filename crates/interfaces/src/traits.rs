use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;
use vmkeeper_core::LogEvent;

/// Read side of the supervisor's log: renders events, never feeds back.
#[async_trait]
pub trait EventView: Send + Sync {
    async fn render(&self, event: &LogEvent);
}

/// Drains `events` into `view` until every sender is gone.
///
/// Returns how many events were rendered.
pub async fn pump<V>(mut events: UnboundedReceiver<LogEvent>, view: &V) -> usize
where
    V: EventView + ?Sized,
{
    let mut rendered = 0;
    while let Some(event) = events.recv().await {
        view.render(&event).await;
        rendered += 1;
    }
    rendered
}
