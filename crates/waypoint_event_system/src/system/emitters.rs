/// Event emission and dispatch.
use crate::events::{Event, EventError};
use crate::types::Direction;
use super::core::EventBus;
use tracing::{debug, warn};

impl EventBus {
    /// Publishes an observed packet to every live handler for its key.
    #[inline]
    pub async fn emit_packet<T>(
        &self,
        direction: Direction,
        name: &str,
        event: &T,
    ) -> Result<(), EventError>
    where
        T: Event,
    {
        self.emit_event(&Self::packet_key(direction, name), event).await
    }

    /// Publishes a relay lifecycle event.
    #[inline]
    pub async fn emit_core<T>(&self, event_name: &str, event: &T) -> Result<(), EventError>
    where
        T: Event,
    {
        self.emit_event(&Self::core_key(event_name), event).await
    }

    /// Serializes once, then dispatches sequentially in registration order.
    ///
    /// Handlers whose gate is off are skipped — this is the single place
    /// enable/disable is enforced. A failing handler is logged and counted;
    /// dispatch continues with the remaining handlers.
    async fn emit_event<T>(&self, event_key: &str, event: &T) -> Result<(), EventError>
    where
        T: Event,
    {
        let data = event.serialize()?;

        // Snapshot the entries so the map shard is not held across handler
        // awaits; handlers may register further subscriptions.
        let entries = self.handlers.get(event_key).map(|entry| entry.value().clone());
        let Some(entries) = entries else {
            debug!("No handlers for {}", event_key);
            let mut stats = self.stats.write().await;
            stats.events_emitted += 1;
            return Ok(());
        };

        let mut invoked: u64 = 0;
        let mut skipped: u64 = 0;
        let mut failures: u64 = 0;

        for entry in &entries {
            if !entry.is_live() {
                skipped += 1;
                continue;
            }
            invoked += 1;
            if let Err(e) = entry.handler.handle(&data).await {
                failures += 1;
                warn!(
                    "Handler {} failed for {}: {}",
                    entry.handler.handler_name(),
                    event_key,
                    e
                );
            }
        }

        let mut stats = self.stats.write().await;
        stats.events_emitted += 1;
        stats.handlers_invoked += invoked;
        stats.handlers_skipped_disabled += skipped;
        stats.handler_failures += failures;
        Ok(())
    }
}
