/// Handler registration methods.
use crate::events::{Event, EventError, EventHandler, TypedEventHandler};
use crate::types::Direction;
use super::core::{EventBus, HandlerEntry};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::debug;

impl EventBus {
    /// Registers a core (non-owned) handler for an observed packet.
    pub async fn on_packet<T, F>(
        &self,
        direction: Direction,
        name: &str,
        handler: F,
    ) -> Result<(), EventError>
    where
        T: Event + 'static,
        F: Fn(T) -> Result<(), EventError> + Send + Sync + 'static,
    {
        self.register_typed_handler(Self::packet_key(direction, name), None, None, handler)
            .await
    }

    /// Registers a core (non-owned) handler for a lifecycle event.
    pub async fn on_core<T, F>(&self, event_name: &str, handler: F) -> Result<(), EventError>
    where
        T: Event + 'static,
        F: Fn(T) -> Result<(), EventError> + Send + Sync + 'static,
    {
        self.register_typed_handler(Self::core_key(event_name), None, None, handler)
            .await
    }

    /// Registers a packet handler on behalf of a plugin.
    ///
    /// The subscription is recorded under `owner` and gated by the plugin's
    /// shared enabled flag; dispatch skips it while the flag is off.
    pub async fn on_packet_for<T, F>(
        &self,
        owner: &str,
        gate: Arc<AtomicBool>,
        direction: Direction,
        name: &str,
        handler: F,
    ) -> Result<(), EventError>
    where
        T: Event + 'static,
        F: Fn(T) -> Result<(), EventError> + Send + Sync + 'static,
    {
        self.register_typed_handler(
            Self::packet_key(direction, name),
            Some(owner.to_string()),
            Some(gate),
            handler,
        )
        .await
    }

    /// Registers a lifecycle-event handler on behalf of a plugin.
    pub async fn on_core_for<T, F>(
        &self,
        owner: &str,
        gate: Arc<AtomicBool>,
        event_name: &str,
        handler: F,
    ) -> Result<(), EventError>
    where
        T: Event + 'static,
        F: Fn(T) -> Result<(), EventError> + Send + Sync + 'static,
    {
        self.register_typed_handler(
            Self::core_key(event_name),
            Some(owner.to_string()),
            Some(gate),
            handler,
        )
        .await
    }

    async fn register_typed_handler<T, F>(
        &self,
        event_key: String,
        owner: Option<String>,
        gate: Option<Arc<AtomicBool>>,
        handler: F,
    ) -> Result<(), EventError>
    where
        T: Event + 'static,
        F: Fn(T) -> Result<(), EventError> + Send + Sync + 'static,
    {
        let handler_name = format!("{}::{}", event_key, T::type_name());
        let typed_handler = TypedEventHandler::new(handler_name, handler);
        let handler_arc: Arc<dyn EventHandler> = Arc::new(typed_handler);

        self.handlers.entry(event_key.clone()).or_default().push(HandlerEntry {
            handler: handler_arc,
            owner: owner.clone(),
            gate,
        });

        let mut stats = self.stats.write().await;
        stats.total_handlers += 1;

        debug!(
            "Registered handler for {} (owner: {})",
            event_key,
            owner.as_deref().unwrap_or("core")
        );
        Ok(())
    }
}
