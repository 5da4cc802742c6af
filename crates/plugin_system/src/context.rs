//! The capability surface handed to each plugin.
//!
//! One [`PluginContext`] exists per plugin, parameterized by the plugin's
//! identity. Everything a plugin can do goes through it: event
//! subscriptions (recorded under the plugin's name and gated by its enabled
//! flag), outbound chat/action-bar/title senders, direct packet senders to
//! either leg, session and world queries, the plugin's config store, and
//! plugin-management queries. The relay side of the surface is the
//! [`RelayServices`] trait, implemented once by the session manager.

use crate::config::PluginConfigStore;
use crate::{PluginHandle, RuntimeShared};
use async_trait::async_trait;
use game_state::GameState;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Weak};
use tracing::warn;
use waypoint_event_system::{
    Direction, Event, EventBus, EventError, Packet, ProtocolState, TextComponent, TitleAction,
};

/// Errors from the relay-facing half of the capability surface.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("no session is active")]
    NoSession,

    #[error("transport error: {0}")]
    Transport(String),
}

/// Point-in-time view of the active session.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub username: String,
    pub state: ProtocolState,
    pub created_at: u64,
}

/// What the relay offers plugins. Implemented by the session manager;
/// every call checks session liveness itself.
#[async_trait]
pub trait RelayServices: Send + Sync {
    /// Sends a chat message to the connected client.
    async fn send_chat(&self, component: TextComponent) -> Result<(), ServiceError>;

    /// Sends action-bar text to the connected client.
    async fn send_action_bar(&self, component: TextComponent) -> Result<(), ServiceError>;

    /// Sends a title action to the connected client.
    async fn send_title(&self, action: TitleAction) -> Result<(), ServiceError>;

    /// Writes a packet directly to the client leg.
    async fn send_to_client(&self, packet: Packet) -> Result<(), ServiceError>;

    /// Writes a packet directly to the backend leg.
    async fn send_to_backend(&self, packet: Packet) -> Result<(), ServiceError>;

    /// Snapshot of the active session, if one exists.
    async fn session(&self) -> Option<SessionSnapshot>;

    /// The active session's world view, if one exists.
    fn world(&self) -> Option<Arc<std::sync::RwLock<GameState>>>;
}

/// A plugin's private view of the relay.
pub struct PluginContext {
    name: String,
    gate: Arc<AtomicBool>,
    bus: Arc<EventBus>,
    services: Arc<dyn RelayServices>,
    runtime: Weak<RuntimeShared>,
    config: PluginConfigStore,
}

impl PluginContext {
    pub(crate) fn new(
        name: String,
        gate: Arc<AtomicBool>,
        bus: Arc<EventBus>,
        services: Arc<dyn RelayServices>,
        runtime: Weak<RuntimeShared>,
        config: PluginConfigStore,
    ) -> Self {
        Self {
            name,
            gate,
            bus,
            services,
            runtime,
            config,
        }
    }

    /// The registry key this context belongs to.
    pub fn plugin_name(&self) -> &str {
        &self.name
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    /// Subscribes to an observed packet. The subscription is recorded under
    /// this plugin and stops delivering while the plugin is disabled.
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
        self.bus
            .on_packet_for(&self.name, self.gate.clone(), direction, name, handler)
            .await
    }

    /// Subscribes to a relay lifecycle event.
    pub async fn on_core<T, F>(&self, event_name: &str, handler: F) -> Result<(), EventError>
    where
        T: Event + 'static,
        F: Fn(T) -> Result<(), EventError> + Send + Sync + 'static,
    {
        self.bus
            .on_core_for(&self.name, self.gate.clone(), event_name, handler)
            .await
    }

    /// Emits a lifecycle event, e.g. for plugin-to-plugin signalling.
    pub async fn emit_core<T>(&self, event_name: &str, event: &T) -> Result<(), EventError>
    where
        T: Event,
    {
        self.bus.emit_core(event_name, event).await
    }

    /// Drops this plugin's subscription to one packet.
    pub async fn unsubscribe_packet(&self, direction: Direction, name: &str) -> usize {
        self.bus
            .remove_packet_handlers_for(&self.name, direction, name)
            .await
    }

    /// Drops this plugin's subscription to one lifecycle event.
    pub async fn unsubscribe_core(&self, event_name: &str) -> usize {
        self.bus.remove_core_handlers_for(&self.name, event_name).await
    }

    /// Drops every subscription this plugin holds.
    pub async fn unsubscribe_all(&self) -> usize {
        self.bus.remove_handlers_for(&self.name).await
    }

    /// The event keys this plugin currently subscribes to.
    pub async fn subscriptions(&self) -> Vec<String> {
        self.bus.subscription_keys_for(&self.name).await
    }

    // ------------------------------------------------------------------
    // Relay services
    // ------------------------------------------------------------------

    pub async fn send_chat(&self, component: TextComponent) -> Result<(), ServiceError> {
        self.services.send_chat(component).await
    }

    pub async fn send_action_bar(&self, component: TextComponent) -> Result<(), ServiceError> {
        self.services.send_action_bar(component).await
    }

    pub async fn send_title(&self, action: TitleAction) -> Result<(), ServiceError> {
        self.services.send_title(action).await
    }

    pub async fn send_to_client(&self, packet: Packet) -> Result<(), ServiceError> {
        self.services.send_to_client(packet).await
    }

    pub async fn send_to_backend(&self, packet: Packet) -> Result<(), ServiceError> {
        self.services.send_to_backend(packet).await
    }

    pub async fn session(&self) -> Option<SessionSnapshot> {
        self.services.session().await
    }

    pub fn world(&self) -> Option<Arc<std::sync::RwLock<GameState>>> {
        self.services.world()
    }

    // ------------------------------------------------------------------
    // Plugin management
    // ------------------------------------------------------------------

    /// Authoritative enabled query for any registered plugin.
    pub async fn is_enabled(&self, name: &str) -> bool {
        match self.runtime.upgrade() {
            Some(shared) => shared.registry.read().await.is_enabled(name),
            None => {
                warn!("Plugin {} queried a dropped runtime", self.name);
                false
            }
        }
    }

    /// The opaque instance registered under `name`, if loaded.
    pub async fn instance(&self, name: &str) -> Option<PluginHandle> {
        let shared = self.runtime.upgrade()?;
        let registry = shared.registry.read().await;
        registry.instance(name)
    }

    /// This plugin's configuration store.
    pub fn config(&self) -> &PluginConfigStore {
        &self.config
    }
}
