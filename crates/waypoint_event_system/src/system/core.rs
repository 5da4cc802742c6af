/// Core EventBus structure.
use crate::events::EventHandler;
use crate::types::Direction;
use super::stats::EventBusStats;
use dashmap::DashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::sync::RwLock;

/// One registered handler with its ownership and gating metadata.
///
/// `owner` is the plugin the subscription was made for; `None` for core
/// subscribers (the state engine, the session manager). `gate` is the
/// plugin's enabled flag, shared with the runtime entry; a handler with its
/// gate off is skipped in the dispatch path.
#[derive(Clone)]
pub(super) struct HandlerEntry {
    pub(super) handler: Arc<dyn EventHandler>,
    pub(super) owner: Option<String>,
    pub(super) gate: Option<Arc<AtomicBool>>,
}

impl HandlerEntry {
    pub(super) fn is_live(&self) -> bool {
        self.gate
            .as_ref()
            .map_or(true, |gate| gate.load(std::sync::atomic::Ordering::SeqCst))
    }
}

/// The event bus routing decoded packets and lifecycle events to handlers.
///
/// Handlers for a key run sequentially in registration order; the session
/// manager registers the state engine before any plugin loads, so plugins
/// always observe post-update game state.
pub struct EventBus {
    pub(super) handlers: DashMap<String, Vec<HandlerEntry>>,
    pub(super) stats: RwLock<EventBusStats>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("keys", &self.handlers.len())
            .finish()
    }
}

impl EventBus {
    /// Creates a bus with no registered handlers.
    pub fn new() -> Self {
        Self {
            handlers: DashMap::new(),
            stats: RwLock::new(EventBusStats::default()),
        }
    }

    /// Current counters.
    pub async fn get_stats(&self) -> EventBusStats {
        self.stats.read().await.clone()
    }

    /// Total handlers registered across all keys.
    pub fn handler_count(&self) -> usize {
        self.handlers.iter().map(|entry| entry.value().len()).sum()
    }

    pub(super) fn packet_key(direction: Direction, name: &str) -> String {
        format!("packet:{direction}:{name}")
    }

    pub(super) fn core_key(name: &str) -> String {
        format!("core:{name}")
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
