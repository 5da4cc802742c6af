/// Bus counters for monitoring.

/// Monotonic dispatch counters, readable via [`super::EventBus::get_stats`].
#[derive(Debug, Clone, Default)]
pub struct EventBusStats {
    /// Handlers currently registered.
    pub total_handlers: u64,
    /// Events emitted since startup.
    pub events_emitted: u64,
    /// Handler invocations that actually ran.
    pub handlers_invoked: u64,
    /// Invocations skipped because the owning plugin was disabled.
    pub handlers_skipped_disabled: u64,
    /// Invocations that returned an error.
    pub handler_failures: u64,
}
