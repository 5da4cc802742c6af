//! Relay configuration.

use std::time::Duration;
use waypoint_event_system::{GameMode, Position};

/// Tunables for the session manager and the auth holding pattern.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Interval of the synthetic keep-alive during AUTH_PENDING.
    pub keep_alive_interval: Duration,
    /// Fixed entity id of the synthetic waiting world.
    pub holding_entity_id: i32,
    /// Game mode shown while waiting; anything non-adventure works, the
    /// player must not be movement-locked.
    pub holding_game_mode: GameMode,
    /// Fixed spawn of the synthetic world.
    pub holding_spawn: Position,
    /// Attempt a best-effort OS browser open for verification URLs.
    pub open_browser: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            keep_alive_interval: Duration::from_secs(15),
            holding_entity_id: 1,
            holding_game_mode: GameMode::Creative,
            holding_spawn: Position::new(0.5, 64.0, 0.5),
            open_browser: true,
        }
    }
}

/// Listener-level settings used by [`crate::server::ProxyServer`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the client-facing listener binds to.
    pub bind_address: String,
    /// Address of the remote backend the relay connects to.
    pub backend_address: String,
    pub relay: RelayConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:25565".to_string(),
            backend_address: "127.0.0.1:25566".to_string(),
            relay: RelayConfig::default(),
        }
    }
}
