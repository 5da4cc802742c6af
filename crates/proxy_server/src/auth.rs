//! The authentication holding pattern.
//!
//! When the credential flow reports an interactive step, the client cannot
//! be left on the login screen — the transport would time out. Instead the
//! relay shows a synthetic minimal world (fixed entity id, non-adventure
//! game mode, fixed spawn), sends a chat message carrying the verification
//! URL, tries a best-effort OS browser open, and keeps the transport alive
//! with periodic synthetic keep-alives. The whole pattern exists only while
//! authentication is pending and is torn down on success and failure alike.

use crate::config::RelayConfig;
use crate::transport::{PacketSink, TransportError};
use std::process::Command;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use waypoint_event_system::{
    Chat, ChatPosition, GameMode, JoinGame, KeepAlive, Packet, PositionLook, SpawnPosition,
    TextComponent,
};

/// A live holding pattern; dropping it cancels the keep-alive timer.
pub(crate) struct HoldingPattern {
    keep_alive: JoinHandle<()>,
}

impl HoldingPattern {
    /// Puts the client into the synthetic waiting world and starts the
    /// keep-alive timer.
    pub(crate) async fn begin(
        config: &RelayConfig,
        sink: Arc<dyn PacketSink>,
        verification_url: &str,
    ) -> Result<Self, TransportError> {
        send_synthetic_world(config, &sink).await?;

        sink.send(Packet::Chat(Chat {
            component: verification_message(verification_url),
            position: ChatPosition::Chat,
        }))
        .await?;

        if config.open_browser {
            match open_browser(verification_url) {
                Ok(()) => info!("Opened verification URL in the system browser"),
                Err(e) => warn!("Could not open browser for verification: {e}"),
            }
        }

        let interval = config.keep_alive_interval;
        let keep_alive = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The immediate first tick is skipped; the world was just sent.
            ticker.tick().await;
            let mut id: i32 = 0;
            loop {
                ticker.tick().await;
                id = id.wrapping_add(1);
                if let Err(e) = sink.send(Packet::KeepAlive(KeepAlive { id })).await {
                    // The session is gone; the timer just stops.
                    debug!("Holding keep-alive ended: {e}");
                    break;
                }
            }
        });

        Ok(Self { keep_alive })
    }

    /// Tears the pattern down. Also happens on drop, so an aborted auth
    /// cannot leave the timer running.
    pub(crate) fn end(self) {
        self.keep_alive.abort();
    }
}

impl Drop for HoldingPattern {
    fn drop(&mut self) {
        self.keep_alive.abort();
    }
}

async fn send_synthetic_world(
    config: &RelayConfig,
    sink: &Arc<dyn PacketSink>,
) -> Result<(), TransportError> {
    let game_mode = match config.holding_game_mode {
        // The waiting world must not lock the player's camera.
        GameMode::Adventure => GameMode::Creative,
        other => other,
    };
    sink.send(Packet::JoinGame(JoinGame {
        entity_id: waypoint_event_system::EntityId(config.holding_entity_id),
        game_mode,
        dimension: 0,
    }))
    .await?;
    sink.send(Packet::SpawnPosition(SpawnPosition {
        x: config.holding_spawn.x as i32,
        y: config.holding_spawn.y as i32,
        z: config.holding_spawn.z as i32,
    }))
    .await?;
    sink.send(Packet::PositionLook(PositionLook {
        x: config.holding_spawn.x,
        y: config.holding_spawn.y,
        z: config.holding_spawn.z,
        yaw: 0.0,
        pitch: 0.0,
        flags: 0,
    }))
    .await?;
    Ok(())
}

fn verification_message(url: &str) -> TextComponent {
    TextComponent::colored("[Waypoint] ", "gold")
        .append(TextComponent::plain("Sign-in required. Click to verify: "))
        .append(
            TextComponent::colored(url, "aqua")
                .with_url(url)
                .with_hover_text(TextComponent::plain("Open the verification page")),
        )
}

/// Best-effort browser launch; failure is logged by the caller, never fatal.
fn open_browser(url: &str) -> std::io::Result<()> {
    #[cfg(target_os = "macos")]
    let mut command = {
        let mut command = Command::new("open");
        command.arg(url);
        command
    };
    #[cfg(target_os = "windows")]
    let mut command = {
        let mut command = Command::new("cmd");
        command.args(["/C", "start", "", url]);
        command
    };
    #[cfg(all(unix, not(target_os = "macos")))]
    let mut command = {
        let mut command = Command::new("xdg-open");
        command.arg(url);
        command
    };

    command.spawn().map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory_leg;
    use std::time::Duration;

    fn test_config() -> RelayConfig {
        RelayConfig {
            open_browser: false,
            keep_alive_interval: Duration::from_secs(15),
            ..RelayConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn holding_pattern_sends_world_then_keep_alives() {
        let (leg, mut remote) = memory_leg();
        let pattern = HoldingPattern::begin(&test_config(), leg.sink.clone(), "https://verify")
            .await
            .unwrap();

        // Synthetic world: join, spawn point, position, then the chat.
        assert!(matches!(remote.outbound.recv().await.unwrap(), Packet::JoinGame(_)));
        assert!(matches!(remote.outbound.recv().await.unwrap(), Packet::SpawnPosition(_)));
        assert!(matches!(remote.outbound.recv().await.unwrap(), Packet::PositionLook(_)));
        match remote.outbound.recv().await.unwrap() {
            Packet::Chat(chat) => {
                assert!(chat.component.to_plain().contains("https://verify"));
            }
            other => panic!("expected chat, got {other:?}"),
        }

        // One keep-alive per interval.
        tokio::time::advance(Duration::from_secs(15)).await;
        assert!(matches!(remote.outbound.recv().await.unwrap(), Packet::KeepAlive(_)));
        tokio::time::advance(Duration::from_secs(15)).await;
        assert!(matches!(remote.outbound.recv().await.unwrap(), Packet::KeepAlive(_)));

        pattern.end();
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(remote.outbound.try_recv().is_err(), "keep-alive survived teardown");
    }

    #[tokio::test(start_paused = true)]
    async fn adventure_holding_mode_is_replaced() {
        let (leg, mut remote) = memory_leg();
        let config = RelayConfig {
            holding_game_mode: GameMode::Adventure,
            ..test_config()
        };
        let pattern = HoldingPattern::begin(&config, leg.sink.clone(), "https://verify")
            .await
            .unwrap();

        match remote.outbound.recv().await.unwrap() {
            Packet::JoinGame(join) => assert_ne!(join.game_mode, GameMode::Adventure),
            other => panic!("expected join_game, got {other:?}"),
        }
        pattern.end();
    }

    #[tokio::test(start_paused = true)]
    async fn late_timer_fire_after_close_is_a_noop() {
        let (leg, mut remote) = memory_leg();
        let _pattern = HoldingPattern::begin(&test_config(), leg.sink.clone(), "https://verify")
            .await
            .unwrap();
        while remote.outbound.try_recv().is_ok() {}

        // Close the leg out from under the timer; the next fire must not
        // panic or loop.
        leg.sink.close(None).await;
        tokio::time::advance(Duration::from_secs(45)).await;
        assert!(remote.outbound.try_recv().is_err());
    }
}
