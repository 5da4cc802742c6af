//! Session lifecycle management.
//!
//! The relay serves exactly one proxied session at a time. The manager owns
//! the single session slot, runs the credential flow (including the
//! interactive holding pattern), drives the relay loop, and tears both legs
//! down symmetrically when either side goes away. It also implements
//! [`RelayServices`], the relay half of the plugin capability surface.

use crate::auth::HoldingPattern;
use crate::config::RelayConfig;
use crate::relay;
use crate::transport::{
    CredentialFlow, InteractiveChallenge, Leg, LegEvent, LoginOutcome, PacketSink,
};
use crate::ServerError;
use async_trait::async_trait;
use game_state::GameState;
use plugin_system::{RelayServices, ServiceError, SessionSnapshot};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use waypoint_event_system::{
    current_timestamp, Chat, ChatPosition, Direction, DisconnectReason, EventBus, Packet,
    ProtocolState, TextComponent, Title, TitleAction,
};

/// Published on the core bus when a session is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStartedEvent {
    pub username: String,
    pub timestamp: u64,
}

/// The terminal event; dependents (state engine, plugins) reset on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEndedEvent {
    pub username: String,
    pub reason: String,
    pub timestamp: u64,
}

/// Published whenever the world view is invalidated wholesale
/// (join, respawn/dimension change, backend switch).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateResetEvent {
    pub timestamp: u64,
}

/// Commands injected into a running relay loop.
pub(crate) enum SessionCommand {
    SwitchBackend(Leg),
    Terminate(DisconnectReason),
}

/// Handles shared between the manager, the relay loop, and the plugin
/// capability surface. Sync locks only — plugin handlers run inside bus
/// dispatch and cannot await.
#[derive(Clone)]
pub(crate) struct SessionShared {
    pub(crate) username: String,
    pub(crate) created_at: u64,
    pub(crate) state: Arc<Mutex<ProtocolState>>,
    pub(crate) client_sink: Arc<dyn PacketSink>,
    pub(crate) backend_sink: Arc<RwLock<Option<Arc<dyn PacketSink>>>>,
    pub(crate) world: Arc<RwLock<GameState>>,
    commands: mpsc::Sender<SessionCommand>,
}

impl SessionShared {
    pub(crate) fn set_state(&self, state: ProtocolState) {
        if let Ok(mut slot) = self.state.lock() {
            *slot = state;
        }
    }
}

/// Owns the one active session and the auth holding pattern.
pub struct SessionManager {
    bus: Arc<EventBus>,
    config: RelayConfig,
    flow: Arc<dyn CredentialFlow>,
    /// Claimed atomically before any await so concurrent accepts fail fast.
    slot: AtomicBool,
    switching: AtomicBool,
    shared: RwLock<Option<SessionShared>>,
}

impl SessionManager {
    pub fn new(bus: Arc<EventBus>, config: RelayConfig, flow: Arc<dyn CredentialFlow>) -> Self {
        Self {
            bus,
            config,
            flow,
            slot: AtomicBool::new(false),
            switching: AtomicBool::new(false),
            shared: RwLock::new(None),
        }
    }

    /// Accepts one client leg and starts the session's control flow.
    ///
    /// Rejected — the connection is closed with a reason — when a session
    /// is already active or a backend switch is in flight. At most one
    /// session exists; a second attempt is never queued and never displaces
    /// the first.
    pub async fn accept_client(
        self: Arc<Self>,
        username: String,
        client: Leg,
    ) -> Result<(), ServerError> {
        let Leg {
            sink: client_sink,
            events: client_events,
        } = client;

        if self.switching.load(Ordering::SeqCst) {
            let reason = DisconnectReason::SwitchInProgress;
            client_sink.close(Some(disconnect_component(&reason))).await;
            return Err(ServerError::SwitchInProgress);
        }
        if self.slot.swap(true, Ordering::SeqCst) {
            let reason = DisconnectReason::SessionActive;
            client_sink.close(Some(disconnect_component(&reason))).await;
            return Err(ServerError::SessionActive);
        }

        let (command_tx, command_rx) = mpsc::channel(8);
        let shared = SessionShared {
            username: username.clone(),
            created_at: current_timestamp(),
            state: Arc::new(Mutex::new(ProtocolState::Login)),
            client_sink,
            backend_sink: Arc::new(RwLock::new(None)),
            world: Arc::new(RwLock::new(GameState::new())),
            commands: command_tx,
        };
        if let Ok(mut slot) = self.shared.write() {
            *slot = Some(shared.clone());
        }

        info!("Session created for {username}");
        self.emit_core(
            "session_started",
            &SessionStartedEvent {
                username,
                timestamp: current_timestamp(),
            },
        )
        .await;

        tokio::spawn(async move {
            self.drive_session(shared, client_events, command_rx).await;
        });
        Ok(())
    }

    /// The session's whole control flow: credential flow, optional holding
    /// pattern, relay loop, teardown.
    async fn drive_session(
        self: Arc<Self>,
        shared: SessionShared,
        mut client_events: mpsc::Receiver<LegEvent>,
        command_rx: mpsc::Receiver<SessionCommand>,
    ) {
        let mut client_play = false;

        let backend = match self.flow.connect(&shared.username).await {
            Ok(LoginOutcome::Ready(leg)) => leg,
            Ok(LoginOutcome::Interactive(challenge)) => {
                shared.set_state(ProtocolState::AuthPending);
                info!("Interactive verification required for {}", shared.username);
                match self
                    .hold_for_auth(&shared, &mut client_events, &mut client_play, challenge)
                    .await
                {
                    Ok(leg) => leg,
                    Err(reason) => {
                        self.teardown(&shared, reason).await;
                        return;
                    }
                }
            }
            Err(e) => {
                // Reported in-band, then the session ends.
                let _ = shared
                    .client_sink
                    .send(prefixed_chat(format!("Authentication failed: {e}")))
                    .await;
                self.teardown(&shared, DisconnectReason::AuthFailed(e.to_string()))
                    .await;
                return;
            }
        };

        if let Ok(mut slot) = shared.backend_sink.write() {
            *slot = Some(backend.sink.clone());
        }

        let reason = relay::run_relay(relay::RelayArgs {
            bus: &self.bus,
            shared: &shared,
            client_events: &mut client_events,
            backend_events: backend.events,
            commands: command_rx,
            client_play,
        })
        .await;

        self.teardown(&shared, reason).await;
    }

    /// Holds the client in the synthetic world until the interactive step
    /// resolves. Client packets observed here are published to subscribers
    /// and dropped from forwarding; a client disconnect aborts the wait.
    async fn hold_for_auth(
        &self,
        shared: &SessionShared,
        client_events: &mut mpsc::Receiver<LegEvent>,
        client_play: &mut bool,
        mut challenge: InteractiveChallenge,
    ) -> Result<Leg, DisconnectReason> {
        let pattern = HoldingPattern::begin(
            &self.config,
            shared.client_sink.clone(),
            &challenge.verification_url,
        )
        .await
        .map_err(|e| DisconnectReason::TransportError(e.to_string()))?;

        loop {
            tokio::select! {
                completion = &mut challenge.completion => {
                    pattern.end();
                    return match completion {
                        Ok(Ok(leg)) => {
                            let _ = shared
                                .client_sink
                                .send(prefixed_chat("Verification complete, joining...".to_string()))
                                .await;
                            Ok(leg)
                        }
                        Ok(Err(e)) => {
                            let _ = shared
                                .client_sink
                                .send(prefixed_chat(format!("Verification failed: {e}")))
                                .await;
                            Err(DisconnectReason::AuthFailed(e.to_string()))
                        }
                        Err(_) => Err(DisconnectReason::AuthFailed(
                            "verification flow dropped".to_string(),
                        )),
                    };
                }
                event = client_events.recv() => match event {
                    Some(LegEvent::Packet(packet)) => {
                        debug!("Dropping pre-play client packet {}", packet.name());
                        let name = packet.name().to_string();
                        let _ = self
                            .bus
                            .emit_packet(Direction::Serverbound, &name, &packet)
                            .await;
                    }
                    Some(LegEvent::EnteredPlay) => {
                        *client_play = true;
                    }
                    Some(LegEvent::Closed) | None => {
                        return Err(DisconnectReason::TransportError(
                            "client disconnected during verification".to_string(),
                        ));
                    }
                    Some(LegEvent::Errored(e)) => {
                        return Err(DisconnectReason::TransportError(e));
                    }
                },
            }
        }
    }

    /// Replaces the backend leg while keeping the client connected. New
    /// client accepts are rejected while the switch is in flight.
    pub async fn switch_backend(&self) -> Result<(), ServerError> {
        let shared = match self.shared.read() {
            Ok(slot) => slot.clone().ok_or(ServerError::NoSession)?,
            Err(_) => return Err(ServerError::NoSession),
        };
        if self.switching.swap(true, Ordering::SeqCst) {
            return Err(ServerError::SwitchInProgress);
        }

        let result = match self.flow.connect(&shared.username).await {
            Ok(LoginOutcome::Ready(leg)) => shared
                .commands
                .send(SessionCommand::SwitchBackend(leg))
                .await
                .map_err(|_| ServerError::NoSession),
            Ok(LoginOutcome::Interactive(_)) => Err(ServerError::Auth(
                "interactive verification is only supported at login".to_string(),
            )),
            Err(e) => Err(ServerError::Auth(e.to_string())),
        };

        self.switching.store(false, Ordering::SeqCst);
        result
    }

    /// Asks the running session, if any, to terminate.
    pub async fn shutdown(&self) {
        let shared = match self.shared.read() {
            Ok(slot) => slot.clone(),
            Err(_) => None,
        };
        if let Some(shared) = shared {
            let _ = shared
                .commands
                .send(SessionCommand::Terminate(DisconnectReason::Shutdown))
                .await;
        }
    }

    pub fn has_session(&self) -> bool {
        self.slot.load(Ordering::SeqCst)
    }

    /// Symmetric teardown: close both legs, publish the terminal event,
    /// clear the world wholesale, release the slot.
    async fn teardown(&self, shared: &SessionShared, reason: DisconnectReason) {
        warn!("Session for {} ended: {}", shared.username, reason);
        shared.set_state(ProtocolState::Ended);

        shared
            .client_sink
            .close(Some(disconnect_component(&reason)))
            .await;
        let backend = match shared.backend_sink.read() {
            Ok(slot) => slot.clone(),
            Err(_) => None,
        };
        if let Some(backend) = backend {
            backend.close(None).await;
        }

        // Terminal event first, so dependents observe it with the session
        // still queryable; then the world clears and the slot frees.
        self.emit_core(
            "session_ended",
            &SessionEndedEvent {
                username: shared.username.clone(),
                reason: reason.to_string(),
                timestamp: current_timestamp(),
            },
        )
        .await;

        if let Ok(mut world) = shared.world.write() {
            world.reset();
        }
        if let Ok(mut slot) = self.shared.write() {
            *slot = None;
        }
        self.slot.store(false, Ordering::SeqCst);
    }

    async fn emit_core<T: waypoint_event_system::Event>(&self, name: &str, event: &T) {
        if let Err(e) = self.bus.emit_core(name, event).await {
            error!("Failed to emit {name}: {e}");
        }
    }

    fn client_sink(&self) -> Result<Arc<dyn PacketSink>, ServiceError> {
        match self.shared.read() {
            Ok(slot) => slot
                .as_ref()
                .map(|shared| shared.client_sink.clone())
                .ok_or(ServiceError::NoSession),
            Err(_) => Err(ServiceError::NoSession),
        }
    }

    fn backend_sink(&self) -> Result<Arc<dyn PacketSink>, ServiceError> {
        match self.shared.read() {
            Ok(slot) => slot
                .as_ref()
                .and_then(|shared| shared.backend_sink.read().ok().and_then(|b| b.clone()))
                .ok_or(ServiceError::NoSession),
            Err(_) => Err(ServiceError::NoSession),
        }
    }
}

fn map_transport(e: crate::transport::TransportError) -> ServiceError {
    ServiceError::Transport(e.to_string())
}

/// The relay-prefixed chat line used for user-visible non-fatal faults.
fn prefixed_chat(message: String) -> Packet {
    Packet::Chat(Chat {
        component: TextComponent::colored("[Waypoint] ", "gold")
            .append(TextComponent::plain(message)),
        position: ChatPosition::Chat,
    })
}

fn disconnect_component(reason: &DisconnectReason) -> TextComponent {
    TextComponent::colored(reason.to_string(), "red")
}

#[async_trait]
impl RelayServices for SessionManager {
    async fn send_chat(&self, component: TextComponent) -> Result<(), ServiceError> {
        self.client_sink()?
            .send(Packet::Chat(Chat {
                component,
                position: ChatPosition::Chat,
            }))
            .await
            .map_err(map_transport)
    }

    async fn send_action_bar(&self, component: TextComponent) -> Result<(), ServiceError> {
        self.client_sink()?
            .send(Packet::Chat(Chat {
                component,
                position: ChatPosition::ActionBar,
            }))
            .await
            .map_err(map_transport)
    }

    async fn send_title(&self, action: TitleAction) -> Result<(), ServiceError> {
        self.client_sink()?
            .send(Packet::Title(Title { action }))
            .await
            .map_err(map_transport)
    }

    async fn send_to_client(&self, packet: Packet) -> Result<(), ServiceError> {
        self.client_sink()?.send(packet).await.map_err(map_transport)
    }

    async fn send_to_backend(&self, packet: Packet) -> Result<(), ServiceError> {
        self.backend_sink()?.send(packet).await.map_err(map_transport)
    }

    async fn session(&self) -> Option<SessionSnapshot> {
        let slot = self.shared.read().ok()?;
        let shared = slot.as_ref()?;
        let state = shared.state.lock().ok().map(|s| *s)?;
        Some(SessionSnapshot {
            username: shared.username.clone(),
            state,
            created_at: shared.created_at,
        })
    }

    fn world(&self) -> Option<Arc<RwLock<GameState>>> {
        self.shared
            .read()
            .ok()?
            .as_ref()
            .map(|shared| shared.world.clone())
    }
}
