//! The bidirectional relay loop.
//!
//! One task per session: every event is handled to completion before the
//! next, so packet handlers never interleave. For each observed packet the
//! order is fixed — apply to the game state engine, publish on the bus,
//! then forward — so every subscriber sees post-update state, and a
//! backend-announced compression threshold reaches the client leg no later
//! than the packet announcing it.

use crate::session::{SessionCommand, SessionShared, StateResetEvent};
use crate::transport::LegEvent;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use waypoint_event_system::{
    current_timestamp, Direction, DisconnectReason, EventBus, Packet, ProtocolState,
};

pub(crate) struct RelayArgs<'a> {
    pub(crate) bus: &'a Arc<EventBus>,
    pub(crate) shared: &'a SessionShared,
    pub(crate) client_events: &'a mut mpsc::Receiver<LegEvent>,
    pub(crate) backend_events: mpsc::Receiver<LegEvent>,
    pub(crate) commands: mpsc::Receiver<SessionCommand>,
    pub(crate) client_play: bool,
}

/// Runs the relay until either leg ends or a terminate command arrives.
/// Returns the reason the session is being torn down for.
pub(crate) async fn run_relay(args: RelayArgs<'_>) -> DisconnectReason {
    let RelayArgs {
        bus,
        shared,
        client_events,
        mut backend_events,
        mut commands,
        mut client_play,
    } = args;
    let mut backend_play = false;

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(SessionCommand::SwitchBackend(leg)) => {
                    info!("Switching backend for {}", shared.username);
                    let previous = match shared.backend_sink.write() {
                        Ok(mut slot) => slot.replace(leg.sink),
                        Err(_) => None,
                    };
                    if let Some(previous) = previous {
                        previous.close(None).await;
                    }
                    backend_events = leg.events;
                    backend_play = false;
                    // A new backend is a new world.
                    reset_world(bus, shared).await;
                }
                Some(SessionCommand::Terminate(reason)) => return reason,
                None => return DisconnectReason::Shutdown,
            },
            event = client_events.recv() => {
                match handle_leg_event(
                    bus,
                    shared,
                    Direction::Serverbound,
                    event,
                    &mut client_play,
                    &mut backend_play,
                ).await {
                    LoopStep::Continue => {}
                    LoopStep::End(reason) => return reason,
                }
            }
            event = backend_events.recv() => {
                match handle_leg_event(
                    bus,
                    shared,
                    Direction::Clientbound,
                    event,
                    &mut client_play,
                    &mut backend_play,
                ).await {
                    LoopStep::Continue => {}
                    LoopStep::End(reason) => return reason,
                }
            }
        }
    }
}

enum LoopStep {
    Continue,
    End(DisconnectReason),
}

async fn handle_leg_event(
    bus: &Arc<EventBus>,
    shared: &SessionShared,
    direction: Direction,
    event: Option<LegEvent>,
    client_play: &mut bool,
    backend_play: &mut bool,
) -> LoopStep {
    match event {
        Some(LegEvent::Packet(packet)) => {
            relay_packet(bus, shared, direction, packet, *client_play && *backend_play).await
        }
        Some(LegEvent::EnteredPlay) => {
            match direction {
                Direction::Serverbound => *client_play = true,
                Direction::Clientbound => *backend_play = true,
            }
            if *client_play && *backend_play {
                shared.set_state(ProtocolState::Play);
                info!("Both legs in play; forwarding for {}", shared.username);
            }
            LoopStep::Continue
        }
        Some(LegEvent::Closed) | None => LoopStep::End(DisconnectReason::TransportError(format!(
            "{} leg disconnected",
            leg_name(direction)
        ))),
        Some(LegEvent::Errored(e)) => LoopStep::End(DisconnectReason::TransportError(format!(
            "{} leg error: {e}",
            leg_name(direction)
        ))),
    }
}

/// Apply → publish → forward, in that order.
async fn relay_packet(
    bus: &Arc<EventBus>,
    shared: &SessionShared,
    direction: Direction,
    packet: Packet,
    forwarding: bool,
) -> LoopStep {
    if direction == Direction::Clientbound {
        let invalidated = matches!(&packet, Packet::JoinGame(_) | Packet::Respawn(_));
        if let Ok(mut world) = shared.world.write() {
            world.apply(&packet);
        }
        if invalidated {
            emit_state_reset(bus).await;
        }

        // Must reach the client's outgoing setting no later than the packet
        // announcing it.
        if let Packet::SetCompression(compression) = &packet {
            shared
                .client_sink
                .set_compression_threshold(compression.threshold)
                .await;
        }
    }

    let name = packet.name().to_string();
    if let Err(e) = bus.emit_packet(direction, &name, &packet).await {
        warn!("Failed to publish {direction} {name}: {e}");
    }

    if !forwarding {
        debug!("Dropping pre-play {direction} packet {name}");
        return LoopStep::Continue;
    }

    let target = match direction {
        Direction::Serverbound => match shared.backend_sink.read() {
            Ok(slot) => slot.clone(),
            Err(_) => None,
        },
        Direction::Clientbound => Some(shared.client_sink.clone()),
    };
    match target {
        Some(sink) => match sink.send(packet).await {
            Ok(()) => LoopStep::Continue,
            Err(e) => LoopStep::End(DisconnectReason::TransportError(format!(
                "forwarding to {} leg failed: {e}",
                leg_name(direction.opposite())
            ))),
        },
        None => LoopStep::Continue,
    }
}

async fn reset_world(bus: &Arc<EventBus>, shared: &SessionShared) {
    if let Ok(mut world) = shared.world.write() {
        world.reset();
    }
    emit_state_reset(bus).await;
}

async fn emit_state_reset(bus: &Arc<EventBus>) {
    let event = StateResetEvent {
        timestamp: current_timestamp(),
    };
    if let Err(e) = bus.emit_core("state_reset", &event).await {
        warn!("Failed to emit state_reset: {e}");
    }
}

fn leg_name(direction: Direction) -> &'static str {
    match direction {
        // The direction names the traffic; the leg it arrives from is the
        // other endpoint.
        Direction::Serverbound => "client",
        Direction::Clientbound => "backend",
    }
}
