//! Transport trait boundary.
//!
//! The wire codec is an external collaborator: something that turns bytes
//! into decoded [`Packet`] records and back. The relay only requires the
//! surface defined here — a packet event stream, a named-packet write, a
//! pre-play/play marker, and end/error signals — and never reimplements the
//! codec itself. The in-memory pair at the bottom backs the test suites;
//! [`crate::codec`] provides a debug TCP framing an embedder replaces with
//! the real vendor codec.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use waypoint_event_system::{Packet, TextComponent};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connection closed")]
    Closed,

    #[error("transport i/o failure: {0}")]
    Io(String),
}

/// What one leg reports back into the relay's control flow.
#[derive(Debug)]
pub enum LegEvent {
    /// A decoded packet arrived.
    Packet(Packet),
    /// The leg's login phase finished; it now relays game traffic.
    EnteredPlay,
    /// The peer closed the connection.
    Closed,
    /// The transport failed.
    Errored(String),
}

/// The write half of a leg. Cheap to clone behind an `Arc`; shared with
/// timers and the plugin capability surface.
#[async_trait]
pub trait PacketSink: Send + Sync {
    /// Writes one named packet.
    async fn send(&self, packet: Packet) -> Result<(), TransportError>;

    /// Applies a new outbound compression threshold.
    async fn set_compression_threshold(&self, threshold: i32);

    /// Closes the leg, optionally with a displayed reason.
    async fn close(&self, reason: Option<TextComponent>);
}

/// One side of a relayed connection: its write half plus the event stream
/// the relay consumes.
pub struct Leg {
    pub sink: Arc<dyn PacketSink>,
    pub events: mpsc::Receiver<LegEvent>,
}

impl std::fmt::Debug for Leg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Leg").finish_non_exhaustive()
    }
}

/// Authentication faults reported by the credential flow.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("credentials rejected: {0}")]
    Denied(String),

    #[error("verification expired")]
    Expired,

    #[error("credential transport failure: {0}")]
    Transport(String),
}

/// The credential flow's answer to a connection request.
pub enum LoginOutcome {
    /// The backend admitted the session directly.
    Ready(Leg),
    /// An interactive out-of-band step is required before the backend leg
    /// can exist.
    Interactive(InteractiveChallenge),
}

/// An out-of-band verification step. The relay holds the client in the
/// synthetic waiting world until `completion` resolves.
pub struct InteractiveChallenge {
    /// URL the player must visit.
    pub verification_url: String,
    /// Resolves with the backend leg once the player completes the step,
    /// or the authentication fault.
    pub completion: oneshot::Receiver<Result<Leg, AuthError>>,
}

/// External collaborator that performs the backend credential flow and
/// produces the backend leg.
#[async_trait]
pub trait CredentialFlow: Send + Sync {
    async fn connect(&self, username: &str) -> Result<LoginOutcome, AuthError>;
}

// ----------------------------------------------------------------------
// In-memory legs
// ----------------------------------------------------------------------

/// Test-side handle to an in-memory leg: inject events, observe writes.
pub struct MemoryRemote {
    /// Injects events as if decoded off the wire.
    pub events: mpsc::Sender<LegEvent>,
    /// Packets the relay wrote to this leg.
    pub outbound: mpsc::UnboundedReceiver<Packet>,
    /// Last compression threshold applied to the leg.
    pub compression: Arc<Mutex<Option<i32>>>,
    /// Set once the relay closed the leg.
    pub closed: Arc<AtomicBool>,
    /// The close reason, when one was given.
    pub close_reason: Arc<Mutex<Option<TextComponent>>>,
}

struct MemorySink {
    outbound: mpsc::UnboundedSender<Packet>,
    compression: Arc<Mutex<Option<i32>>>,
    closed: Arc<AtomicBool>,
    close_reason: Arc<Mutex<Option<TextComponent>>>,
}

#[async_trait]
impl PacketSink for MemorySink {
    async fn send(&self, packet: Packet) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.outbound.send(packet).map_err(|_| TransportError::Closed)
    }

    async fn set_compression_threshold(&self, threshold: i32) {
        if let Ok(mut slot) = self.compression.lock() {
            *slot = Some(threshold);
        }
    }

    async fn close(&self, reason: Option<TextComponent>) {
        self.closed.store(true, Ordering::SeqCst);
        if let Ok(mut slot) = self.close_reason.lock() {
            if slot.is_none() {
                *slot = reason;
            }
        }
    }
}

/// Creates an in-memory leg pair: the [`Leg`] handed to the relay and the
/// remote handle driving it.
pub fn memory_leg() -> (Leg, MemoryRemote) {
    let (event_tx, event_rx) = mpsc::channel(64);
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let compression = Arc::new(Mutex::new(None));
    let closed = Arc::new(AtomicBool::new(false));
    let close_reason = Arc::new(Mutex::new(None));

    let leg = Leg {
        sink: Arc::new(MemorySink {
            outbound: outbound_tx,
            compression: compression.clone(),
            closed: closed.clone(),
            close_reason: close_reason.clone(),
        }),
        events: event_rx,
    };
    let remote = MemoryRemote {
        events: event_tx,
        outbound: outbound_rx,
        compression,
        closed,
        close_reason,
    };
    (leg, remote)
}

#[cfg(test)]
mod tests {
    use super::*;
    use waypoint_event_system::{KeepAlive, Packet};

    #[tokio::test]
    async fn memory_leg_round_trip() {
        let (leg, mut remote) = memory_leg();

        leg.sink.send(Packet::KeepAlive(KeepAlive { id: 9 })).await.unwrap();
        match remote.outbound.recv().await.unwrap() {
            Packet::KeepAlive(keep_alive) => assert_eq!(keep_alive.id, 9),
            other => panic!("unexpected packet: {other:?}"),
        }

        leg.sink.set_compression_threshold(256).await;
        assert_eq!(*remote.compression.lock().unwrap(), Some(256));

        leg.sink.close(None).await;
        assert!(remote.closed.load(Ordering::SeqCst));
        assert!(matches!(
            leg.sink.send(Packet::KeepAlive(KeepAlive { id: 10 })).await,
            Err(TransportError::Closed)
        ));
    }
}
