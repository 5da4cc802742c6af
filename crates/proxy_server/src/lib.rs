//! # Proxy Server — Session Relay Core
//!
//! The person-in-the-middle relay: accepts one player's client, opens one
//! backend connection through the credential flow, and forwards decoded
//! packets bidirectionally while publishing every observed packet on the
//! event bus. Game logic lives in plugins; this crate only provides the
//! session infrastructure:
//!
//! * **Session manager** — the single session slot, fail-fast rejection of
//!   concurrent logins, symmetric teardown.
//! * **Auth holding pattern** — the synthetic waiting world shown while an
//!   interactive verification step is pending.
//! * **Relay loop** — apply-to-state → publish → forward ordering, pre-play
//!   drop semantics, compression-threshold propagation.
//! * **Transport boundary** — the trait surface an external wire codec
//!   plugs into, plus a JSON-frames debug codec for development.
//!
//! ## Error handling
//!
//! Transport faults are fatal to the session and torn down symmetrically,
//! never auto-retried. Authentication faults are reported in-band via chat
//! and end the session. Non-fatal faults reach the user as a prefixed chat
//! message; internal anomalies are logged only.

mod auth;
mod relay;

pub mod codec;
pub mod config;
pub mod server;
pub mod session;
pub mod transport;

pub use config::{RelayConfig, ServerConfig};
pub use server::ProxyServer;
pub use session::{SessionEndedEvent, SessionManager, SessionStartedEvent, StateResetEvent};
pub use transport::{
    AuthError, CredentialFlow, InteractiveChallenge, Leg, LegEvent, LoginOutcome, PacketSink,
    TransportError,
};

/// Server-level failures.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("a session is already active")]
    SessionActive,

    #[error("a server switch is in progress")]
    SwitchInProgress,

    #[error("no session is active")]
    NoSession,

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("internal error: {0}")]
    Internal(String),
}
