//! # Core Type Definitions
//!
//! Fundamental types shared across the relay: identifiers, spatial types,
//! and the session protocol state machine.
//!
//! Wrapper types keep the id spaces apart — a [`PlayerId`] (account uuid
//! carried by the player list) can never be confused with an [`EntityId`]
//! (the per-world integer handle movement packets refer to).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a player, as carried by player-list packets.
///
/// Wraps the account uuid the backend assigns; stable for the lifetime of
/// the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlayerId(pub Uuid);

impl PlayerId {
    /// Creates a new random player id. Used by tests and synthetic entries.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_str(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }
}

impl std::str::FromStr for PlayerId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str(s)
    }
}

impl Default for PlayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// World-scoped integer handle entity packets refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityId(pub i32);

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A 3D position in world units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Facing angles in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rotation {
    pub yaw: f32,
    pub pitch: f32,
}

impl Rotation {
    pub fn new(yaw: f32, pitch: f32) -> Self {
        Self { yaw, pitch }
    }
}

/// Which way a packet is travelling through the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Backend → client.
    Clientbound,
    /// Client → backend.
    Serverbound,
}

impl Direction {
    /// The opposite leg, where a forwarded packet goes.
    pub fn opposite(self) -> Self {
        match self {
            Direction::Clientbound => Direction::Serverbound,
            Direction::Serverbound => Direction::Clientbound,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Clientbound => write!(f, "clientbound"),
            Direction::Serverbound => write!(f, "serverbound"),
        }
    }
}

/// Lifecycle state of a proxied session.
///
/// Forwarding is gated on both legs reaching [`ProtocolState::Play`];
/// everything before that is published to subscribers but dropped from
/// forwarding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolState {
    Handshake,
    Login,
    /// The credential flow requires an interactive step; the client is held
    /// in the synthetic waiting world until it completes.
    AuthPending,
    Play,
    Ended,
}

/// Player game mode as announced by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    Survival,
    Creative,
    Adventure,
    Spectator,
}

/// Why a connection attempt or live session was terminated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DisconnectReason {
    /// Another session is already being relayed.
    SessionActive,
    /// A backend switch is in flight; try again once it settles.
    SwitchInProgress,
    /// The credential flow failed.
    AuthFailed(String),
    /// One leg disconnected or errored.
    TransportError(String),
    /// The relay is shutting down.
    Shutdown,
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisconnectReason::SessionActive => write!(f, "another session is already active"),
            DisconnectReason::SwitchInProgress => write!(f, "a server switch is in progress"),
            DisconnectReason::AuthFailed(msg) => write!(f, "authentication failed: {msg}"),
            DisconnectReason::TransportError(msg) => write!(f, "connection error: {msg}"),
            DisconnectReason::Shutdown => write!(f, "relay shutting down"),
        }
    }
}
