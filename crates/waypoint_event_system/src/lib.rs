//! # Waypoint Event System
//!
//! Central hub for everything that happens inside the relay. Every decoded
//! packet observed on either leg of the proxied session is published here,
//! alongside relay lifecycle events (session start/end, state resets). The
//! game state engine and every plugin are subscribers; nothing in the relay
//! calls into them directly.
//!
//! ## Event Categories
//!
//! * **Packet events** — keyed `packet:<direction>:<name>`, one per decoded
//!   packet record passing through the relay.
//! * **Core events** — keyed `core:<name>`, emitted by the session manager
//!   and plugin runtime (`session_started`, `session_ended`, `state_reset`,
//!   `plugin_loaded`, ...).
//!
//! ## Handler Gating
//!
//! Handlers registered on behalf of a plugin carry the plugin's name and a
//! shared enabled flag. The bus checks that flag in the dispatch path, so a
//! disabled plugin structurally cannot observe events; handlers themselves
//! never need to self-check.
//!
//! ## Dispatch Semantics
//!
//! Handlers for a key run sequentially in registration order. A failing
//! handler is logged and does not stop dispatch to the remaining handlers.

pub mod events;
pub mod packet;
pub mod system;
pub mod text;
pub mod types;
pub mod utils;
pub mod vendor;

pub use events::{Event, EventError, EventHandler, TypedEventHandler};
pub use packet::{
    Chat, ChatInput, ChatPosition, DestroyEntities, Disconnect, EntityLook, EntityTeleport,
    JoinGame, KeepAlive, OtherPacket, Packet, PlayerInfo, PlayerInfoAction, PlayerInfoEntry,
    PluginChannel, PositionLook, ProfileProperty, RelEntityMove, RelEntityMoveLook, Respawn,
    SetCompression, SpawnPlayer, SpawnPosition, TeamMode, Teams, Title, TitleAction,
};
pub use system::{EventBus, EventBusStats};
pub use text::{strip_formatting, ClickAction, ClickEvent, HoverEvent, TextComponent};
pub use types::{
    Direction, DisconnectReason, EntityId, GameMode, PlayerId, Position, ProtocolState, Rotation,
};
pub use utils::current_timestamp;
pub use vendor::{VendorError, VendorReader, VendorWriter};

use std::sync::Arc;

/// Creates a new shared event bus.
pub fn create_event_bus() -> Arc<EventBus> {
    Arc::new(EventBus::new())
}
