//! Decoded packet records.
//!
//! The wire codec is an external collaborator: it turns bytes into these
//! named, typed records and back. The relay, the game state engine, and
//! plugins only ever see this representation. Positions and deltas carry the
//! raw wire units (fixed-point thirty-seconds of a world unit, angle bytes
//! as fractions of a full turn); converting to world units is the state
//! engine's business, not the codec's.

use crate::text::TextComponent;
use crate::types::{EntityId, GameMode, PlayerId};
use serde::{Deserialize, Serialize};

/// One decoded packet record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "name", content = "body", rename_all = "snake_case")]
pub enum Packet {
    JoinGame(JoinGame),
    Respawn(Respawn),
    KeepAlive(KeepAlive),
    Chat(Chat),
    ChatInput(ChatInput),
    Title(Title),
    Disconnect(Disconnect),
    SetCompression(SetCompression),
    PlayerInfo(PlayerInfo),
    Teams(Teams),
    SpawnPlayer(SpawnPlayer),
    SpawnPosition(SpawnPosition),
    PositionLook(PositionLook),
    RelEntityMove(RelEntityMove),
    EntityLook(EntityLook),
    RelEntityMoveLook(RelEntityMoveLook),
    EntityTeleport(EntityTeleport),
    DestroyEntities(DestroyEntities),
    PluginChannel(PluginChannel),
    /// Any packet the relay has no structured model for. Still published and
    /// forwarded verbatim.
    Other(OtherPacket),
}

impl Packet {
    /// Stable name used as the bus key suffix.
    pub fn name(&self) -> &str {
        match self {
            Packet::JoinGame(_) => "join_game",
            Packet::Respawn(_) => "respawn",
            Packet::KeepAlive(_) => "keep_alive",
            Packet::Chat(_) => "chat",
            Packet::ChatInput(_) => "chat_input",
            Packet::Title(_) => "title",
            Packet::Disconnect(_) => "disconnect",
            Packet::SetCompression(_) => "set_compression",
            Packet::PlayerInfo(_) => "player_info",
            Packet::Teams(_) => "teams",
            Packet::SpawnPlayer(_) => "spawn_player",
            Packet::SpawnPosition(_) => "spawn_position",
            Packet::PositionLook(_) => "position_look",
            Packet::RelEntityMove(_) => "rel_entity_move",
            Packet::EntityLook(_) => "entity_look",
            Packet::RelEntityMoveLook(_) => "rel_entity_move_look",
            Packet::EntityTeleport(_) => "entity_teleport",
            Packet::DestroyEntities(_) => "destroy_entities",
            Packet::PluginChannel(_) => "plugin_channel",
            Packet::Other(other) => &other.name,
        }
    }
}

/// Initial world state sent when the backend admits the player.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinGame {
    pub entity_id: EntityId,
    pub game_mode: GameMode,
    pub dimension: i32,
}

/// World change; invalidates everything the state engine knows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Respawn {
    pub dimension: i32,
    pub game_mode: GameMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeepAlive {
    pub id: i32,
}

/// Where a clientbound chat payload lands on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatPosition {
    Chat,
    System,
    ActionBar,
}

/// Clientbound chat/system/action-bar text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub component: TextComponent,
    pub position: ChatPosition,
}

/// Serverbound chat line typed by the player.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatInput {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TitleAction {
    SetTitle(TextComponent),
    SetSubtitle(TextComponent),
    Times {
        fade_in: i32,
        stay: i32,
        fade_out: i32,
    },
    Clear,
    Reset,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Title {
    pub action: TitleAction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Disconnect {
    pub reason: TextComponent,
}

/// Backend announcement of a new compression threshold. The relay must apply
/// this to the client leg no later than forwarding the packet itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetCompression {
    pub threshold: i32,
}

/// Player-list update action selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerInfoAction {
    Add,
    UpdateGameMode,
    UpdateLatency,
    UpdateDisplayName,
    Remove,
}

/// A signed profile property; skin texture references travel here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileProperty {
    pub name: String,
    pub value: String,
    pub signature: Option<String>,
}

/// One entry of a player-list packet. Fields absent from the wire for the
/// given action are `None`; the state engine must not clobber known values
/// with them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerInfoEntry {
    pub id: PlayerId,
    pub name: Option<String>,
    pub display_name: Option<TextComponent>,
    #[serde(default)]
    pub properties: Vec<ProfileProperty>,
    pub game_mode: Option<GameMode>,
    pub latency: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub action: PlayerInfoAction,
    pub entries: Vec<PlayerInfoEntry>,
}

/// Team packet mode selector, mirroring the wire's mode codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamMode {
    Create,
    Remove,
    Update,
    AddMembers,
    RemoveMembers,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Teams {
    pub team: String,
    pub mode: TeamMode,
    pub display_name: Option<String>,
    pub prefix: Option<String>,
    pub suffix: Option<String>,
    #[serde(default)]
    pub members: Vec<String>,
}

/// Spawns a player entity. Coordinates are fixed-point (thirty-seconds),
/// angles are byte fractions of a full turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpawnPlayer {
    pub entity_id: EntityId,
    pub player_id: PlayerId,
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub yaw: u8,
    pub pitch: u8,
}

/// World spawn point, block coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpawnPosition {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

/// Absolute position-and-look sent to the client itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionLook {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub yaw: f32,
    pub pitch: f32,
    pub flags: u8,
}

/// Relative movement; deltas in fixed-point thirty-seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelEntityMove {
    pub entity_id: EntityId,
    pub dx: i8,
    pub dy: i8,
    pub dz: i8,
    pub on_ground: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityLook {
    pub entity_id: EntityId,
    pub yaw: u8,
    pub pitch: u8,
    pub on_ground: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelEntityMoveLook {
    pub entity_id: EntityId,
    pub dx: i8,
    pub dy: i8,
    pub dz: i8,
    pub yaw: u8,
    pub pitch: u8,
    pub on_ground: bool,
}

/// Absolute teleport; coordinates in fixed-point thirty-seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityTeleport {
    pub entity_id: EntityId,
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub yaw: u8,
    pub pitch: u8,
    pub on_ground: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestroyEntities {
    pub entity_ids: Vec<EntityId>,
}

/// Opaque payload on a named side channel. The body uses the vendor
/// micro-format; see [`crate::vendor`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginChannel {
    pub channel: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtherPacket {
    pub name: String,
    pub data: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_names_are_stable() {
        let packet = Packet::SetCompression(SetCompression { threshold: 256 });
        assert_eq!(packet.name(), "set_compression");

        let other = Packet::Other(OtherPacket {
            name: "window_items".to_string(),
            data: serde_json::json!({"count": 0}),
        });
        assert_eq!(other.name(), "window_items");
    }

    #[test]
    fn packet_serde_round_trip() {
        let packet = Packet::Teams(Teams {
            team: "RED".to_string(),
            mode: TeamMode::Create,
            display_name: Some("Red Team".to_string()),
            prefix: Some("[R]".to_string()),
            suffix: None,
            members: vec!["Foo".to_string()],
        });
        let json = serde_json::to_string(&packet).unwrap();
        let back: Packet = serde_json::from_str(&json).unwrap();
        match back {
            Packet::Teams(teams) => {
                assert_eq!(teams.team, "RED");
                assert_eq!(teams.mode, TeamMode::Create);
                assert_eq!(teams.members, vec!["Foo".to_string()]);
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }
}
