//! Player-list records and upsert semantics.

use waypoint_event_system::{GameMode, PlayerInfoEntry, TextComponent};

/// What the relay knows about one player-list entry.
///
/// Built up incrementally from player-list packets; a later partial update
/// never erases a field it does not carry.
#[derive(Debug, Clone)]
pub struct PlayerRecord {
    /// Raw account name, as first announced.
    pub name: String,
    /// Structured display text, when the backend has set one.
    pub display_name: Option<TextComponent>,
    pub game_mode: Option<GameMode>,
    pub latency: Option<i32>,
}

impl PlayerRecord {
    pub(crate) fn from_entry(entry: &PlayerInfoEntry) -> Self {
        Self {
            name: entry.name.clone().unwrap_or_default(),
            display_name: entry.display_name.clone(),
            game_mode: entry.game_mode,
            latency: entry.latency,
        }
    }

    /// Merges a partial update: only fields present in the entry change.
    pub(crate) fn merge(&mut self, entry: &PlayerInfoEntry) {
        if let Some(name) = &entry.name {
            self.name = name.clone();
        }
        if let Some(display_name) = &entry.display_name {
            self.display_name = Some(display_name.clone());
        }
        if let Some(game_mode) = entry.game_mode {
            self.game_mode = Some(game_mode);
        }
        if let Some(latency) = entry.latency {
            self.latency = Some(latency);
        }
    }
}
