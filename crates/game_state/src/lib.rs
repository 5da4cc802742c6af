//! # Game State Engine
//!
//! Reconstructs a best-effort, eventually-consistent view of the game world
//! purely from the decoded packet stream passing through the relay: the
//! player list, scoreboard teams, and visible entities. Nothing here ever
//! queries the backend out-of-band.
//!
//! The tables are owned wholesale by the active session and cleared only on
//! full-invalidation events (join, respawn/dimension change, session end) —
//! never reconciled incrementally across such a boundary.
//!
//! Failure semantics: references to unknown ids are tolerated as no-ops,
//! malformed substructures are logged and skipped, and nothing in this crate
//! can abort the relay.

mod entity;
mod player;
mod team;

pub use entity::EntityRecord;
pub use player::PlayerRecord;
pub use team::TeamRecord;

use entity::{angle_to_degrees, delta_to_world, fixed_to_world};
use std::collections::HashMap;
use tracing::{debug, trace};
use waypoint_event_system::{
    strip_formatting, EntityId, Packet, PlayerId, PlayerInfo, PlayerInfoAction, Position,
    Rotation, TeamMode, Teams,
};

/// The reconstructed world view for one session.
#[derive(Debug, Default)]
pub struct GameState {
    players: HashMap<PlayerId, PlayerRecord>,
    teams: HashMap<String, TeamRecord>,
    entities: HashMap<EntityId, EntityRecord>,
    /// Plain member name → team name. Kept alongside the member sets so a
    /// team referenced before its metadata arrives still resolves.
    memberships: HashMap<String, String>,
}

impl GameState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one observed packet into the tables. Irrelevant packets are
    /// ignored; relevant ones mutate state before any plugin sees them.
    pub fn apply(&mut self, packet: &Packet) {
        match packet {
            Packet::JoinGame(_) | Packet::Respawn(_) => {
                // World boundary: the only permitted reset is wholesale.
                self.reset();
            }
            Packet::PlayerInfo(info) => self.apply_player_info(info),
            Packet::Teams(teams) => self.apply_teams(teams),
            Packet::SpawnPlayer(spawn) => {
                let owner = self.players.contains_key(&spawn.player_id).then_some(spawn.player_id);
                self.entities.insert(
                    spawn.entity_id,
                    EntityRecord {
                        owner,
                        position: Position::new(
                            fixed_to_world(spawn.x),
                            fixed_to_world(spawn.y),
                            fixed_to_world(spawn.z),
                        ),
                        rotation: Rotation::new(
                            angle_to_degrees(spawn.yaw),
                            angle_to_degrees(spawn.pitch),
                        ),
                        on_ground: false,
                    },
                );
            }
            Packet::RelEntityMove(rel) => {
                if let Some(entity) = self.entities.get_mut(&rel.entity_id) {
                    entity.position.x += delta_to_world(rel.dx);
                    entity.position.y += delta_to_world(rel.dy);
                    entity.position.z += delta_to_world(rel.dz);
                    entity.on_ground = rel.on_ground;
                } else {
                    trace!("Movement for unknown entity {}", rel.entity_id);
                }
            }
            Packet::EntityLook(look) => {
                if let Some(entity) = self.entities.get_mut(&look.entity_id) {
                    entity.rotation = Rotation::new(
                        angle_to_degrees(look.yaw),
                        angle_to_degrees(look.pitch),
                    );
                    entity.on_ground = look.on_ground;
                }
            }
            Packet::RelEntityMoveLook(rel) => {
                if let Some(entity) = self.entities.get_mut(&rel.entity_id) {
                    entity.position.x += delta_to_world(rel.dx);
                    entity.position.y += delta_to_world(rel.dy);
                    entity.position.z += delta_to_world(rel.dz);
                    entity.rotation =
                        Rotation::new(angle_to_degrees(rel.yaw), angle_to_degrees(rel.pitch));
                    entity.on_ground = rel.on_ground;
                }
            }
            Packet::EntityTeleport(teleport) => {
                if let Some(entity) = self.entities.get_mut(&teleport.entity_id) {
                    entity.position = Position::new(
                        fixed_to_world(teleport.x),
                        fixed_to_world(teleport.y),
                        fixed_to_world(teleport.z),
                    );
                    entity.rotation = Rotation::new(
                        angle_to_degrees(teleport.yaw),
                        angle_to_degrees(teleport.pitch),
                    );
                    entity.on_ground = teleport.on_ground;
                }
            }
            Packet::DestroyEntities(destroy) => {
                // Idempotent; unknown ids are a no-op.
                for entity_id in &destroy.entity_ids {
                    self.entities.remove(entity_id);
                }
            }
            _ => {}
        }
    }

    fn apply_player_info(&mut self, info: &PlayerInfo) {
        for entry in &info.entries {
            match info.action {
                PlayerInfoAction::Remove => {
                    self.players.remove(&entry.id);
                }
                PlayerInfoAction::Add => {
                    if entry.name.is_none() {
                        debug!("Player-list add without a name for {}; skipped", entry.id);
                        continue;
                    }
                    match self.players.get_mut(&entry.id) {
                        Some(existing) => existing.merge(entry),
                        None => {
                            self.players.insert(entry.id, PlayerRecord::from_entry(entry));
                        }
                    }
                }
                _ => {
                    // Partial update: never clobber fields absent from it.
                    if let Some(existing) = self.players.get_mut(&entry.id) {
                        existing.merge(entry);
                    } else {
                        trace!("Update for unknown player {}; ignored", entry.id);
                    }
                }
            }
        }
    }

    fn apply_teams(&mut self, teams: &Teams) {
        match teams.mode {
            TeamMode::Create | TeamMode::Update => {
                let record = self.teams.entry(teams.team.clone()).or_default();
                if let Some(display_name) = &teams.display_name {
                    record.display_name = Some(display_name.clone());
                }
                if let Some(prefix) = &teams.prefix {
                    record.prefix = prefix.clone();
                }
                if let Some(suffix) = &teams.suffix {
                    record.suffix = suffix.clone();
                }
                for member in &teams.members {
                    self.add_member(&teams.team, member);
                }
            }
            TeamMode::AddMembers => {
                for member in &teams.members {
                    self.add_member(&teams.team, member);
                }
            }
            TeamMode::RemoveMembers => {
                for member in &teams.members {
                    if let Some(record) = self.teams.get_mut(&teams.team) {
                        record.members.remove(member);
                    }
                    if self.memberships.get(member).map(String::as_str) == Some(&teams.team) {
                        self.memberships.remove(member);
                    }
                }
            }
            TeamMode::Remove => {
                let removed = self.teams.remove(&teams.team);
                // Every member's association is cleared, including members
                // recorded before the team's metadata ever arrived.
                self.memberships.retain(|_, team| team != &teams.team);
                if let Some(record) = removed {
                    debug!(
                        "Team {} deleted, {} member associations cleared",
                        teams.team,
                        record.members.len()
                    );
                }
            }
        }
    }

    /// Joining a team leaves whatever team held the name before.
    fn add_member(&mut self, team: &str, member: &str) {
        if let Some(previous) = self.memberships.insert(member.to_string(), team.to_string()) {
            if previous != team {
                if let Some(record) = self.teams.get_mut(&previous) {
                    record.members.remove(member);
                }
            }
        }
        if let Some(record) = self.teams.get_mut(team) {
            record.members.insert(member.to_string());
        } else {
            trace!("Members added to team {} before its metadata", team);
        }
    }

    /// Clears every table wholesale. The only permitted reset.
    pub fn reset(&mut self) {
        self.players.clear();
        self.teams.clear();
        self.entities.clear();
        self.memberships.clear();
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn player(&self, id: &PlayerId) -> Option<&PlayerRecord> {
        self.players.get(id)
    }

    pub fn players(&self) -> impl Iterator<Item = (&PlayerId, &PlayerRecord)> {
        self.players.iter()
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn team(&self, name: &str) -> Option<&TeamRecord> {
        self.teams.get(name)
    }

    pub fn entity(&self, id: &EntityId) -> Option<&EntityRecord> {
        self.entities.get(id)
    }

    pub fn entities(&self) -> impl Iterator<Item = (&EntityId, &EntityRecord)> {
        self.entities.iter()
    }

    /// The team currently holding `plain_name`, if any.
    pub fn team_of(&self, plain_name: &str) -> Option<&str> {
        self.memberships.get(plain_name).map(String::as_str)
    }

    /// Composes the team-decorated display text for a player, derived from
    /// the records every time — never cached.
    ///
    /// Order: structured display text or raw name → strip formatting codes
    /// for the plain key → current team lookup → prefix/suffix wrap. When a
    /// team is referenced but its metadata has not arrived, the unmodified
    /// name is returned rather than guessed decoration.
    pub fn display_name(&self, id: &PlayerId) -> Option<String> {
        let player = self.players.get(id)?;
        let base = player
            .display_name
            .as_ref()
            .map(|component| component.to_plain())
            .unwrap_or_else(|| player.name.clone());
        let plain = strip_formatting(&base);

        let team = self.memberships.get(&plain).and_then(|name| self.teams.get(name));
        Some(match team {
            Some(team) => format!("{}{}{}", team.prefix, plain, team.suffix),
            None => plain,
        })
    }
}
