//! # Nick Detection Plugin
//!
//! Spots players whose displayed name does not match the identity carried
//! by their signed skin-texture reference. Built purely on the public
//! plugin contracts — the packet bus, the world queries, and the outbound
//! senders — with no reach into relay internals.
//!
//! On a player-list add for an unanalyzed id the accompanying texture
//! reference is decoded: a known placeholder fingerprint flags the player
//! unresolved, an embedded profile name differing from the displayed name
//! (after stripping formatting) resolves the real name. Each id is
//! analyzed once; analysis results survive until the world resets.
//!
//! The rendered decoration — `"(realName)"` or `"[NICK]"` — is recomputed
//! through display-name composition on demand, never cached as a string,
//! so a team change immediately shows up in the rendering.

mod texture;

pub use texture::{decode_texture_property, TextureProfile};

use async_trait::async_trait;
use game_state::GameState;
use plugin_system::{
    PluginContext, PluginDescriptor, PluginError, RelayPlugin, SimplePluginFactory, Version,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};
use waypoint_event_system::{
    strip_formatting, Direction, Packet, PlayerId, PlayerInfoAction, PlayerInfoEntry,
    TextComponent,
};

/// What analysis concluded for one player id. Recorded once per id.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    /// Texture identity matches the displayed name.
    Genuine,
    /// Placeholder skin; the real identity is hidden.
    Unresolved,
    /// The texture names a different account.
    ResolvedTo(String),
}

/// Per-session analysis results.
#[derive(Debug, Default)]
pub struct DetectorState {
    outcomes: HashMap<PlayerId, AnalysisOutcome>,
}

impl DetectorState {
    pub fn outcome(&self, id: &PlayerId) -> Option<&AnalysisOutcome> {
        self.outcomes.get(id)
    }

    pub fn is_analyzed(&self, id: &PlayerId) -> bool {
        self.outcomes.contains_key(id)
    }

    pub fn clear(&mut self) {
        self.outcomes.clear();
    }

    /// Records the first analysis for an id; later ones are ignored.
    fn record(&mut self, id: PlayerId, outcome: AnalysisOutcome) -> bool {
        if self.outcomes.contains_key(&id) {
            return false;
        }
        self.outcomes.insert(id, outcome);
        true
    }

    /// Composes the decorated rendering for a player: current display-name
    /// composition plus the analysis suffix. Derived fresh on every call.
    pub fn rendered_name(&self, world: &GameState, id: &PlayerId) -> Option<String> {
        let display = world.display_name(id)?;
        Some(match self.outcomes.get(id) {
            Some(AnalysisOutcome::ResolvedTo(real)) => format!("{display} ({real})"),
            Some(AnalysisOutcome::Unresolved) => format!("{display} [NICK]"),
            _ => display,
        })
    }
}

/// The plugin instance.
pub struct NickDetectPlugin {
    state: Arc<Mutex<DetectorState>>,
}

impl NickDetectPlugin {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(DetectorState::default())),
        }
    }

    /// Shares the analysis state with the caller; used by tests and by
    /// anything embedding the detector.
    pub fn with_state(state: Arc<Mutex<DetectorState>>) -> Self {
        Self { state }
    }

    pub fn descriptor() -> PluginDescriptor {
        PluginDescriptor::new("nick_detect", "Nick Detection", Version::new(0, 3, 1))
    }

    /// The factory the runtime registers.
    pub fn factory() -> SimplePluginFactory {
        SimplePluginFactory::new(Self::descriptor(), || Box::new(NickDetectPlugin::new()))
            .with_config_schema(serde_json::json!({
                "alerts": { "announce": true, "delay_secs": 2 }
            }))
    }
}

impl Default for NickDetectPlugin {
    fn default() -> Self {
        Self::new()
    }
}

/// Analysis of one player-list add entry. `Ok(None)` means there was
/// nothing to analyze (no texture property on the entry).
fn analyze_entry(entry: &PlayerInfoEntry) -> Result<Option<AnalysisOutcome>, String> {
    let Some(property) = entry.properties.iter().find(|property| property.name == "textures")
    else {
        return Ok(None);
    };
    let profile = texture::decode_texture_property(&property.value)?;

    if profile.is_placeholder() {
        return Ok(Some(AnalysisOutcome::Unresolved));
    }

    let displayed = entry
        .display_name
        .as_ref()
        .map(|component| component.to_plain())
        .or_else(|| entry.name.clone())
        .unwrap_or_default();
    let plain = strip_formatting(&displayed);

    match profile.profile_name {
        Some(profile_name) if !plain.is_empty() && profile_name != plain => {
            Ok(Some(AnalysisOutcome::ResolvedTo(profile_name)))
        }
        _ => Ok(Some(AnalysisOutcome::Genuine)),
    }
}

/// Fires the delayed alert for a freshly flagged player. Runs outside the
/// packet flow; the player may have vanished meanwhile, so liveness is
/// re-checked before anything is sent.
async fn delayed_alert(
    ctx: Arc<PluginContext>,
    state: Arc<Mutex<DetectorState>>,
    id: PlayerId,
    delay: Duration,
) {
    tokio::time::sleep(delay).await;

    let Some(world) = ctx.world() else {
        return;
    };
    let rendered = {
        let Ok(world) = world.read() else { return };
        if world.player(&id).is_none() {
            // Gone while the timer ran; the alert is a no-op.
            return;
        }
        let Ok(state) = state.lock() else { return };
        state.rendered_name(&world, &id)
    };
    let Some(rendered) = rendered else { return };

    if let Err(e) = ctx
        .send_chat(
            TextComponent::colored("[NickDetect] ", "gold")
                .append(TextComponent::plain(format!("Spotted: {rendered}"))),
        )
        .await
    {
        debug!("Nick alert not delivered: {e}");
    }
}

#[async_trait]
impl RelayPlugin for NickDetectPlugin {
    async fn register(&mut self, ctx: Arc<PluginContext>) -> Result<(), PluginError> {
        let announce = ctx.config().get_bool("alerts.announce").unwrap_or(true);
        let delay = Duration::from_secs(ctx.config().get_u64("alerts.delay_secs").unwrap_or(2));

        // Player-list adds drive the analysis.
        let state = self.state.clone();
        let handler_ctx = ctx.clone();
        ctx.on_packet(Direction::Clientbound, "player_info", move |packet: Packet| {
            let Packet::PlayerInfo(info) = packet else {
                return Ok(());
            };
            if info.action != PlayerInfoAction::Add {
                return Ok(());
            }
            for entry in &info.entries {
                let already = state
                    .lock()
                    .map(|state| state.is_analyzed(&entry.id))
                    .unwrap_or(true);
                if already {
                    continue;
                }
                match analyze_entry(entry) {
                    Ok(None) => {}
                    Ok(Some(outcome)) => {
                        let flagged = outcome != AnalysisOutcome::Genuine;
                        if let Ok(mut state) = state.lock() {
                            state.record(entry.id, outcome);
                        }
                        if flagged && announce {
                            tokio::spawn(delayed_alert(
                                handler_ctx.clone(),
                                state.clone(),
                                entry.id,
                                delay,
                            ));
                        }
                    }
                    Err(reason) => {
                        // Failures are surfaced once, never retried.
                        if let Ok(mut state) = state.lock() {
                            state.record(entry.id, AnalysisOutcome::Genuine);
                        }
                        let subject = entry.name.clone().unwrap_or_else(|| entry.id.to_string());
                        warn!("Texture decode failed for {subject}: {reason}");
                        let chat_ctx = handler_ctx.clone();
                        tokio::spawn(async move {
                            let _ = chat_ctx
                                .send_chat(
                                    TextComponent::colored("[NickDetect] ", "gold").append(
                                        TextComponent::plain(format!(
                                            "Could not analyze {subject}: {reason}"
                                        )),
                                    ),
                                )
                                .await;
                        });
                    }
                }
            }
            Ok(())
        })
        .await
        .map_err(|e| PluginError::RegistrationFailed(e.to_string()))?;

        // Team changes invalidate the rendered decoration; recompute it
        // through display composition rather than patching any cache.
        let state = self.state.clone();
        let teams_ctx = ctx.clone();
        ctx.on_packet(Direction::Clientbound, "teams", move |packet: Packet| {
            let Packet::Teams(teams) = packet else {
                return Ok(());
            };
            let Some(world) = teams_ctx.world() else {
                return Ok(());
            };
            let Ok(world) = world.read() else {
                return Ok(());
            };
            let Ok(state) = state.lock() else {
                return Ok(());
            };
            for (id, outcome) in &state.outcomes {
                if *outcome == AnalysisOutcome::Genuine {
                    continue;
                }
                let Some(player) = world.player(id) else {
                    continue;
                };
                let plain = strip_formatting(&player.name);
                let affected = teams.members.contains(&plain)
                    || teams.mode == waypoint_event_system::TeamMode::Remove;
                if affected {
                    if let Some(rendered) = state.rendered_name(&world, id) {
                        debug!("Team change; {id} now renders as {rendered}");
                    }
                }
            }
            Ok(())
        })
        .await
        .map_err(|e| PluginError::RegistrationFailed(e.to_string()))?;

        // Full invalidation clears the per-session results.
        for reset_event in ["state_reset", "session_ended"] {
            let state = self.state.clone();
            ctx.on_core(reset_event, move |_: serde_json::Value| {
                if let Ok(mut state) = state.lock() {
                    state.clear();
                }
                Ok(())
            })
            .await
            .map_err(|e| PluginError::RegistrationFailed(e.to_string()))?;
        }

        Ok(())
    }

    async fn on_unload(&mut self, _ctx: Arc<PluginContext>) -> Result<(), PluginError> {
        if let Ok(mut state) = self.state.lock() {
            state.clear();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::texture::encode_texture_property;
    use super::*;
    use plugin_system::{PluginRuntime, RelayServices, ServiceError, SessionSnapshot};
    use std::sync::RwLock;
    use waypoint_event_system::{
        create_event_bus, EventBus, PlayerInfo, ProfileProperty, TeamMode, Teams, TitleAction,
    };

    /// Services stub backed by a shared world; records chat lines.
    struct TestServices {
        world: Arc<RwLock<GameState>>,
        chats: Mutex<Vec<String>>,
    }

    impl TestServices {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                world: Arc::new(RwLock::new(GameState::new())),
                chats: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl RelayServices for TestServices {
        async fn send_chat(&self, component: TextComponent) -> Result<(), ServiceError> {
            if let Ok(mut chats) = self.chats.lock() {
                chats.push(component.to_plain());
            }
            Ok(())
        }
        async fn send_action_bar(&self, _: TextComponent) -> Result<(), ServiceError> {
            Ok(())
        }
        async fn send_title(&self, _: TitleAction) -> Result<(), ServiceError> {
            Ok(())
        }
        async fn send_to_client(&self, _: Packet) -> Result<(), ServiceError> {
            Ok(())
        }
        async fn send_to_backend(&self, _: Packet) -> Result<(), ServiceError> {
            Ok(())
        }
        async fn session(&self) -> Option<SessionSnapshot> {
            None
        }
        fn world(&self) -> Option<Arc<RwLock<GameState>>> {
            Some(self.world.clone())
        }
    }

    fn add_packet(id: PlayerId, name: &str, texture: Option<String>) -> Packet {
        Packet::PlayerInfo(PlayerInfo {
            action: PlayerInfoAction::Add,
            entries: vec![PlayerInfoEntry {
                id,
                name: Some(name.to_string()),
                display_name: None,
                properties: texture
                    .map(|value| {
                        vec![ProfileProperty {
                            name: "textures".to_string(),
                            value,
                            signature: Some("sig".to_string()),
                        }]
                    })
                    .unwrap_or_default(),
                game_mode: None,
                latency: None,
            }],
        })
    }

    /// Registers the detector sharing `state`, returning the loaded bus.
    async fn load_detector(
        services: Arc<TestServices>,
        state: Arc<Mutex<DetectorState>>,
    ) -> (Arc<EventBus>, PluginRuntime) {
        let bus = create_event_bus();
        let runtime = PluginRuntime::new(bus.clone(), services);
        let factory_state = state.clone();
        runtime
            .register(
                SimplePluginFactory::new(NickDetectPlugin::descriptor(), move || {
                    Box::new(NickDetectPlugin::with_state(factory_state.clone()))
                })
                .with_config_schema(serde_json::json!({
                    "alerts": { "announce": true, "delay_secs": 2 }
                })),
            )
            .await;
        let loaded = runtime.load_all().await;
        assert_eq!(loaded, vec!["nick_detect".to_string()]);
        (bus, runtime)
    }

    /// Mirrors the relay's ordering: state first, then publish.
    async fn observe(services: &TestServices, bus: &EventBus, packet: Packet) {
        if let Ok(mut world) = services.world.write() {
            world.apply(&packet);
        }
        let name = packet.name().to_string();
        bus.emit_packet(Direction::Clientbound, &name, &packet)
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn resolves_nicked_player_and_is_idempotent() {
        let services = TestServices::new();
        let state = Arc::new(Mutex::new(DetectorState::default()));
        let (bus, _runtime) = load_detector(services.clone(), state.clone()).await;

        let id = PlayerId::new();
        let nicked = encode_texture_property("RealName", "abc123");
        observe(&services, &bus, add_packet(id, "SneakyNick", Some(nicked))).await;

        assert_eq!(
            state.lock().unwrap().outcome(&id),
            Some(&AnalysisOutcome::ResolvedTo("RealName".to_string()))
        );

        // A second add for the same id must not re-analyze.
        let placeholder = encode_texture_property(
            "Other",
            "c06f89064c8a49119c29ea1dbd1aab82485a3966d0f535baf898743ad9739cc9",
        );
        observe(&services, &bus, add_packet(id, "SneakyNick", Some(placeholder))).await;
        assert_eq!(
            state.lock().unwrap().outcome(&id),
            Some(&AnalysisOutcome::ResolvedTo("RealName".to_string()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn placeholder_skin_flags_unresolved() {
        let services = TestServices::new();
        let state = Arc::new(Mutex::new(DetectorState::default()));
        let (bus, _runtime) = load_detector(services.clone(), state.clone()).await;

        let id = PlayerId::new();
        let placeholder = encode_texture_property(
            "Hidden",
            "c06f89064c8a49119c29ea1dbd1aab82485a3966d0f535baf898743ad9739cc9",
        );
        observe(&services, &bus, add_packet(id, "Mystery", Some(placeholder))).await;

        assert_eq!(
            state.lock().unwrap().outcome(&id),
            Some(&AnalysisOutcome::Unresolved)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn rendered_name_tracks_team_changes() {
        let services = TestServices::new();
        let state = Arc::new(Mutex::new(DetectorState::default()));
        let (bus, _runtime) = load_detector(services.clone(), state.clone()).await;

        let id = PlayerId::new();
        let nicked = encode_texture_property("RealName", "abc123");
        observe(&services, &bus, add_packet(id, "Foo", Some(nicked))).await;

        {
            let world = services.world.read().unwrap();
            let rendered = state.lock().unwrap().rendered_name(&world, &id).unwrap();
            assert_eq!(rendered, "Foo (RealName)");
        }

        // Team decoration appears in the recomputed rendering.
        observe(
            &services,
            &bus,
            Packet::Teams(Teams {
                team: "RED".to_string(),
                mode: TeamMode::Create,
                display_name: None,
                prefix: Some("[R]".to_string()),
                suffix: None,
                members: vec!["Foo".to_string()],
            }),
        )
        .await;
        {
            let world = services.world.read().unwrap();
            let rendered = state.lock().unwrap().rendered_name(&world, &id).unwrap();
            assert_eq!(rendered, "[R]Foo (RealName)");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_alert_rechecks_liveness() {
        let services = TestServices::new();
        let state = Arc::new(Mutex::new(DetectorState::default()));
        let (bus, _runtime) = load_detector(services.clone(), state.clone()).await;

        // Flagged player vanishes before the alert timer fires.
        let gone = PlayerId::new();
        let nicked = encode_texture_property("RealName", "abc123");
        observe(&services, &bus, add_packet(gone, "Ghost", Some(nicked.clone()))).await;
        services.world.write().unwrap().reset();
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(services.chats.lock().unwrap().is_empty());

        // A player that stays present gets the alert after the delay.
        let here = PlayerId::new();
        observe(&services, &bus, add_packet(here, "Present", Some(nicked))).await;
        tokio::time::sleep(Duration::from_secs(3)).await;
        let chats = services.chats.lock().unwrap();
        assert_eq!(chats.len(), 1);
        assert!(chats[0].contains("Present (RealName)"));
    }

    #[tokio::test(start_paused = true)]
    async fn reset_clears_analysis() {
        let services = TestServices::new();
        let state = Arc::new(Mutex::new(DetectorState::default()));
        let (bus, _runtime) = load_detector(services.clone(), state.clone()).await;

        let id = PlayerId::new();
        let nicked = encode_texture_property("RealName", "abc123");
        observe(&services, &bus, add_packet(id, "Foo", Some(nicked))).await;
        assert!(state.lock().unwrap().is_analyzed(&id));

        bus.emit_core(
            "state_reset",
            &serde_json::json!({ "timestamp": 1 }),
        )
        .await
        .unwrap();
        assert!(!state.lock().unwrap().is_analyzed(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_texture_reports_once() {
        let services = TestServices::new();
        let state = Arc::new(Mutex::new(DetectorState::default()));
        let (bus, _runtime) = load_detector(services.clone(), state.clone()).await;

        let id = PlayerId::new();
        observe(&services, &bus, add_packet(id, "Broken", Some("!!!".to_string()))).await;
        tokio::time::sleep(Duration::from_millis(2)).await;

        // Reported as a prefixed chat naming the subject; analysis marked
        // so the failure is never retried.
        {
            let chats = services.chats.lock().unwrap();
            assert_eq!(chats.len(), 1);
            assert!(chats[0].contains("Broken"));
        }
        assert!(state.lock().unwrap().is_analyzed(&id));

        observe(&services, &bus, add_packet(id, "Broken", Some("!!!".to_string()))).await;
        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(services.chats.lock().unwrap().len(), 1);
    }
}
