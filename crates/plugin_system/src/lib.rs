//! # Plugin System
//!
//! The catalogue of installable behaviors and their lifecycles: descriptor
//! registration, dependency resolution and load ordering, version
//! compatibility checking, and safe runtime enable/disable.
//!
//! The runtime is an explicitly owned object constructed once at startup
//! and passed by reference to every consumer — there are no ambient
//! singletons. Each plugin receives a private [`PluginContext`] carrying
//! its identity; subscriptions made through it are recorded under the
//! plugin's name and gated centrally in the bus dispatch path, so a
//! disabled plugin structurally cannot observe events.
//!
//! ## Failure semantics
//!
//! A plugin whose registration fails is isolated: the failure is logged
//! with the plugin's identity, its partial subscriptions are removed, and
//! the remaining plugins continue loading. Dependency and version faults
//! are never thrown — [`PluginRuntime::validate`] returns them as
//! human-readable strings for the caller to act on.

pub mod config;
pub mod context;
pub mod dependency;
pub mod descriptor;
pub mod version;

pub use config::PluginConfigStore;
pub use context::{PluginContext, RelayServices, ServiceError, SessionSnapshot};
pub use dependency::{DependencyGraph, DependencyNode};
pub use descriptor::{plugin_key, Dependency, PluginDescriptor};
pub use version::{is_compatible, RequirementKind, Version, VersionError, VersionRequirement};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use waypoint_event_system::{current_timestamp, EventBus};

/// Errors from runtime operations. Dependency *validation* results are not
/// errors; see [`PluginRuntime::validate`].
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    #[error("plugin registration failed: {0}")]
    RegistrationFailed(String),

    #[error("plugin '{0}' is not registered")]
    NotFound(String),

    #[error("cannot disable '{plugin}': required by enabled plugin(s) {dependents:?}")]
    DisableBlocked {
        plugin: String,
        dependents: Vec<String>,
    },
}

/// A live plugin instance behind the runtime's lock.
pub type PluginHandle = Arc<RwLock<Box<dyn RelayPlugin>>>;

/// The behavior contract a plugin implements.
///
/// `register` is the module's registration function: it receives the
/// capability object and wires up subscriptions. The optional `on_unload`
/// hook runs when the plugin is unloaded or the runtime shuts down.
#[async_trait]
pub trait RelayPlugin: Send + Sync + 'static {
    async fn register(&mut self, ctx: Arc<PluginContext>) -> Result<(), PluginError>;

    async fn on_unload(&mut self, _ctx: Arc<PluginContext>) -> Result<(), PluginError> {
        Ok(())
    }
}

/// Creates plugin instances and declares their static metadata.
pub trait PluginFactory: Send + Sync {
    fn descriptor(&self) -> PluginDescriptor;

    fn create(&self) -> Box<dyn RelayPlugin>;

    /// Default configuration schema for the plugin's config store.
    fn config_schema(&self) -> serde_json::Value {
        serde_json::Value::Object(Default::default())
    }
}

/// Factory wrapping a constructor closure, for plugins without their own
/// factory type.
pub struct SimplePluginFactory {
    descriptor: PluginDescriptor,
    schema: serde_json::Value,
    constructor: Box<dyn Fn() -> Box<dyn RelayPlugin> + Send + Sync>,
}

impl SimplePluginFactory {
    pub fn new<F>(descriptor: PluginDescriptor, constructor: F) -> Self
    where
        F: Fn() -> Box<dyn RelayPlugin> + Send + Sync + 'static,
    {
        Self {
            descriptor,
            schema: serde_json::Value::Object(Default::default()),
            constructor: Box::new(constructor),
        }
    }

    pub fn with_config_schema(mut self, schema: serde_json::Value) -> Self {
        self.schema = schema;
        self
    }
}

impl PluginFactory for SimplePluginFactory {
    fn descriptor(&self) -> PluginDescriptor {
        self.descriptor.clone()
    }

    fn create(&self) -> Box<dyn RelayPlugin> {
        (self.constructor)()
    }

    fn config_schema(&self) -> serde_json::Value {
        self.schema.clone()
    }
}

/// Lifecycle events the runtime publishes on the core bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginLoadedEvent {
    pub plugin: String,
    pub version: String,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginUnloadedEvent {
    pub plugin: String,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginToggledEvent {
    pub plugin: String,
    pub enabled: bool,
    pub timestamp: u64,
}

/// One registered plugin: descriptor, factory, enabled flag, and the
/// instance/context once loaded.
struct RuntimeEntry {
    descriptor: PluginDescriptor,
    factory: Arc<dyn PluginFactory>,
    enabled: Arc<AtomicBool>,
    instance: Option<PluginHandle>,
    context: Option<Arc<PluginContext>>,
}

pub(crate) struct RegistryInner {
    entries: HashMap<String, RuntimeEntry>,
    /// Keys in registration order; overwrites keep their original slot.
    order: Vec<String>,
    graph: DependencyGraph,
}

impl RegistryInner {
    fn rebuild_graph(&mut self) {
        let descriptors: Vec<PluginDescriptor> = self
            .order
            .iter()
            .map(|key| self.entries[key].descriptor.clone())
            .collect();
        self.graph = DependencyGraph::build(descriptors.iter());
    }

    pub(crate) fn is_enabled(&self, name: &str) -> bool {
        self.entries
            .get(&plugin_key(name))
            .map(|entry| entry.enabled.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    pub(crate) fn instance(&self, name: &str) -> Option<PluginHandle> {
        self.entries
            .get(&plugin_key(name))
            .and_then(|entry| entry.instance.clone())
    }
}

pub(crate) struct RuntimeShared {
    pub(crate) bus: Arc<EventBus>,
    pub(crate) services: Arc<dyn RelayServices>,
    pub(crate) registry: RwLock<RegistryInner>,
}

/// The process-wide plugin runtime.
pub struct PluginRuntime {
    shared: Arc<RuntimeShared>,
}

impl PluginRuntime {
    pub fn new(bus: Arc<EventBus>, services: Arc<dyn RelayServices>) -> Self {
        Self {
            shared: Arc::new(RuntimeShared {
                bus,
                services,
                registry: RwLock::new(RegistryInner {
                    entries: HashMap::new(),
                    order: Vec::new(),
                    graph: DependencyGraph::default(),
                }),
            }),
        }
    }

    /// Registers a plugin factory under its descriptor's name
    /// (case-insensitive). Re-registration overwrites: a loaded previous
    /// instance is unloaded first, and the enabled flag resets to true.
    /// The dependency graph is rebuilt.
    pub async fn register<F>(&self, factory: F)
    where
        F: PluginFactory + 'static,
    {
        let factory: Arc<dyn PluginFactory> = Arc::new(factory);
        let descriptor = factory.descriptor();
        let key = descriptor.key();

        let previous = {
            let mut registry = self.shared.registry.write().await;
            let previous = registry.entries.remove(&key);
            if previous.is_none() {
                registry.order.push(key.clone());
            }
            registry.entries.insert(
                key.clone(),
                RuntimeEntry {
                    descriptor: descriptor.clone(),
                    factory,
                    enabled: Arc::new(AtomicBool::new(true)),
                    instance: None,
                    context: None,
                },
            );
            registry.rebuild_graph();
            previous
        };

        if let Some(entry) = previous {
            warn!("Plugin {} re-registered; unloading previous instance", descriptor.display_name);
            self.teardown_instance(&key, entry).await;
        }
        info!("Registered plugin {} v{}", descriptor.display_name, descriptor.version);
    }

    /// Batched dependency/version validation; see
    /// [`DependencyGraph::validate`]. Never fails — violations are data.
    pub async fn validate(&self) -> Vec<String> {
        self.shared.registry.read().await.graph.validate()
    }

    /// A required-dependency cycle, if one exists, as the path from the
    /// repeated plugin back to itself.
    pub async fn find_cycle(&self) -> Option<Vec<String>> {
        self.shared.registry.read().await.graph.find_cycle()
    }

    /// The dependency-first load order over all registered plugins.
    pub async fn load_order(&self) -> Vec<String> {
        self.shared.registry.read().await.graph.load_order()
    }

    /// Instantiates and registers every loadable plugin in dependency-first
    /// order. Returns the keys that loaded.
    ///
    /// Plugins with unsatisfied required dependencies and members of a
    /// required cycle are skipped (logged, with the batched violations).
    /// A registration failure is isolated to its plugin.
    pub async fn load_all(&self) -> Vec<String> {
        // Snapshot the plan first so no lock is held while plugin code runs.
        let (order, skip, violations) = {
            let registry = self.shared.registry.read().await;
            let violations = registry.graph.validate();
            let mut skip = registry.graph.unsatisfied_plugins();
            if let Some(cycle) = registry.graph.find_cycle() {
                error!("Required dependency cycle: {}", cycle.join(" -> "));
                skip.extend(cycle);
            }
            (registry.graph.load_order(), skip, violations)
        };
        for violation in &violations {
            warn!("Dependency validation: {violation}");
        }

        let mut loaded = Vec::new();
        for key in order {
            if skip.contains(&key) {
                warn!("Skipping {key}: unsatisfied dependencies");
                continue;
            }
            if self.load_one(&key).await {
                loaded.push(key);
            }
        }
        loaded
    }

    /// Loads a single registered plugin. Returns whether it loaded.
    async fn load_one(&self, key: &str) -> bool {
        let (factory, gate, display_name) = {
            let registry = self.shared.registry.read().await;
            let Some(entry) = registry.entries.get(key) else {
                return false;
            };
            if entry.instance.is_some() {
                return false;
            }
            (
                entry.factory.clone(),
                entry.enabled.clone(),
                entry.descriptor.display_name.clone(),
            )
        };

        let ctx = Arc::new(PluginContext::new(
            key.to_string(),
            gate,
            self.shared.bus.clone(),
            self.shared.services.clone(),
            Arc::downgrade(&self.shared),
            PluginConfigStore::new(key, factory.config_schema()),
        ));

        let mut instance = factory.create();
        match instance.register(ctx.clone()).await {
            Ok(()) => {
                let version = {
                    let mut registry = self.shared.registry.write().await;
                    let Some(entry) = registry.entries.get_mut(key) else {
                        // Unregistered mid-load; drop the orphan's handlers.
                        drop(registry);
                        self.shared.bus.remove_handlers_for(key).await;
                        return false;
                    };
                    entry.instance = Some(Arc::new(RwLock::new(instance)));
                    entry.context = Some(ctx);
                    entry.descriptor.version.to_string()
                };
                info!("Loaded plugin {}", display_name);
                self.emit_lifecycle(
                    "plugin_loaded",
                    &PluginLoadedEvent {
                        plugin: key.to_string(),
                        version,
                        timestamp: current_timestamp(),
                    },
                )
                .await;
                true
            }
            Err(e) => {
                // Isolated: log with identity, clean partial subscriptions,
                // keep loading the others.
                error!("Plugin {} failed to register: {e}", display_name);
                self.shared.bus.remove_handlers_for(key).await;
                false
            }
        }
    }

    /// Unloads every loaded plugin in reverse load order.
    pub async fn unload_all(&self) {
        let mut order = self.load_order().await;
        order.reverse();
        for key in order {
            let entry_parts = {
                let mut registry = self.shared.registry.write().await;
                registry.entries.get_mut(&key).and_then(|entry| {
                    entry.instance.take().map(|instance| (instance, entry.context.take()))
                })
            };
            if let Some((instance, context)) = entry_parts {
                self.run_unload(&key, instance, context).await;
            }
        }
    }

    async fn teardown_instance(&self, key: &str, entry: RuntimeEntry) {
        if let Some(instance) = entry.instance {
            self.run_unload(key, instance, entry.context).await;
        }
    }

    async fn run_unload(
        &self,
        key: &str,
        instance: PluginHandle,
        context: Option<Arc<PluginContext>>,
    ) {
        if let Some(ctx) = context {
            let mut plugin = instance.write().await;
            if let Err(e) = plugin.on_unload(ctx).await {
                error!("Plugin {key} unload hook failed: {e}");
            }
        }
        let removed = self.shared.bus.remove_handlers_for(key).await;
        info!("Unloaded plugin {key} ({removed} subscriptions dropped)");
        self.emit_lifecycle(
            "plugin_unloaded",
            &PluginUnloadedEvent {
                plugin: key.to_string(),
                timestamp: current_timestamp(),
            },
        )
        .await;
    }

    /// Disables a plugin.
    ///
    /// Refused with the list of blocking dependents when any currently
    /// enabled plugin lists the target as a required dependency.
    pub async fn disable(&self, name: &str) -> Result<(), PluginError> {
        let key = plugin_key(name);
        {
            let registry = self.shared.registry.read().await;
            if !registry.entries.contains_key(&key) {
                return Err(PluginError::NotFound(name.to_string()));
            }
            let blockers: Vec<String> = registry
                .graph
                .direct_required_dependents(&key)
                .into_iter()
                .filter(|dependent| registry.is_enabled(dependent))
                .collect();
            if !blockers.is_empty() {
                return Err(PluginError::DisableBlocked {
                    plugin: key,
                    dependents: blockers,
                });
            }
            registry.entries[&key].enabled.store(false, Ordering::SeqCst);
        }
        self.emit_toggle(&key, false).await;
        Ok(())
    }

    /// Disables a plugin together with the full transitive closure of
    /// dependents whose required chain passes through it. Returns the keys
    /// that changed from enabled to disabled, target first.
    pub async fn disable_cascading(&self, name: &str) -> Result<Vec<String>, PluginError> {
        let key = plugin_key(name);
        let mut changed = Vec::new();
        {
            let registry = self.shared.registry.read().await;
            if !registry.entries.contains_key(&key) {
                return Err(PluginError::NotFound(name.to_string()));
            }
            let mut targets = vec![key.clone()];
            targets.extend(registry.graph.required_dependents_closure(&key));
            for target in targets {
                if let Some(entry) = registry.entries.get(&target) {
                    if entry.enabled.swap(false, Ordering::SeqCst) {
                        changed.push(target);
                    }
                }
            }
        }
        if changed.len() > 1 {
            warn!(
                "Cascading disable of {key} also disabled: {}",
                changed[1..].join(", ")
            );
        }
        for target in &changed {
            self.emit_toggle(target, false).await;
        }
        Ok(changed)
    }

    /// Enables a plugin. Deliberately has no graph precondition: the
    /// target's dependencies are not re-verified to be enabled.
    pub async fn enable(&self, name: &str) -> Result<(), PluginError> {
        let key = plugin_key(name);
        {
            let registry = self.shared.registry.read().await;
            let entry = registry
                .entries
                .get(&key)
                .ok_or_else(|| PluginError::NotFound(name.to_string()))?;
            entry.enabled.store(true, Ordering::SeqCst);
        }
        self.emit_toggle(&key, true).await;
        Ok(())
    }

    /// Authoritative enabled query.
    pub async fn is_enabled(&self, name: &str) -> bool {
        self.shared.registry.read().await.is_enabled(name)
    }

    pub async fn descriptor(&self, name: &str) -> Option<PluginDescriptor> {
        self.shared
            .registry
            .read()
            .await
            .entries
            .get(&plugin_key(name))
            .map(|entry| entry.descriptor.clone())
    }

    /// Registered keys in registration order.
    pub async fn plugin_names(&self) -> Vec<String> {
        self.shared.registry.read().await.order.clone()
    }

    pub async fn instance(&self, name: &str) -> Option<PluginHandle> {
        self.shared.registry.read().await.instance(name)
    }

    async fn emit_toggle(&self, key: &str, enabled: bool) {
        self.emit_lifecycle(
            "plugin_toggled",
            &PluginToggledEvent {
                plugin: key.to_string(),
                enabled,
                timestamp: current_timestamp(),
            },
        )
        .await;
    }

    async fn emit_lifecycle<T: waypoint_event_system::Event>(&self, name: &str, event: &T) {
        if let Err(e) = self.shared.bus.emit_core(name, event).await {
            warn!("Failed to emit {name}: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waypoint_event_system::{create_event_bus, Packet, TextComponent, TitleAction};

    /// Services stub for runtime tests; no session ever exists.
    struct NullServices;

    #[async_trait]
    impl RelayServices for NullServices {
        async fn send_chat(&self, _: TextComponent) -> Result<(), ServiceError> {
            Err(ServiceError::NoSession)
        }
        async fn send_action_bar(&self, _: TextComponent) -> Result<(), ServiceError> {
            Err(ServiceError::NoSession)
        }
        async fn send_title(&self, _: TitleAction) -> Result<(), ServiceError> {
            Err(ServiceError::NoSession)
        }
        async fn send_to_client(&self, _: Packet) -> Result<(), ServiceError> {
            Err(ServiceError::NoSession)
        }
        async fn send_to_backend(&self, _: Packet) -> Result<(), ServiceError> {
            Err(ServiceError::NoSession)
        }
        async fn session(&self) -> Option<SessionSnapshot> {
            None
        }
        fn world(&self) -> Option<Arc<std::sync::RwLock<game_state::GameState>>> {
            None
        }
    }

    struct RecordingPlugin {
        fail_registration: bool,
    }

    #[async_trait]
    impl RelayPlugin for RecordingPlugin {
        async fn register(&mut self, ctx: Arc<PluginContext>) -> Result<(), PluginError> {
            if self.fail_registration {
                return Err(PluginError::RegistrationFailed("deliberate".to_string()));
            }
            ctx.on_core("session_started", |_: serde_json::Value| Ok(()))
                .await
                .map_err(|e| PluginError::RegistrationFailed(e.to_string()))?;
            Ok(())
        }
    }

    fn runtime() -> PluginRuntime {
        PluginRuntime::new(create_event_bus(), Arc::new(NullServices))
    }

    fn factory(name: &str, version: &str) -> SimplePluginFactory {
        SimplePluginFactory::new(
            PluginDescriptor::new(name, name, Version::parse(version).unwrap()),
            || {
                Box::new(RecordingPlugin {
                    fail_registration: false,
                })
            },
        )
    }

    fn factory_with_required(name: &str, version: &str, dep: &str) -> SimplePluginFactory {
        SimplePluginFactory::new(
            PluginDescriptor::new(name, name, Version::parse(version).unwrap())
                .with_required(Dependency::on(dep)),
            || {
                Box::new(RecordingPlugin {
                    fail_registration: false,
                })
            },
        )
    }

    #[tokio::test]
    async fn registration_is_case_insensitive_and_overwrites() {
        let runtime = runtime();
        runtime.register(factory("NickDetect", "1.0")).await;
        runtime.register(factory("nickdetect", "2.0")).await;

        assert_eq!(runtime.plugin_names().await, vec!["nickdetect"]);
        let descriptor = runtime.descriptor("NICKDETECT").await.unwrap();
        assert_eq!(descriptor.version, Version::new(2, 0, 0));
        assert!(runtime.is_enabled("nickdetect").await);
    }

    #[tokio::test]
    async fn disable_refused_while_required_by_enabled_dependent() {
        let runtime = runtime();
        runtime.register(factory("a", "1.0")).await;
        runtime.register(factory_with_required("b", "1.0", "a")).await;

        let err = runtime.disable("a").await.unwrap_err();
        match err {
            PluginError::DisableBlocked { dependents, .. } => {
                assert_eq!(dependents, vec!["b".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }

        // After the dependent is disabled, disabling succeeds.
        runtime.disable("b").await.unwrap();
        runtime.disable("a").await.unwrap();
        assert!(!runtime.is_enabled("a").await);
    }

    #[tokio::test]
    async fn cascading_disable_covers_required_chains_only() {
        let runtime = runtime();
        runtime.register(factory("core", "1.0")).await;
        runtime.register(factory_with_required("ui", "1.0", "core")).await;
        runtime.register(factory_with_required("hud", "1.0", "ui")).await;
        runtime
            .register(
                SimplePluginFactory::new(
                    PluginDescriptor::new("themes", "themes", Version::new(1, 0, 0))
                        .with_optional(Dependency::on("core")),
                    || {
                        Box::new(RecordingPlugin {
                            fail_registration: false,
                        })
                    },
                ),
            )
            .await;

        let changed = runtime.disable_cascading("core").await.unwrap();
        assert_eq!(changed[0], "core");
        assert!(changed.contains(&"ui".to_string()));
        assert!(changed.contains(&"hud".to_string()));
        assert!(!changed.contains(&"themes".to_string()));
        assert!(runtime.is_enabled("themes").await);
    }

    #[tokio::test]
    async fn enable_has_no_graph_precondition() {
        let runtime = runtime();
        runtime.register(factory("a", "1.0")).await;
        runtime.register(factory_with_required("b", "1.0", "a")).await;

        runtime.disable_cascading("a").await.unwrap();
        assert!(!runtime.is_enabled("b").await);

        // "a" stays disabled, yet enabling "b" succeeds.
        runtime.enable("b").await.unwrap();
        assert!(runtime.is_enabled("b").await);
        assert!(!runtime.is_enabled("a").await);
    }

    #[tokio::test]
    async fn load_all_isolates_registration_failures() {
        let runtime = runtime();
        runtime.register(factory("good", "1.0")).await;
        runtime
            .register(SimplePluginFactory::new(
                PluginDescriptor::new("bad", "bad", Version::new(1, 0, 0)),
                || {
                    Box::new(RecordingPlugin {
                        fail_registration: true,
                    })
                },
            ))
            .await;

        let loaded = runtime.load_all().await;
        assert_eq!(loaded, vec!["good".to_string()]);
        assert!(runtime.instance("good").await.is_some());
        assert!(runtime.instance("bad").await.is_none());
    }

    #[tokio::test]
    async fn load_all_skips_unsatisfied_and_loads_in_dependency_order() {
        let runtime = runtime();
        runtime.register(factory_with_required("app", "1.0", "lib")).await;
        runtime.register(factory("lib", "1.0")).await;
        runtime
            .register(factory_with_required("broken", "1.0", "missing"))
            .await;

        let loaded = runtime.load_all().await;
        assert_eq!(loaded, vec!["lib".to_string(), "app".to_string()]);

        let violations = runtime.validate().await;
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("missing"));
    }

    #[tokio::test]
    async fn unknown_plugin_operations_fail_fast() {
        let runtime = runtime();
        assert!(matches!(
            runtime.disable("ghost").await,
            Err(PluginError::NotFound(_))
        ));
        assert!(matches!(
            runtime.enable("ghost").await,
            Err(PluginError::NotFound(_))
        ));
        assert!(!runtime.is_enabled("ghost").await);
    }
}
