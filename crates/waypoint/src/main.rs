//! Waypoint relay entry point.
//!
//! Wires the pieces together: event bus, session manager, plugin runtime,
//! built-in plugins, and the client-facing listener. The runtime object
//! graph is built once here and passed by reference everywhere — nothing
//! global, nothing ambient.

mod cli;
mod config;
mod logging;
mod signals;

use anyhow::{Context, Result};
use cli::CliArgs;
use config::AppConfig;
use plugin_nick_detect::NickDetectPlugin;
use plugin_system::{PluginRuntime, RelayServices};
use proxy_server::server::TcpBackendFlow;
use proxy_server::{ProxyServer, SessionManager};
use std::sync::Arc;
use tracing::{info, warn};
use waypoint_event_system::create_event_bus;

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    let mut config = AppConfig::load_from_file(&args.config_path)
        .await
        .context("loading configuration")?;

    // CLI overrides beat the file.
    if let Some(bind) = args.bind_address {
        config.server.bind_address = bind;
    }
    if let Some(backend) = args.backend_address {
        config.server.backend_address = backend;
    }
    let level = args.log_level.unwrap_or_else(|| config.logging.level.clone());
    let json_logs = args.json_logs || config.logging.json_format;
    logging::setup_logging(&level, json_logs).context("initializing logging")?;

    info!("Waypoint relay v{} starting", env!("CARGO_PKG_VERSION"));
    let server_config = config.server_config();

    // The shared core: bus, session manager, plugin runtime.
    let bus = create_event_bus();
    let flow = Arc::new(TcpBackendFlow::new(server_config.backend_address.clone()));
    let manager = Arc::new(SessionManager::new(
        bus.clone(),
        server_config.relay.clone(),
        flow,
    ));
    let services: Arc<dyn RelayServices> = manager.clone();
    let runtime = PluginRuntime::new(bus.clone(), services);

    // Built-in plugins.
    runtime.register(NickDetectPlugin::factory()).await;

    for violation in runtime.validate().await {
        warn!("Plugin dependency issue: {violation}");
    }
    let loaded = runtime.load_all().await;
    info!("Loaded {} plugin(s): {}", loaded.len(), loaded.join(", "));

    for name in &config.plugins.disabled {
        match runtime.disable_cascading(name).await {
            Ok(disabled) => info!("Disabled at startup: {}", disabled.join(", ")),
            Err(e) => warn!("Could not disable {name}: {e}"),
        }
    }

    let shutdown_rx = signals::setup_shutdown_handler().await;
    let server = ProxyServer::new(server_config, manager);
    server
        .run(shutdown_rx)
        .await
        .context("running relay server")?;

    runtime.unload_all().await;
    info!("Waypoint relay stopped");
    Ok(())
}
