//! Application configuration.
//!
//! Loaded from a TOML file; a missing file is written out with defaults on
//! first run. Command-line options override individual fields.

use anyhow::{Context, Result};
use proxy_server::{RelayConfig, ServerConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerSettings,
    pub relay: RelaySettings,
    pub plugins: PluginSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Client-facing bind address.
    pub bind_address: String,
    /// Backend server the relay connects to.
    pub backend_address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelaySettings {
    /// Synthetic keep-alive interval during pending authentication, seconds.
    pub keep_alive_interval_secs: u64,
    /// Attempt an OS browser open for verification URLs.
    pub open_browser: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginSettings {
    /// Plugins disabled at startup (registered, not receiving events).
    pub disabled: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter: trace, debug, info, warn, error.
    pub level: String,
    /// Structured JSON output.
    pub json_format: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                bind_address: "127.0.0.1:25565".to_string(),
                backend_address: "127.0.0.1:25566".to_string(),
            },
            relay: RelaySettings {
                keep_alive_interval_secs: 15,
                open_browser: true,
            },
            plugins: PluginSettings { disabled: vec![] },
            logging: LoggingSettings {
                level: "info".to_string(),
                json_format: false,
            },
        }
    }
}

impl AppConfig {
    /// Loads the config file, writing defaults when it does not exist yet.
    pub async fn load_from_file(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
        } else {
            let config = AppConfig::default();
            let content =
                toml::to_string_pretty(&config).context("serializing default config")?;
            tokio::fs::write(path, content)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            info!("Created default configuration file: {}", path.display());
            Ok(config)
        }
    }

    /// Maps the file settings onto the proxy server's configuration.
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            bind_address: self.server.bind_address.clone(),
            backend_address: self.server.backend_address.clone(),
            relay: RelayConfig {
                keep_alive_interval: Duration::from_secs(self.relay.keep_alive_interval_secs),
                open_browser: self.relay.open_browser,
                ..RelayConfig::default()
            },
        }
    }
}
