//! Command-line interface for the relay binary.

use clap::{Arg, Command};
use std::path::PathBuf;

/// Parsed command-line options; each override wins over the config file.
#[derive(Debug, Clone)]
pub struct CliArgs {
    pub config_path: PathBuf,
    pub bind_address: Option<String>,
    pub backend_address: Option<String>,
    pub log_level: Option<String>,
    pub json_logs: bool,
}

impl CliArgs {
    pub fn parse() -> Self {
        let matches = Command::new("Waypoint Relay")
            .version(env!("CARGO_PKG_VERSION"))
            .about("Person-in-the-middle relay with game state reconstruction and plugins")
            .arg(
                Arg::new("config")
                    .short('c')
                    .long("config")
                    .value_name("FILE")
                    .help("Configuration file path")
                    .default_value("waypoint.toml"),
            )
            .arg(
                Arg::new("bind")
                    .short('b')
                    .long("bind")
                    .value_name("ADDRESS")
                    .help("Client-facing bind address (e.g. 127.0.0.1:25565)"),
            )
            .arg(
                Arg::new("backend")
                    .short('s')
                    .long("backend")
                    .value_name("ADDRESS")
                    .help("Backend server address"),
            )
            .arg(
                Arg::new("log-level")
                    .short('l')
                    .long("log-level")
                    .value_name("LEVEL")
                    .help("Log level (trace, debug, info, warn, error)"),
            )
            .arg(
                Arg::new("json-logs")
                    .long("json-logs")
                    .help("Output logs in JSON format")
                    .action(clap::ArgAction::SetTrue),
            )
            .get_matches();

        Self {
            config_path: PathBuf::from(
                matches
                    .get_one::<String>("config")
                    .map(String::as_str)
                    .unwrap_or("waypoint.toml"),
            ),
            bind_address: matches.get_one::<String>("bind").cloned(),
            backend_address: matches.get_one::<String>("backend").cloned(),
            log_level: matches.get_one::<String>("log-level").cloned(),
            json_logs: matches.get_flag("json-logs"),
        }
    }
}
