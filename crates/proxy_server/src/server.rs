//! Client-facing listener.
//!
//! Accepts TCP connections, performs the debug codec's login exchange, and
//! hands the resulting leg to the session manager. The manager enforces the
//! single-session invariant; the listener itself never queues clients.

use crate::codec;
use crate::config::ServerConfig;
use crate::session::SessionManager;
use crate::transport::{AuthError, CredentialFlow, LoginOutcome};
use crate::ServerError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tracing::{info, warn};

/// How long a connecting client has to present its login record.
const LOGIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Credential flow over the debug codec: connects to the configured
/// backend and presents the player's login record. Never interactive; a
/// real vendor flow replaces this.
pub struct TcpBackendFlow {
    address: String,
}

impl TcpBackendFlow {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

#[async_trait]
impl CredentialFlow for TcpBackendFlow {
    async fn connect(&self, username: &str) -> Result<LoginOutcome, AuthError> {
        let mut stream = TcpStream::connect(&self.address)
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;
        codec::write_frame(&mut stream, &codec::login_packet(username))
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;
        Ok(LoginOutcome::Ready(codec::spawn_leg(stream)))
    }
}

/// The client-facing accept loop.
pub struct ProxyServer {
    config: ServerConfig,
    manager: Arc<SessionManager>,
}

impl ProxyServer {
    pub fn new(config: ServerConfig, manager: Arc<SessionManager>) -> Self {
        Self { config, manager }
    }

    pub fn session_manager(&self) -> Arc<SessionManager> {
        self.manager.clone()
    }

    /// Runs until the shutdown signal fires.
    pub async fn run(&self, mut shutdown: oneshot::Receiver<()>) -> Result<(), ServerError> {
        let listener = TcpListener::bind(&self.config.bind_address)
            .await
            .map_err(|e| ServerError::Network(format!("bind {}: {e}", self.config.bind_address)))?;
        info!("Relay listening on {}", self.config.bind_address);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested; ending active session");
                    self.manager.shutdown().await;
                    return Ok(());
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        info!("Client connection from {addr}");
                        let manager = self.manager.clone();
                        tokio::spawn(async move {
                            handle_connection(manager, stream).await;
                        });
                    }
                    Err(e) => warn!("Accept failed: {e}"),
                },
            }
        }
    }
}

async fn handle_connection(manager: Arc<SessionManager>, mut stream: TcpStream) {
    let login = tokio::time::timeout(LOGIN_TIMEOUT, codec::read_frame(&mut stream)).await;
    let username = match login {
        Ok(Ok(Some(packet))) => match codec::login_username(&packet) {
            Some(username) => username,
            None => {
                warn!("First frame was not a login record; dropping connection");
                return;
            }
        },
        Ok(Ok(None)) | Ok(Err(_)) => {
            warn!("Connection ended before login");
            return;
        }
        Err(_) => {
            warn!("Login timed out");
            return;
        }
    };

    let leg = codec::spawn_leg(stream);
    if let Err(e) = manager.accept_client(username, leg).await {
        // Rejection reasons already reached the client as a disconnect.
        info!("Connection rejected: {e}");
    }
}
