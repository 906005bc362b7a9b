//! Tunnel manager for the cloudflared process lifecycle

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, error, info, warn};

use super::cloudflared;
use super::config::TunnelConfig;
use super::state::{LogLevel, TunnelEvent, TunnelState};
use crate::process::ManagedProcess;

/// How long to wait for trailing output from a process that already exited.
const OUTPUT_SETTLE: Duration = Duration::from_millis(500);

/// Manages the cloudflared quick tunnel process
pub struct TunnelManager {
    config: TunnelConfig,
    state: Arc<RwLock<TunnelState>>,
    event_tx: broadcast::Sender<TunnelEvent>,
    process: Option<ManagedProcess>,
}

impl TunnelManager {
    /// Create a new tunnel manager
    pub fn new(config: TunnelConfig) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        Self {
            config,
            state: Arc::new(RwLock::new(TunnelState::Idle)),
            event_tx,
            process: None,
        }
    }

    /// Get the tunnel configuration
    pub fn config(&self) -> &TunnelConfig {
        &self.config
    }

    /// Get current tunnel state
    pub async fn state(&self) -> TunnelState {
        self.state.read().await.clone()
    }

    /// Subscribe to tunnel events
    pub fn subscribe(&self) -> broadcast::Receiver<TunnelEvent> {
        self.event_tx.subscribe()
    }

    /// Start cloudflared and give it the startup grace to fail fast.
    pub async fn start(&mut self) -> Result<(), TunnelError> {
        self.set_state(TunnelState::Starting).await;
        self.emit(TunnelEvent::Starting);

        let command = cloudflared::tunnel_command(&self.config.binary, self.config.local_port);
        let spawned = ManagedProcess::spawn("cloudflared", command, &self.config.log_path).await;
        let mut process = match spawned {
            Ok(process) => process,
            Err(e) => {
                error!("Failed to spawn cloudflared: {}", e);
                let err = if e.kind() == io::ErrorKind::NotFound {
                    TunnelError::NotInstalled(self.config.binary.clone())
                } else {
                    TunnelError::SpawnFailed(e.to_string())
                };
                self.fail(&err).await;
                return Err(err);
            }
        };

        tokio::time::sleep(self.config.startup_grace).await;
        if let Some(status) = process.try_status()? {
            let err = TunnelError::ExitedEarly {
                status: status.to_string(),
                output: process.collect_output(OUTPUT_SETTLE).await,
            };
            self.fail(&err).await;
            return Err(err);
        }

        info!(
            binary = %self.config.binary.display(),
            pid = ?process.id(),
            service = %self.config.service_url(),
            "Tunnel process started"
        );
        self.process = Some(process);
        Ok(())
    }

    /// Wait for cloudflared to print the quick tunnel URL.
    pub async fn wait_for_url(&mut self) -> Result<String, TunnelError> {
        let process = self.process.as_mut().ok_or(TunnelError::NotStarted)?;

        match cloudflared::scan_for_url(process.output_mut(), self.config.url_timeout).await {
            Ok(url) => {
                info!(url = %url, "Tunnel connected");
                self.set_state(TunnelState::Connected {
                    url: url.clone(),
                    connected_at: Utc::now(),
                })
                .await;
                self.emit(TunnelEvent::Connected { url: url.clone() });
                Ok(url)
            }
            Err(err) => {
                self.fail(&err).await;
                Err(err)
            }
        }
    }

    /// Next classified event from cloudflared's output.
    ///
    /// Unclassifiable lines are skipped. Returns `None` once the process's
    /// output has closed, which means it exited.
    pub async fn next_event(&mut self) -> Option<TunnelEvent> {
        loop {
            let line = self.process.as_mut()?.next_line().await?;
            let Some(event) = self.classify(&line).await else {
                continue;
            };
            self.emit(event.clone());
            return Some(event);
        }
    }

    async fn classify(&self, line: &str) -> Option<TunnelEvent> {
        if let Some(url) = cloudflared::parse_quick_tunnel_url(line) {
            if self.state.read().await.url() == Some(url.as_str()) {
                return None;
            }
            self.set_state(TunnelState::Connected {
                url: url.clone(),
                connected_at: Utc::now(),
            })
            .await;
            return Some(TunnelEvent::Connected { url });
        }

        if cloudflared::is_connection_registered(line) {
            return Some(TunnelEvent::Registered);
        }

        if cloudflared::is_connection_lost(line) {
            let reason = cloudflared::parse_log_level(line)
                .map(|(_, message)| message.to_string())
                .unwrap_or_else(|| line.to_string());
            warn!(reason = %reason, "Tunnel connection lost");
            return Some(TunnelEvent::Disconnected { reason });
        }

        cloudflared::parse_log_level(line).map(|(level, message)| {
            if level == LogLevel::Error {
                warn!(output = message, "cloudflared error");
            }
            TunnelEvent::Log {
                level,
                message: message.to_string(),
            }
        })
    }

    /// Whether the cloudflared process is still alive.
    pub fn is_running(&mut self) -> bool {
        self.process
            .as_mut()
            .is_some_and(|p| matches!(p.try_status(), Ok(None)))
    }

    /// Stop the tunnel, killing cloudflared if it ignores the request for
    /// `grace`.
    pub async fn stop(&mut self, grace: Duration) -> Result<(), TunnelError> {
        if let Some(mut process) = self.process.take() {
            info!("Stopping tunnel");
            process.terminate(grace).await?;
            self.set_state(TunnelState::Stopped).await;
            self.emit(TunnelEvent::Stopped);
        }
        Ok(())
    }

    async fn fail(&self, err: &TunnelError) {
        self.set_state(TunnelState::Failed {
            error: err.to_string(),
        })
        .await;
        self.emit(TunnelEvent::Failed {
            error: err.to_string(),
        });
    }

    /// Set state and log change
    async fn set_state(&self, new_state: TunnelState) {
        let mut state = self.state.write().await;
        debug!("Tunnel state: {:?} -> {:?}", *state, new_state);
        *state = new_state;
    }

    /// Emit an event
    fn emit(&self, event: TunnelEvent) {
        let _ = self.event_tx.send(event);
    }
}

/// Errors from tunnel operations
#[derive(Debug, thiserror::Error)]
pub enum TunnelError {
    #[error("cloudflared not found at {0}. Run 'swarmtunnel install' first")]
    NotInstalled(PathBuf),

    #[error("Failed to spawn cloudflared: {0}")]
    SpawnFailed(String),

    #[error("cloudflared exited during startup ({status})")]
    ExitedEarly { status: String, output: Vec<String> },

    #[error("cloudflared exited before printing a tunnel URL")]
    Terminated,

    #[error("Timed out after {0:?} waiting for the tunnel URL")]
    UrlTimeout(Duration),

    #[error("Tunnel has not been started")]
    NotStarted,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
