//! Tunnel state and event types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current state of the tunnel connection
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TunnelState {
    /// No tunnel process yet
    #[default]
    Idle,
    /// cloudflared is running but has not printed a URL
    Starting,
    /// Public URL is known
    Connected {
        url: String,
        connected_at: DateTime<Utc>,
    },
    /// Tunnel failed to come up
    Failed { error: String },
    /// Tunnel was explicitly stopped
    Stopped,
}

impl TunnelState {
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Connected { url, .. } => Some(url),
            _ => None,
        }
    }
}

/// Events emitted by the tunnel manager
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TunnelEvent {
    /// Tunnel is starting
    Starting,
    /// Quick tunnel URL is available
    Connected { url: String },
    /// An edge connection registered
    Registered,
    /// An edge connection dropped
    Disconnected { reason: String },
    /// Tunnel failed
    Failed { error: String },
    /// Tunnel stopped
    Stopped,
    /// Log message from cloudflared
    Log { level: LogLevel, message: String },
}

/// Log levels for tunnel events
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}
