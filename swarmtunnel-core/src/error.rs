//! Error types for swarmtunnel-core

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub use crate::tunnel::TunnelError;

/// Top-level error type for swarmtunnel-core
#[derive(Error, Debug)]
pub enum SwarmTunnelError {
    #[error("Install error: {0}")]
    Install(#[from] InstallError),

    #[error("Launch error: {0}")]
    Launch(#[from] LaunchError),

    #[error("Tunnel error: {0}")]
    Tunnel(#[from] TunnelError),
}

/// Errors from installing SwarmUI or cloudflared
#[derive(Error, Debug)]
pub enum InstallError {
    #[error("'git' is not installed or not found in PATH. Install it from https://git-scm.com/downloads and try again")]
    GitNotFound,

    #[error("git clone of {repo} failed with {status}")]
    CloneFailed { repo: String, status: std::process::ExitStatus },

    #[error("SwarmUI clone at {0} appears incomplete (no .git directory)")]
    IncompleteClone(PathBuf),

    #[error("Network error downloading {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Error extracting {path}: {source}")]
    Extract {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from starting SwarmUI
#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("SwarmUI not found at {0}. Run 'swarmtunnel install' first")]
    NotInstalled(PathBuf),

    #[error("SwarmUI at {0} is not built and has no launch script. Run 'swarmtunnel install' to install and/or build it")]
    NotBuilt(PathBuf),

    #[error(".NET not found. Please install the .NET 8 SDK")]
    DotnetMissing,

    #[error("Failed to spawn SwarmUI: {0}")]
    SpawnFailed(#[source] std::io::Error),

    #[error("SwarmUI exited during startup ({status})")]
    ExitedEarly { status: String, output: Vec<String> },

    #[error("SwarmUI did not answer at {url} within {timeout:?}")]
    NotReady { url: String, timeout: Duration },
}
