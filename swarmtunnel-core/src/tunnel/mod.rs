//! Cloudflare quick tunnel in front of the local web UI

pub mod cloudflared;
pub mod config;
pub mod manager;
pub mod state;

pub use cloudflared::{CloudflaredLocation, CloudflaredLocator, probe_version};
pub use config::{TunnelConfig, remove_ingress_file, write_ingress_file};
pub use manager::{TunnelError, TunnelManager};
pub use state::{LogLevel, TunnelEvent, TunnelState};
