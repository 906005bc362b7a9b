//! swarmtunnel-core: install SwarmUI and cloudflared, run them together,
//! and tear them down again
//!
//! - **Installation** - [`SwarmUiInstaller`] clones and sets up SwarmUI,
//!   [`CloudflaredInstaller`] downloads the platform release of cloudflared
//! - **Launch** - [`SwarmUiLauncher`] starts the web UI and waits for it,
//!   [`TunnelManager`] runs a quick tunnel and scrapes its public URL
//! - **Process relay** - [`ManagedProcess`] copies child output into a log
//!   file and a bounded queue
//! - **Cleanup** - [`Uninstaller`] removes what the installer created
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   http://localhost:7801   ┌──────────────────┐
//! │   SwarmUI    │ ◀──────────────────────── │   cloudflared    │
//! │ (launcher or │                           │  quick tunnel    │
//! │  executable) │                           │                  │
//! └──────┬───────┘                           └────────┬─────────┘
//!        │ stdout/stderr                              │ stdout/stderr
//!        ▼                                            ▼
//!  logs/swarmui.log + queue                logs/cloudflared.log + queue
//!                                                     │
//!                                          https://*.trycloudflare.com
//! ```

pub mod cleanup;
pub mod error;
pub mod install;
pub mod platform;
pub mod process;
pub mod readiness;
pub mod settings;
pub mod tunnel;
pub mod webui;

#[cfg(test)]
mod testing;

pub use cleanup::{CleanupReport, Removal, Uninstaller};
pub use error::{InstallError, LaunchError, SwarmTunnelError};
pub use install::{
    CloudflaredInstall, CloudflaredInstaller, InstallPrompt, NonInteractive, SetupOutcome,
    SwarmUiInstall, SwarmUiInstaller,
};
pub use platform::{Arch, Os, Platform};
pub use process::ManagedProcess;
pub use readiness::{HttpProbe, ReadinessProbe, wait_for_service};
pub use settings::{DEFAULT_PORT, Settings, Timeouts};
pub use tunnel::{
    CloudflaredLocation, CloudflaredLocator, LogLevel, TunnelConfig, TunnelError, TunnelEvent,
    TunnelManager, TunnelState,
};
pub use webui::{BuildStatus, SwarmUiLauncher};
