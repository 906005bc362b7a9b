//! Installation of SwarmUI and cloudflared

pub mod cloudflared;
pub mod download;
pub mod swarmui;

pub use cloudflared::{CloudflaredInstall, CloudflaredInstaller};
pub use download::{download_file, extract_tar_gz};
pub use swarmui::{
    CLONE_RECORD_FILE, InstallPrompt, NonInteractive, SetupOutcome, SwarmUiInstall,
    SwarmUiInstaller,
};
