//! cloudflared installation from the upstream release assets.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::download::{download_file, extract_tar_gz};
use crate::error::InstallError;
use crate::platform::{AssetKind, CloudflaredAsset, Platform, cloudflared_asset};
use crate::settings::Settings;
use crate::tunnel::{CloudflaredLocation, CloudflaredLocator};

/// Files a failed install may leave in the cloudflared directory.
const PARTIAL_FILES: [&str; 3] = ["cloudflared", "cloudflared.exe", "cloudflared.tgz"];

/// Result of [`CloudflaredInstaller::install`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloudflaredInstall {
    AlreadyInstalled(CloudflaredLocation),
    Installed(PathBuf),
}

pub struct CloudflaredInstaller {
    locator: CloudflaredLocator,
    platform: Platform,
    base_url: String,
    cloudflared_dir: PathBuf,
    client: reqwest::Client,
}

impl CloudflaredInstaller {
    pub fn new(settings: &Settings, client: reqwest::Client) -> Self {
        Self {
            locator: CloudflaredLocator::from_settings(settings),
            platform: settings.platform,
            base_url: settings.cloudflared_base_url.clone(),
            cloudflared_dir: settings.cloudflared_dir.clone(),
            client,
        }
    }

    /// Download cloudflared unless one is found already. `force` skips the
    /// lookup.
    pub async fn install(&self, force: bool) -> Result<CloudflaredInstall, InstallError> {
        if !force && let Some(location) = self.locator.locate() {
            info!(
                path = %location.path().display(),
                source = location.describe(),
                "cloudflared already installed"
            );
            return Ok(CloudflaredInstall::AlreadyInstalled(location));
        }

        let asset = cloudflared_asset(self.platform, &self.base_url);
        info!(platform = %self.platform, url = %asset.url, "Installing cloudflared");

        match self.fetch(&asset).await {
            Ok(path) => {
                info!(path = %path.display(), "cloudflared installed");
                Ok(CloudflaredInstall::Installed(path))
            }
            Err(e) => {
                warn!(error = %e, "Failed to install cloudflared");
                self.remove_partial();
                Err(e)
            }
        }
    }

    /// Download straight into the cloudflared directory. With the default
    /// layout that directory is `<work_dir>/cloudflared`, so a download into
    /// the work dir would collide with it.
    async fn fetch(&self, asset: &CloudflaredAsset) -> Result<PathBuf, InstallError> {
        let download = self.cloudflared_dir.join(asset.file_name);
        download_file(&self.client, &asset.url, &download).await?;

        match asset.kind {
            AssetKind::Tarball => {
                extract_tar_gz(&download, &self.cloudflared_dir).await?;
                if let Err(e) = tokio::fs::remove_file(&download).await {
                    warn!(path = %download.display(), error = %e, "Could not remove downloaded archive");
                }
                Ok(self.locator.local_path())
            }
            AssetKind::Binary => {
                if !self.platform.is_windows() {
                    make_executable(&download);
                }
                Ok(download)
            }
        }
    }

    fn remove_partial(&self) {
        for name in PARTIAL_FILES {
            let path = self.cloudflared_dir.join(name);
            if path.exists()
                && let Err(e) = std::fs::remove_file(&path)
            {
                warn!(path = %path.display(), error = %e, "Could not remove partial download");
            }
        }
    }
}

#[cfg(unix)]
fn make_executable(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)) {
        warn!(
            path = %path.display(),
            error = %e,
            "Could not set executable permissions; you may need to run: chmod +x cloudflared"
        );
    }
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) {}
