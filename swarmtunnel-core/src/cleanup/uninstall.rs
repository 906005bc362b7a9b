//! Removal of everything the installer created.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use super::remove::{Removal, matching_files, remove_dir_safely, remove_file_safely};
use crate::install::CLONE_RECORD_FILE;
use crate::settings::Settings;

/// Files a cloudflared download can leave behind.
pub const STRAY_CLOUDFLARED_FILES: [&str; 3] =
    ["cloudflared", "cloudflared.exe", "cloudflared.tgz"];

/// Prefix of the permission repair scripts older installs left in the temp
/// dir; also matches the `_everyone_` variant.
const FIXPERM_PREFIX: &str = "swarmtunnel_fixperm_";

/// One removed (or not) path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupEntry {
    pub component: String,
    pub path: PathBuf,
    pub removal: Removal,
}

/// Outcome of an uninstall or cleanup run.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub entries: Vec<CleanupEntry>,
}

impl CleanupReport {
    fn push(&mut self, component: impl Into<String>, path: &Path, removal: Removal) {
        self.entries.push(CleanupEntry {
            component: component.into(),
            path: path.to_path_buf(),
            removal,
        });
    }

    /// Entries that still need manual removal.
    pub fn failures(&self) -> impl Iterator<Item = &CleanupEntry> {
        self.entries.iter().filter(|e| e.removal.is_failure())
    }

    pub fn removed(&self) -> impl Iterator<Item = &CleanupEntry> {
        self.entries.iter().filter(|e| e.removal == Removal::Removed)
    }

    pub fn is_clean(&self) -> bool {
        self.failures().next().is_none()
    }
}

pub struct Uninstaller {
    swarmui_dir: PathBuf,
    cloudflared_dir: PathBuf,
    log_dir: PathBuf,
    install_log: PathBuf,
    work_dir: PathBuf,
    temp_dir: PathBuf,
    interactive_user: Option<String>,
}

impl Uninstaller {
    pub fn new(settings: &Settings) -> Self {
        Self {
            swarmui_dir: settings.swarmui_dir.clone(),
            cloudflared_dir: settings.cloudflared_dir.clone(),
            log_dir: settings.log_dir.clone(),
            install_log: settings.install_log(),
            work_dir: settings.work_dir.clone(),
            temp_dir: std::env::temp_dir(),
            interactive_user: settings.interactive_user.clone(),
        }
    }

    /// Look for leftover temp files in `dir` instead of the system temp dir.
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }

    /// Remove SwarmUI, cloudflared, logs and temp files.
    pub async fn uninstall(&self) -> CleanupReport {
        let mut report = CleanupReport::default();
        let user = self.interactive_user.as_deref();

        info!(dir = %self.swarmui_dir.display(), "Removing SwarmUI");
        let removal = remove_dir_safely(&self.swarmui_dir, user).await;
        report.push("SwarmUI directory", &self.swarmui_dir, removal);
        report.push("install log", &self.install_log, remove_file_safely(&self.install_log).await);

        let clone_record = self.temp_dir.join(CLONE_RECORD_FILE);
        report.push("clone record", &clone_record, remove_file_safely(&clone_record).await);
        for script in matching_files(&self.temp_dir, |name| {
            name.starts_with(FIXPERM_PREFIX) && name.ends_with(".bat")
        }) {
            let removal = remove_file_safely(&script).await;
            report.push("temp file", &script, removal);
        }

        info!(dir = %self.cloudflared_dir.display(), "Removing cloudflared");
        report.push(
            "cloudflared directory",
            &self.cloudflared_dir,
            remove_dir_safely(&self.cloudflared_dir, user).await,
        );
        self.remove_stray_cloudflared(&self.work_dir, &mut report).await;

        report.push("logs directory", &self.log_dir, remove_dir_safely(&self.log_dir, user).await);
        report
    }

    /// Remove SwarmUI and loose cloudflared files, keeping logs.
    pub async fn cleanup(&self) -> CleanupReport {
        let mut report = CleanupReport::default();
        let user = self.interactive_user.as_deref();

        let removal = remove_dir_safely(&self.swarmui_dir, user).await;
        report.push("SwarmUI directory", &self.swarmui_dir, removal);
        self.remove_stray_cloudflared(&self.work_dir, &mut report).await;
        self.remove_stray_cloudflared(&self.cloudflared_dir, &mut report).await;

        if std::fs::read_dir(&self.cloudflared_dir).is_ok_and(|mut d| d.next().is_none()) {
            let removal = match std::fs::remove_dir(&self.cloudflared_dir) {
                Ok(()) => Removal::Removed,
                Err(e) => Removal::Failed { error: e.to_string() },
            };
            report.push("cloudflared directory", &self.cloudflared_dir, removal);
        }
        report
    }

    /// Stray downloads are files only; a directory with the same name is the
    /// cloudflared directory and handled separately.
    async fn remove_stray_cloudflared(&self, dir: &Path, report: &mut CleanupReport) {
        for name in STRAY_CLOUDFLARED_FILES {
            let path = dir.join(name);
            if path.is_file() {
                let removal = remove_file_safely(&path).await;
                report.push(name, &path, removal);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        settings: Settings,
        temp_files: PathBuf,
    }

    fn installed_layout() -> Fixture {
        let temp = TempDir::new().unwrap();
        let settings = Settings::rooted_at(temp.path());
        std::fs::create_dir_all(settings.swarmui_dir.join(".git")).unwrap();
        std::fs::write(settings.swarmui_dir.join("SwarmUI.sln"), b"").unwrap();
        std::fs::create_dir_all(&settings.cloudflared_dir).unwrap();
        std::fs::write(settings.cloudflared_dir.join("cloudflared"), b"bin").unwrap();
        std::fs::create_dir_all(&settings.log_dir).unwrap();
        std::fs::write(settings.install_log(), b"[t] clone_path=x\n").unwrap();
        std::fs::write(temp.path().join("cloudflared.exe"), b"bin").unwrap();

        let temp_files = temp.path().join("tmp");
        std::fs::create_dir_all(&temp_files).unwrap();
        std::fs::write(temp_files.join(CLONE_RECORD_FILE), b"timestamp=x\n").unwrap();
        std::fs::write(temp_files.join("swarmtunnel_fixperm_42.bat"), b"").unwrap();
        std::fs::write(temp_files.join("swarmtunnel_fixperm_everyone_42.bat"), b"").unwrap();
        std::fs::write(temp_files.join("unrelated.bat"), b"").unwrap();

        Fixture {
            _temp: temp,
            settings,
            temp_files,
        }
    }

    #[tokio::test]
    async fn uninstall_removes_every_component() {
        let f = installed_layout();
        let report = Uninstaller::new(&f.settings)
            .with_temp_dir(&f.temp_files)
            .uninstall()
            .await;

        assert!(report.is_clean());
        assert!(!f.settings.swarmui_dir.exists());
        assert!(!f.settings.cloudflared_dir.exists());
        assert!(!f.settings.log_dir.exists());
        assert!(!f.settings.work_dir.join("cloudflared.exe").exists());
        assert!(!f.temp_files.join(CLONE_RECORD_FILE).exists());
        assert!(!f.temp_files.join("swarmtunnel_fixperm_42.bat").exists());
        assert!(!f.temp_files.join("swarmtunnel_fixperm_everyone_42.bat").exists());
        assert!(f.temp_files.join("unrelated.bat").exists());

        assert!(report.removed().count() >= 8);
    }

    #[tokio::test]
    async fn uninstall_on_clean_tree_reports_missing() {
        let temp = TempDir::new().unwrap();
        let settings = Settings::rooted_at(temp.path());
        let report = Uninstaller::new(&settings)
            .with_temp_dir(temp.path().join("tmp"))
            .uninstall()
            .await;

        assert!(report.is_clean());
        assert_eq!(report.removed().count(), 0);
        assert!(report.entries.iter().all(|e| e.removal == Removal::Missing));
    }

    #[tokio::test]
    async fn cleanup_keeps_logs_and_drops_empty_cloudflared_dir() {
        let f = installed_layout();
        let report = Uninstaller::new(&f.settings)
            .with_temp_dir(&f.temp_files)
            .cleanup()
            .await;

        assert!(report.is_clean());
        assert!(!f.settings.swarmui_dir.exists());
        assert!(!f.settings.cloudflared_dir.exists());
        assert!(!f.settings.work_dir.join("cloudflared.exe").exists());
        assert!(f.settings.install_log().exists());
        assert!(f.temp_files.join(CLONE_RECORD_FILE).exists());
    }

    #[tokio::test]
    async fn cleanup_keeps_non_empty_cloudflared_dir() {
        let f = installed_layout();
        std::fs::write(f.settings.cloudflared_dir.join("config.yml"), b"").unwrap();

        let report = Uninstaller::new(&f.settings).cleanup().await;
        assert!(report.is_clean());
        assert!(f.settings.cloudflared_dir.join("config.yml").exists());
        assert!(!f.settings.cloudflared_dir.join("cloudflared").exists());
    }
}
