//! Best-effort removal of files and directory trees.

use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use super::permissions::fix_permissions;

/// What happened to one path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Removal {
    /// Nothing was there.
    Missing,
    Removed,
    /// Still present; the user has to remove it by hand.
    Failed { error: String },
}

impl Removal {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Remove `dir` recursively, repairing permissions between attempts.
pub async fn remove_dir_safely(dir: &Path, interactive_user: Option<&str>) -> Removal {
    if !dir.exists() {
        return Removal::Missing;
    }

    let first = match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => return removed(dir),
        Err(e) => e,
    };
    warn!(path = %dir.display(), error = %first, "Removal failed, repairing permissions");

    match fix_permissions(dir, interactive_user).await {
        Ok(true) => {}
        Ok(false) => warn!(path = %dir.display(), "Permission repair was incomplete"),
        Err(e) => warn!(path = %dir.display(), error = %e, "Permission repair failed"),
    }

    let second = match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => return removed(dir),
        Err(e) => e,
    };

    if force_remove(dir).await && !dir.exists() {
        return removed(dir);
    }

    warn!(path = %dir.display(), error = %second, "Could not remove directory");
    Removal::Failed {
        error: second.to_string(),
    }
}

/// Remove a single file.
pub async fn remove_file_safely(path: &Path) -> Removal {
    match tokio::fs::remove_file(path).await {
        Ok(()) => removed(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Removal::Missing,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not remove file");
            Removal::Failed {
                error: e.to_string(),
            }
        }
    }
}

fn removed(path: &Path) -> Removal {
    info!(path = %path.display(), "Removed");
    Removal::Removed
}

#[cfg(windows)]
async fn force_remove(dir: &Path) -> bool {
    tokio::process::Command::new("cmd")
        .arg("/C")
        .arg("rmdir")
        .arg("/S")
        .arg("/Q")
        .arg(dir)
        .output()
        .await
        .is_ok_and(|o| o.status.success())
}

#[cfg(not(windows))]
async fn force_remove(_dir: &Path) -> bool {
    false
}

/// Steps for removing `path` by hand after automatic removal failed.
pub fn manual_steps(path: &Path) -> Vec<String> {
    let shown = path.display();
    if cfg!(windows) {
        vec![
            format!("Close all applications that might be using files in {shown}"),
            "Open Command Prompt as Administrator".to_string(),
            format!("Run: rmdir /S /Q \"{shown}\""),
            "If that fails, delete the .git folder first, then the rest".to_string(),
        ]
    } else {
        vec![
            format!("Stop any process using files in {shown}"),
            format!("Run: chmod -R u+rwX \"{shown}\" && rm -rf \"{shown}\""),
        ]
    }
}

/// Paths in `dir` whose file name satisfies `matches`.
pub(crate) fn matching_files(dir: &Path, matches: impl Fn(&str) -> bool) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut found: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_str().is_some_and(&matches))
        .map(|e| e.path())
        .collect();
    found.sort();
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn missing_paths_are_reported_as_missing() {
        let temp = TempDir::new().unwrap();
        assert_eq!(remove_dir_safely(&temp.path().join("gone"), None).await, Removal::Missing);
        assert_eq!(remove_file_safely(&temp.path().join("gone.txt")).await, Removal::Missing);
    }

    #[tokio::test]
    async fn removes_tree_and_file() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("SwarmUI");
        std::fs::create_dir_all(dir.join("src").join("bin")).unwrap();
        std::fs::write(dir.join("src").join("bin").join("x"), b"x").unwrap();
        let file = temp.path().join("cloudflared.tgz");
        std::fs::write(&file, b"x").unwrap();

        assert_eq!(remove_dir_safely(&dir, None).await, Removal::Removed);
        assert!(!dir.exists());
        assert_eq!(remove_file_safely(&file).await, Removal::Removed);
        assert!(!file.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn removes_tree_with_read_only_directories() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("SwarmUI");
        let objects = dir.join(".git").join("objects");
        std::fs::create_dir_all(&objects).unwrap();
        std::fs::write(objects.join("ab"), b"x").unwrap();
        std::fs::set_permissions(&objects, std::fs::Permissions::from_mode(0o555)).unwrap();

        assert_eq!(remove_dir_safely(&dir, None).await, Removal::Removed);
        assert!(!dir.exists());
    }

    #[test]
    fn manual_steps_mention_path() {
        let steps = manual_steps(Path::new("/tmp/SwarmUI"));
        assert!(!steps.is_empty());
        assert!(steps.iter().any(|s| s.contains("/tmp/SwarmUI")));
    }

    #[test]
    fn matching_files_filters_by_name() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("swarmtunnel_fixperm_12.bat"), b"").unwrap();
        std::fs::write(temp.path().join("other.bat"), b"").unwrap();

        let found = matching_files(temp.path(), |name| name.starts_with("swarmtunnel_"));
        assert_eq!(found, vec![temp.path().join("swarmtunnel_fixperm_12.bat")]);
        assert!(matching_files(&temp.path().join("missing"), |_| true).is_empty());
    }
}
