//! Permission repair so that installed trees can be deleted again.
//!
//! git marks object files read-only; on Windows it also sets hidden and
//! system attributes and the clone may end up owned by an elevated account.

use std::io;
use std::path::Path;

use tokio::process::Command;
use tracing::debug;

/// Environment variable naming the account that should own the tree.
pub const INTERACTIVE_USER_ENV: &str = "SWARMTUNNEL_INTERACTIVE_USER";

/// Make everything under `dir` writable by the current user.
///
/// Returns whether every step succeeded. A missing `dir` counts as success.
pub async fn fix_permissions(dir: &Path, interactive_user: Option<&str>) -> io::Result<bool> {
    if !dir.exists() {
        return Ok(true);
    }
    platform_fix(dir, interactive_user).await
}

#[cfg(unix)]
async fn platform_fix(dir: &Path, _interactive_user: Option<&str>) -> io::Result<bool> {
    let dir = dir.to_path_buf();
    tokio::task::spawn_blocking(move || grant_owner_access(&dir))
        .await
        .map_err(io::Error::other)??;
    Ok(true)
}

/// Owner gets rwx on directories and rw on files; symlinks are left alone.
#[cfg(unix)]
fn grant_owner_access(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let meta = std::fs::symlink_metadata(path)?;
    if meta.file_type().is_symlink() {
        return Ok(());
    }

    let mode = meta.permissions().mode();
    if meta.is_dir() {
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode | 0o700))?;
        for entry in std::fs::read_dir(path)? {
            grant_owner_access(&entry?.path())?;
        }
    } else {
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode | 0o600))?;
    }
    Ok(())
}

#[cfg(windows)]
async fn platform_fix(dir: &Path, interactive_user: Option<&str>) -> io::Result<bool> {
    let user = resolve_interactive_user(interactive_user).await;
    let target = dir.display().to_string();
    let pattern = format!("{}\\*", target);

    let mut ok = run_quiet("attrib", &["-R", "-S", "-H", &pattern, "/S", "/D"]).await;
    ok &= run_quiet("takeown", &["/F", &target, "/R", "/D", "Y"]).await;
    match user {
        Some(user) => {
            let grant = format!("{user}:(OI)(CI)F");
            ok &= run_quiet("icacls", &[&target, "/grant", &grant, "/T", "/C"]).await;
        }
        None => {
            tracing::warn!("Could not determine the current user, skipping ACL grant");
            ok = false;
        }
    }
    Ok(ok)
}

#[cfg(not(any(unix, windows)))]
async fn platform_fix(_dir: &Path, _interactive_user: Option<&str>) -> io::Result<bool> {
    Ok(true)
}

/// The account to grant access to: the configured one, else `whoami`, else
/// `USERNAME`.
pub async fn resolve_interactive_user(configured: Option<&str>) -> Option<String> {
    if let Some(user) = configured.map(str::trim).filter(|u| !u.is_empty()) {
        return Some(user.to_string());
    }

    if let Ok(output) = Command::new("whoami").output().await
        && output.status.success()
    {
        let user = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if !user.is_empty() {
            return Some(user);
        }
    }

    std::env::var("USERNAME").ok().filter(|u| !u.is_empty())
}

/// Run a repair tool, logging rather than failing.
#[cfg_attr(not(windows), allow(dead_code))]
async fn run_quiet(program: &str, args: &[&str]) -> bool {
    match Command::new(program).args(args).output().await {
        Ok(output) if output.status.success() => true,
        Ok(output) => {
            debug!(
                program,
                status = %output.status,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "Permission repair step failed"
            );
            false
        }
        Err(e) => {
            debug!(program, error = %e, "Could not run permission repair step");
            false
        }
    }
}
