//! Locating a SwarmUI checkout and deciding how it can be started.

use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::platform::Os;
use crate::settings::INSTALLED_MARKER;

/// Solution file present in every SwarmUI checkout.
pub const SOLUTION_FILE: &str = "SwarmUI.sln";

/// Launcher scripts shipped with SwarmUI, in preference order.
pub const LAUNCH_SCRIPTS: [&str; 6] = [
    "launch-windows.bat",
    "launch_windows.bat",
    "launch-linux.sh",
    "launch_linux.sh",
    "launch-macos.sh",
    "launch_macos.sh",
];

/// How deep below the SwarmUI root launcher scripts are searched for.
const LAUNCH_SCRIPT_DEPTH: usize = 3;

/// Whether `dir` holds an installed (or at least cloned) SwarmUI.
pub fn is_installed(dir: &Path) -> bool {
    dir.join(INSTALLED_MARKER).exists() || dir.join(SOLUTION_FILE).exists()
}

/// Find an existing SwarmUI: the configured directory, then a `SwarmUI`
/// directory next to `cwd` or any of its ancestors, then `~/SwarmUI`.
pub fn discover(configured: &Path, cwd: &Path, home: Option<&Path>) -> Option<PathBuf> {
    if is_installed(configured) {
        return Some(configured.to_path_buf());
    }

    let found = cwd
        .ancestors()
        .map(|dir| dir.join("SwarmUI"))
        .chain(home.map(|h| h.join("SwarmUI")))
        .find(|candidate| is_installed(candidate));

    if let Some(dir) = &found {
        info!(path = %dir.display(), "Detected existing SwarmUI");
    }
    found
}

/// Search `root` and then its subdirectories, nearest first, for a launcher
/// script.
pub fn find_launch_script(root: &Path) -> Option<PathBuf> {
    let mut queue = VecDeque::from([(root.to_path_buf(), 0usize)]);

    while let Some((dir, depth)) = queue.pop_front() {
        if let Some(script) = LAUNCH_SCRIPTS
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.is_file())
        {
            debug!(script = %script.display(), "Found launcher script");
            return Some(script);
        }

        if depth >= LAUNCH_SCRIPT_DEPTH {
            continue;
        }
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        let mut children: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_ok_and(|t| t.is_dir()))
            .map(|e| e.path())
            .collect();
        children.sort();
        queue.extend(children.into_iter().map(|child| (child, depth + 1)));
    }
    None
}

/// Published SwarmUI executable inside a checkout.
pub fn executable_path(dir: &Path, os: Os) -> PathBuf {
    let name = if os == Os::Windows { "SwarmUI.exe" } else { "SwarmUI" };
    dir.join("src").join("bin").join("live_release").join(name)
}

/// What a checkout offers for starting SwarmUI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildStatus {
    /// A launcher script that builds and runs SwarmUI.
    Launcher(PathBuf),
    /// A published executable.
    Executable(PathBuf),
    /// Only sources; a launcher may still be attempted.
    SourceOnly(PathBuf),
    /// Nothing startable.
    Missing,
}

impl BuildStatus {
    pub fn is_startable(&self) -> bool {
        !matches!(self, Self::Missing)
    }
}

pub fn check_build(dir: &Path, os: Os) -> BuildStatus {
    if let Some(script) = find_launch_script(dir) {
        return BuildStatus::Launcher(script);
    }
    let exe = executable_path(dir, os);
    if exe.exists() {
        return BuildStatus::Executable(exe);
    }
    let sln = dir.join(SOLUTION_FILE);
    if sln.exists() {
        return BuildStatus::SourceOnly(sln);
    }
    BuildStatus::Missing
}

/// Mark `dir` as fully installed.
pub fn write_installed_marker(dir: &Path) -> io::Result<()> {
    std::fs::create_dir_all(dir)?;
    std::fs::write(dir.join(INSTALLED_MARKER), "installed\n")
}
