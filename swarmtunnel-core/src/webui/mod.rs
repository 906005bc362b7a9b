//! SwarmUI detection, LAN binding and launch

pub mod detect;
pub mod lan;
pub mod launcher;

pub use detect::{
    BuildStatus, check_build, discover, executable_path, find_launch_script, is_installed,
    write_installed_marker,
};
pub use lan::{LanBinding, enable_lan_binding};
pub use launcher::{LaunchCommand, SwarmUiLauncher, check_dotnet};
