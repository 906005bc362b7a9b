//! Uninstall and cleanup of installed components

pub mod permissions;
pub mod remove;
pub mod uninstall;

pub use permissions::{fix_permissions, resolve_interactive_user};
pub use remove::{Removal, manual_steps, remove_dir_safely, remove_file_safely};
pub use uninstall::{CleanupEntry, CleanupReport, Uninstaller};
