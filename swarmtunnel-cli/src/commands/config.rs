use std::path::Path;

use anyhow::Result;
use clap::{Args, Subcommand};

use crate::config::ConfigLoader;
use crate::output;

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration and the layers it came from
    Show,
    /// Print where the user and project config files live
    Path,
}

pub fn run(args: ConfigArgs) -> Result<()> {
    match args.command {
        ConfigCommands::Show => show_config(),
        ConfigCommands::Path => show_paths(),
    }
}

fn show_config() -> Result<()> {
    let user = ConfigLoader::user_config_path();
    let project = ConfigLoader::project_config_path();
    let config = ConfigLoader::load_from(&user, &project)?;

    // Comments keep the output loadable as a config file.
    for line in layer_summary(&user, &project, &ConfigLoader::env_overrides()) {
        println!("# {line}");
    }
    println!();
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

fn show_paths() -> Result<()> {
    let user = ConfigLoader::user_config_path();
    let project = ConfigLoader::project_config_path();
    output::print_field("User config", &describe_file(&user));
    output::print_field("Project config", &describe_file(&project));
    Ok(())
}

/// Layers that contributed to the effective config, lowest priority first.
fn layer_summary(user: &Path, project: &Path, env: &[&str]) -> Vec<String> {
    let mut lines = vec!["Layers, lowest priority first:".to_string()];
    lines.push("  built-in defaults".to_string());
    if user.is_file() {
        lines.push(format!("  user config     {}", user.display()));
    }
    if project.is_file() {
        lines.push(format!("  project config  {}", project.display()));
    }
    if !env.is_empty() {
        lines.push(format!("  environment     {}", env.join(", ")));
    }
    lines
}

fn describe_file(path: &Path) -> String {
    let state = if path.is_file() { "found" } else { "not found" };
    format!("{} ({state})", path.display())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn summary_lists_only_present_layers() {
        let temp = TempDir::new().unwrap();
        let user = temp.path().join("user.toml");
        let project = temp.path().join("project.toml");

        let lines = layer_summary(&user, &project, &[]);
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains("built-in defaults"));

        std::fs::write(&project, "[service]\nport = 9000\n").unwrap();
        let lines = layer_summary(&user, &project, &["SWARMUI_DIR", "SWARMTUNNEL_ENABLE_LAN"]);
        assert_eq!(lines.len(), 4);
        assert!(lines[2].starts_with("  project config"));
        assert!(lines[2].ends_with("project.toml"));
        assert_eq!(lines[3], "  environment     SWARMUI_DIR, SWARMTUNNEL_ENABLE_LAN");
    }

    #[test]
    fn describe_file_reports_presence() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        assert!(describe_file(&path).ends_with("(not found)"));

        std::fs::write(&path, "").unwrap();
        assert!(describe_file(&path).ends_with("(found)"));
    }
}
