use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod config;
mod output;

#[derive(Parser)]
#[command(
    name = "swarmtunnel",
    about = "Run SwarmUI locally and share it through a Cloudflare quick tunnel"
)]
#[command(version, propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Install SwarmUI and cloudflared
    Install(commands::install::InstallArgs),
    /// Start SwarmUI and open a public tunnel to it
    Start(commands::start::StartArgs),
    /// Remove everything the installer created
    Uninstall(commands::uninstall::UninstallArgs),
    /// Remove the SwarmUI checkout and stray cloudflared downloads
    Cleanup,
    /// Inspect configuration
    Config(commands::config::ConfigArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = run(cli.command).await {
        output::print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Install(args) => commands::install::run(args).await,
        Commands::Start(args) => commands::start::run(args).await,
        Commands::Uninstall(args) => commands::uninstall::run(args).await,
        Commands::Cleanup => commands::cleanup::run().await,
        Commands::Config(args) => commands::config::run(args),
    }
}
