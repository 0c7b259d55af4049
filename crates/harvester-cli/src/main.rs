mod cmd;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "harvester",
    about = "Mass-build repositories from their CI descriptors and harvest compiler artifacts",
    version,
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build every repository in a database and extract artifacts
    Run {
        /// Run configuration file (YAML)
        #[arg(long, default_value = "harvester.yaml")]
        config: PathBuf,

        /// Repository database (JSON: database -> repository -> { url })
        #[arg(long)]
        database: PathBuf,

        /// Override the configured worker count
        #[arg(long)]
        workers: Option<usize>,

        /// Re-sync build directories even when already populated
        #[arg(long)]
        force_update: bool,
    },

    /// Show the interpreted build plan for a repository without running it
    Plan {
        /// Repository checkout to inspect
        dir: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            config,
            database,
            workers,
            force_update,
        } => cmd::run::run(&config, &database, workers, force_update),
        Commands::Plan { dir } => cmd::plan::plan(&dir),
    }
}
