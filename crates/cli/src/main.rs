//! PitchPal CLI — the main entry point.
//!
//! Commands:
//! - `practice` — Start an interactive pitch practice session
//! - `doctor`   — Diagnose config and model availability
//! - `config`   — Print the effective configuration

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "pitchpal",
    about = "PitchPal — practice sales pitches against AI customer personas",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive practice session
    Practice {
        /// Model preset alias or path to a GGUF file
        #[arg(short, long)]
        model: Option<String>,

        /// Path to a persona profile JSON file (default: built-in persona)
        #[arg(short, long)]
        persona: Option<String>,
    },

    /// Diagnose config and model availability
    Doctor,

    /// Print the effective configuration as TOML
    Config,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Practice { model, persona } => commands::practice::run(model, persona).await?,
        Commands::Doctor => commands::doctor::run().await?,
        Commands::Config => commands::config_cmd::run().await?,
    }

    Ok(())
}
