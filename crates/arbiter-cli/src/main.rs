use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser, Debug)]
#[command(name = "arbiter", version, about = "Arbiter decision logger CLI")]
struct Cli {
    /// Enable debug logging (overridden by RUST_LOG).
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate a configuration file and print the effective settings.
    Check {
        /// Path to the configuration file.
        #[arg(short, long, default_value = "arbiter.yaml", env = "ARBITER_CONFIG")]
        config: PathBuf,
    },

    /// Replay a JSON Lines file of decisions through the logging pipeline.
    Replay {
        /// Path to the configuration file.
        #[arg(short, long, default_value = "arbiter.yaml", env = "ARBITER_CONFIG")]
        config: PathBuf,

        /// Decisions, one JSON object per line.
        #[arg(short, long)]
        input: PathBuf,

        /// Outcomes to attach, one JSON object per line.
        #[arg(long)]
        outcomes: Option<PathBuf>,
    },

    /// Summarize the local decision log.
    Inspect {
        /// Local log directory.
        #[arg(short, long)]
        dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.cmd {
        Command::Check { config } => commands::check::run(&config),
        Command::Replay {
            config,
            input,
            outcomes,
        } => commands::replay::run(&config, &input, outcomes.as_deref()).await,
        Command::Inspect { dir } => commands::inspect::run(&dir),
    }
}
