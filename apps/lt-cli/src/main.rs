//! # lt-byrole
//!
//! Operator CLI for the by-role course deletion trigger.
//!
//! - `lt-byrole run --snapshot <json>` — run one pass over a role snapshot
//! - `lt-byrole status` — list tracked courses and their remaining time
//! - `lt-byrole clear <course_id>` — drop a tracking record
//! - `lt-byrole check-config` / `init-config` — validate or create the config

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::CliContext;

/// Flags courses for deletion once they lack a responsible role for too long.
#[derive(Parser)]
#[command(name = "lt-byrole", version, about)]
struct Cli {
    /// Trigger configuration file.
    #[arg(long, default_value = "lt-byrole.toml")]
    config: PathBuf,

    /// Directory holding tracking records and the event log.
    #[arg(long, default_value = ".lt-byrole")]
    state_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate every course in a role directory snapshot.
    Run(commands::run::RunArgs),
    /// List tracked courses.
    Status,
    /// Delete the tracking record of a course.
    Clear {
        course_id: u64,
        /// Trigger instance, for per-instance tracking.
        #[arg(long)]
        instance: Option<u64>,
    },
    /// Validate the configuration file.
    CheckConfig,
    /// Write the recommended configuration file.
    InitConfig {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so `run --json` output stays machine readable.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("lt_byrole=info".parse()?)
                .add_directive("lt_tracking=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();
    let ctx = CliContext::new(cli.config, cli.state_dir);

    match &cli.command {
        Commands::Run(args) => commands::run::execute(args, &ctx),
        Commands::Status => commands::status::execute(&ctx),
        Commands::Clear {
            course_id,
            instance,
        } => commands::clear::execute(&ctx, *course_id, *instance),
        Commands::CheckConfig => commands::config::check(&ctx),
        Commands::InitConfig { force } => commands::config::init(&ctx, *force),
    }
}
