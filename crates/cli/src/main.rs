//! MediGuard CLI, the main entry point.
//!
//! Commands:
//! - `analyze`  Run the stage pipeline for one patient
//! - `serve`    Start the HTTP gateway
//! - `subjects` List patient ids in the record snapshot
//! - `config`   Print or check configuration

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "mediguard",
    about = "MediGuard: staged claims-fraud and discharge analysis",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze one patient and print the run report
    Analyze {
        /// Patient id
        subject_id: String,

        /// Stop after this stage
        #[arg(long)]
        through: Option<String>,

        /// Record snapshot to load instead of the configured one
        #[arg(long, env = "MEDIGUARD_RECORDS")]
        records: Option<PathBuf>,
    },

    /// Start the HTTP gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,

        #[arg(long, env = "MEDIGUARD_RECORDS")]
        records: Option<PathBuf>,
    },

    /// List patient ids
    Subjects {
        #[arg(short, long, default_value_t = 10)]
        limit: usize,

        #[arg(long, env = "MEDIGUARD_RECORDS")]
        records: Option<PathBuf>,
    },

    /// Print the default configuration, or check the current one
    Config {
        /// Load and validate ~/.mediguard/config.toml
        #[arg(long)]
        check: bool,
    },
}

fn init_tracing(verbose: bool, json: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    // stdout carries the report
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json_logs);

    match cli.command {
        Commands::Analyze {
            subject_id,
            through,
            records,
        } => commands::analyze::run(&subject_id, through.as_deref(), records).await?,
        Commands::Serve { port, records } => commands::serve::run(port, records).await?,
        Commands::Subjects { limit, records } => commands::subjects::run(limit, records)?,
        Commands::Config { check } => {
            if check {
                commands::config_cmd::check()?
            } else {
                commands::config_cmd::show()
            }
        }
    }

    Ok(())
}
