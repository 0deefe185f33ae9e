//! Chime: interval trigger planner
//!
//! Main binary with subcommands:
//! - `plan`: List upcoming fire times of a trigger definition
//! - `misfire`: Apply a trigger's misfire instruction at a given instant
//! - `final`: Print the last fire time a trigger will produce

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "chime")]
#[command(about = "Interval trigger planner", long_about = None)]
struct Cli {
    /// Trigger configuration file (JSON)
    #[arg(long, global = true, env = "CHIME_CONFIG")]
    config: Option<PathBuf>,

    /// Calendar-excluded candidates a search may skip before giving up
    #[arg(long, global = true, env = "CHIME_MAX_CALENDAR_SKIPS")]
    max_calendar_skips: Option<u32>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the next fire times of a trigger
    Plan {
        /// Trigger definition file (JSON)
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Number of fire times to list
        #[arg(long, default_value = "10")]
        count: usize,

        /// Skip fire times falling on Saturday or Sunday (UTC)
        #[arg(long)]
        exclude_weekends: bool,
    },

    /// Apply the trigger's misfire instruction and print the updated trigger
    Misfire {
        /// Trigger definition file (JSON)
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Instant the misfire is detected at (RFC 3339)
        #[arg(long)]
        now: DateTime<Utc>,

        /// Skip fire times falling on Saturday or Sunday (UTC)
        #[arg(long)]
        exclude_weekends: bool,
    },

    /// Print the last fire time of a trigger
    Final {
        /// Trigger definition file (JSON)
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "chime=info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = commands::load_config(cli.config.as_deref(), cli.max_calendar_skips)?;

    let output = match cli.command {
        Commands::Plan {
            file,
            count,
            exclude_weekends,
        } => commands::plan(&file, &config, count, exclude_weekends)?,

        Commands::Misfire {
            file,
            now,
            exclude_weekends,
        } => commands::misfire(&file, &config, now, exclude_weekends)?,

        Commands::Final { file } => commands::final_fire_time(&file, &config)?,
    };

    println!("{output}");
    Ok(())
}
