use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tempora::commands::availability::AvailabilityArgs;
use tempora::config::Config;

#[derive(Parser)]
#[command(
    name = "tempora",
    version,
    about = "Availability computation and concurrency-safe booking engine",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true, default_value = "text")]
    log_format: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the booking API server
    Serve {
        /// Use the in-memory booking store instead of PostgreSQL (demo only)
        #[arg(long, default_value = "false")]
        memory_store: bool,
    },

    /// Query availability once against the configured fixtures
    Availability {
        /// Location to query
        #[arg(short, long)]
        location: String,

        /// Window start (RFC 3339)
        #[arg(long)]
        from: String,

        /// Window end (RFC 3339)
        #[arg(long)]
        to: String,

        /// Services to chain, in order
        #[arg(short, long, required = true, num_args = 1..)]
        services: Vec<String>,

        /// Pin a staff member
        #[arg(long)]
        staff: Option<String>,

        /// Slot granularity in minutes
        #[arg(short, long)]
        granularity: Option<i64>,
    },

    /// Delete expired booking claims for a location
    Sweep {
        /// Location to sweep
        #[arg(short, long)]
        location: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_tracing(&cli.log_format, cli.verbose)?;

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };

    match cli.command {
        Commands::Serve { memory_store } => {
            tempora::commands::serve::run(config, memory_store).await?;
        }
        Commands::Availability {
            location,
            from,
            to,
            services,
            staff,
            granularity,
        } => {
            tempora::commands::availability::run(
                config,
                AvailabilityArgs {
                    location_id: location,
                    from,
                    to,
                    service_ids: services,
                    staff_id: staff,
                    granularity_min: granularity,
                },
            )
            .await?;
        }
        Commands::Sweep { location } => {
            tempora::commands::sweep::run(config, location).await?;
        }
    }

    Ok(())
}

fn setup_tracing(format: &str, verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    match format {
        "json" => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        _ => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }

    Ok(())
}
