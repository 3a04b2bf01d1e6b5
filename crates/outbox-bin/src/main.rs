//! telemetry-outboxd - drains the telemetry outbox table into a Redis stream.

mod app;
mod liveness;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use outbox_config::{init_logging, Config, ENV_CONFIG_PATH};

/// Telemetry outbox dispatcher command-line interface.
#[derive(Parser)]
#[command(name = "telemetry-outboxd")]
#[command(about = "Publishes pending telemetry records to an event stream")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// JSON configuration file
    #[arg(short, long, env = ENV_CONFIG_PATH, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Source SQLite database
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Redis URL (redis:// or rediss://)
    #[arg(long, global = true)]
    redis_url: Option<String>,

    /// Destination stream key
    #[arg(long, global = true)]
    stream_key: Option<String>,

    /// Seconds between cycle starts
    #[arg(long, global = true)]
    tick_interval_secs: Option<u64>,

    /// Liveness probe port (0 picks a free port)
    #[arg(long, global = true)]
    liveness_port: Option<u16>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the dispatcher until SIGINT/SIGTERM
    Run,
    /// Run exactly one dispatch cycle and print its report
    Once,
    /// Print outbox counts from the source store
    Status,
    /// Append records from a JSONL file to the outbox
    Ingest {
        /// One JSON record per line
        #[arg(short, long)]
        file: PathBuf,
    },
}

impl Cli {
    /// Command-line flags win over file and environment values.
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        if let Some(path) = &self.db_path {
            config.source_db_path = Some(path.clone());
        }
        if let Some(url) = &self.redis_url {
            config.redis_url = Some(url.clone());
        }
        if let Some(key) = &self.stream_key {
            config.stream_key = Some(key.clone());
        }
        if let Some(secs) = self.tick_interval_secs {
            config.tick_interval_secs = secs;
        }
        if let Some(port) = self.liveness_port {
            config.liveness_port = port;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    cli.apply_overrides(&mut config);

    init_logging(&config);

    match cli.command {
        Some(Commands::Run) | None => {
            config.validate()?;
            app::run_dispatcher(config).await?;
        }
        Some(Commands::Once) => {
            config.validate()?;
            app::run_once(config).await?;
        }
        Some(Commands::Status) => {
            app::print_status(&config).await?;
        }
        Some(Commands::Ingest { file }) => {
            app::ingest_file(&config, &file).await?;
        }
    }

    Ok(())
}
