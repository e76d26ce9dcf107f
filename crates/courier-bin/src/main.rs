//! Courier - transactional outbox relay and maintenance commands.

mod app;
mod handlers;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use courier_config_and_utils::{init_logging, Config, Paths};

/// Courier command-line interface.
#[derive(Parser)]
#[command(name = "courier")]
#[command(about = "Relay and maintain a transactional outbox")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error). Defaults to the configured level
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Base directory for runtime files (config, database, logs). Defaults to ~/.courier
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay pending events
    #[command(alias = "relay-events")]
    Relay {
        /// Keep relaying until interrupted
        #[arg(long)]
        run_in_loop: bool,
        /// Seconds between sweeps when looping
        #[arg(long, default_value = "1.0", value_parser = parse_interval)]
        loop_interval: Duration,
        /// Only relay this stream
        #[arg(long)]
        stream: Option<String>,
    },
    /// Delete delivered events older than the retention window
    #[command(alias = "event-cleaner")]
    Clean,
    /// Show pending and delivered event counts
    Status {
        /// Number of recent events to list
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Publish an event through one of the built-in handlers
    Publish {
        /// Target key, e.g. demo.notify
        target: String,
        /// Event payload as JSON
        #[arg(long, default_value = "{}")]
        payload: String,
        /// Keyword argument as key=value (repeatable)
        #[arg(long = "kwarg", value_parser = parse_kwarg)]
        kwargs: Vec<(String, String)>,
        /// Stream to publish on
        #[arg(long)]
        stream: Option<String>,
        /// Strategy override (best-effort, keep-order)
        #[arg(long)]
        strategy: Option<String>,
    },
}

fn parse_interval(raw: &str) -> Result<Duration, String> {
    let secs: f64 = raw
        .parse()
        .map_err(|_| format!("not a number: {raw}"))?;
    if secs <= 0.0 {
        return Err("interval must be positive".to_string());
    }
    Duration::try_from_secs_f64(secs).map_err(|e| e.to_string())
}

fn parse_kwarg(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected key=value, got {raw:?}")),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    let config = Config::load(&paths)?;

    // Initialize logging
    init_logging(cli.log_level.as_deref().unwrap_or(&config.log_level));

    let ctx = app::AppContext::open(config, &paths)?;

    match cli.command {
        Commands::Relay {
            run_in_loop,
            loop_interval,
            stream,
        } => {
            ctx.register_handlers()?;
            if run_in_loop {
                app::relay_forever(&ctx, stream.as_deref(), loop_interval).await?;
            } else {
                app::relay_once(&ctx, stream.as_deref())?;
            }
        }
        Commands::Clean => {
            app::clean(&ctx)?;
        }
        Commands::Status { limit } => app::status(&ctx, limit)?,
        Commands::Publish {
            target,
            payload,
            kwargs,
            stream,
            strategy,
        } => {
            app::publish(
                &ctx,
                &target,
                &payload,
                kwargs,
                stream.as_deref(),
                strategy.as_deref(),
            )?;
        }
    }

    Ok(())
}
