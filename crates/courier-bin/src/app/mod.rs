//! Command implementations.

mod relay_loop;

pub use relay_loop::relay_forever;

use crate::handlers;
use anyhow::{anyhow, Context};
use courier_config_and_utils::{Config, Paths};
use courier_database::Database;
use courier_outbox::{CallArgs, Outbox, OutboxSettings, PublishStrategyType, RelayReport};
use tracing::{info, warn};

/// Everything a command needs: configuration, the store, and the outbox.
pub struct AppContext {
    pub config: Config,
    pub db: Database,
    pub outbox: Outbox,
}

impl AppContext {
    pub fn open(config: Config, paths: &Paths) -> anyhow::Result<Self> {
        let settings = OutboxSettings::from_config(&config)?;
        let db_path = config.database_file(paths);
        let db = Database::open(&db_path)
            .with_context(|| format!("opening database at {}", db_path.display()))?;
        Ok(Self::with_database(config, settings, db))
    }

    pub fn with_database(config: Config, settings: OutboxSettings, db: Database) -> Self {
        Self {
            config,
            db,
            outbox: Outbox::new(settings),
        }
    }

    /// Make the built-in handlers resolvable for replay.
    pub fn register_handlers(&self) -> anyhow::Result<()> {
        handlers::register_all(&self.outbox)?;
        Ok(())
    }
}

/// One relay sweep.
pub fn relay_once(ctx: &AppContext, stream: Option<&str>) -> anyhow::Result<RelayReport> {
    let report = ctx.outbox.relay(&ctx.db, stream)?;
    for stuck in &report.stuck {
        warn!(
            stream = stuck.stream.as_deref().unwrap_or("<default>"),
            event_id = stuck.event_id,
            "Stream halted until the failing event succeeds"
        );
    }
    Ok(report)
}

/// Delete delivered events past retention.
pub fn clean(ctx: &AppContext) -> anyhow::Result<usize> {
    let deleted = ctx.outbox.cleaner().clean(&ctx.db)?;
    println!("Deleted {deleted} delivered events");
    Ok(deleted)
}

/// Print counts and the most recent events.
pub fn status(ctx: &AppContext, limit: usize) -> anyhow::Result<()> {
    let counts = ctx.db.count_outbox_events()?;
    println!("Pending: {}", counts.pending);
    println!("Sent:    {}", counts.sent);
    println!("Strategy: {}", ctx.outbox.settings().publish_strategy);
    println!("Retention: {}s", ctx.config.time_to_delete_secs);

    let events = ctx.db.list_outbox_events(limit)?;
    if !events.is_empty() {
        println!();
    }
    for event in events {
        let state = match event.sent_at {
            Some(sent_at) => format!("sent {}", sent_at.to_rfc3339()),
            None => "pending".to_string(),
        };
        println!(
            "#{:<6} {:<24} stream={:<12} {}",
            event.id,
            event.function,
            event.stream.as_deref().unwrap_or("-"),
            state
        );
    }
    Ok(())
}

/// Publish one event through a built-in handler in its own transaction.
pub fn publish(
    ctx: &AppContext,
    target: &str,
    payload: &str,
    kwargs: Vec<(String, String)>,
    stream: Option<&str>,
    strategy: Option<&str>,
) -> anyhow::Result<()> {
    let handler = handlers::lookup(target).ok_or_else(|| {
        let known: Vec<_> = handlers::HANDLERS.iter().map(|(key, _)| *key).collect();
        anyhow!("unknown target {target}, expected one of: {}", known.join(", "))
    })?;
    let strategy = strategy
        .map(str::parse::<PublishStrategyType>)
        .transpose()?;

    let payload: serde_json::Value =
        serde_json::from_str(payload).context("payload is not valid JSON")?;
    let call = kwargs
        .into_iter()
        .fold(CallArgs::new().arg(payload), |call, (key, value)| call.kwarg(key, value));

    let function = match stream {
        Some(stream) => ctx
            .outbox
            .save_to_outbox_stream(stream, strategy)
            .wrap(target, handler)?,
        None => match strategy {
            Some(strategy) => ctx
                .outbox
                .save_to_outbox_stream("", Some(strategy))
                .wrap(target, handler)?,
            None => ctx.outbox.save_to_outbox(target, handler)?,
        },
    };

    function.call_now(&ctx.db, call)?;
    info!(target_key = target, strategy = %function.strategy(), "Published");
    Ok(())
}
