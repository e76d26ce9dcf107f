//! JSONL log file sink.
//!
//! Each event is rendered by `tracing-subscriber`'s JSON formatter with its
//! fields flattened to the top level, so outbox fields such as `event_id`,
//! `stream` and `target_key` can be filtered directly
//! (`jq 'select(.stream == "orders")'`).

use crate::LogConfig;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::Subscriber;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

fn default_log_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".courier")
        .join("logs")
        .join("courier.jsonl")
}

/// Append-only log file shared by every event of the process.
pub struct LogFile {
    file: Mutex<File>,
}

impl LogFile {
    /// Open `path` for appending, creating parent directories as needed.
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

/// Buffers one formatted entry and appends it in a single write on drop.
pub struct LogLine<'a> {
    file: &'a Mutex<File>,
    buf: Vec<u8>,
}

impl Write for LogLine<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for LogLine<'_> {
    fn drop(&mut self) {
        if self.buf.is_empty() {
            return;
        }
        // A failed log write has nowhere better to go.
        let _ = self.file.lock().write_all(&self.buf);
    }
}

impl<'a> MakeWriter<'a> for LogFile {
    type Writer = LogLine<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        LogLine {
            file: &self.file,
            buf: Vec::with_capacity(256),
        }
    }
}

/// JSON formatting layer writing flattened entries to `file`.
pub fn jsonl_layer<S>(file: LogFile) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    tracing_subscriber::fmt::layer()
        .json()
        .flatten_event(true)
        .with_current_span(false)
        .with_span_list(false)
        .with_target(true)
        .with_writer(file)
}

/// Install a subscriber that writes JSONL to the configured file.
pub(crate) fn init_file_subscriber(config: &LogConfig) {
    let log_path = config.log_path.clone().unwrap_or_else(default_log_path);

    let file = match LogFile::open(&log_path) {
        Ok(file) => file,
        Err(e) => {
            eprintln!(
                "failed to open log file {}: {e}; logging to stderr",
                log_path.display()
            );
            crate::init_compact(&config.default_level);
            return;
        }
    };

    let stderr_layer = config.also_stderr.then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .compact()
            .with_writer(io::stderr)
            .with_filter(crate::env_filter(&config.default_level))
    });

    let installed = tracing_subscriber::registry()
        .with(jsonl_layer(file).with_filter(crate::env_filter(&config.default_level)))
        .with(stderr_layer)
        .try_init();

    if installed.is_ok() {
        tracing::info!(
            service = %config.service_name,
            pid = std::process::id(),
            log_path = %log_path.display(),
            "observability initialized"
        );
    }
}
