//! Built-in handlers the CLI can publish and relay.

use courier_outbox::{CallArgs, HandlerResult, Outbox, OutboxResult, Value};
use std::fs::OpenOptions;
use std::io::Write;
use tracing::info;

/// Signature shared by the built-in handlers.
pub type HandlerFn = fn(&CallArgs) -> HandlerResult;

/// Built-in handlers by target key.
pub const HANDLERS: &[(&str, HandlerFn)] = &[("demo.notify", notify), ("demo.write_file", write_file)];

pub fn lookup(target: &str) -> Option<HandlerFn> {
    HANDLERS
        .iter()
        .find(|(key, _)| *key == target)
        .map(|(_, handler)| *handler)
}

/// Register every built-in handler for replay.
pub fn register_all(outbox: &Outbox) -> OutboxResult<()> {
    for (key, handler) in HANDLERS {
        outbox.register_handler(key, *handler)?;
    }
    Ok(())
}

/// Log the payload.
pub fn notify(call: &CallArgs) -> HandlerResult {
    let payload = to_json(&call.event_payload())?;
    info!(payload = %payload, "Notification delivered");
    Ok(())
}

/// Append the payload as one JSON line to the file named by the `path` kwarg.
pub fn write_file(call: &CallArgs) -> HandlerResult {
    let path = call
        .keyword("path")
        .and_then(Value::as_str)
        .ok_or("missing `path` keyword argument")?;

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let line = to_json(&call.event_payload())?;
    writeln!(file, "{line}")?;
    info!(path, "Payload written");
    Ok(())
}

/// Plain JSON payloads are written as-is, other values in their tagged form.
fn to_json(value: &Value) -> serde_json::Result<String> {
    match value {
        Value::Json(json) => Ok(json.to_string()),
        other => serde_json::to_string(other),
    }
}
