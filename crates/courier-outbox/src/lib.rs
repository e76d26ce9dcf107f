//! Transactional outbox.
//!
//! This crate provides:
//! - Outbox: wraps business callables so that calling them inside a database
//!   transaction records the call atomically with the caller's writes
//! - PublishStrategy: best-effort (attempt after commit, fall back to relay)
//!   and keep-order (persist, relay in order, halt a stream on failure)
//! - EventRelayer: replays persisted envelopes through the handler registry
//! - EventCleaner: removes delivered envelopes past their retention window
//! - Signals: synchronous delivery notifications with isolated subscribers

mod cleaner;
mod commit_hook;
mod envelope;
mod error;
mod outbox;
mod registry;
mod relayer;
mod settings;
mod signals;
mod strategy;
mod value;

pub use cleaner::EventCleaner;
pub use commit_hook::HookOutcome;
pub use envelope::{normalize_stream, Envelope};
pub use error::{OutboxError, OutboxResult, ResolutionError};
pub use outbox::{CaptureFn, Outbox, OutboxBuilder, OutboxFunction, StreamPublisher};
pub use registry::{
    split_target, Handler, HandlerError, HandlerRegistry, HandlerResult, RegisteredFunction,
};
pub use relayer::{EventRelayer, RelayReport, StuckStream};
pub use settings::OutboxSettings;
pub use signals::{Notification, Signal, Signals, SubscriberError};
pub use strategy::{
    create_publish_strategy, BestEffortStrategy, KeepOrderStrategy, PublishRequest,
    PublishStrategy, PublishStrategyType,
};
pub use value::{CallArgs, Value};
