//! Outbox entry point.
//!
//! [`Outbox`] owns the settings, registry, signals, and strategies. Wrapping a
//! callable with [`Outbox::save_to_outbox`] registers it under its target key
//! and returns an [`OutboxFunction`]. Calling that function inside a
//! transaction records the call; the business callable itself runs only
//! after commit or from the relayer.

use crate::strategy::{create_publish_strategy, PublishRequest, PublishStrategy};
use crate::{
    CallArgs, EventCleaner, EventRelayer, Handler, HandlerRegistry, HandlerResult, OutboxError,
    OutboxResult, OutboxSettings, PublishStrategyType, RelayReport, Signals,
};
use courier_database::{Database, Transaction};
use std::fmt;
use std::sync::Arc;

/// Receives every failure the outbox swallows.
pub type CaptureFn = Arc<dyn Fn(&OutboxError) + Send + Sync>;

/// Transactional outbox.
pub struct Outbox {
    settings: OutboxSettings,
    registry: Arc<HandlerRegistry>,
    signals: Arc<Signals>,
    capture: Option<CaptureFn>,
    best_effort: Arc<dyn PublishStrategy>,
    keep_order: Arc<dyn PublishStrategy>,
}

impl Outbox {
    pub fn new(settings: OutboxSettings) -> Self {
        Self::builder(settings).build()
    }

    pub fn builder(settings: OutboxSettings) -> OutboxBuilder {
        OutboxBuilder {
            settings,
            registry: None,
            signals: None,
            capture: None,
        }
    }

    pub fn settings(&self) -> &OutboxSettings {
        &self.settings
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    pub fn signals(&self) -> &Arc<Signals> {
        &self.signals
    }

    /// Register a plain callable the relayer can resolve.
    pub fn register_handler<F>(&self, target: &str, handler: F) -> OutboxResult<()>
    where
        F: Fn(&CallArgs) -> HandlerResult + Send + Sync + 'static,
    {
        self.registry.register(target, handler)
    }

    /// Register a type that may be passed as a type marker argument.
    pub fn register_type(&self, key: &str) -> OutboxResult<()> {
        self.registry.register_type(key)
    }

    /// Wrap `handler` with the default strategy and no stream.
    pub fn save_to_outbox<F>(&self, target: &str, handler: F) -> OutboxResult<OutboxFunction>
    where
        F: Fn(&CallArgs) -> HandlerResult + Send + Sync + 'static,
    {
        self.wrap(target, Arc::new(handler), None, self.settings.publish_strategy)
    }

    /// Wrapper factory bound to `stream` and, optionally, a strategy override.
    pub fn save_to_outbox_stream(
        &self,
        stream: &str,
        strategy: Option<PublishStrategyType>,
    ) -> StreamPublisher<'_> {
        StreamPublisher {
            outbox: self,
            stream: crate::envelope::normalize_stream(Some(stream)),
            strategy: strategy.unwrap_or(self.settings.publish_strategy),
        }
    }

    fn wrap(
        &self,
        target: &str,
        original: Handler,
        stream: Option<String>,
        strategy: PublishStrategyType,
    ) -> OutboxResult<OutboxFunction> {
        self.registry.register_wrapped(target, original.clone())?;
        Ok(OutboxFunction {
            target: target.to_string(),
            original,
            stream,
            strategy: self.strategy(strategy),
            registry: self.registry.clone(),
        })
    }

    fn strategy(&self, kind: PublishStrategyType) -> Arc<dyn PublishStrategy> {
        match kind {
            PublishStrategyType::BestEffort => self.best_effort.clone(),
            PublishStrategyType::KeepOrder => self.keep_order.clone(),
        }
    }

    /// Relayer sharing this outbox's registry, signals, and capture callback.
    pub fn relayer(&self) -> EventRelayer {
        EventRelayer::new(
            self.settings.clone(),
            self.registry.clone(),
            self.signals.clone(),
            self.capture.clone(),
        )
    }

    /// Run one relay sweep.
    pub fn relay(&self, db: &Database, stream: Option<&str>) -> OutboxResult<RelayReport> {
        self.relayer().relay(db, stream)
    }

    pub fn cleaner(&self) -> EventCleaner {
        EventCleaner::new(&self.settings)
    }
}

impl fmt::Debug for Outbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Outbox")
            .field("settings", &self.settings)
            .field("targets", &self.registry.targets())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Outbox`].
pub struct OutboxBuilder {
    settings: OutboxSettings,
    registry: Option<Arc<HandlerRegistry>>,
    signals: Option<Arc<Signals>>,
    capture: Option<CaptureFn>,
}

impl OutboxBuilder {
    /// Share an existing registry.
    pub fn registry(mut self, registry: Arc<HandlerRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Share an existing signal hub.
    pub fn signals(mut self, signals: Arc<Signals>) -> Self {
        self.signals = Some(signals);
        self
    }

    /// Install the exception-capture callback.
    pub fn capture<F>(mut self, capture: F) -> Self
    where
        F: Fn(&OutboxError) + Send + Sync + 'static,
    {
        self.capture = Some(Arc::new(capture));
        self
    }

    pub fn build(self) -> Outbox {
        let registry = self.registry.unwrap_or_default();
        let signals = self.signals.unwrap_or_default();
        let best_effort = create_publish_strategy(
            PublishStrategyType::BestEffort,
            &self.settings,
            signals.clone(),
            self.capture.clone(),
        );
        let keep_order = create_publish_strategy(
            PublishStrategyType::KeepOrder,
            &self.settings,
            signals.clone(),
            self.capture.clone(),
        );
        Outbox {
            settings: self.settings,
            registry,
            signals,
            capture: self.capture,
            best_effort,
            keep_order,
        }
    }
}

/// Wrapper factory returned by [`Outbox::save_to_outbox_stream`].
pub struct StreamPublisher<'a> {
    outbox: &'a Outbox,
    stream: Option<String>,
    strategy: PublishStrategyType,
}

impl StreamPublisher<'_> {
    pub fn wrap<F>(&self, target: &str, handler: F) -> OutboxResult<OutboxFunction>
    where
        F: Fn(&CallArgs) -> HandlerResult + Send + Sync + 'static,
    {
        self.outbox
            .wrap(target, Arc::new(handler), self.stream.clone(), self.strategy)
    }
}

/// A callable wrapped by the outbox.
#[derive(Clone)]
pub struct OutboxFunction {
    target: String,
    original: Handler,
    stream: Option<String>,
    strategy: Arc<dyn PublishStrategy>,
    registry: Arc<HandlerRegistry>,
}

impl OutboxFunction {
    /// Record a call in `tx`.
    ///
    /// Arguments that cannot be stored or type markers that do not resolve
    /// fail here, before anything is written.
    pub fn call(&self, tx: &Transaction<'_>, call: CallArgs) -> OutboxResult<()> {
        call.check_storable()?;
        self.registry.resolve_types(&call)?;
        self.strategy.publish(
            tx,
            PublishRequest {
                target: self.target.clone(),
                handler: self.original.clone(),
                call,
                stream: self.stream.clone(),
            },
        )
    }

    /// Record a call in its own transaction, committing immediately.
    pub fn call_now(&self, db: &Database, call: CallArgs) -> OutboxResult<()> {
        db.atomic(|tx| self.call(tx, call))
    }

    /// The unwrapped business callable.
    pub fn original(&self) -> &Handler {
        &self.original
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn stream(&self) -> Option<&str> {
        self.stream.as_deref()
    }

    pub fn strategy(&self) -> PublishStrategyType {
        self.strategy.kind()
    }
}

impl fmt::Debug for OutboxFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutboxFunction")
            .field("target", &self.target)
            .field("stream", &self.stream)
            .field("strategy", &self.strategy.kind())
            .finish()
    }
}
