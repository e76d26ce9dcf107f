//! Handler registry.
//!
//! Targets are stored in envelopes as dotted `module.name` keys. The relayer
//! resolves them here instead of importing code by name, so a key that was
//! renamed or removed surfaces as a [`ResolutionError`] that says whether the
//! module or only the name went missing.

use crate::{CallArgs, OutboxError, OutboxResult, ResolutionError};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::debug;

/// Error returned by a business callable.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Result returned by a business callable.
pub type HandlerResult = Result<(), HandlerError>;

/// A business callable.
pub type Handler = Arc<dyn Fn(&CallArgs) -> HandlerResult + Send + Sync>;

/// What a target key points at.
#[derive(Clone)]
pub enum RegisteredFunction {
    /// A plain callable.
    Plain(Handler),
    /// A callable wrapped by the outbox. Keeps a reference to the original so
    /// replay never re-enters the publishing path.
    Wrapped { original: Handler },
}

impl RegisteredFunction {
    /// The callable to invoke on replay.
    pub fn original(&self) -> &Handler {
        match self {
            RegisteredFunction::Plain(handler) => handler,
            RegisteredFunction::Wrapped { original } => original,
        }
    }

    pub fn is_wrapped(&self) -> bool {
        matches!(self, RegisteredFunction::Wrapped { .. })
    }
}

impl std::fmt::Debug for RegisteredFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegisteredFunction::Plain(_) => f.write_str("Plain(..)"),
            RegisteredFunction::Wrapped { .. } => f.write_str("Wrapped(..)"),
        }
    }
}

/// Split `module.name` on the last dot.
pub fn split_target(path: &str) -> Result<(&str, &str), ResolutionError> {
    match path.rsplit_once('.') {
        Some((module, name)) if !module.is_empty() && !name.is_empty() => Ok((module, name)),
        _ => Err(ResolutionError::MalformedTarget(path.to_string())),
    }
}

/// Registry of callables and type markers, keyed by dotted path.
#[derive(Default)]
pub struct HandlerRegistry {
    functions: RwLock<HashMap<String, RegisteredFunction>>,
    types: RwLock<HashSet<String>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plain callable under `key`.
    pub fn register<F>(&self, key: &str, handler: F) -> OutboxResult<()>
    where
        F: Fn(&CallArgs) -> HandlerResult + Send + Sync + 'static,
    {
        self.insert(key, RegisteredFunction::Plain(Arc::new(handler)))
    }

    pub(crate) fn register_wrapped(&self, key: &str, original: Handler) -> OutboxResult<()> {
        self.insert(key, RegisteredFunction::Wrapped { original })
    }

    fn insert(&self, key: &str, function: RegisteredFunction) -> OutboxResult<()> {
        split_target(key)?;
        let mut functions = self.functions.write();
        if functions.contains_key(key) {
            return Err(OutboxError::DuplicateTarget(key.to_string()));
        }
        debug!(target_key = key, wrapped = function.is_wrapped(), "Registered target");
        functions.insert(key.to_string(), function);
        Ok(())
    }

    /// Remove a target. Returns whether it was registered.
    pub fn unregister(&self, key: &str) -> bool {
        self.functions.write().remove(key).is_some()
    }

    /// Register a type that may be passed as a [`Value::Type`](crate::Value::Type) marker.
    pub fn register_type(&self, key: &str) -> OutboxResult<()> {
        split_target(key)?;
        self.types.write().insert(key.to_string());
        Ok(())
    }

    pub fn unregister_type(&self, key: &str) -> bool {
        self.types.write().remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.functions.read().contains_key(key)
    }

    /// Registered target keys, sorted.
    pub fn targets(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.functions.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Resolve a stored target path.
    pub fn resolve(&self, path: &str) -> Result<RegisteredFunction, ResolutionError> {
        let (module, attribute) = split_target(path)?;
        let functions = self.functions.read();
        if let Some(function) = functions.get(path) {
            return Ok(function.clone());
        }
        let module_known = functions.keys().any(|key| in_module(key, module));
        Err(missing(module, attribute, module_known))
    }

    /// Resolve a stored type marker.
    pub fn resolve_type(&self, key: &str) -> Result<(), ResolutionError> {
        let (module, attribute) = split_target(key)?;
        let types = self.types.read();
        if types.contains(key) {
            return Ok(());
        }
        let module_known = types.iter().any(|known| in_module(known, module));
        Err(missing(module, attribute, module_known))
    }

    /// Check that every type marker in `args` resolves.
    pub fn resolve_types(&self, args: &CallArgs) -> Result<(), ResolutionError> {
        args.type_markers().try_for_each(|key| self.resolve_type(key))
    }
}

fn in_module(key: &str, module: &str) -> bool {
    split_target(key).is_ok_and(|(m, _)| m == module)
}

fn missing(module: &str, attribute: &str, module_known: bool) -> ResolutionError {
    if module_known {
        ResolutionError::AttributeNotFound {
            module: module.to_string(),
            attribute: attribute.to_string(),
        }
    } else {
        ResolutionError::ModuleNotFound {
            module: module.to_string(),
        }
    }
}

/// Invoke `handler`, turning a panic into an ordinary failure.
pub(crate) fn invoke(handler: &Handler, args: &CallArgs) -> HandlerResult {
    match panic::catch_unwind(AssertUnwindSafe(|| handler(args))) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(format!("handler panicked: {message}").into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &CallArgs) -> HandlerResult {
        Ok(())
    }

    #[test]
    fn test_resolve_registered_target() {
        let registry = HandlerRegistry::new();
        registry.register("billing.charge", noop).unwrap();

        let function = registry.resolve("billing.charge").unwrap();
        assert!(!function.is_wrapped());
        assert!(invoke(function.original(), &CallArgs::new()).is_ok());
    }

    #[test]
    fn test_missing_module_vs_missing_attribute() {
        let registry = HandlerRegistry::new();
        registry.register("billing.charge", noop).unwrap();

        assert_eq!(
            registry.resolve("shipping.dispatch").unwrap_err(),
            ResolutionError::ModuleNotFound {
                module: "shipping".to_string()
            }
        );
        assert_eq!(
            registry.resolve("billing.refund").unwrap_err(),
            ResolutionError::AttributeNotFound {
                module: "billing".to_string(),
                attribute: "refund".to_string()
            }
        );
    }

    #[test]
    fn test_nested_module_paths_split_on_last_dot() {
        let registry = HandlerRegistry::new();
        registry.register("app.billing.charge", noop).unwrap();

        assert!(registry.resolve("app.billing.charge").is_ok());
        assert!(matches!(
            registry.resolve("app.billing.refund"),
            Err(ResolutionError::AttributeNotFound { ref module, .. }) if module == "app.billing"
        ));
        assert!(matches!(
            registry.resolve("app.charge"),
            Err(ResolutionError::ModuleNotFound { .. })
        ));
    }

    #[test]
    fn test_malformed_keys_rejected() {
        let registry = HandlerRegistry::new();
        for key in ["charge", ".charge", "billing.", ""] {
            assert!(registry.register(key, noop).is_err(), "{key:?} accepted");
            assert!(matches!(
                registry.resolve(key),
                Err(ResolutionError::MalformedTarget(_))
            ));
        }
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let registry = HandlerRegistry::new();
        registry.register("billing.charge", noop).unwrap();
        assert!(matches!(
            registry.register("billing.charge", noop),
            Err(OutboxError::DuplicateTarget(_))
        ));

        assert!(registry.unregister("billing.charge"));
        registry.register("billing.charge", noop).unwrap();
    }

    #[test]
    fn test_type_markers_resolve() {
        let registry = HandlerRegistry::new();
        registry.register_type("billing.Invoice").unwrap();

        let known = CallArgs::new().arg(crate::Value::type_marker("billing.Invoice"));
        assert!(registry.resolve_types(&known).is_ok());

        let gone = CallArgs::new().kwarg("kind", crate::Value::type_marker("billing.Receipt"));
        assert!(matches!(
            registry.resolve_types(&gone),
            Err(ResolutionError::AttributeNotFound { .. })
        ));
    }

    #[test]
    fn test_invoke_catches_panics() {
        let handler: Handler = Arc::new(|_: &CallArgs| -> HandlerResult { panic!("boom") });
        let err = invoke(&handler, &CallArgs::new()).unwrap_err();
        assert_eq!(err.to_string(), "handler panicked: boom");
    }
}
