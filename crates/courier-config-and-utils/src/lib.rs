//! Configuration, file system paths and logging bootstrap for Courier.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, DEFAULT_LOG_LEVEL, DEFAULT_PUBLISH_STRATEGY, DEFAULT_TIME_TO_DELETE_SECS,
    MAX_TIME_TO_DELETE_SECS,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, init_logging_for_service, parse_level};
pub use paths::Paths;
