//! Utility modules for repkeeper

pub mod logging;

pub use logging::{init_logging, LoggingConfig};
