//! NetCA Common
//!
//! Shared utilities for the NetCA crates:
//! - Component-based structured logging with instance and network context
//! - Logging configuration backed by `env_logger`

pub mod logging;

pub use logging::{Component, LogLevel, Logger, LoggingConfig};
