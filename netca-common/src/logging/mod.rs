// Logging utilities for the NetCA system
//
// This module provides the structured logging used across the CA crates:
// - Component-based prefixes (Registry, Keys, DB, ...)
// - Instance ID tracking through logger inheritance
// - Optional network context so every line of a request can be grepped by network

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Predefined components for logging categorization
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Component {
    Service,
    Registry,
    Revocation,
    Decryption,
    Database,
    Keys,
}

impl Component {
    /// Get the string representation of the component
    pub fn as_str(&self) -> &'static str {
        match self {
            Component::Service => "Service",
            Component::Registry => "Registry",
            Component::Revocation => "Revocation",
            Component::Decryption => "Decryption",
            Component::Database => "DB",
            Component::Keys => "Keys",
        }
    }
}

struct ComponentPrefixDisplay {
    parent: Option<Component>,
    component: Component,
}

impl Display for ComponentPrefixDisplay {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.parent {
            Some(parent) if parent != Component::Service => {
                write!(f, "{}.{}", parent.as_str(), self.component.as_str())
            }
            _ => write!(f, "{}", self.component.as_str()),
        }
    }
}

struct MaybeNetworkDisplay<'a>(Option<&'a str>);

impl Display for MaybeNetworkDisplay<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if let Some(network) = self.0 {
            write!(f, "|net={network}")
        } else {
            Ok(())
        }
    }
}

/// A helper for creating component-specific loggers with instance ID tracking
#[derive(Debug, Clone)]
pub struct Logger {
    /// Component this logger is for
    component: Component,
    /// CA instance ID, printed on every line
    instance_id: String,
    /// Parent component for hierarchical logging (if any)
    parent_component: Option<Component>,
    /// Network the current request operates on
    network: Option<String>,
}

impl Logger {
    /// Create a new root logger for a specific component and instance ID
    pub fn new_root(component: Component, instance_id: &str) -> Self {
        Self {
            component,
            instance_id: instance_id.to_string(),
            parent_component: None,
            network: None,
        }
    }

    /// Create a child logger with the same instance ID but different component
    pub fn with_component(&self, component: Component) -> Self {
        Self {
            component,
            instance_id: self.instance_id.clone(),
            parent_component: Some(self.component),
            network: self.network.clone(),
        }
    }

    /// Create a logger scoped to a network
    pub fn with_network(&self, network: impl Into<String>) -> Self {
        Self {
            component: self.component,
            instance_id: self.instance_id.clone(),
            parent_component: self.parent_component,
            network: Some(network.into()),
        }
    }

    /// Get a reference to the instance ID
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Get the network context if available
    pub fn network(&self) -> Option<&str> {
        self.network.as_deref()
    }

    /// Get the component this logger writes for
    pub fn component(&self) -> Component {
        self.component
    }

    fn prefix(&self) -> String {
        format!(
            "{}{}",
            ComponentPrefixDisplay {
                parent: self.parent_component,
                component: self.component,
            },
            MaybeNetworkDisplay(self.network())
        )
    }

    /// Log a debug message
    pub fn debug(&self, message: impl Into<String>) {
        if log::log_enabled!(log::Level::Debug) {
            debug!("[{}][{}] {}", self.instance_id, self.prefix(), message.into());
        }
    }

    /// Log an info message
    pub fn info(&self, message: impl Into<String>) {
        if log::log_enabled!(log::Level::Info) {
            info!("[{}][{}] {}", self.instance_id, self.prefix(), message.into());
        }
    }

    /// Log a warning message
    pub fn warn(&self, message: impl Into<String>) {
        if log::log_enabled!(log::Level::Warn) {
            warn!("[{}][{}] {}", self.instance_id, self.prefix(), message.into());
        }
    }

    /// Log an error message
    pub fn error(&self, message: impl Into<String>) {
        if log::log_enabled!(log::Level::Error) {
            error!("[{}][{}] {}", self.instance_id, self.prefix(), message.into());
        }
    }
}

/// Log verbosity accepted by [`LoggingConfig`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
    Off,
}

impl LogLevel {
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
            LogLevel::Off => log::LevelFilter::Off,
        }
    }
}

/// Process-level logging setup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: LogLevel,
    #[serde(default)]
    pub timestamps: bool,
}

impl LoggingConfig {
    pub fn new() -> Self {
        Self::default_info()
    }

    /// Info level, no timestamps
    pub fn default_info() -> Self {
        Self {
            level: LogLevel::Info,
            timestamps: false,
        }
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_timestamps(mut self, timestamps: bool) -> Self {
        self.timestamps = timestamps;
        self
    }

    /// Install the global `env_logger`. Returns false if a logger was already installed,
    /// which happens routinely in tests.
    pub fn apply(&self) -> bool {
        let mut builder = env_logger::Builder::new();
        builder.filter_level(self.level.to_level_filter());
        if !self.timestamps {
            builder.format_timestamp(None);
        }
        builder.try_init().is_ok()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::default_info()
    }
}
