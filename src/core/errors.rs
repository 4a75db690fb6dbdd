//! TA-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, AgentError>;

/// Top-level error type for the telemetry agent.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("[TA-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[TA-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[TA-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[TA-2001] agent is already running as pid {pid}")]
    AlreadyRunning { pid: u32 },

    #[error("[TA-2002] agent is not running")]
    NotRunning,

    #[error("[TA-2101] unknown emitter '{name}'")]
    UnknownEmitter { name: String },

    #[error("[TA-2102] unknown check module '{name}'")]
    UnknownCheck { name: String },

    #[error("[TA-3001] daemonization failure: {details}")]
    Daemonize { details: String },

    #[error("[TA-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[TA-3003] signal delivery to pid {pid} failed: {details}")]
    Signal { pid: u32, details: String },

    #[error("[TA-3004] channel closed in component {component}")]
    ChannelClosed { component: &'static str },

    #[error("[TA-3101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[TA-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl AgentError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "TA-1001",
            Self::MissingConfig { .. } => "TA-1002",
            Self::ConfigParse { .. } => "TA-1003",
            Self::AlreadyRunning { .. } => "TA-2001",
            Self::NotRunning => "TA-2002",
            Self::UnknownEmitter { .. } => "TA-2101",
            Self::UnknownCheck { .. } => "TA-2102",
            Self::Daemonize { .. } => "TA-3001",
            Self::Io { .. } => "TA-3002",
            Self::Signal { .. } => "TA-3003",
            Self::ChannelClosed { .. } => "TA-3004",
            Self::Serialization { .. } => "TA-3101",
            Self::Runtime { .. } => "TA-3900",
        }
    }

    /// Whether retrying might resolve the failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io { .. }
                | Self::Signal { .. }
                | Self::ChannelClosed { .. }
                | Self::Runtime { .. }
        )
    }

    /// Whether the failure belongs to the configuration class (fatal at
    /// startup, before any daemonization).
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig { .. }
                | Self::MissingConfig { .. }
                | Self::ConfigParse { .. }
                | Self::UnknownEmitter { .. }
                | Self::UnknownCheck { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for AgentError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
