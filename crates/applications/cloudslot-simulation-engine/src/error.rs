//! Error types for the simulation engine

use cloudslot_core::SimError;
use thiserror::Error;

/// Engine result type
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors raised while ingesting traces, configuring or running evaluations
#[derive(Error, Debug)]
pub enum EngineError {
    /// Malformed trace record
    #[error("Trace line {line}: {reason}")]
    Trace { line: usize, reason: String },

    /// Policy name that matches no known format
    #[error("Unknown policy: {name} (available policies: {available})")]
    UnknownPolicy { name: String, available: String },

    /// Sweep variable that does not exist
    #[error("Unknown variable name: {name} (available variables: {available})")]
    UnknownVariable { name: String, available: String },

    /// Sweep metric that does not exist
    #[error("Unknown value name: {name} (available values: {available})")]
    UnknownMetric { name: String, available: String },

    /// Malformed `start:end:segments[:exp]` range
    #[error("Invalid range '{range}': {reason}")]
    InvalidRange { range: String, reason: String },

    /// Parameter table missing or malformed
    #[error("Parameter table error: {0}")]
    ParamTable(String),

    /// Inconsistent configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// A sweep worker failed to complete
    #[error("Worker error: {0}")]
    Worker(String),

    /// Rejected by the simulation core
    #[error(transparent)]
    Core(#[from] SimError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    /// Create a trace parse error
    pub fn trace(line: usize, reason: impl Into<String>) -> Self {
        Self::Trace {
            line,
            reason: reason.into(),
        }
    }

    /// Create a range error
    pub fn range(range: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRange {
            range: range.into(),
            reason: reason.into(),
        }
    }

    /// Create a parameter table error
    pub fn param_table(msg: impl Into<String>) -> Self {
        Self::ParamTable(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
