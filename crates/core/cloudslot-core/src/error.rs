//! Error types for the simulation core
//!
//! Only boundary validation is recoverable. Contract violations inside a run
//! (over-selecting jobs, over-allocating machines) are assertions.

use thiserror::Error;

use crate::model::{JobId, Slot};

/// Core result type
pub type Result<T> = std::result::Result<T, SimError>;

/// Errors raised when validating simulation inputs
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimError {
    /// Model parameters out of range
    #[error("Invalid model parameters: {0}")]
    InvalidParameters(String),

    /// A job template violates the input preconditions
    #[error("Invalid job {id}: {reason}")]
    InvalidJob { id: JobId, reason: String },

    /// A job's release time does not match the slot it arrives in
    #[error("Job {id} released at {release_time} but arrives in slot {slot}")]
    ReleaseMismatch { id: JobId, release_time: Slot, slot: Slot },

    /// The same job id appears more than once in an input
    #[error("Duplicate job id {0}")]
    DuplicateJob(JobId),
}

impl SimError {
    /// Create an invalid-parameters error
    pub fn parameters(msg: impl Into<String>) -> Self {
        Self::InvalidParameters(msg.into())
    }

    /// Create an invalid-job error
    pub fn job(id: JobId, reason: impl Into<String>) -> Self {
        Self::InvalidJob {
            id,
            reason: reason.into(),
        }
    }
}
