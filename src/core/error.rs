//! Error taxonomy for the state core.
//!
//! Every mutator validates before it mutates, so any `Err` returned outside a
//! batch means the store is untouched. Inside a batch the coordinator restores
//! the pre-batch snapshot and wraps the cause in [`StoreError::BatchRollback`].

use std::thread::ThreadId;

use thiserror::Error;

/// Rejected input. Raised synchronously by the mutator that received it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("curve name must not be empty")]
    EmptyCurveName,
    #[error("curve '{curve}' has {count} points, limit is {max}")]
    TooManyPoints { curve: String, count: usize, max: usize },
    #[error("store already holds {max} curves")]
    TooManyCurves { max: usize },
    #[error("non-finite coordinate in curve '{curve}' at frame {frame}: ({x}, {y})")]
    NonFinite { curve: String, frame: i32, x: f64, y: f64 },
    #[error("unknown curve '{0}'")]
    UnknownCurve(String),
    #[error("point index {index} out of range for curve '{curve}' ({len} points)")]
    IndexOutOfRange { curve: String, index: usize, len: usize },
    #[error("invalid preference {key}: {reason}")]
    InvalidPreference { key: &'static str, reason: &'static str },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// A single-curve operation ran with no curve given and no active curve.
    #[error("no active curve set and no curve name given to {operation}")]
    NoActiveCurve { operation: &'static str },

    #[error("store accessed from thread {actual:?}, owner is {expected:?}")]
    ThreadConfinement { expected: ThreadId, actual: ThreadId },

    /// The batch was rolled back to its snapshot because of `source`.
    #[error("batch rolled back: {source}")]
    BatchRollback {
        #[source]
        source: Box<StoreError>,
    },

    #[error("end_batch called without a matching begin_batch")]
    NotBatching,

    /// An inner batch failed; the outermost batch was rolled back on close.
    #[error("a nested batch failed")]
    NestedBatchFailed,

    #[error("store already initialized for this process")]
    AlreadyInitialized,
}

impl StoreError {
    /// Unwraps nested rollbacks down to the error that caused them.
    pub fn root_cause(&self) -> &StoreError {
        match self {
            StoreError::BatchRollback { source } => source.root_cause(),
            other => other,
        }
    }

    pub fn is_rollback(&self) -> bool {
        matches!(self, StoreError::BatchRollback { .. })
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_cause_unwraps_nested_rollback() {
        let inner = StoreError::Validation(ValidationError::EmptyCurveName);
        let wrapped = StoreError::BatchRollback {
            source: Box::new(StoreError::BatchRollback { source: Box::new(inner) }),
        };
        assert!(wrapped.is_rollback());
        assert!(matches!(
            wrapped.root_cause(),
            StoreError::Validation(ValidationError::EmptyCurveName)
        ));
    }

    #[test]
    fn test_messages_name_the_problem() {
        let err = StoreError::NoActiveCurve { operation: "update_point" };
        assert!(err.to_string().contains("update_point"));

        let err: StoreError = ValidationError::UnknownCurve("Track9".into()).into();
        assert!(err.to_string().contains("Track9"));
    }
}
