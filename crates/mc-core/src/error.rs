//! Error types for mctally

use thiserror::Error;

/// mctally error type
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed bin-boundary configuration (fatal at configuration time).
    #[error("Invalid bin boundaries for {dimension}: {reason}")]
    InvalidBoundaries {
        /// Dimension being configured.
        dimension: String,
        /// What is wrong with the boundary sequence.
        reason: String,
    },

    /// Configuration mutation attempted after the first commit.
    #[error("Estimator {estimator} is finalized: cannot {operation} after the first commit")]
    AlreadyFinalized {
        /// Estimator id.
        estimator: u32,
        /// Rejected configuration operation.
        operation: &'static str,
    },

    /// Contribution referencing an entity the estimator does not own.
    #[error("Entity {entity} is not assigned to estimator {estimator}")]
    UnknownEntity {
        /// Estimator id.
        estimator: u32,
        /// Offending entity id.
        entity: u64,
    },

    /// Coordinate outside every bin interval of an active dimension.
    #[error("Coordinate {value} is outside the {dimension} bins [{lower}, {upper}]")]
    OutOfRangeCoordinate {
        /// Dimension name.
        dimension: String,
        /// Coordinate value.
        value: f64,
        /// Lowest boundary.
        lower: f64,
        /// Highest boundary.
        upper: f64,
    },

    /// Processed export requested before history count / end time were set.
    #[error("Statistics not configured: {0}")]
    StatisticsNotConfigured(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Collective communication failure
    #[error("Communication error: {0}")]
    Communication(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// True for per-event conditions that are recovered locally instead of aborting the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::OutOfRangeCoordinate { .. })
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
