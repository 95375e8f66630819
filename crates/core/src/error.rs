//! Error type shared by the grouping, ranking and enumeration stages.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PairError {
    /// Negative distance bound, or a lower bound above the upper bound.
    #[error("invalid rank-distance window: d_lower={lower}, d_upper={upper}")]
    InvalidBounds { lower: i64, upper: String },

    /// Upper bound text that is neither an integer nor an unbounded keyword.
    #[error("invalid rank-distance bound '{0}' (expected a non-negative integer or 'inf')")]
    InvalidBound(String),

    /// A target value without a total order against the rest of its group.
    #[error("sample {index} has a non-comparable target value ({value})")]
    NonComparableValue { index: usize, value: f64 },
}

pub type Result<T> = std::result::Result<T, PairError>;
