//! Error types for dci.

use thiserror::Error;

/// Errors reported synchronously by index construction and querying.
///
/// Configuration errors never leave a partially mutated index behind: the
/// offending call returns before any per-level state is touched.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DciError {
    /// Invalid parameter value.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Ambient dimensionality disagrees between construction and use.
    #[error("dimension mismatch: index has {index_dim} dimensions, input has {input_dim}")]
    DimensionMismatch { index_dim: usize, input_dim: usize },

    /// `add` called while the index already holds points.
    #[error("index already populated; call clear() or reset() first")]
    AlreadyPopulated,

    /// Query issued against an index with no points.
    #[error("index is empty")]
    EmptyIndex,

    /// Neither axis of the termination budget is active.
    #[error("query budget inactive: activate at least one visit or retrieve cap")]
    InactiveBudget,
}

/// Result type alias for dci operations.
pub type Result<T> = std::result::Result<T, DciError>;
