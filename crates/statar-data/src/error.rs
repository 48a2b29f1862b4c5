//! Error types for data preparation.

use thiserror::Error;

/// Result type for data operations.
pub type Result<T> = std::result::Result<T, DataError>;

/// Errors caused by the content of the input data.
#[derive(Debug, Error)]
pub enum DataError {
    /// Column not present in the dataset
    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    /// Column dtype cannot be used in the requested role
    #[error("Unsupported dtype for column `{column}` used as {role}: {dtype}")]
    UnsupportedDtype {
        /// Column name
        column: String,
        /// Role the column was requested for
        role: &'static str,
        /// Polars dtype of the column
        dtype: String,
    },

    /// Infinite or NaN value reached the numeric core
    #[error("Non-finite value {value} in column `{column}` at row {row}")]
    NonFinite {
        /// Column name
        column: String,
        /// Row index within the estimation sample
        row: usize,
        /// Offending value
        value: f64,
    },

    /// No observations survive filtering
    #[error("Empty estimation sample: {0}")]
    EmptySample(String),

    /// Polars error
    #[error("Polars error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),
}

/// Errors caused by an invalid or degenerate model setup.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// Fixed effect with a single level absorbs every column
    #[error("Fixed effect `{dimension}` has a single level and would absorb all variation")]
    SingleLevel {
        /// Fixed-effect dimension
        dimension: String,
    },

    /// Fixed effect with one level per row leaves nothing to estimate
    #[error(
        "Fixed effect `{dimension}` has {levels} levels for {rows} rows; every regressor would be absorbed"
    )]
    PerfectAbsorption {
        /// Fixed-effect dimension
        dimension: String,
        /// Number of distinct levels
        levels: usize,
        /// Number of rows
        rows: usize,
    },

    /// Fewer clusters than estimated parameters
    #[error(
        "Cluster dimension `{dimension}` has {clusters} clusters, fewer than the {parameters} estimated parameters"
    )]
    InsufficientClusters {
        /// Cluster dimension (intersections are joined with `#`)
        dimension: String,
        /// Observed number of clusters
        clusters: usize,
        /// Number of estimated parameters
        parameters: usize,
    },

    /// Regressor list is empty
    #[error("No regressors specified")]
    NoRegressors,

    /// The same column appears twice in incompatible roles
    #[error("Column `{column}` is used more than once: {detail}")]
    DuplicateRole {
        /// Column name
        column: String,
        /// Which roles collide
        detail: String,
    },

    /// Not enough observations left after absorption
    #[error(
        "No residual degrees of freedom: {observations} observations, {regressors} regressors, {absorbed} absorbed"
    )]
    NoResidualDof {
        /// Observations in the estimation sample
        observations: usize,
        /// Number of regressors
        regressors: usize,
        /// Degrees of freedom absorbed by the fixed effects
        absorbed: usize,
    },

    /// Invalid numeric setting
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Errors raised while building an estimation sample.
#[derive(Debug, Error)]
pub enum SampleError {
    /// Data content problem
    #[error(transparent)]
    Data(#[from] DataError),

    /// Model setup problem
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}
