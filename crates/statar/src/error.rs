//! Error types for the regression pipeline.

use statar_absorb::AbsorbError;
use statar_data::{ConfigurationError, DataError, SampleError};
use statar_estimate::RankDeficiencyError;
use thiserror::Error;

/// Any failure of a fixed-effects regression.
#[derive(Debug, Error)]
pub enum RegressionError {
    /// Invalid or degenerate model setup
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// Invalid input data
    #[error(transparent)]
    Data(#[from] DataError),

    /// Design matrix without full column rank
    #[error(transparent)]
    RankDeficiency(#[from] RankDeficiencyError),
}

impl From<SampleError> for RegressionError {
    fn from(err: SampleError) -> Self {
        match err {
            SampleError::Data(e) => Self::Data(e),
            SampleError::Configuration(e) => Self::Configuration(e),
        }
    }
}

impl From<AbsorbError> for RegressionError {
    fn from(err: AbsorbError) -> Self {
        match err {
            AbsorbError::Data(e) => Self::Data(e),
            AbsorbError::Configuration(e) => Self::Configuration(e),
        }
    }
}

/// Result alias for regression operations.
pub type Result<T> = std::result::Result<T, RegressionError>;
