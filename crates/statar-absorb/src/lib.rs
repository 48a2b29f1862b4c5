#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/brycewang-stanford/statar/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod demean;
pub mod dof;

pub use demean::{
    Acceleration, Convergence, DemeanConfig, Demeaned, Demeaner, StopReason, group_means,
};
pub use dof::{AbsorbedDof, DimensionDof, DofCaveat, connected_components};

use statar_data::{ConfigurationError, DataError};
use thiserror::Error;

/// Errors that can occur during absorption
#[derive(Debug, Error)]
pub enum AbsorbError {
    /// Invalid input values
    #[error(transparent)]
    Data(#[from] DataError),

    /// Invalid settings or mismatched inputs
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}
