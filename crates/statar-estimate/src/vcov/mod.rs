//! Coefficient variance-covariance estimation
//!
//! Every estimator is a sandwich around the bread `(X̃ᵀX̃)⁻¹` of the
//! demeaned design:
//!
//! ```text
//! V = q · (X̃ᵀX̃)⁻¹ · M · (X̃ᵀX̃)⁻¹
//! ```
//!
//! and differs only in the meat `M` and the small-sample factor `q`.

pub mod cluster;
pub mod robust;
pub mod utils;

pub use cluster::ClusterRobust;
pub use robust::{Robust, Unadjusted};
pub use utils::{SymmetricEigen, clip_negative_eigenvalues, symmetric_pinv};

use derive_more::Display;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use statar_data::ConfigurationError;

/// Kind of variance estimator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum VcovKind {
    /// Homoskedastic errors
    #[display("unadjusted")]
    Unadjusted,
    /// Heteroskedasticity-robust (HC1)
    #[display("robust")]
    Robust,
    /// Cluster-robust, one or more dimensions
    #[display("cluster")]
    Cluster,
}

/// Inputs shared by all variance estimators
#[derive(Debug, Clone, Copy)]
pub struct VcovInput<'a> {
    /// Demeaned regressors (n x k)
    pub x: &'a Array2<f64>,
    /// OLS residuals (n)
    pub residuals: &'a Array1<f64>,
    /// (X̃ᵀX̃)⁻¹ (k x k)
    pub xtx_inv: &'a Array2<f64>,
    /// Residual degrees of freedom: n − k − absorbed
    pub df_resid: usize,
}

impl VcovInput<'_> {
    /// Number of observations
    pub fn n_obs(&self) -> usize {
        self.x.nrows()
    }

    /// Number of estimated coefficients
    pub fn n_params(&self) -> usize {
        self.x.ncols()
    }

    /// bread · meat · bread
    pub fn sandwich(&self, meat: &Array2<f64>) -> Array2<f64> {
        self.xtx_inv.dot(meat).dot(self.xtx_inv)
    }
}

/// Cluster count of one cluster dimension (or intersection)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterCount {
    /// Dimension name; intersections are joined with `#`
    pub name: String,
    /// Number of clusters
    pub clusters: usize,
}

/// Estimated covariance plus the degrees of freedom for inference
#[derive(Debug, Clone)]
pub struct VcovEstimate {
    /// Covariance matrix (k x k)
    pub matrix: Array2<f64>,
    /// Estimator that produced it
    pub kind: VcovKind,
    /// Degrees of freedom for t and F reference distributions
    pub df: usize,
    /// Cluster counts per requested dimension; empty unless clustered
    pub clusters: Vec<ClusterCount>,
}

impl VcovEstimate {
    /// Standard errors (square roots of the diagonal)
    pub fn std_errors(&self) -> Array1<f64> {
        self.matrix.diag().mapv(|v| v.max(0.0).sqrt())
    }
}

/// Trait for coefficient covariance estimators
pub trait VarianceEstimator {
    /// Estimator kind
    fn kind(&self) -> VcovKind;

    /// Estimate the coefficient covariance matrix
    ///
    /// # Errors
    /// [`ConfigurationError`] when the estimator is undefined for the input,
    /// e.g. no residual degrees of freedom or too few clusters.
    fn estimate(&self, input: &VcovInput<'_>) -> Result<VcovEstimate, ConfigurationError>;
}

pub(crate) fn require_dof(input: &VcovInput<'_>) -> Result<(), ConfigurationError> {
    if input.df_resid == 0 {
        return Err(ConfigurationError::NoResidualDof {
            observations: input.n_obs(),
            regressors: input.n_params(),
            absorbed: input.n_obs().saturating_sub(input.n_params()),
        });
    }
    Ok(())
}
