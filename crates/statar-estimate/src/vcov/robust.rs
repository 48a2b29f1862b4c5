//! Unadjusted and heteroskedasticity-robust (HC1) covariance
//!
//! ```text
//! unadjusted:  V = σ̂² (X̃ᵀX̃)⁻¹,                      σ̂² = e'e / df_r
//! HC1:         V = n/df_r · (X̃ᵀX̃)⁻¹ (Σ eᵢ² xᵢxᵢᵀ) (X̃ᵀX̃)⁻¹
//! ```
//!
//! `df_r` already subtracts the absorbed fixed effects, matching the
//! small-sample convention of `reghdfe`.

use super::{VarianceEstimator, VcovEstimate, VcovInput, VcovKind, require_dof};
use ndarray::Axis;
use statar_data::ConfigurationError;

/// Homoskedastic covariance estimator
#[derive(Debug, Default, Clone, Copy)]
pub struct Unadjusted;

impl VarianceEstimator for Unadjusted {
    fn kind(&self) -> VcovKind {
        VcovKind::Unadjusted
    }

    fn estimate(&self, input: &VcovInput<'_>) -> Result<VcovEstimate, ConfigurationError> {
        require_dof(input)?;
        let sigma2 = input.residuals.dot(input.residuals) / input.df_resid as f64;
        Ok(VcovEstimate {
            matrix: input.xtx_inv * sigma2,
            kind: self.kind(),
            df: input.df_resid,
            clusters: Vec::new(),
        })
    }
}

/// HC1 heteroskedasticity-robust covariance estimator
#[derive(Debug, Default, Clone, Copy)]
pub struct Robust;

impl VarianceEstimator for Robust {
    fn kind(&self) -> VcovKind {
        VcovKind::Robust
    }

    fn estimate(&self, input: &VcovInput<'_>) -> Result<VcovEstimate, ConfigurationError> {
        require_dof(input)?;

        // Rows of X scaled by their residual
        let scores = input.x * &input.residuals.view().insert_axis(Axis(1));
        let meat = scores.t().dot(&scores);
        let q = input.n_obs() as f64 / input.df_resid as f64;

        Ok(VcovEstimate {
            matrix: input.sandwich(&meat) * q,
            kind: self.kind(),
            df: input.df_resid,
            clusters: Vec::new(),
        })
    }
}
