//! Coefficient tests and the joint Wald test
//!
//! t statistics and confidence intervals use Student's t with the inference
//! degrees of freedom reported by the variance estimator (`df_r`, or
//! `G − 1` when clustering). The joint test of all slope coefficients is
//!
//! ```text
//! F = β̂ᵀ V⁺ β̂ / q  ~  F(q, df)
//! ```
//!
//! where `V⁺` is the pseudo-inverse and `q` its rank, so a covariance that
//! lost rank in the multi-way cluster repair still yields a usable test.

use crate::vcov::{VcovEstimate, symmetric_pinv};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use statar_data::ConfigurationError;
use statrs::distribution::{ContinuousCDF, FisherSnedecor, StudentsT};

/// Relative eigenvalue cutoff when inverting the covariance for the Wald test
const WALD_RANK_TOLERANCE: f64 = 1e-12;

/// Inference for a single coefficient
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoefficientTest {
    /// Point estimate
    pub estimate: f64,
    /// Standard error
    pub std_error: f64,
    /// estimate / std_error
    pub t_stat: f64,
    /// Two-sided p-value
    pub p_value: f64,
    /// Lower confidence bound
    pub conf_low: f64,
    /// Upper confidence bound
    pub conf_high: f64,
}

/// Joint Wald test that all slope coefficients are zero
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WaldTest {
    /// F statistic
    pub statistic: f64,
    /// Numerator degrees of freedom (rank of the covariance)
    pub df_num: usize,
    /// Denominator degrees of freedom
    pub df_den: usize,
    /// Upper-tail p-value
    pub p_value: f64,
}

fn students_t(df: usize) -> Result<StudentsT, ConfigurationError> {
    StudentsT::new(0.0, 1.0, df as f64).map_err(|e| {
        ConfigurationError::InvalidParameter(format!(
            "t distribution with {} degrees of freedom: {}",
            df, e
        ))
    })
}

/// t tests and confidence intervals for every coefficient.
///
/// # Arguments
/// * `coefficients` - Point estimates
/// * `vcov` - Coefficient covariance and its inference degrees of freedom
/// * `level` - Confidence level in (0, 1), e.g. 0.95
pub fn coefficient_tests(
    coefficients: &Array1<f64>,
    vcov: &VcovEstimate,
    level: f64,
) -> Result<Vec<CoefficientTest>, ConfigurationError> {
    if !(level > 0.0 && level < 1.0) {
        return Err(ConfigurationError::InvalidParameter(format!(
            "confidence level must lie in (0, 1), got {}",
            level
        )));
    }
    let dist = students_t(vcov.df)?;
    let critical = dist.inverse_cdf(0.5 + level / 2.0);

    Ok(coefficients
        .iter()
        .zip(vcov.std_errors().iter())
        .map(|(&estimate, &std_error)| {
            let t_stat = estimate / std_error;
            let p_value = if t_stat.is_finite() {
                2.0 * dist.sf(t_stat.abs())
            } else {
                f64::NAN
            };
            CoefficientTest {
                estimate,
                std_error,
                t_stat,
                p_value,
                conf_low: estimate - critical * std_error,
                conf_high: estimate + critical * std_error,
            }
        })
        .collect())
}

/// Wald F test of H₀: β = 0 for all coefficients.
pub fn wald_test(
    coefficients: &Array1<f64>,
    vcov: &VcovEstimate,
) -> Result<WaldTest, ConfigurationError> {
    let (inverse, rank) = symmetric_pinv(&vcov.matrix, WALD_RANK_TOLERANCE);
    if rank == 0 {
        return Ok(WaldTest {
            statistic: f64::NAN,
            df_num: 0,
            df_den: vcov.df,
            p_value: f64::NAN,
        });
    }

    let statistic = coefficients.dot(&inverse.dot(coefficients)) / rank as f64;
    let dist = FisherSnedecor::new(rank as f64, vcov.df as f64).map_err(|e| {
        ConfigurationError::InvalidParameter(format!(
            "F distribution with ({}, {}) degrees of freedom: {}",
            rank, vcov.df, e
        ))
    })?;

    Ok(WaldTest {
        statistic,
        df_num: rank,
        df_den: vcov.df,
        p_value: dist.sf(statistic),
    })
}
