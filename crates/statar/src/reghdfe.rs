//! The estimation pipeline.
//!
//! ```text
//! DataFrame ─▶ EstimationSample ─▶ demean [y | X] ─▶ pivoted QR ─▶ vcov ─▶ tests ─▶ RegressionResult
//! ```

use crate::config::ReghdfeConfig;
use crate::error::{RegressionError, Result};
use ndarray::{Array1, Array2, Axis, s};
use polars::prelude::DataFrame;
use statar_absorb::{AbsorbedDof, Demeaner};
use statar_data::{ConfigurationError, Dataset, EstimationSample, GroupIds};
use statar_estimate::{
    ClusterRobust, OlsSolver, RankScale, Robust, Unadjusted, VarianceEstimator, VcovInput,
    coefficient_tests, column_norms, wald_test,
};
use statar_output::{RegressionResult, ResultAssembler};

/// Fixed-effects regression estimator
#[derive(Debug, Clone)]
pub struct Reghdfe {
    config: ReghdfeConfig,
}

impl Reghdfe {
    /// Create an estimator for `config`.
    pub const fn new(config: ReghdfeConfig) -> Self {
        Self { config }
    }

    /// Estimator configuration
    pub const fn config(&self) -> &ReghdfeConfig {
        &self.config
    }

    /// Fit the model on `dataset`.
    ///
    /// # Errors
    /// * [`RegressionError::Configuration`] for invalid settings, degenerate
    ///   fixed effects, too few clusters or no residual degrees of freedom
    /// * [`RegressionError::Data`] for missing columns, unsupported or
    ///   non-finite values and empty samples
    /// * [`RegressionError::RankDeficiency`] when a regressor is collinear
    ///   with the others or absorbed by the fixed effects
    pub fn fit(&self, dataset: &Dataset) -> Result<RegressionResult> {
        let config = &self.config;
        config.validate()?;

        let sample = EstimationSample::build(dataset, &config.sample_spec())?;
        let n = sample.n_obs();
        let k = sample.n_regressors();

        // Outcome first, then regressors, so one demeaning run covers all
        let mut stacked = Array2::<f64>::zeros((n, k + 1));
        stacked.column_mut(0).assign(&sample.y);
        stacked.slice_mut(s![.., 1..]).assign(&sample.x);
        let names: Vec<String> = std::iter::once(sample.depvar.clone())
            .chain(sample.regressors.iter().cloned())
            .collect();

        let constant;
        let dimensions: Vec<&GroupIds> = if sample.fixed_effects.is_empty() {
            constant = GroupIds::constant(n);
            vec![&constant]
        } else {
            sample.fixed_effects.iter().map(|d| &d.groups).collect()
        };

        let demeaned =
            Demeaner::new(config.demean_config()?).demean(&stacked, &names, &dimensions)?;
        let y_demeaned = demeaned.data.column(0).to_owned();
        let x_demeaned = demeaned.data.slice(s![.., 1..]).to_owned();
        tracing::debug!(
            observations = n,
            iterations = demeaned.convergence.iterations,
            converged = demeaned.convergence.converged,
            "absorbed fixed effects"
        );

        // Error estimates only carry meaning for a finished projection; an
        // unconverged run is reported through its diagnostics instead
        let mut scale = RankScale::new(column_norms(&sample.x));
        if demeaned.convergence.converged {
            scale = scale.with_error_bounds(demeaned.error_bounds[1..].to_vec());
        }
        let fit = OlsSolver::new(config.ols_config()).solve(
            &x_demeaned,
            &y_demeaned,
            &sample.regressors,
            Some(&scale),
        )?;

        let fixed_effects: Vec<(&str, &GroupIds)> = sample
            .fixed_effects
            .iter()
            .map(|d| (d.name.as_str(), &d.groups))
            .collect();
        let cluster_groups: Vec<&GroupIds> = sample.clusters.iter().map(|d| &d.groups).collect();
        let absorbed = AbsorbedDof::compute(&fixed_effects, &cluster_groups);

        let df_resid = residual_dof(n, k, absorbed.absorbed)?;

        let input = VcovInput {
            x: &x_demeaned,
            residuals: &fit.residuals,
            xtx_inv: &fit.xtx_inv,
            df_resid,
        };
        let estimator: Box<dyn VarianceEstimator + '_> = if !sample.clusters.is_empty() {
            Box::new(ClusterRobust::new(
                sample
                    .clusters
                    .iter()
                    .map(|d| (d.name.as_str(), &d.groups))
                    .collect(),
            ))
        } else if config.robust {
            Box::new(Robust)
        } else {
            Box::new(Unadjusted)
        };
        let vcov = estimator.estimate(&input)?;
        tracing::debug!(kind = %vcov.kind, df = vcov.df, "estimated covariance");

        let tests = coefficient_tests(&fit.coefficients, &vcov, config.confidence_level)?;
        let f_test = wald_test(&fit.coefficients, &vcov)?;
        let x_means = sample
            .x
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(k));
        let absorb: Vec<String> = sample.fixed_effects.iter().map(|d| d.name.clone()).collect();

        Ok(ResultAssembler {
            depvar: &sample.depvar,
            names: &sample.regressors,
            absorb: &absorb,
            y: sample.y.view(),
            y_demeaned: y_demeaned.view(),
            x_means: x_means.view(),
            fit,
            vcov,
            tests,
            f_test,
            confidence_level: config.confidence_level,
            absorbed,
            df_resid,
            dropped_missing: sample.dropped_missing,
            dropped_singletons: sample.dropped_singletons,
            convergence: demeaned.convergence,
        }
        .assemble())
    }
}

/// n − k − absorbed, which must be positive.
fn residual_dof(n: usize, k: usize, absorbed: usize) -> Result<usize> {
    match n.checked_sub(k + absorbed) {
        Some(df) if df > 0 => Ok(df),
        _ => Err(RegressionError::Configuration(
            ConfigurationError::NoResidualDof {
                observations: n,
                regressors: k,
                absorbed,
            },
        )),
    }
}

/// Fit a fixed-effects regression on a polars frame.
///
/// Shorthand for `Reghdfe::new(config.clone()).fit(&Dataset::new(frame.clone()))`.
pub fn reghdfe(frame: &DataFrame, config: &ReghdfeConfig) -> Result<RegressionResult> {
    Reghdfe::new(config.clone()).fit(&Dataset::new(frame.clone()))
}
