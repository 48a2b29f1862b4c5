//! Regression results.
//!
//! [`RegressionResult`] is the single value returned by a fit. It owns the
//! coefficient vector and covariance together with everything needed to
//! interpret them: fit statistics, degrees-of-freedom bookkeeping, the
//! variance estimator used and the convergence of the absorption step.

use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use statar_absorb::{AbsorbedDof, Convergence};
use statar_estimate::{ClusterCount, CoefficientTest, OlsFit, VcovEstimate, VcovKind, WaldTest};

/// One row of the coefficient table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CoefficientRow {
    /// Regressor name.
    pub name: String,

    /// Point estimate.
    pub estimate: f64,

    /// Standard error.
    pub std_error: f64,

    /// t statistic.
    pub t_stat: f64,

    /// Two-sided p-value.
    pub p_value: f64,

    /// Lower confidence bound.
    pub conf_low: f64,

    /// Upper confidence bound.
    pub conf_high: f64,
}

impl CoefficientRow {
    fn new(name: &str, test: &CoefficientTest) -> Self {
        Self {
            name: name.to_string(),
            estimate: test.estimate,
            std_error: test.std_error,
            t_stat: test.t_stat,
            p_value: test.p_value,
            conf_low: test.conf_low,
            conf_high: test.conf_high,
        }
    }
}

/// Goodness-of-fit statistics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FitStatistics {
    /// 1 − RSS / TSS, with TSS around the raw outcome mean.
    pub r_squared: f64,

    /// R² adjusted for all estimated and absorbed parameters.
    pub adj_r_squared: f64,

    /// 1 − RSS / TSS_within, with TSS of the demeaned outcome.
    pub within_r_squared: f64,

    /// Within-R² adjusted for the regressors.
    pub adj_within_r_squared: f64,

    /// Root mean squared error, √(RSS / df_r).
    pub rmse: f64,

    /// Residual sum of squares.
    pub rss: f64,

    /// Total sum of squares of the outcome.
    pub tss: f64,

    /// Total sum of squares of the demeaned outcome.
    pub tss_within: f64,
}

/// Complete output of a fixed-effects regression.
#[derive(Debug, Clone)]
pub struct RegressionResult {
    /// Dependent variable.
    pub depvar: String,

    /// Regressor names, in coefficient order.
    pub names: Vec<String>,

    /// Absorbed fixed-effect dimensions (empty when only the intercept is absorbed).
    pub absorb: Vec<String>,

    /// Slope coefficients.
    pub coefficients: Array1<f64>,

    /// Standard errors.
    pub std_errors: Array1<f64>,

    /// Coefficient covariance matrix.
    pub vcov: Array2<f64>,

    /// Per-coefficient inference.
    pub tests: Vec<CoefficientTest>,

    /// Constant recovered as ȳ − x̄ᵀβ (reported without a standard error).
    pub intercept: f64,

    /// Goodness-of-fit statistics.
    pub fit: FitStatistics,

    /// Joint test that all slopes are zero.
    pub f_test: WaldTest,

    /// Confidence level of the intervals.
    pub confidence_level: f64,

    /// Observations in the estimation sample.
    pub n_obs: usize,

    /// Rows dropped for a missing value in any used column.
    pub dropped_missing: usize,

    /// Rows dropped as fixed-effect singletons.
    pub dropped_singletons: usize,

    /// Residual degrees of freedom, n − k − absorbed.
    pub df_resid: usize,

    /// Degrees of freedom absorbed by the fixed effects.
    pub absorbed: AbsorbedDof,

    /// Variance estimator.
    pub vcov_kind: VcovKind,

    /// Cluster counts (empty unless clustered).
    pub clusters: Vec<ClusterCount>,

    /// Convergence of the absorption step.
    pub convergence: Convergence,
}

impl RegressionResult {
    fn index(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Coefficient of `name`.
    pub fn coefficient(&self, name: &str) -> Option<f64> {
        self.index(name).map(|i| self.coefficients[i])
    }

    /// Standard error of `name`.
    pub fn std_error(&self, name: &str) -> Option<f64> {
        self.index(name).map(|i| self.std_errors[i])
    }

    /// t statistic of `name`.
    pub fn t_stat(&self, name: &str) -> Option<f64> {
        self.index(name).map(|i| self.tests[i].t_stat)
    }

    /// Two-sided p-value of `name`.
    pub fn p_value(&self, name: &str) -> Option<f64> {
        self.index(name).map(|i| self.tests[i].p_value)
    }

    /// Confidence interval of `name`.
    pub fn conf_int(&self, name: &str) -> Option<(f64, f64)> {
        self.index(name)
            .map(|i| (self.tests[i].conf_low, self.tests[i].conf_high))
    }

    /// Number of slope coefficients.
    pub fn n_params(&self) -> usize {
        self.names.len()
    }

    /// Whether the absorption step converged.
    pub const fn converged(&self) -> bool {
        self.convergence.converged
    }

    /// Coefficient table, one row per regressor.
    pub fn coefficient_table(&self) -> Vec<CoefficientRow> {
        self.names
            .iter()
            .zip(&self.tests)
            .map(|(name, test)| CoefficientRow::new(name, test))
            .collect()
    }

    /// Warnings a reader of the estimates should see.
    pub fn caveats(&self) -> Vec<String> {
        let mut caveats = Vec::new();
        if !self.convergence.converged {
            caveats.push(format!(
                "demeaning did not converge ({} after {} iterations, last relative change {:.3e}); \
                 estimates are approximate",
                self.convergence.stop_reason, self.convergence.iterations, self.convergence.max_change
            ));
        }
        if let Some(message) = self.absorbed.caveat_message() {
            caveats.push(message);
        }
        caveats
    }
}

/// Inputs collected by the estimation pipeline.
#[derive(Debug)]
pub struct ResultAssembler<'a> {
    /// Dependent variable.
    pub depvar: &'a str,
    /// Regressor names.
    pub names: &'a [String],
    /// Absorbed dimension names.
    pub absorb: &'a [String],
    /// Outcome before absorption.
    pub y: ArrayView1<'a, f64>,
    /// Outcome after absorption.
    pub y_demeaned: ArrayView1<'a, f64>,
    /// Regressor means before absorption.
    pub x_means: ArrayView1<'a, f64>,
    /// Least-squares fit on the demeaned data.
    pub fit: OlsFit,
    /// Coefficient covariance.
    pub vcov: VcovEstimate,
    /// Per-coefficient inference.
    pub tests: Vec<CoefficientTest>,
    /// Joint slope test.
    pub f_test: WaldTest,
    /// Confidence level of `tests`.
    pub confidence_level: f64,
    /// Absorbed degrees of freedom.
    pub absorbed: AbsorbedDof,
    /// Residual degrees of freedom.
    pub df_resid: usize,
    /// Rows dropped for missing values.
    pub dropped_missing: usize,
    /// Rows dropped as singletons.
    pub dropped_singletons: usize,
    /// Convergence diagnostics.
    pub convergence: Convergence,
}

impl ResultAssembler<'_> {
    /// Compute fit statistics and package everything into a result.
    pub fn assemble(self) -> RegressionResult {
        let n_obs = self.y.len();
        let k = self.names.len();
        let df_resid = self.df_resid as f64;

        let y_mean = self.y.mean().unwrap_or(0.0);
        let tss = self.y.iter().map(|v| (v - y_mean).powi(2)).sum::<f64>();
        let tss_within = self.y_demeaned.dot(&self.y_demeaned);
        let rss = self.fit.rss;

        let r_squared = 1.0 - rss / tss;
        let adj_r_squared = 1.0 - (rss / df_resid) / (tss / (n_obs as f64 - 1.0));
        let within_r_squared = 1.0 - rss / tss_within;
        let adj_within_r_squared =
            1.0 - (rss / df_resid) / (tss_within / (self.df_resid + k) as f64);

        let fit = FitStatistics {
            r_squared,
            adj_r_squared,
            within_r_squared,
            adj_within_r_squared,
            rmse: (rss / df_resid).sqrt(),
            rss,
            tss,
            tss_within,
        };

        let intercept = y_mean - self.x_means.dot(&self.fit.coefficients);
        let std_errors = self.vcov.std_errors();

        RegressionResult {
            depvar: self.depvar.to_string(),
            names: self.names.to_vec(),
            absorb: self.absorb.to_vec(),
            coefficients: self.fit.coefficients,
            std_errors,
            vcov: self.vcov.matrix,
            tests: self.tests,
            intercept,
            fit,
            f_test: self.f_test,
            confidence_level: self.confidence_level,
            n_obs,
            dropped_missing: self.dropped_missing,
            dropped_singletons: self.dropped_singletons,
            df_resid: self.df_resid,
            absorbed: self.absorbed,
            vcov_kind: self.vcov.kind,
            clusters: self.vcov.clusters,
            convergence: self.convergence,
        }
    }
}
