//! Export of regression results.
//!
//! The coefficient table is written one row per regressor. JSON exports
//! additionally carry the fit statistics and sample bookkeeping.

use crate::result::{CoefficientRow, FitStatistics, RegressionResult};
use serde::{Deserialize, Serialize};
use statar_absorb::{AbsorbedDof, Convergence};
use statar_estimate::{ClusterCount, VcovKind, WaldTest};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during export operations.
#[derive(Debug, Error)]
pub enum ExportError {
    /// CSV serialization error.
    #[error("CSV serialization error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization error.
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Output was not valid UTF-8.
    #[error("Invalid UTF-8 in export: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Export format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Comma-separated values format.
    Csv,

    /// Compact JSON format.
    Json,

    /// Pretty-printed JSON format.
    PrettyJson,
}

impl ExportFormat {
    /// Get the file extension for this format.
    pub const fn extension(&self) -> &str {
        match self {
            Self::Csv => "csv",
            Self::Json | Self::PrettyJson => "json",
        }
    }
}

/// Serializable snapshot of a [`RegressionResult`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultExport {
    /// Dependent variable.
    pub depvar: String,

    /// Absorbed dimensions.
    pub absorb: Vec<String>,

    /// Coefficient table.
    pub coefficients: Vec<CoefficientRow>,

    /// Intercept ȳ − x̄ᵀβ.
    pub intercept: f64,

    /// Coefficient covariance, row-major.
    pub vcov: Vec<Vec<f64>>,

    /// Fit statistics.
    pub fit: FitStatistics,

    /// Joint slope test.
    pub f_test: WaldTest,

    /// Observations used.
    pub n_obs: usize,

    /// Rows dropped for missing values.
    pub dropped_missing: usize,

    /// Rows dropped as singletons.
    pub dropped_singletons: usize,

    /// Residual degrees of freedom.
    pub df_resid: usize,

    /// Absorbed degrees of freedom.
    pub absorbed: AbsorbedDof,

    /// Variance estimator.
    pub vcov_kind: VcovKind,

    /// Cluster counts.
    pub clusters: Vec<ClusterCount>,

    /// Absorption convergence.
    pub convergence: Convergence,

    /// Caveats attached to the estimates.
    pub caveats: Vec<String>,
}

impl From<&RegressionResult> for ResultExport {
    fn from(result: &RegressionResult) -> Self {
        Self {
            depvar: result.depvar.clone(),
            absorb: result.absorb.clone(),
            coefficients: result.coefficient_table(),
            intercept: result.intercept,
            vcov: result.vcov.rows().into_iter().map(|r| r.to_vec()).collect(),
            fit: result.fit,
            f_test: result.f_test,
            n_obs: result.n_obs,
            dropped_missing: result.dropped_missing,
            dropped_singletons: result.dropped_singletons,
            df_resid: result.df_resid,
            absorbed: result.absorbed.clone(),
            vcov_kind: result.vcov_kind,
            clusters: result.clusters.clone(),
            convergence: result.convergence,
            caveats: result.caveats(),
        }
    }
}

/// Trait for exporting data in various formats.
pub trait Exporter {
    /// Export data to a string in the specified format.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    fn export_to_string(&self, format: ExportFormat) -> Result<String, ExportError>;

    /// Export data to a file in the specified format.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or file writing fails.
    fn export_to_file(&self, path: &Path, format: ExportFormat) -> Result<(), ExportError> {
        let content = self.export_to_string(format)?;
        let mut file = File::create(path)?;
        file.write_all(content.as_bytes())?;
        Ok(())
    }
}

fn rows_to_csv(rows: &[CoefficientRow]) -> Result<String, ExportError> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    for row in rows {
        wtr.serialize(row)?;
    }
    let bytes = wtr.into_inner().map_err(|e| e.into_error())?;
    Ok(String::from_utf8(bytes)?)
}

impl Exporter for Vec<CoefficientRow> {
    fn export_to_string(&self, format: ExportFormat) -> Result<String, ExportError> {
        match format {
            ExportFormat::Csv => rows_to_csv(self),
            ExportFormat::Json => Ok(serde_json::to_string(self)?),
            ExportFormat::PrettyJson => Ok(serde_json::to_string_pretty(self)?),
        }
    }
}

impl Exporter for RegressionResult {
    fn export_to_string(&self, format: ExportFormat) -> Result<String, ExportError> {
        match format {
            ExportFormat::Csv => rows_to_csv(&self.coefficient_table()),
            ExportFormat::Json => Ok(serde_json::to_string(&ResultExport::from(self))?),
            ExportFormat::PrettyJson => {
                Ok(serde_json::to_string_pretty(&ResultExport::from(self))?)
            }
        }
    }
}
