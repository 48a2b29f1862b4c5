//! Estimation sample construction.
//!
//! Turns a [`Dataset`] plus the column roles of a model into the aligned
//! arrays the estimator works on:
//!
//! 1. listwise deletion of rows with a missing value in any used column
//! 2. rejection of fixed-effect dimensions with a single level or with one
//!    level per row
//! 3. optional iterative removal of singleton fixed-effect groups (dropping
//!    a singleton in one dimension can create a new one in another, so the
//!    pass repeats until no dimension has a singleton)
//! 4. dense re-encoding of every fixed-effect and cluster dimension on the
//!    surviving rows

use crate::dataset::Dataset;
use crate::encoder::{CategoricalEncoder, GroupIds};
use crate::error::{ConfigurationError, DataError, SampleError};
use crate::variable::Level;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Column roles of a model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SampleSpec {
    /// Outcome column
    pub depvar: String,
    /// Regressor columns
    pub regressors: Vec<String>,
    /// Absorbed fixed-effect columns
    pub absorb: Vec<String>,
    /// Cluster columns
    pub cluster: Vec<String>,
    /// Drop singleton fixed-effect groups
    pub drop_singletons: bool,
}

impl SampleSpec {
    /// Check the column roles for conflicts.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.regressors.is_empty() {
            return Err(ConfigurationError::NoRegressors);
        }

        let mut seen = HashSet::new();
        for name in &self.regressors {
            if name == &self.depvar {
                return Err(ConfigurationError::DuplicateRole {
                    column: name.clone(),
                    detail: "outcome and regressor".to_string(),
                });
            }
            if !seen.insert(name.as_str()) {
                return Err(ConfigurationError::DuplicateRole {
                    column: name.clone(),
                    detail: "regressor listed twice".to_string(),
                });
            }
        }

        let mut absorbed = HashSet::new();
        for name in &self.absorb {
            if !absorbed.insert(name.as_str()) {
                return Err(ConfigurationError::DuplicateRole {
                    column: name.clone(),
                    detail: "fixed effect listed twice".to_string(),
                });
            }
        }

        let mut clusters = HashSet::new();
        for name in &self.cluster {
            if !clusters.insert(name.as_str()) {
                return Err(ConfigurationError::DuplicateRole {
                    column: name.clone(),
                    detail: "cluster dimension listed twice".to_string(),
                });
            }
        }

        Ok(())
    }
}

/// A named categorical dimension of the estimation sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Dimension {
    /// Column name
    pub name: String,
    /// Dense group assignment
    pub groups: GroupIds,
}

/// Outcome, regressors and group assignments aligned row-for-row.
#[derive(Debug, Clone)]
pub struct EstimationSample {
    /// Outcome column name
    pub depvar: String,
    /// Regressor column names, in column order of `x`
    pub regressors: Vec<String>,
    /// Outcome (n)
    pub y: Array1<f64>,
    /// Regressors (n x k)
    pub x: Array2<f64>,
    /// Absorbed fixed-effect dimensions
    pub fixed_effects: Vec<Dimension>,
    /// Cluster dimensions
    pub clusters: Vec<Dimension>,
    /// Row index in the dataset of every retained observation
    pub rows: Vec<usize>,
    /// Rows dropped for missing values
    pub dropped_missing: usize,
    /// Rows dropped as singleton groups
    pub dropped_singletons: usize,
}

impl EstimationSample {
    /// Build the estimation sample for `spec`.
    ///
    /// # Errors
    /// * [`SampleError::Configuration`] for conflicting roles or a degenerate
    ///   fixed-effect dimension
    /// * [`SampleError::Data`] for missing columns, unsupported dtypes or an
    ///   empty sample
    pub fn build(dataset: &Dataset, spec: &SampleSpec) -> Result<Self, SampleError> {
        spec.validate()?;

        let y = dataset.numeric(&spec.depvar)?;
        let xs = spec
            .regressors
            .iter()
            .map(|name| dataset.numeric(name))
            .collect::<Result<Vec<_>, _>>()?;
        let fes = spec
            .absorb
            .iter()
            .map(|name| dataset.categorical(name))
            .collect::<Result<Vec<_>, _>>()?;
        let cls = spec
            .cluster
            .iter()
            .map(|name| dataset.categorical(name))
            .collect::<Result<Vec<_>, _>>()?;

        // Listwise deletion, keeping the values of every complete row
        let n_total = dataset.height();
        let mut records: Vec<Record<'_>> = (0..n_total)
            .filter_map(|row| {
                Some(Record {
                    row,
                    y: y.value(row)?,
                    x: xs.iter().map(|v| v.value(row)).collect::<Option<_>>()?,
                    fes: fes.iter().map(|v| v.level(row)).collect::<Option<_>>()?,
                    cls: cls.iter().map(|v| v.level(row)).collect::<Option<_>>()?,
                })
            })
            .collect();
        let dropped_missing = n_total - records.len();
        if dropped_missing > 0 {
            tracing::debug!(dropped = dropped_missing, "dropped rows with missing values");
        }

        let encoder = CategoricalEncoder::new();

        // A dimension with one row per level absorbs everything; singleton
        // dropping would otherwise hide that as an empty sample
        if !records.is_empty() {
            for (d, name) in spec.absorb.iter().enumerate() {
                let groups = encoder.encode(records.iter().map(|r| r.fes[d]));
                CategoricalEncoder::validate_fixed_effect(name, &groups)?;
            }
        }

        let mut dropped_singletons = 0;
        if spec.drop_singletons && !fes.is_empty() {
            loop {
                let mut keep = vec![true; records.len()];
                for d in 0..fes.len() {
                    let groups = encoder.encode(records.iter().map(|r| r.fes[d]));
                    for (i, flag) in keep.iter_mut().enumerate() {
                        if groups.is_singleton_row(i) {
                            *flag = false;
                        }
                    }
                }
                let before = records.len();
                let mut flags = keep.iter();
                records.retain(|_| flags.next().copied().unwrap_or(true));
                if records.len() == before {
                    break;
                }
                dropped_singletons += before - records.len();
            }
            if dropped_singletons > 0 {
                tracing::warn!(
                    dropped = dropped_singletons,
                    "dropped singleton observations"
                );
            }
        }

        if records.is_empty() {
            return Err(DataError::EmptySample(format!(
                "no observations left for `{}` after dropping {} missing and {} singleton rows",
                spec.depvar, dropped_missing, dropped_singletons
            ))
            .into());
        }

        let n = records.len();
        let y = Array1::from_iter(records.iter().map(|r| r.y));
        let mut x = Array2::<f64>::zeros((n, xs.len()));
        for (i, record) in records.iter().enumerate() {
            for (j, &value) in record.x.iter().enumerate() {
                x[[i, j]] = value;
            }
        }

        let fixed_effects = spec
            .absorb
            .iter()
            .enumerate()
            .map(|(d, name)| {
                let groups =
                    encoder.encode_fixed_effect(name, records.iter().map(|r| r.fes[d]))?;
                Ok(Dimension {
                    name: name.clone(),
                    groups,
                })
            })
            .collect::<Result<Vec<_>, ConfigurationError>>()?;

        let clusters = spec
            .cluster
            .iter()
            .enumerate()
            .map(|(d, name)| Dimension {
                name: name.clone(),
                groups: encoder.encode(records.iter().map(|r| r.cls[d])),
            })
            .collect();
        let rows = records.iter().map(|r| r.row).collect();

        tracing::debug!(
            observations = n,
            regressors = xs.len(),
            fixed_effects = spec.absorb.len(),
            clusters = spec.cluster.len(),
            "estimation sample built"
        );

        Ok(Self {
            depvar: spec.depvar.clone(),
            regressors: spec.regressors.clone(),
            y,
            x,
            fixed_effects,
            clusters,
            rows,
            dropped_missing,
            dropped_singletons,
        })
    }

    /// Number of observations.
    pub fn n_obs(&self) -> usize {
        self.y.len()
    }

    /// Number of regressors.
    pub fn n_regressors(&self) -> usize {
        self.x.ncols()
    }
}

/// Values of one row with no missing entry
#[derive(Debug)]
struct Record<'a> {
    row: usize,
    y: f64,
    x: Vec<f64>,
    fes: Vec<&'a Level>,
    cls: Vec<&'a Level>,
}
