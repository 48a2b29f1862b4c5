//! Column-oriented input table.

use crate::error::{DataError, Result};
use crate::variable::Variable;
use polars::prelude::*;

/// Immutable input table backed by a polars [`DataFrame`].
#[derive(Debug, Clone)]
pub struct Dataset {
    frame: DataFrame,
}

impl Dataset {
    /// Wrap a data frame.
    pub const fn new(frame: DataFrame) -> Self {
        Self { frame }
    }

    /// Number of rows.
    pub fn height(&self) -> usize {
        self.frame.height()
    }

    /// Underlying frame.
    pub const fn frame(&self) -> &DataFrame {
        &self.frame
    }

    /// Whether a column exists.
    pub fn has_column(&self, name: &str) -> bool {
        self.frame.column(name).is_ok()
    }

    fn series(&self, name: &str) -> Result<&Series> {
        self.frame
            .column(name)
            .map(|c| c.as_materialized_series())
            .map_err(|_| DataError::ColumnNotFound(name.to_string()))
    }

    /// Resolve a column as a numeric variable (outcome or regressor).
    pub fn numeric(&self, name: &str) -> Result<Variable> {
        Variable::numeric(self.series(name)?)
    }

    /// Resolve a column as a categorical variable (fixed effect or cluster).
    pub fn categorical(&self, name: &str) -> Result<Variable> {
        Variable::categorical(self.series(name)?)
    }
}

impl From<DataFrame> for Dataset {
    fn from(frame: DataFrame) -> Self {
        Self::new(frame)
    }
}
