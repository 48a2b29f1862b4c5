//! Typed columns.
//!
//! A polars column is resolved into a [`Variable`] once, when it is pulled
//! out of the [`Dataset`](crate::Dataset). Downstream code matches on the
//! variant instead of inspecting dtypes inside hot loops.

use crate::error::{DataError, Result};
use polars::prelude::*;
use std::fmt;

/// A single categorical value.
///
/// Floats are keyed by their bit pattern with `-0.0` folded into `0.0`, so
/// equal numbers always land in the same group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Level {
    /// Integer or boolean level
    Integer(i64),
    /// Floating-point level (IEEE bits)
    Float(u64),
    /// String or categorical level
    Text(String),
}

impl Level {
    /// Build a float level.
    pub fn from_f64(value: f64) -> Self {
        let value = if value == 0.0 { 0.0 } else { value };
        Self::Float(value.to_bits())
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{}", v),
            Self::Float(bits) => write!(f, "{}", f64::from_bits(*bits)),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Level {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<&str> for Level {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// A column resolved for a specific role in the model.
#[derive(Debug, Clone, PartialEq)]
pub enum Variable {
    /// Outcome or regressor values; `None` marks a missing value
    Numeric(Vec<Option<f64>>),
    /// Fixed-effect or cluster levels; `None` marks a missing value
    Categorical(Vec<Option<Level>>),
}

impl Variable {
    /// Resolve a series as a numeric variable.
    ///
    /// Nulls and NaN become missing. Infinite values are kept so that the
    /// numeric core can report them with their row.
    pub fn numeric(series: &Series) -> Result<Self> {
        let dtype = series.dtype();
        if !(dtype.is_float() || dtype.is_integer() || matches!(dtype, DataType::Boolean)) {
            return Err(DataError::UnsupportedDtype {
                column: series.name().to_string(),
                role: "numeric variable",
                dtype: dtype.to_string(),
            });
        }

        let cast = series.cast(&DataType::Float64)?;
        let values = cast
            .f64()?
            .iter()
            .map(|v| v.filter(|x| !x.is_nan()))
            .collect();
        Ok(Self::Numeric(values))
    }

    /// Resolve a series as a categorical variable.
    pub fn categorical(series: &Series) -> Result<Self> {
        let dtype = series.dtype();
        let values: Vec<Option<Level>> = if dtype.is_float() {
            series
                .cast(&DataType::Float64)?
                .f64()?
                .iter()
                .map(|v| v.filter(|x| !x.is_nan()).map(Level::from_f64))
                .collect()
        } else if dtype.is_integer() || matches!(dtype, DataType::Boolean) {
            series
                .cast(&DataType::Int64)?
                .i64()?
                .iter()
                .map(|v| v.map(Level::Integer))
                .collect()
        } else {
            let cast = series
                .cast(&DataType::String)
                .map_err(|_| DataError::UnsupportedDtype {
                    column: series.name().to_string(),
                    role: "categorical variable",
                    dtype: dtype.to_string(),
                })?;
            cast.str()?
                .iter()
                .map(|v| v.map(|s| Level::Text(s.to_string())))
                .collect()
        };
        Ok(Self::Categorical(values))
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        match self {
            Self::Numeric(v) => v.len(),
            Self::Categorical(v) => v.len(),
        }
    }

    /// Whether the variable has no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the value at `row` is missing.
    pub fn is_missing(&self, row: usize) -> bool {
        match self {
            Self::Numeric(v) => v[row].is_none(),
            Self::Categorical(v) => v[row].is_none(),
        }
    }

    /// Numeric value at `row`, if this is a present numeric value.
    pub fn value(&self, row: usize) -> Option<f64> {
        match self {
            Self::Numeric(v) => v[row],
            Self::Categorical(_) => None,
        }
    }

    /// Level at `row`, if this is a present categorical value.
    pub fn level(&self, row: usize) -> Option<&Level> {
        match self {
            Self::Numeric(_) => None,
            Self::Categorical(v) => v[row].as_ref(),
        }
    }
}
