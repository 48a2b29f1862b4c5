//! Categorical encoding.
//!
//! Maps the levels of a categorical column to dense group ids `0..G-1`.
//! Ids are assigned in **first-seen order**: the level on the first row gets
//! id 0, the next new level id 1, and so on. The order is a pure function of
//! the row order, so repeated runs on the same data produce identical ids.

use crate::error::ConfigurationError;
use crate::variable::Level;
use std::collections::HashMap;

/// Dense group assignment for one categorical dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupIds {
    ids: Vec<u32>,
    counts: Vec<usize>,
    levels: Vec<Level>,
}

impl GroupIds {
    /// A single group covering `n_rows` rows (the intercept).
    pub fn constant(n_rows: usize) -> Self {
        Self {
            ids: vec![0; n_rows],
            counts: vec![n_rows],
            levels: vec![Level::Integer(1)],
        }
    }

    /// Per-row group ids.
    pub fn ids(&self) -> &[u32] {
        &self.ids
    }

    /// Number of rows.
    pub fn n_rows(&self) -> usize {
        self.ids.len()
    }

    /// Number of distinct groups.
    pub fn n_groups(&self) -> usize {
        self.counts.len()
    }

    /// Rows per group.
    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    /// Original level of each group id.
    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    /// Number of groups observed exactly once.
    pub fn singleton_groups(&self) -> usize {
        self.counts.iter().filter(|&&c| c == 1).count()
    }

    /// Whether `row` is the only member of its group.
    pub fn is_singleton_row(&self, row: usize) -> bool {
        self.counts[self.ids[row] as usize] == 1
    }

    /// Restrict to the rows where `keep` is true and re-densify the ids,
    /// preserving first-seen order among the retained rows.
    pub fn subset(&self, keep: &[bool]) -> Self {
        debug_assert_eq!(keep.len(), self.ids.len());
        let mut remap: Vec<Option<u32>> = vec![None; self.counts.len()];
        let mut ids = Vec::with_capacity(keep.iter().filter(|&&k| k).count());
        let mut counts = Vec::new();
        let mut levels = Vec::new();

        for (&old, _) in self.ids.iter().zip(keep).filter(|(_, k)| **k) {
            let new = *remap[old as usize].get_or_insert_with(|| {
                counts.push(0);
                levels.push(self.levels[old as usize].clone());
                (counts.len() - 1) as u32
            });
            counts[new as usize] += 1;
            ids.push(new);
        }

        Self {
            ids,
            counts,
            levels,
        }
    }

    /// Whether every group of `self` lies inside a single group of `outer`.
    pub fn is_nested_within(&self, outer: &Self) -> bool {
        if self.n_rows() != outer.n_rows() {
            return false;
        }
        let mut parent: Vec<Option<u32>> = vec![None; self.n_groups()];
        for (&inner, &out) in self.ids.iter().zip(&outer.ids) {
            match parent[inner as usize] {
                Some(p) if p != out => return false,
                Some(_) => {}
                None => parent[inner as usize] = Some(out),
            }
        }
        true
    }

    /// Groups formed by every observed combination of `self` and `other`.
    pub fn intersect(&self, other: &Self) -> Self {
        debug_assert_eq!(self.n_rows(), other.n_rows());
        let mut index: HashMap<(u32, u32), u32> = HashMap::new();
        let mut ids = Vec::with_capacity(self.n_rows());
        let mut counts = Vec::new();
        let mut levels = Vec::new();

        for (&a, &b) in self.ids.iter().zip(&other.ids) {
            let id = *index.entry((a, b)).or_insert_with(|| {
                counts.push(0);
                levels.push(Level::Text(format!(
                    "{}#{}",
                    self.levels[a as usize], other.levels[b as usize]
                )));
                (counts.len() - 1) as u32
            });
            counts[id as usize] += 1;
            ids.push(id);
        }

        Self {
            ids,
            counts,
            levels,
        }
    }
}

/// Encoder from categorical levels to [`GroupIds`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CategoricalEncoder;

impl CategoricalEncoder {
    /// Create an encoder.
    pub const fn new() -> Self {
        Self
    }

    /// Encode levels in first-seen order.
    pub fn encode<'a, I>(&self, values: I) -> GroupIds
    where
        I: IntoIterator<Item = &'a Level>,
    {
        let mut index: HashMap<&'a Level, u32> = HashMap::new();
        let mut ids = Vec::new();
        let mut counts = Vec::new();
        let mut levels = Vec::new();

        for level in values {
            let id = *index.entry(level).or_insert_with(|| {
                counts.push(0);
                levels.push(level.clone());
                (counts.len() - 1) as u32
            });
            counts[id as usize] += 1;
            ids.push(id);
        }

        GroupIds {
            ids,
            counts,
            levels,
        }
    }

    /// Encode a fixed-effect dimension, rejecting degenerate ones.
    ///
    /// # Errors
    /// * [`ConfigurationError::SingleLevel`] if the column has one distinct value
    /// * [`ConfigurationError::PerfectAbsorption`] if every row is its own group
    pub fn encode_fixed_effect<'a, I>(
        &self,
        dimension: &str,
        values: I,
    ) -> Result<GroupIds, ConfigurationError>
    where
        I: IntoIterator<Item = &'a Level>,
    {
        let groups = self.encode(values);
        Self::validate_fixed_effect(dimension, &groups)?;
        Ok(groups)
    }

    /// Check that a fixed-effect dimension leaves variation to estimate.
    pub fn validate_fixed_effect(
        dimension: &str,
        groups: &GroupIds,
    ) -> Result<(), ConfigurationError> {
        let levels = groups.n_groups();
        let rows = groups.n_rows();
        if levels <= 1 {
            return Err(ConfigurationError::SingleLevel {
                dimension: dimension.to_string(),
            });
        }
        if levels == rows {
            return Err(ConfigurationError::PerfectAbsorption {
                dimension: dimension.to_string(),
                levels,
                rows,
            });
        }
        Ok(())
    }
}
