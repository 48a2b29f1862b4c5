//! Degrees of freedom absorbed by the fixed effects
//!
//! Each absorbed dimension with `G` levels spans `G` dummy columns, but the
//! spans overlap: every dimension contains the constant, and two dimensions
//! share one redundant direction per connected component of the graph that
//! links their groups through common observations.
//!
//! ```text
//! 1 dimension:   df_a = G₁
//! 2 dimensions:  df_a = G₁ + G₂ − M₁₂          (M₁₂ = connected components; exact)
//! D ≥ 3:         df_a = ΣG − M₁₂ − (D − 2)     (one redundancy per extra dimension)
//! ```
//!
//! The D ≥ 3 count is a lower bound on the true redundancy, so `df_a` may be
//! overstated. Exact accounting for three or more dimensions has no cheap
//! closed form; the result is flagged [`DofCaveat::Approximate`] instead.
//!
//! With clustered inference, a dimension nested within a cluster dimension
//! is already accounted for by the cluster correction and absorbs nothing.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use statar_data::GroupIds;

/// Whether the absorbed DOF count is exact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum DofCaveat {
    /// Exact count
    #[display("exact")]
    Exact,
    /// Three or more non-nested dimensions; redundancies beyond the first
    /// pair are assumed to be one per dimension
    #[display("approximate")]
    Approximate,
}

/// DOF accounting for one absorbed dimension
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionDof {
    /// Dimension name
    pub name: String,
    /// Number of levels
    pub levels: usize,
    /// Levels that are linear combinations of earlier dimensions
    pub redundant: usize,
    /// Nested within a cluster dimension
    pub nested: bool,
}

impl DimensionDof {
    /// Degrees of freedom this dimension absorbs
    pub const fn absorbed(&self) -> usize {
        self.levels - self.redundant
    }
}

/// Degrees of freedom absorbed by all fixed effects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbsorbedDof {
    /// Per-dimension breakdown
    pub dimensions: Vec<DimensionDof>,
    /// Total absorbed degrees of freedom (includes the intercept)
    pub absorbed: usize,
    /// Exactness of `absorbed`
    pub caveat: DofCaveat,
}

impl AbsorbedDof {
    /// No fixed effects: only the intercept is absorbed.
    pub fn intercept_only() -> Self {
        Self {
            dimensions: vec![DimensionDof {
                name: "_cons".to_string(),
                levels: 1,
                redundant: 0,
                nested: false,
            }],
            absorbed: 1,
            caveat: DofCaveat::Exact,
        }
    }

    /// Count absorbed degrees of freedom.
    ///
    /// # Arguments
    /// * `fixed_effects` - Named group assignments, in absorption order
    /// * `clusters` - Cluster assignments; empty when not clustering
    pub fn compute(fixed_effects: &[(&str, &GroupIds)], clusters: &[&GroupIds]) -> Self {
        if fixed_effects.is_empty() {
            return Self::intercept_only();
        }

        let mut dimensions = Vec::with_capacity(fixed_effects.len());
        let mut first_active: Option<&GroupIds> = None;
        let mut active = 0;

        for &(name, groups) in fixed_effects {
            let levels = groups.n_groups();
            let nested = clusters.iter().any(|c| groups.is_nested_within(c));

            let redundant = if nested {
                levels
            } else {
                active += 1;
                match (active, first_active) {
                    (1, _) => {
                        first_active = Some(groups);
                        0
                    }
                    (2, Some(first)) => connected_components(first, groups),
                    _ => 1,
                }
            };

            if nested {
                tracing::debug!(dimension = name, "fixed effect nested within cluster");
            }

            dimensions.push(DimensionDof {
                name: name.to_string(),
                levels,
                redundant,
                nested,
            });
        }

        let absorbed = if active == 0 {
            1
        } else {
            dimensions.iter().map(DimensionDof::absorbed).sum()
        };

        let caveat = if active >= 3 {
            tracing::warn!(
                dimensions = active,
                "absorbed degrees of freedom are approximate with three or more fixed effects"
            );
            DofCaveat::Approximate
        } else {
            DofCaveat::Exact
        };

        Self {
            dimensions,
            absorbed,
            caveat,
        }
    }

    /// Human-readable caveat, if the count is not exact.
    pub fn caveat_message(&self) -> Option<String> {
        match self.caveat {
            DofCaveat::Exact => None,
            DofCaveat::Approximate => Some(format!(
                "absorbed degrees of freedom ({}) assume one redundant level per fixed effect \
                 beyond the first two; the exact count for three or more dimensions may be lower",
                self.absorbed
            )),
        }
    }
}

/// Connected components of the bipartite graph whose nodes are the groups
/// of `a` and `b` and whose edges are the observations.
pub fn connected_components(a: &GroupIds, b: &GroupIds) -> usize {
    let offset = a.n_groups();
    let mut parent: Vec<usize> = (0..offset + b.n_groups()).collect();

    fn find(parent: &mut [usize], mut x: usize) -> usize {
        while parent[x] != x {
            parent[x] = parent[parent[x]];
            x = parent[x];
        }
        x
    }

    for (&ga, &gb) in a.ids().iter().zip(b.ids()) {
        let ra = find(&mut parent, ga as usize);
        let rb = find(&mut parent, offset + gb as usize);
        if ra != rb {
            parent[ra.max(rb)] = ra.min(rb);
        }
    }

    (0..parent.len())
        .filter(|&x| find(&mut parent, x) == x)
        .count()
}
