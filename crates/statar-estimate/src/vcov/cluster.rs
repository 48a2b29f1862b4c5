//! Multi-way cluster-robust covariance (Cameron, Gelbach and Miller)
//!
//! For every non-empty subset `S` of the cluster dimensions the observations
//! are grouped by the intersection of the dimensions in `S`, and
//!
//! ```text
//! V_S = G_S/(G_S − 1) · (n − 1)/df_r · (X̃ᵀX̃)⁻¹ (Σ_g u_g u_gᵀ) (X̃ᵀX̃)⁻¹
//! u_g = Σ_{i∈g} x̃_i e_i
//! V   = Σ_S (−1)^{|S|+1} V_S
//! ```
//!
//! One dimension reduces to the usual CR1 estimator. With two or more the
//! alternating sum can lose positive semi-definiteness; negative eigenvalues
//! are then clipped to zero.

use super::utils::clip_negative_eigenvalues;
use super::{ClusterCount, VarianceEstimator, VcovEstimate, VcovInput, VcovKind, require_dof};
use ndarray::Array2;
use statar_data::{ConfigurationError, GroupIds};

/// Cluster-robust covariance over one or more cluster dimensions
#[derive(Debug, Clone)]
pub struct ClusterRobust<'a> {
    dimensions: Vec<(&'a str, &'a GroupIds)>,
}

impl<'a> ClusterRobust<'a> {
    /// Cluster on the given named dimensions.
    pub fn new(dimensions: Vec<(&'a str, &'a GroupIds)>) -> Self {
        Self { dimensions }
    }

    /// Number of cluster dimensions
    pub fn n_dimensions(&self) -> usize {
        self.dimensions.len()
    }

    /// Groups and name for the intersection selected by `mask`
    fn intersection(&self, mask: usize) -> (String, GroupIds) {
        let mut selected = self
            .dimensions
            .iter()
            .enumerate()
            .filter(|(d, _)| mask & (1usize << *d) != 0)
            .map(|(_, dim)| *dim);

        // mask is non-empty
        let (first_name, first_groups) = selected.next().unwrap_or(self.dimensions[0]);
        selected.fold(
            (first_name.to_string(), first_groups.clone()),
            |(name, groups), (next_name, next_groups)| {
                (format!("{}#{}", name, next_name), groups.intersect(next_groups))
            },
        )
    }
}

/// Σ_g u_g u_gᵀ with u_g the summed scores of group g
fn cluster_meat(input: &VcovInput<'_>, groups: &GroupIds) -> Array2<f64> {
    let k = input.n_params();
    let mut scores = Array2::<f64>::zeros((groups.n_groups(), k));
    for (i, &g) in groups.ids().iter().enumerate() {
        let e = input.residuals[i];
        let mut row = scores.row_mut(g as usize);
        row.scaled_add(e, &input.x.row(i));
    }
    scores.t().dot(&scores)
}

impl VarianceEstimator for ClusterRobust<'_> {
    fn kind(&self) -> VcovKind {
        VcovKind::Cluster
    }

    fn estimate(&self, input: &VcovInput<'_>) -> Result<VcovEstimate, ConfigurationError> {
        require_dof(input)?;
        if self.dimensions.is_empty() {
            return Err(ConfigurationError::InvalidParameter(
                "cluster-robust covariance needs at least one cluster dimension".to_string(),
            ));
        }

        let n = input.n_obs();
        let k = input.n_params();

        let clusters: Vec<ClusterCount> = self
            .dimensions
            .iter()
            .map(|(name, groups)| ClusterCount {
                name: (*name).to_string(),
                clusters: groups.n_groups(),
            })
            .collect();

        for count in &clusters {
            if count.clusters < 2 || count.clusters < k {
                return Err(ConfigurationError::InsufficientClusters {
                    dimension: count.name.clone(),
                    clusters: count.clusters,
                    parameters: k,
                });
            }
        }
        let min_clusters = clusters.iter().map(|c| c.clusters).min().unwrap_or(0);

        let mut matrix = Array2::<f64>::zeros((k, k));
        let n_dims = self.dimensions.len();
        for mask in 1usize..(1usize << n_dims) {
            let (name, groups) = self.intersection(mask);
            let g = groups.n_groups();
            let q = if g > 1 {
                g as f64 / (g - 1) as f64 * (n - 1) as f64 / input.df_resid as f64
            } else {
                0.0
            };
            let sign = if mask.count_ones() % 2 == 1 { 1.0 } else { -1.0 };

            tracing::debug!(subset = %name, clusters = g, "cluster meat");
            let term = input.sandwich(&cluster_meat(input, &groups));
            matrix.scaled_add(sign * q, &term);
        }

        if n_dims > 1 {
            let (repaired, clipped) = clip_negative_eigenvalues(&matrix);
            if clipped > 0 {
                tracing::warn!(
                    clipped,
                    "multi-way cluster covariance not positive semi-definite; negative eigenvalues set to zero"
                );
                matrix = repaired;
            }
        }

        Ok(VcovEstimate {
            matrix,
            kind: self.kind(),
            df: min_clusters - 1,
            clusters,
        })
    }
}
