//! Ordinary least squares via column-pivoted Householder QR
//!
//! ```text
//! X P = Q R,   β = P R⁻¹ Qᵀ y,   (XᵀX)⁻¹ = P R⁻¹ R⁻ᵀ Pᵀ
//! ```
//!
//! Pivoting picks, at each step, the column with the largest remaining norm
//! relative to its rank floor
//!
//! ```text
//! floor_c = max(tol · ‖x_c‖_ref, 10 · err_c)
//! ```
//!
//! The reference is the column's norm before fixed-effect absorption, so a
//! regressor that the fixed effects explain almost entirely is caught by the
//! same rank test as an exact collinearity among regressors. `err_c` is the
//! estimated distance of the demeaned column from its exact projection: a
//! column no larger than the demeaning error cannot be told apart from zero.

use derive_more::Display;
use ndarray::{Array1, Array2, Axis, s};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a design matrix lost rank
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum CollinearityCause {
    /// Demeaned column is numerically zero
    #[display("absorbed by the fixed effects")]
    AbsorbedByFixedEffects,
    /// Column is a linear combination of the other regressors
    #[display("collinear with other regressors")]
    CollinearWithRegressors,
    /// More regressors than observations
    #[display("not identified with so few observations")]
    TooFewObservations,
}

/// Design matrix without full column rank
#[derive(Debug, Clone, Error)]
#[error("Rank deficient design: `{column}` is {cause} (rank {rank} of {columns} columns)")]
pub struct RankDeficiencyError {
    /// Offending column
    pub column: String,
    /// Numerical rank detected before the failure
    pub rank: usize,
    /// Number of columns in the design
    pub columns: usize,
    /// Why the column is redundant
    pub cause: CollinearityCause,
}

/// Solver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OlsConfig {
    /// Relative norm below which a pivot column counts as dependent (default: 1e-9)
    pub rank_tolerance: f64,
}

impl Default for OlsConfig {
    fn default() -> Self {
        Self {
            rank_tolerance: 1e-9,
        }
    }
}

/// Margin applied to demeaning error estimates in the rank test
const ERROR_BOUND_SAFETY: f64 = 10.0;

/// Per-column scale for the rank test
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RankScale {
    reference_norms: Vec<f64>,
    error_bounds: Vec<f64>,
}

impl RankScale {
    /// Scale the rank test by the given reference norms
    pub const fn new(reference_norms: Vec<f64>) -> Self {
        Self {
            reference_norms,
            error_bounds: Vec::new(),
        }
    }

    /// Also treat columns within the given numerical error as zero
    pub fn with_error_bounds(mut self, error_bounds: Vec<f64>) -> Self {
        self.error_bounds = error_bounds;
        self
    }

    fn floors(&self, own_norms: &[f64], tol: f64) -> Vec<f64> {
        own_norms
            .iter()
            .enumerate()
            .map(|(c, &own)| {
                let reference = self.reference_norms.get(c).copied().unwrap_or(own);
                let error = self.error_bounds.get(c).copied().unwrap_or(0.0);
                (tol * reference).max(ERROR_BOUND_SAFETY * error)
            })
            .collect()
    }
}

/// Result of a least-squares fit
#[derive(Debug, Clone)]
pub struct OlsFit {
    /// Coefficients, in input column order
    pub coefficients: Array1<f64>,
    /// y − Xβ
    pub residuals: Array1<f64>,
    /// Residual sum of squares
    pub rss: f64,
    /// Numerical rank of X
    pub rank: usize,
    /// (XᵀX)⁻¹, in input column order
    pub xtx_inv: Array2<f64>,
}

/// Least-squares solver
#[derive(Debug, Default)]
pub struct OlsSolver {
    config: OlsConfig,
}

impl OlsSolver {
    /// Create a solver with the given configuration
    pub const fn new(config: OlsConfig) -> Self {
        Self { config }
    }

    /// Solve `min ‖y − Xβ‖²`.
    ///
    /// # Arguments
    /// * `x` - Design matrix (n x k), k < n
    /// * `y` - Outcome (n)
    /// * `names` - Column names for error reporting
    /// * `scale` - Per-column scale for the rank test; defaults to the norms
    ///   of `x` itself with no demeaning error
    pub fn solve(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        names: &[String],
        scale: Option<&RankScale>,
    ) -> Result<OlsFit, RankDeficiencyError> {
        let (n, k) = x.dim();
        let name = |j: usize| {
            names
                .get(j)
                .cloned()
                .unwrap_or_else(|| format!("column {}", j))
        };

        if k >= n {
            return Err(RankDeficiencyError {
                column: name(k.saturating_sub(1)),
                rank: n.min(k),
                columns: k,
                cause: CollinearityCause::TooFewObservations,
            });
        }

        let own_norms = column_norms(x);
        let tol = self.config.rank_tolerance;
        let floors = scale.map_or_else(
            || own_norms.iter().map(|n| tol * n).collect::<Vec<_>>(),
            |scale| scale.floors(&own_norms, tol),
        );
        let relative = |norm: f64, floor: f64| {
            if floor > 0.0 {
                norm / floor
            } else if norm > 0.0 {
                f64::INFINITY
            } else {
                0.0
            }
        };

        let mut a = x.to_owned();
        let mut qty = y.to_owned();
        let mut perm: Vec<usize> = (0..k).collect();

        for j in 0..k {
            let (best, best_rel) = (j..k)
                .map(|c| {
                    let tail = a.slice(s![j.., c]);
                    (c, relative(tail.dot(&tail).sqrt(), floors[perm[c]]))
                })
                .fold((j, f64::NEG_INFINITY), |acc, cur| if cur.1 > acc.1 { cur } else { acc });

            if best_rel <= 1.0 {
                let col = perm[best];
                let cause = if own_norms[col] <= floors[col] {
                    CollinearityCause::AbsorbedByFixedEffects
                } else {
                    CollinearityCause::CollinearWithRegressors
                };
                return Err(RankDeficiencyError {
                    column: name(col),
                    rank: j,
                    columns: k,
                    cause,
                });
            }

            if best != j {
                for i in 0..n {
                    a.swap([i, j], [i, best]);
                }
                perm.swap(j, best);
            }

            householder_step(&mut a, &mut qty, j);
        }

        let r = a.slice(s![..k, ..k]).to_owned();
        let r_inv = upper_triangular_inverse(&r);
        let beta_pivoted = r_inv.dot(&qty.slice(s![..k]));

        let mut coefficients = Array1::<f64>::zeros(k);
        let mut xtx_inv = Array2::<f64>::zeros((k, k));
        let bread_pivoted = r_inv.dot(&r_inv.t());
        for (i, &pi) in perm.iter().enumerate() {
            coefficients[pi] = beta_pivoted[i];
            for (j, &pj) in perm.iter().enumerate() {
                xtx_inv[[pi, pj]] = bread_pivoted[[i, j]];
            }
        }

        let residuals = y - &x.dot(&coefficients);
        let rss = residuals.dot(&residuals);

        Ok(OlsFit {
            coefficients,
            residuals,
            rss,
            rank: k,
            xtx_inv,
        })
    }
}

/// Euclidean norm of every column
pub fn column_norms(x: &Array2<f64>) -> Vec<f64> {
    x.axis_iter(Axis(1)).map(|c| c.dot(&c).sqrt()).collect()
}

/// Reflect rows `j..` so that column `j` becomes zero below the diagonal,
/// applying the same reflection to the trailing columns and to `qty`.
fn householder_step(a: &mut Array2<f64>, qty: &mut Array1<f64>, j: usize) {
    let k = a.ncols();
    let head = a.slice(s![j.., j]);
    let norm = head.dot(&head).sqrt();
    if norm == 0.0 {
        return;
    }

    let alpha = if a[[j, j]] > 0.0 { -norm } else { norm };
    let mut v = head.to_owned();
    v[0] -= alpha;
    let vtv = v.dot(&v);
    if vtv == 0.0 {
        return;
    }

    for c in j..k {
        let mut col = a.slice_mut(s![j.., c]);
        let f = 2.0 * v.dot(&col) / vtv;
        col.scaled_add(-f, &v);
    }
    let mut tail = qty.slice_mut(s![j..]);
    let f = 2.0 * v.dot(&tail) / vtv;
    tail.scaled_add(-f, &v);
}

/// Inverse of an upper-triangular matrix with non-zero diagonal
fn upper_triangular_inverse(r: &Array2<f64>) -> Array2<f64> {
    let k = r.nrows();
    let mut inv = Array2::<f64>::zeros((k, k));
    for col in 0..k {
        inv[[col, col]] = 1.0 / r[[col, col]];
        for row in (0..col).rev() {
            let mut sum = 0.0;
            for m in (row + 1)..=col {
                sum += r[[row, m]] * inv[[m, col]];
            }
            inv[[row, col]] = -sum / r[[row, row]];
        }
    }
    inv
}
