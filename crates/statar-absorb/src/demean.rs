//! Fixed-effect absorption by accelerated alternating projections
//!
//! Removes the span of one or more sets of fixed-effect dummies from every
//! column of a matrix without forming the dummies. With `M_d` the within
//! transform of dimension `d` (subtract group means), one symmetric sweep is
//!
//! ```text
//! T = M_1 M_2 … M_D … M_2 M_1
//! ```
//!
//! `T` is symmetric with spectrum in `[0, 1]` and its fixed points are the
//! columns orthogonal to every dummy set. Two solvers are offered:
//!
//! ```text
//! conjugate gradient:  solve (I − T) z = (I − T) x,  x̃ = x − z
//! none:                repeat x ← M_D … M_1 x
//! stop when            max_i |Δx_i| / ‖x^(0)‖_∞ ≤ tol
//! ```
//!
//! where `Δx` is the change one more sweep would make (the conjugate-gradient
//! residual). One dimension is a single exact pass. All columns share the
//! group assignments, so the outcome and the regressors are residualised
//! against the same projection and OLS on the result reproduces the
//! dummy-variable coefficients (Frisch–Waugh–Lovell).
//!
//! Every run also reports, per column, an estimate of the 2-norm distance
//! between the returned column and its exact projection. The rank check of
//! the solver uses it to tell a column absorbed by the fixed effects apart
//! from one that is merely not demeaned to full precision.
//!
//! # References
//! - Guimarães, P., & Portugal, P. (2010). "A simple feasible procedure to
//!   fit models with high-dimensional fixed effects." Stata Journal, 10(4).
//! - Correia, S. (2017). "Linear Models with High-Dimensional Fixed Effects:
//!   An Efficient and Feasible Estimator."
//! - Saad, Y. (2003). "Iterative Methods for Sparse Linear Systems", §6.7
//!   (Lanczos tridiagonal from conjugate-gradient coefficients).

use crate::AbsorbError;
use derive_more::Display;
use ndarray::{Array1, Array2, ArrayView1, ArrayViewMut1, Axis, ShapeBuilder};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use statar_data::{ConfigurationError, DataError, GroupIds};
use std::time::{Duration, Instant};

/// Iteration scheme for two or more dimensions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum Acceleration {
    /// Conjugate gradient on the symmetric sweep
    #[default]
    #[display("conjugate gradient")]
    ConjugateGradient,
    /// Plain alternating projections
    #[display("none")]
    None,
}

/// Demeaning configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemeanConfig {
    /// Relative convergence tolerance (default: 1e-8)
    pub tolerance: f64,

    /// Maximum number of iterations (default: 10_000)
    pub max_iterations: usize,

    /// Wall-clock budget for the iteration loop (default: none)
    pub time_limit: Option<Duration>,

    /// Sweep columns in parallel (default: true)
    pub parallel: bool,

    /// Iteration scheme (default: conjugate gradient)
    pub acceleration: Acceleration,
}

impl Default for DemeanConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-8,
            max_iterations: 10_000,
            time_limit: None,
            parallel: true,
            acceleration: Acceleration::default(),
        }
    }
}

impl DemeanConfig {
    /// Reject settings the iteration loop cannot honour.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(ConfigurationError::InvalidParameter(format!(
                "tolerance must be positive and finite, got {}",
                self.tolerance
            )));
        }
        if self.max_iterations == 0 {
            return Err(ConfigurationError::InvalidParameter(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Why the iteration loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum StopReason {
    /// Change fell below the tolerance (or a single exact pass)
    #[display("converged")]
    Converged,
    /// Iteration cap reached
    #[display("iteration limit reached")]
    IterationLimit,
    /// Wall-clock budget exhausted
    #[display("time limit reached")]
    TimeLimit,
    /// Conjugate gradient lost positive curvature above the tolerance
    #[display("stalled before reaching the tolerance")]
    Stalled,
}

/// Convergence diagnostics of one demeaning run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Convergence {
    /// Whether the projection is exact to tolerance
    pub converged: bool,
    /// Iterations performed
    pub iterations: usize,
    /// Largest relative change one more sweep would make (0 for a single exact pass)
    pub max_change: f64,
    /// Why the loop stopped
    pub stop_reason: StopReason,
}

/// Demeaned columns plus diagnostics
#[derive(Debug, Clone)]
pub struct Demeaned {
    /// Residualised columns, same shape as the input
    pub data: Array2<f64>,
    /// Estimated 2-norm distance of each column from its exact projection
    pub error_bounds: Vec<f64>,
    /// Convergence diagnostics
    pub convergence: Convergence,
}

/// Per-worker buffers reused across columns and iterations
#[derive(Debug, Default)]
struct Scratch {
    means: Vec<f64>,
    seen: Vec<usize>,
    previous: Vec<f64>,
}

/// Alternating-projections demeaning engine
#[derive(Debug, Default)]
pub struct Demeaner {
    config: DemeanConfig,
}

impl Demeaner {
    /// Create a demeaner with the given configuration
    pub const fn new(config: DemeanConfig) -> Self {
        Self { config }
    }

    /// Configuration in use
    pub const fn config(&self) -> &DemeanConfig {
        &self.config
    }

    /// Demean every column of `data` against all `dimensions`.
    ///
    /// # Arguments
    /// * `data` - Columns to residualise (n x k), e.g. outcome then regressors
    /// * `names` - Column names, used in error messages
    /// * `dimensions` - Group assignments, one per absorbed dimension
    ///
    /// # Errors
    /// * [`DataError::NonFinite`] if any input value is infinite or NaN
    /// * [`ConfigurationError`] for invalid settings or mismatched inputs
    ///
    /// Hitting the iteration or time budget is not an error: the best
    /// iterate is returned with `converged = false`.
    pub fn demean(
        &self,
        data: &Array2<f64>,
        names: &[String],
        dimensions: &[&GroupIds],
    ) -> Result<Demeaned, AbsorbError> {
        self.config.validate()?;
        let (n_rows, n_cols) = data.dim();

        if dimensions.is_empty() {
            return Err(ConfigurationError::InvalidParameter(
                "at least one dimension is required for demeaning".to_string(),
            )
            .into());
        }
        if let Some(dim) = dimensions.iter().find(|d| d.n_rows() != n_rows) {
            return Err(ConfigurationError::InvalidParameter(format!(
                "group assignment has {} rows, data has {}",
                dim.n_rows(),
                n_rows
            ))
            .into());
        }

        for (j, column) in data.axis_iter(Axis(1)).enumerate() {
            if let Some((row, &value)) = column.iter().enumerate().find(|(_, v)| !v.is_finite()) {
                let column = names
                    .get(j)
                    .cloned()
                    .unwrap_or_else(|| format!("column {}", j));
                return Err(DataError::NonFinite { column, row, value }.into());
            }
        }

        let scales: Vec<f64> = data
            .axis_iter(Axis(1))
            .map(|c| c.iter().fold(0.0_f64, |m, v| m.max(v.abs())))
            .collect();

        // Column-major working copy, updated in place
        let mut work = Array2::<f64>::zeros((n_rows, n_cols).f());
        work.assign(data);

        if dimensions.len() == 1 {
            self.sweep(&mut work, dimensions, &scales);
            return Ok(Demeaned {
                data: work,
                error_bounds: vec![0.0; n_cols],
                convergence: Convergence {
                    converged: true,
                    iterations: 1,
                    max_change: 0.0,
                    stop_reason: StopReason::Converged,
                },
            });
        }

        let (error_bounds, convergence) = match self.config.acceleration {
            Acceleration::ConjugateGradient => {
                self.conjugate_gradient(&mut work, dimensions, &scales)
            }
            Acceleration::None => self.alternate(&mut work, dimensions, &scales),
        };

        if convergence.converged {
            tracing::debug!(
                iterations = convergence.iterations,
                max_change = convergence.max_change,
                acceleration = %self.config.acceleration,
                "demeaning converged"
            );
        } else {
            tracing::warn!(
                iterations = convergence.iterations,
                max_change = convergence.max_change,
                tolerance = self.config.tolerance,
                reason = %convergence.stop_reason,
                "demeaning stopped before convergence; absorption is approximate"
            );
        }

        Ok(Demeaned {
            data: work,
            error_bounds,
            convergence,
        })
    }

    /// Budget check shared by both iteration schemes.
    fn budget_exhausted(&self, iterations: usize, start: Instant) -> Option<StopReason> {
        if iterations >= self.config.max_iterations {
            Some(StopReason::IterationLimit)
        } else if self
            .config
            .time_limit
            .is_some_and(|limit| start.elapsed() >= limit)
        {
            Some(StopReason::TimeLimit)
        } else {
            None
        }
    }

    /// Plain alternating projections. The error of each column is bounded
    /// by the geometric tail `‖Δ‖ ρ / (1 − ρ)` of its last change, with the
    /// contraction rate `ρ` estimated from the last two cycles.
    fn alternate(
        &self,
        work: &mut Array2<f64>,
        dimensions: &[&GroupIds],
        scales: &[f64],
    ) -> (Vec<f64>, Convergence) {
        let n_cols = work.ncols();
        let start = Instant::now();
        let mut previous = vec![0.0; n_cols];
        let mut changes = vec![ColumnChange::default(); n_cols];
        let mut iterations = 0;

        let (max_change, stop_reason) = loop {
            iterations += 1;
            for (prev, change) in previous.iter_mut().zip(&changes) {
                *prev = change.norm;
            }
            changes = self.sweep(work, dimensions, scales);
            let change = changes.iter().fold(0.0_f64, |m, c| m.max(c.relative));

            if change <= self.config.tolerance {
                break (change, StopReason::Converged);
            }
            if let Some(reason) = self.budget_exhausted(iterations, start) {
                break (change, reason);
            }
        };

        let error_bounds = changes
            .iter()
            .zip(&previous)
            .map(|(change, &prev)| {
                let rate = if iterations > 1 && prev > 0.0 {
                    change.norm / prev
                } else {
                    0.0
                };
                if rate > 0.0 && rate < 1.0 {
                    change.norm * rate / (1.0 - rate)
                } else {
                    change.norm
                }
            })
            .collect();

        (
            error_bounds,
            Convergence {
                converged: stop_reason == StopReason::Converged,
                iterations,
                max_change,
                stop_reason,
            },
        )
    }

    /// Conjugate gradient on `(I − T) z = (I − T) x` for every column, with
    /// a final symmetric sweep applied to the iterate.
    fn conjugate_gradient(
        &self,
        work: &mut Array2<f64>,
        dimensions: &[&GroupIds],
        scales: &[f64],
    ) -> (Vec<f64>, Convergence) {
        let tolerance = self.config.tolerance;
        let mut solvers: Vec<CgColumn> = work
            .axis_iter(Axis(1))
            .zip(scales)
            .map(|(column, &scale)| CgColumn::new(column, scale))
            .collect();
        self.for_each_column(&mut solvers, |solver, scratch| {
            solver.start(dimensions, scratch)
        });

        let start = Instant::now();
        let mut iterations = 0;
        let stop_reason = loop {
            iterations += 1;
            self.for_each_column(&mut solvers, |solver, scratch| {
                solver.step(dimensions, tolerance, scratch)
            });

            if solvers.iter().all(|s| s.state != CgState::Running) {
                break if solvers.iter().all(|s| s.state == CgState::Converged) {
                    StopReason::Converged
                } else {
                    StopReason::Stalled
                };
            }
            if let Some(reason) = self.budget_exhausted(iterations, start) {
                break reason;
            }
        };
        let max_change = solvers.iter().fold(0.0_f64, |m, s| m.max(s.change));

        self.for_each_column(&mut solvers, |solver, scratch| {
            symmetric_sweep(solver.values.view_mut(), dimensions, scratch)
        });
        for (mut column, solver) in work.axis_iter_mut(Axis(1)).zip(&solvers) {
            column.assign(&solver.values);
        }
        let error_bounds = solvers.iter().map(CgColumn::error_bound).collect();

        (
            error_bounds,
            Convergence {
                converged: stop_reason == StopReason::Converged,
                iterations,
                max_change,
                stop_reason,
            },
        )
    }

    fn for_each_column<F>(&self, solvers: &mut [CgColumn], op: F)
    where
        F: Fn(&mut CgColumn, &mut Scratch) + Sync + Send,
    {
        if self.config.parallel {
            solvers
                .par_iter_mut()
                .for_each_init(Scratch::default, |scratch, solver| op(solver, scratch));
        } else {
            let mut scratch = Scratch::default();
            for solver in solvers {
                op(solver, &mut scratch);
            }
        }
    }

    /// One full cycle over all dimensions for every column.
    fn sweep(
        &self,
        work: &mut Array2<f64>,
        dimensions: &[&GroupIds],
        scales: &[f64],
    ) -> Vec<ColumnChange> {
        if self.config.parallel {
            work.axis_iter_mut(Axis(1))
                .into_par_iter()
                .enumerate()
                .map_init(Scratch::default, |scratch, (j, column)| {
                    sweep_column(column, dimensions, scales[j], scratch)
                })
                .collect()
        } else {
            let mut scratch = Scratch::default();
            work.axis_iter_mut(Axis(1))
                .zip(scales)
                .map(|(column, &scale)| sweep_column(column, dimensions, scale, &mut scratch))
                .collect()
        }
    }
}

/// Change made by one cycle on one column
#[derive(Debug, Clone, Copy, Default)]
struct ColumnChange {
    /// Sup-norm of the change relative to the column's original sup-norm
    relative: f64,
    /// 2-norm of the change
    norm: f64,
}

fn sweep_column(
    mut column: ArrayViewMut1<'_, f64>,
    dimensions: &[&GroupIds],
    scale: f64,
    scratch: &mut Scratch,
) -> ColumnChange {
    scratch.previous.clear();
    scratch.previous.extend(column.iter().copied());

    for groups in dimensions {
        subtract_group_means(&mut column, groups, scratch);
    }

    let (sup, sq) = column
        .iter()
        .zip(&scratch.previous)
        .fold((0.0_f64, 0.0_f64), |(m, s), (a, b)| {
            let d = (a - b).abs();
            (m.max(d), s + d * d)
        });
    ColumnChange {
        relative: relative_to(sup, scale),
        norm: sq.sqrt(),
    }
}

fn relative_to(value: f64, scale: f64) -> f64 {
    if scale > 0.0 { value / scale } else { value }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CgState {
    Running,
    Converged,
    Stalled,
}

/// Conjugate-gradient state of one column.
///
/// `values` holds the current residualised column `x − z`, so the CG
/// residual `r = (I − T)(x − z)` is exactly the change a further symmetric
/// sweep would make.
#[derive(Debug)]
struct CgColumn {
    values: Array1<f64>,
    residual: Array1<f64>,
    direction: Array1<f64>,
    rr: f64,
    scale: f64,
    change: f64,
    state: CgState,
    alphas: Vec<f64>,
    betas: Vec<f64>,
}

impl CgColumn {
    fn new(column: ArrayView1<'_, f64>, scale: f64) -> Self {
        Self {
            values: column.to_owned(),
            residual: Array1::zeros(0),
            direction: Array1::zeros(0),
            rr: 0.0,
            scale,
            change: 0.0,
            state: CgState::Running,
            alphas: Vec::new(),
            betas: Vec::new(),
        }
    }

    fn start(&mut self, dimensions: &[&GroupIds], scratch: &mut Scratch) {
        self.residual = apply_operator(self.values.view(), dimensions, scratch);
        self.direction = self.residual.clone();
        self.rr = self.residual.dot(&self.residual);
        self.change = relative_to(sup_norm(self.residual.view()), self.scale);
    }

    fn step(&mut self, dimensions: &[&GroupIds], tolerance: f64, scratch: &mut Scratch) {
        if self.state != CgState::Running {
            return;
        }

        let q = apply_operator(self.direction.view(), dimensions, scratch);
        let curvature = self.direction.dot(&q);
        if !(curvature.is_finite() && curvature > 0.0) {
            self.state = if self.change <= tolerance {
                CgState::Converged
            } else {
                CgState::Stalled
            };
            return;
        }

        let alpha = self.rr / curvature;
        self.values.scaled_add(-alpha, &self.direction);
        self.residual.scaled_add(-alpha, &q);
        let rr = self.residual.dot(&self.residual);
        let beta = rr / self.rr;
        self.direction *= beta;
        self.direction += &self.residual;
        self.rr = rr;
        self.alphas.push(alpha);
        self.betas.push(beta);

        self.change = relative_to(sup_norm(self.residual.view()), self.scale);
        if self.change <= tolerance {
            self.state = CgState::Converged;
        }
    }

    /// `‖r‖ / θ_min`, with `θ_min` the smallest Ritz value of the Lanczos
    /// tridiagonal built from the CG coefficients.
    fn error_bound(&self) -> f64 {
        let residual = self.rr.sqrt();
        if residual == 0.0 {
            return 0.0;
        }
        match smallest_ritz_value(&self.alphas, &self.betas) {
            Some(theta) if theta > f64::EPSILON => residual / theta,
            _ => residual / f64::EPSILON,
        }
    }
}

/// `(I − T) v`
fn apply_operator(
    values: ArrayView1<'_, f64>,
    dimensions: &[&GroupIds],
    scratch: &mut Scratch,
) -> Array1<f64> {
    let mut swept = values.to_owned();
    symmetric_sweep(swept.view_mut(), dimensions, scratch);
    &values - &swept
}

/// Apply `M_1 … M_D … M_1` in place.
fn symmetric_sweep(
    mut column: ArrayViewMut1<'_, f64>,
    dimensions: &[&GroupIds],
    scratch: &mut Scratch,
) {
    let last = dimensions.len() - 1;
    for groups in dimensions.iter().chain(dimensions[..last].iter().rev()) {
        subtract_group_means(&mut column, groups, scratch);
    }
}

fn sup_norm(values: ArrayView1<'_, f64>) -> f64 {
    values.iter().fold(0.0_f64, |m, v| m.max(v.abs()))
}

/// Smallest eigenvalue of the Lanczos tridiagonal
///
/// ```text
/// d_0 = 1/α_0,   d_i = 1/α_i + β_{i−1}/α_{i−1},   e_i = √β_i / α_i
/// ```
///
/// found by bisection on the Sturm sequence count.
fn smallest_ritz_value(alphas: &[f64], betas: &[f64]) -> Option<f64> {
    let m = alphas.len();
    if m == 0 {
        return None;
    }
    let diag: Vec<f64> = (0..m)
        .map(|i| {
            let prev = if i == 0 { 0.0 } else { betas[i - 1] / alphas[i - 1] };
            1.0 / alphas[i] + prev
        })
        .collect();
    let off: Vec<f64> = (0..m.saturating_sub(1))
        .map(|i| betas[i].sqrt() / alphas[i])
        .collect();
    if diag.iter().chain(&off).any(|v| !v.is_finite()) {
        return None;
    }

    // Number of eigenvalues below `x`
    let count_below = |x: f64| {
        let mut count = 0;
        let mut q = 1.0;
        for i in 0..m {
            let coupling = if i == 0 { 0.0 } else { off[i - 1] * off[i - 1] / q };
            q = diag[i] - x - coupling;
            if q == 0.0 {
                q = -f64::EPSILON * (diag[i].abs() + x.abs()).max(f64::MIN_POSITIVE);
            }
            if q < 0.0 {
                count += 1;
            }
        }
        count
    };

    let mut lo = 0.0_f64;
    let mut hi = (0..m)
        .map(|i| {
            let left = if i == 0 { 0.0 } else { off[i - 1].abs() };
            let right = off.get(i).map_or(0.0, |e| e.abs());
            diag[i] + left + right
        })
        .fold(0.0_f64, f64::max);
    if hi <= 0.0 {
        return None;
    }
    for _ in 0..200 {
        let mid = 0.5 * (lo + hi);
        if count_below(mid) >= 1 {
            hi = mid;
        } else {
            lo = mid;
        }
        if hi - lo <= 1e-12 * hi {
            break;
        }
    }
    Some(hi)
}

fn subtract_group_means(
    column: &mut ArrayViewMut1<'_, f64>,
    groups: &GroupIds,
    scratch: &mut Scratch,
) {
    accumulate_means(column.view(), groups, &mut scratch.means, &mut scratch.seen);
    for (v, &id) in column.iter_mut().zip(groups.ids()) {
        *v -= scratch.means[id as usize];
    }
}

// Running mean per group: m += (v - m) / count
fn accumulate_means(
    values: ArrayView1<'_, f64>,
    groups: &GroupIds,
    means: &mut Vec<f64>,
    seen: &mut Vec<usize>,
) {
    let n_groups = groups.n_groups();
    means.clear();
    means.resize(n_groups, 0.0);
    seen.clear();
    seen.resize(n_groups, 0);

    for (&v, &id) in values.iter().zip(groups.ids()) {
        let g = id as usize;
        seen[g] += 1;
        means[g] += (v - means[g]) / seen[g] as f64;
    }
}

/// Mean of `values` within each group, indexed by group id.
pub fn group_means(values: ArrayView1<'_, f64>, groups: &GroupIds) -> Vec<f64> {
    let mut means = Vec::new();
    let mut seen = Vec::new();
    accumulate_means(values, groups, &mut means, &mut seen);
    means
}
