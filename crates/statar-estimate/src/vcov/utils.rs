//! Small symmetric-matrix helpers for variance estimates
//!
//! Coefficient covariance matrices are k x k with k the number of
//! regressors, so a cyclic Jacobi eigendecomposition is accurate and fast
//! enough without pulling in LAPACK.

use ndarray::{Array1, Array2};

/// Eigenvalues (descending) and eigenvectors (columns) of a symmetric matrix
#[derive(Debug, Clone)]
pub struct SymmetricEigen {
    /// Eigenvalues sorted in descending order
    pub values: Array1<f64>,
    /// Matching eigenvectors as columns
    pub vectors: Array2<f64>,
}

impl SymmetricEigen {
    /// Decompose a symmetric matrix with cyclic Jacobi rotations.
    pub fn new(matrix: &Array2<f64>) -> Self {
        let n = matrix.nrows();
        debug_assert_eq!(n, matrix.ncols());

        let mut a = (matrix + &matrix.t()) / 2.0;
        let mut v = Array2::<f64>::eye(n);
        let scale = a.iter().fold(0.0_f64, |m, x| m.max(x.abs())).max(f64::MIN_POSITIVE);

        for _sweep in 0..100 {
            let off: f64 = (0..n)
                .flat_map(|i| ((i + 1)..n).map(move |j| (i, j)))
                .map(|(i, j)| a[[i, j]] * a[[i, j]])
                .sum();
            if off.sqrt() <= 1e-15 * scale {
                break;
            }
            for p in 0..n {
                for q in (p + 1)..n {
                    rotate(&mut a, &mut v, p, q);
                }
            }
        }

        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&i, &j| a[[j, j]].total_cmp(&a[[i, i]]));

        let values = order.iter().map(|&i| a[[i, i]]).collect();
        let mut vectors = Array2::<f64>::zeros((n, n));
        for (dst, &src) in order.iter().enumerate() {
            vectors.column_mut(dst).assign(&v.column(src));
        }

        Self { values, vectors }
    }

    /// V · diag(f(λ)) · Vᵀ
    pub fn reconstruct_with<F>(&self, f: F) -> Array2<f64>
    where
        F: Fn(f64) -> f64,
    {
        let scaled = &self.vectors * &self.values.mapv(f);
        scaled.dot(&self.vectors.t())
    }
}

/// Zero a single off-diagonal pair (p, q) with a Jacobi rotation
fn rotate(a: &mut Array2<f64>, v: &mut Array2<f64>, p: usize, q: usize) {
    let apq = a[[p, q]];
    if apq.abs() < f64::MIN_POSITIVE {
        return;
    }
    let app = a[[p, p]];
    let aqq = a[[q, q]];

    let theta = (aqq - app) / (2.0 * apq);
    let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
    let c = 1.0 / (t * t + 1.0).sqrt();
    let s = t * c;

    a[[p, p]] = app - t * apq;
    a[[q, q]] = aqq + t * apq;
    a[[p, q]] = 0.0;
    a[[q, p]] = 0.0;

    let n = a.nrows();
    for i in 0..n {
        if i != p && i != q {
            let aip = a[[i, p]];
            let aiq = a[[i, q]];
            a[[i, p]] = c * aip - s * aiq;
            a[[p, i]] = a[[i, p]];
            a[[i, q]] = s * aip + c * aiq;
            a[[q, i]] = a[[i, q]];
        }
    }
    for i in 0..n {
        let vip = v[[i, p]];
        let viq = v[[i, q]];
        v[[i, p]] = c * vip - s * viq;
        v[[i, q]] = s * vip + c * viq;
    }
}

/// Project onto the positive semi-definite cone by zeroing negative
/// eigenvalues. Returns the repaired matrix and the number of eigenvalues
/// that were clipped.
pub fn clip_negative_eigenvalues(matrix: &Array2<f64>) -> (Array2<f64>, usize) {
    let eig = SymmetricEigen::new(matrix);
    let clipped = eig.values.iter().filter(|&&l| l < 0.0).count();
    if clipped == 0 {
        return (matrix.clone(), 0);
    }
    (eig.reconstruct_with(|l| l.max(0.0)), clipped)
}

/// Moore–Penrose inverse of a symmetric matrix and its numerical rank.
pub fn symmetric_pinv(matrix: &Array2<f64>, rel_tol: f64) -> (Array2<f64>, usize) {
    let eig = SymmetricEigen::new(matrix);
    let largest = eig.values.iter().fold(0.0_f64, |m, l| m.max(l.abs()));
    let cutoff = rel_tol * largest;
    let rank = eig.values.iter().filter(|l| l.abs() > cutoff).count();
    let inv = eig.reconstruct_with(|l| if l.abs() > cutoff { 1.0 / l } else { 0.0 });
    (inv, rank)
}
