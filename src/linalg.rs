//! Powers of symmetric matrices through their eigendecomposition.

use nalgebra::{DMatrix, SymmetricEigen};
use ndarray::{Array2, ArrayView2};

use crate::error::{Result, SamplerError};

/// Relative eigenvalue floor: eigenvalues below `EIG_RLIM · λmax` are treated as unconstrained
/// directions and dropped from every power.
pub const EIG_RLIM: f64 = 1e-10;

/// Eigendecomposition of a symmetric matrix, with the near-null directions removed.
#[derive(Debug, Clone)]
pub struct SymEigen {
    values: Vec<f64>,
    vectors: DMatrix<f64>,
    keep: Vec<bool>,
}

impl SymEigen {
    /// Decomposes the symmetric part of `a`.
    pub fn new(a: ArrayView2<f64>, rlim: f64) -> Result<Self> {
        let (n, m) = a.dim();
        if n != m {
            return Err(SamplerError::ShapeMismatch {
                what: "SymEigen::new",
                expected: n * n,
                got: a.len(),
            });
        }
        if a.iter().any(|v| !v.is_finite()) {
            return Err(SamplerError::Operator(
                "non-finite entry in symmetric matrix".to_string(),
            ));
        }
        let mat = DMatrix::from_fn(n, n, |i, j| 0.5 * (a[[i, j]] + a[[j, i]]));
        let eig = SymmetricEigen::new(mat);
        let values: Vec<f64> = eig.eigenvalues.iter().copied().collect();
        let vmax = values.iter().fold(0.0_f64, |acc, &v| acc.max(v));
        let keep = values.iter().map(|&v| v > vmax * rlim && v > 0.0).collect();
        Ok(Self {
            values,
            vectors: eig.eigenvectors,
            keep,
        })
    }

    pub fn n(&self) -> usize {
        self.values.len()
    }

    /// Eigenvalues in decomposition order.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Number of eigenvalues dropped by the relative floor.
    pub fn n_discarded(&self) -> usize {
        self.keep.iter().filter(|&&k| !k).count()
    }

    /// `Σ ln|λ|` over all eigenvalues, `-∞` for a singular matrix.
    pub fn log_det(&self) -> f64 {
        self.values.iter().map(|v| v.abs().ln()).sum()
    }

    /// `V diag(λᵖ) Vᵀ`, with dropped eigenvalues contributing zero.
    pub fn pow(&self, p: f64) -> Array2<f64> {
        let n = self.n();
        let mut scaled = self.vectors.clone();
        for (k, mut col) in scaled.column_iter_mut().enumerate() {
            let w = if self.keep[k] { self.values[k].powf(p) } else { 0.0 };
            col *= w;
        }
        let out = scaled * self.vectors.transpose();
        Array2::from_shape_fn((n, n), |(i, j)| out[(i, j)])
    }
}
