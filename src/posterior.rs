/*!
# Gaussian amplitude posterior.

For fixed positions and beams the model is linear in the amplitudes, so with curvature
`A = Pᵀ N⁻¹ P` and right-hand side `b = Pᵀ N⁻¹ d` (both restricted to a [`Dof`]) the amplitude
posterior is Gaussian with mean `A⁻¹ b` and covariance `A⁻¹`.

Directions with eigenvalues below [`EIG_RLIM`] times the largest one are unconstrained by the
data. They are dropped from the covariance and its square roots, so draws never move along
them, and counted in [`AmpPosterior::n_discarded`].
*/

use ndarray::{Array1, Array2, ArrayView1};
use rand::Rng;
use rand_distr::StandardNormal;

use crate::dof::Dof;
use crate::error::{Result, SamplerError};
use crate::linalg::{SymEigen, EIG_RLIM};

#[derive(Debug, Clone)]
pub struct AmpPosterior {
    dof: Dof,
    curvature: Array2<f64>,
    cov: Array2<f64>,
    cov_sqrt: Array2<f64>,
    curv_sqrt: Array2<f64>,
    mean: Array1<f64>,
    log_det: f64,
    n_discarded: usize,
}

impl AmpPosterior {
    pub fn new(curvature: Array2<f64>, rhs: Array1<f64>, dof: Dof) -> Result<Self> {
        let n = dof.n();
        if curvature.dim() != (n, n) {
            return Err(SamplerError::ShapeMismatch {
                what: "AmpPosterior curvature",
                expected: n * n,
                got: curvature.len(),
            });
        }
        if rhs.len() != n {
            return Err(SamplerError::ShapeMismatch {
                what: "AmpPosterior rhs",
                expected: n,
                got: rhs.len(),
            });
        }
        if n == 0 {
            return Ok(Self {
                dof,
                curvature,
                cov: Array2::zeros((0, 0)),
                cov_sqrt: Array2::zeros((0, 0)),
                curv_sqrt: Array2::zeros((0, 0)),
                mean: rhs,
                log_det: 0.0,
                n_discarded: 0,
            });
        }
        let eig = SymEigen::new(curvature.view(), EIG_RLIM)?;
        let n_discarded = eig.n_discarded();
        if n_discarded > 0 {
            log::trace!("amplitude posterior: {n_discarded} of {n} directions unconstrained");
        }
        let cov = eig.pow(-1.0);
        let mean = cov.dot(&rhs);
        Ok(Self {
            dof,
            cov_sqrt: eig.pow(-0.5),
            curv_sqrt: eig.pow(0.5),
            log_det: eig.log_det(),
            curvature,
            cov,
            mean,
            n_discarded,
        })
    }

    /// Number of sampled amplitudes.
    pub fn n(&self) -> usize {
        self.dof.n()
    }

    pub fn dof(&self) -> &Dof {
        &self.dof
    }

    /// Posterior mean in flat DOF order.
    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    pub fn curvature(&self) -> &Array2<f64> {
        &self.curvature
    }

    pub fn covariance(&self) -> &Array2<f64> {
        &self.cov
    }

    /// `Σ ln|λ|` of the curvature; zero when empty.
    pub fn log_det(&self) -> f64 {
        self.log_det
    }

    pub fn n_discarded(&self) -> usize {
        self.n_discarded
    }

    /// Posterior mean unzipped to `[n_src, n_comp]`, zero outside the mask.
    pub fn mean_amplitudes(&self) -> Result<Array2<f64>> {
        self.dof.unzip(self.mean.view())
    }

    /// A standard normal vector in whitened coordinates.
    pub fn draw_standard<R: Rng>(&self, rng: &mut R) -> Array1<f64> {
        Array1::from_shape_simple_fn(self.n(), || rng.sample(StandardNormal))
    }

    /// Maps whitened coordinates `r` to amplitudes `mean + A^{-1/2} r`.
    pub fn standard_to_amplitudes(&self, r: ArrayView1<f64>) -> Result<Array2<f64>> {
        if r.len() != self.n() {
            return Err(SamplerError::ShapeMismatch {
                what: "AmpPosterior::standard_to_amplitudes",
                expected: self.n(),
                got: r.len(),
            });
        }
        let flat = &self.mean + &self.cov_sqrt.dot(&r);
        self.dof.unzip(flat.view())
    }

    /// Inverse of [`AmpPosterior::standard_to_amplitudes`] on the constrained subspace.
    pub fn amplitudes_to_standard(&self, amp: &Array2<f64>) -> Result<Array1<f64>> {
        let flat = self.dof.zip(amp.view())?;
        Ok(self.curv_sqrt.dot(&(flat - &self.mean)))
    }

    /// One draw from the posterior, `[n_src, n_comp]`.
    pub fn draw<R: Rng>(&self, rng: &mut R) -> Result<Array2<f64>> {
        let r = self.draw_standard(rng);
        self.standard_to_amplitudes(r.view())
    }

    /// `½ xᵀ A x` for a flat amplitude vector.
    pub fn quadratic_form(&self, x: ArrayView1<f64>) -> Result<f64> {
        if x.len() != self.n() {
            return Err(SamplerError::ShapeMismatch {
                what: "AmpPosterior::quadratic_form",
                expected: self.n(),
                got: x.len(),
            });
        }
        Ok(0.5 * x.dot(&self.curvature.dot(&x)))
    }
}
