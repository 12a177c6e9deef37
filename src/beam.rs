//! Elliptical Gaussian beams and the rule for composing a fiducial beam with a relative
//! perturbation.
//!
//! A beam is described by two widths and an orientation. The projection operators consume it
//! in compressed form: the three independent entries `[C₀₀, C₁₁, C₀₁]` of the inverse
//! covariance `C = R(φ) diag(σ₀⁻², σ₁⁻²) R(φ)ᵀ`.

use nalgebra::{Matrix2, SymmetricEigen};

/// Compressed inverse-covariance form of a beam.
pub type CompressedBeam = [f64; 3];

/// Compresses widths `sigma` and orientation `angle` (radians).
pub fn compress(sigma: [f64; 2], angle: f64) -> CompressedBeam {
    let (s, c) = angle.sin_cos();
    let d0 = sigma[0].powi(-2);
    let d1 = sigma[1].powi(-2);
    [
        c * c * d0 + s * s * d1,
        s * s * d0 + c * c * d1,
        c * s * (d0 - d1),
    ]
}

/// Recovers widths and orientation from a compressed beam.
///
/// The orientation is only defined modulo π, and is arbitrary for circular beams.
pub fn expand(beam: CompressedBeam) -> ([f64; 2], f64) {
    let eig = SymmetricEigen::new(as_matrix(beam));
    let v = eig.eigenvectors.column(0);
    let angle = v[1].atan2(v[0]);
    let sigma = [
        eig.eigenvalues[0].max(f64::MIN_POSITIVE).powf(-0.5),
        eig.eigenvalues[1].max(f64::MIN_POSITIVE).powf(-0.5),
    ];
    (sigma, angle)
}

/// Composes beams left to right: each successive beam stretches the accumulated one.
///
/// Composing with the identity beam (unit widths) leaves a beam unchanged, and composing
/// with a circular beam of width `s` multiplies every width by `s`.
pub fn combine(beams: &[CompressedBeam]) -> CompressedBeam {
    let mut total = Matrix2::<f64>::identity();
    for &beam in beams {
        let b = sqrt_psd(as_matrix(beam));
        total = b * total * b.transpose();
    }
    [total[(0, 0)], total[(1, 1)], total[(0, 1)]]
}

fn as_matrix(beam: CompressedBeam) -> Matrix2<f64> {
    Matrix2::new(beam[0], beam[2], beam[2], beam[1])
}

fn sqrt_psd(m: Matrix2<f64>) -> Matrix2<f64> {
    let eig = SymmetricEigen::new(m);
    let roots = eig.eigenvalues.map(|e| e.max(0.0).sqrt());
    eig.eigenvectors * Matrix2::from_diagonal(&roots) * eig.eigenvectors.transpose()
}
