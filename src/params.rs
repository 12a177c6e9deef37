/*!
# Source parameters.

[`Parameters`] keeps every physical quantity as a fiducial value (from the catalog) plus a
relative offset that the sampler moves:

- position: per-source fiducial `[n, 2]` plus one shared offset `[2]`,
- beam: per-source fiducial `(σ₀, σ₁, φ)` `[n, 3]` plus one shared relative beam `[3]`
  (unit widths and zero angle leave the fiducial beam unchanged),
- amplitude: per-source fiducial `[n, c]` plus relative `[n, c]`.

The projection operators never see this split. [`Parameters::model`] assembles the
[`ModelParams`] they consume, composing beams with [`crate::beam::combine`].
*/

use ndarray::{Array1, Array2, ArrayView2, Axis};

use crate::beam::{self, CompressedBeam};
use crate::error::{Result, SamplerError};

/// Absolute per-source parameters handed to the projection operators.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelParams {
    /// Source positions, `[n, 2]`.
    pub pos: Array2<f64>,
    /// Source amplitudes, `[n, c]`.
    pub amp: Array2<f64>,
    /// Compressed inverse-covariance beams, `[n, 3]`.
    pub beam: Array2<f64>,
}

impl ModelParams {
    pub fn n_src(&self) -> usize {
        self.amp.nrows()
    }

    pub fn n_comp(&self) -> usize {
        self.amp.ncols()
    }

    /// Compressed beam of source `si`.
    pub fn beam_of(&self, si: usize) -> CompressedBeam {
        [self.beam[[si, 0]], self.beam[[si, 1]], self.beam[[si, 2]]]
    }

    /// The same geometry with amplitudes replaced by `amp`.
    pub fn with_amplitudes(&self, amp: Array2<f64>) -> Result<Self> {
        if amp.dim() != self.amp.dim() {
            return Err(SamplerError::ShapeMismatch {
                what: "ModelParams::with_amplitudes",
                expected: self.amp.len(),
                got: amp.len(),
            });
        }
        Ok(Self {
            pos: self.pos.clone(),
            amp,
            beam: self.beam.clone(),
        })
    }
}

/// Fiducial and relative source parameters, plus the strong mask and source groups.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameters {
    pub pos_fid: Array2<f64>,
    pub beam_fid: Array2<f64>,
    pub amp_fid: Array2<f64>,
    pub pos_rel: Array1<f64>,
    pub beam_rel: Array1<f64>,
    pub amp_rel: Array2<f64>,
    /// Amplitudes that are explicitly sampled rather than held fixed, `[n, c]`.
    pub strong: Array2<bool>,
    /// Clusters of sources sharing data, see [`crate::grouping`].
    pub groups: Vec<Vec<usize>>,
}

impl Parameters {
    /// Builds parameters at the fiducial point: zero offset, identity relative beam,
    /// zero relative amplitudes, every amplitude strong and all sources in one group.
    pub fn new(pos_fid: Array2<f64>, beam_fid: Array2<f64>, amp_fid: Array2<f64>) -> Result<Self> {
        let n = amp_fid.nrows();
        if pos_fid.dim() != (n, 2) {
            return Err(SamplerError::ShapeMismatch {
                what: "Parameters::new pos_fid",
                expected: 2 * n,
                got: pos_fid.len(),
            });
        }
        if beam_fid.dim() != (n, 3) {
            return Err(SamplerError::ShapeMismatch {
                what: "Parameters::new beam_fid",
                expected: 3 * n,
                got: beam_fid.len(),
            });
        }
        Ok(Self {
            pos_rel: Array1::zeros(2),
            beam_rel: Array1::from(vec![1.0, 1.0, 0.0]),
            amp_rel: Array2::zeros(amp_fid.dim()),
            strong: Array2::from_elem(amp_fid.dim(), true),
            groups: vec![(0..n).collect()],
            pos_fid,
            beam_fid,
            amp_fid,
        })
    }

    pub fn n_src(&self) -> usize {
        self.amp_fid.nrows()
    }

    pub fn n_comp(&self) -> usize {
        self.amp_fid.ncols()
    }

    /// Absolute amplitudes `fid + rel`.
    pub fn amplitudes(&self) -> Array2<f64> {
        &self.amp_fid + &self.amp_rel
    }

    /// Absolute model parameters at the current relative offsets.
    pub fn model(&self) -> ModelParams {
        let pos = &self.pos_fid + &self.pos_rel.view().insert_axis(Axis(0));
        let rel = beam::compress([self.beam_rel[0], self.beam_rel[1]], self.beam_rel[2]);
        let mut beam = Array2::zeros((self.n_src(), 3));
        for (si, mut row) in beam.rows_mut().into_iter().enumerate() {
            let b = &self.beam_fid;
            let fid = beam::compress([b[[si, 0]], b[[si, 1]]], b[[si, 2]]);
            let combined = beam::combine(&[fid, rel]);
            row.assign(&Array1::from(combined.to_vec()));
        }
        ModelParams {
            pos,
            amp: self.amplitudes(),
            beam,
        }
    }

    /// Beam area of each source under the stretch model: product of fiducial widths times
    /// product of relative widths.
    pub fn area(&self) -> Array1<f64> {
        let rel = self.beam_rel[0] * self.beam_rel[1];
        self.beam_fid
            .rows()
            .into_iter()
            .map(|r| r[0] * r[1] * rel)
            .collect()
    }

    /// A copy with new relative position and beam. Relative amplitudes are rescaled so that
    /// every source keeps its integrated flux (`amplitude ∝ 1 / area`).
    pub fn with_pos_beam(&self, pos_rel: Array1<f64>, beam_rel: Array1<f64>) -> Self {
        let old_area = self.area();
        let mut next = self.clone();
        next.pos_rel = pos_rel;
        next.beam_rel = beam_rel;
        let ratio = &next.area() / &old_area;
        let total = self.amplitudes() / &ratio.view().insert_axis(Axis(1));
        next.amp_rel = total - &next.amp_fid;
        next
    }

    /// A copy whose absolute amplitudes equal `amp`.
    pub fn with_amplitudes(&self, amp: ArrayView2<f64>) -> Result<Self> {
        if amp.dim() != self.amp_fid.dim() {
            return Err(SamplerError::ShapeMismatch {
                what: "Parameters::with_amplitudes",
                expected: self.amp_fid.len(),
                got: amp.len(),
            });
        }
        let mut next = self.clone();
        next.amp_rel = &amp - &self.amp_fid;
        Ok(next)
    }

    /// Model parameters with the amplitudes selected by `mask` set to zero.
    pub fn model_without(&self, mask: &Array2<bool>) -> ModelParams {
        let mut model = self.model();
        ndarray::Zip::from(&mut model.amp)
            .and(mask)
            .for_each(|a, &m| {
                if m {
                    *a = 0.0;
                }
            });
        model
    }

    /// Whether any amplitude is held fixed (not strong).
    pub fn has_weak(&self) -> bool {
        self.strong.iter().any(|&s| !s)
    }
}
