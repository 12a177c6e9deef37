/*!
# Scan data and the operators acting on it.

The sampler never reads detector files or evaluates pointing itself. It consumes a scan through
two traits:

- [`ScanData`]: the time-ordered data, per-detector noise and the bookkeeping of which sample
  ranges each source touches.
- [`ScanModel`]: the three linear operators the amplitude posterior is built from, forward
  projection `P`, its amplitude adjoint `Pᵀ`, and the noise weighting `N⁻¹`.

[`SrcScan`] is a self-contained implementation with an elliptical Gaussian profile per
source, a per-sample response for each flux component and white per-detector noise. It is
what the tests and the example pipeline run on; detector-format readers implement the traits
for their own types.
*/

use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2};
use std::ops::Range;

use crate::error::{Result, SamplerError};
use crate::params::ModelParams;

/// Read access to one scan's data and range bookkeeping.
pub trait ScanData {
    /// Identifier used in logs and output paths.
    fn id(&self) -> &str;
    fn n_det(&self) -> usize;
    /// Total number of samples in [`ScanData::tod`].
    fn n_samp(&self) -> usize;
    fn n_src(&self) -> usize;
    /// Flux components per source.
    fn n_comp(&self) -> usize;
    fn tod(&self) -> ArrayView1<'_, f64>;
    /// Inverse noise variance of each detector.
    fn noise_ivar(&self) -> ArrayView1<'_, f64>;
    fn n_ranges(&self) -> usize;
    /// Sample interval of range `ri`.
    fn range(&self, ri: usize) -> Range<usize>;
    /// Detector that recorded range `ri`.
    fn range_detector(&self, ri: usize) -> usize;
    /// Indices of the ranges source `si` contributes to.
    fn source_ranges(&self, si: usize) -> &[usize];
    /// A reduced scan holding only the sources in `keep`, renumbered in that order.
    fn select_sources(&self, keep: &[usize]) -> Result<Self>
    where
        Self: Sized;
}

/// Linear operators over a scan. All three must be fixed for the lifetime of a chain, and
/// `forward` must be linear in the amplitudes.
pub trait ScanModel: ScanData {
    /// Model time stream for the given absolute parameters.
    fn forward(&self, params: &ModelParams) -> Result<Array1<f64>>;
    /// Adjoint of [`ScanModel::forward`] with respect to the amplitudes, `[n_src, n_comp]`.
    fn backward(&self, tod: ArrayView1<f64>, params: &ModelParams) -> Result<Array2<f64>>;
    /// Applies the inverse noise covariance in place.
    fn noise_weight(&self, tod: &mut Array1<f64>) -> Result<()>;
}

/// Reference scan: sampled pointing per sample, Gaussian source profiles, white noise.
#[derive(Debug, Clone, PartialEq)]
pub struct SrcScan {
    id: String,
    tod: Array1<f64>,
    /// Sky position of every sample, `[n_samp, 2]`.
    point: Array2<f64>,
    /// Response of every sample to each flux component, `[n_samp, n_comp]`.
    phase: Array2<f64>,
    ranges: Vec<Range<usize>>,
    range_det: Vec<usize>,
    ivar: Array1<f64>,
    src_ranges: Vec<Vec<usize>>,
}

impl SrcScan {
    pub fn builder(id: &str, n_src: usize, n_comp: usize) -> SrcScanBuilder {
        SrcScanBuilder {
            id: id.to_string(),
            n_src,
            n_comp,
            ivar: Vec::new(),
            ranges: Vec::new(),
        }
    }

    /// Replaces the time-ordered data.
    pub fn set_tod(&mut self, tod: Array1<f64>) -> Result<()> {
        if tod.len() != self.n_samp() {
            return Err(SamplerError::ShapeMismatch {
                what: "SrcScan::set_tod",
                expected: self.n_samp(),
                got: tod.len(),
            });
        }
        self.tod = tod;
        Ok(())
    }

    pub fn with_tod(mut self, tod: Array1<f64>) -> Result<Self> {
        self.set_tod(tod)?;
        Ok(self)
    }

    pub fn pointing(&self) -> ArrayView2<'_, f64> {
        self.point.view()
    }

    fn check_params(&self, params: &ModelParams) -> Result<()> {
        if params.n_src() != self.n_src() || params.n_comp() != self.n_comp() {
            return Err(SamplerError::ShapeMismatch {
                what: "SrcScan model parameters",
                expected: self.n_src() * self.n_comp(),
                got: params.amp.len(),
            });
        }
        Ok(())
    }

    /// Profile value of source `si` at sample `t`.
    fn profile(&self, params: &ModelParams, si: usize, t: usize) -> f64 {
        let dx = self.point[[t, 0]] - params.pos[[si, 0]];
        let dy = self.point[[t, 1]] - params.pos[[si, 1]];
        let b = params.beam_of(si);
        (-0.5 * (b[0] * dx * dx + b[1] * dy * dy + 2.0 * b[2] * dx * dy)).exp()
    }
}

impl ScanData for SrcScan {
    fn id(&self) -> &str {
        &self.id
    }

    fn n_det(&self) -> usize {
        self.ivar.len()
    }

    fn n_samp(&self) -> usize {
        self.point.nrows()
    }

    fn n_src(&self) -> usize {
        self.src_ranges.len()
    }

    fn n_comp(&self) -> usize {
        self.phase.ncols()
    }

    fn tod(&self) -> ArrayView1<'_, f64> {
        self.tod.view()
    }

    fn noise_ivar(&self) -> ArrayView1<'_, f64> {
        self.ivar.view()
    }

    fn n_ranges(&self) -> usize {
        self.ranges.len()
    }

    fn range(&self, ri: usize) -> Range<usize> {
        self.ranges[ri].clone()
    }

    fn range_detector(&self, ri: usize) -> usize {
        self.range_det[ri]
    }

    fn source_ranges(&self, si: usize) -> &[usize] {
        &self.src_ranges[si]
    }

    fn select_sources(&self, keep: &[usize]) -> Result<Self> {
        if let Some(&bad) = keep.iter().find(|&&si| si >= self.n_src()) {
            return Err(SamplerError::Operator(format!(
                "scan {} has no source {bad}",
                self.id
            )));
        }
        let mut used = vec![false; self.n_ranges()];
        for &si in keep {
            for &ri in &self.src_ranges[si] {
                used[ri] = true;
            }
        }
        let mut remap = vec![usize::MAX; self.n_ranges()];
        let mut ranges = Vec::new();
        let mut range_det = Vec::new();
        let mut samples = Vec::new();
        let mut start = 0;
        for (ri, r) in self.ranges.iter().enumerate().filter(|(ri, _)| used[*ri]) {
            remap[ri] = ranges.len();
            ranges.push(start..start + r.len());
            range_det.push(self.range_det[ri]);
            samples.extend(r.clone());
            start += r.len();
        }
        let src_ranges = keep
            .iter()
            .map(|&si| self.src_ranges[si].iter().map(|&ri| remap[ri]).collect())
            .collect();
        Ok(Self {
            id: self.id.clone(),
            tod: self.tod.select(ndarray::Axis(0), &samples),
            point: self.point.select(ndarray::Axis(0), &samples),
            phase: self.phase.select(ndarray::Axis(0), &samples),
            ranges,
            range_det,
            ivar: self.ivar.clone(),
            src_ranges,
        })
    }
}

impl ScanModel for SrcScan {
    fn forward(&self, params: &ModelParams) -> Result<Array1<f64>> {
        self.check_params(params)?;
        let mut tod = Array1::zeros(self.n_samp());
        for si in 0..self.n_src() {
            let amp = params.amp.row(si);
            for &ri in &self.src_ranges[si] {
                for t in self.ranges[ri].clone() {
                    let resp = self.phase.row(t).dot(&amp);
                    tod[t] += resp * self.profile(params, si, t);
                }
            }
        }
        Ok(tod)
    }

    fn backward(&self, tod: ArrayView1<f64>, params: &ModelParams) -> Result<Array2<f64>> {
        self.check_params(params)?;
        if tod.len() != self.n_samp() {
            return Err(SamplerError::ShapeMismatch {
                what: "SrcScan::backward",
                expected: self.n_samp(),
                got: tod.len(),
            });
        }
        let mut amp = Array2::zeros((self.n_src(), self.n_comp()));
        for si in 0..self.n_src() {
            for &ri in &self.src_ranges[si] {
                for t in self.ranges[ri].clone() {
                    let w = tod[t] * self.profile(params, si, t);
                    amp.row_mut(si).scaled_add(w, &self.phase.row(t));
                }
            }
        }
        Ok(amp)
    }

    fn noise_weight(&self, tod: &mut Array1<f64>) -> Result<()> {
        if tod.len() != self.n_samp() {
            return Err(SamplerError::ShapeMismatch {
                what: "SrcScan::noise_weight",
                expected: self.n_samp(),
                got: tod.len(),
            });
        }
        for (r, &det) in self.ranges.iter().zip(&self.range_det) {
            let w = self.ivar[det];
            tod.slice_mut(s![r.clone()]).mapv_inplace(|x| x * w);
        }
        Ok(())
    }
}

struct RangeSpec {
    det: usize,
    sources: Vec<usize>,
    point: Array2<f64>,
    phase: Option<Array2<f64>>,
}

/// Assembles a [`SrcScan`] range by range.
///
/// ```rust
/// use ndarray::array;
/// use ptsrc_mcmc::scan::{ScanData, SrcScan};
///
/// let mut builder = SrcScan::builder("demo", 1, 1);
/// let det = builder.detector(2.0);
/// builder.range(det, &[0], array![[0.0, 0.0], [0.1, 0.0]], None);
/// let scan = builder.build().unwrap();
/// assert_eq!(scan.n_samp(), 2);
/// assert_eq!(scan.source_ranges(0), &[0]);
/// ```
pub struct SrcScanBuilder {
    id: String,
    n_src: usize,
    n_comp: usize,
    ivar: Vec<f64>,
    ranges: Vec<RangeSpec>,
}

impl SrcScanBuilder {
    /// Adds a detector with inverse noise variance `ivar`, returning its index.
    pub fn detector(&mut self, ivar: f64) -> usize {
        self.ivar.push(ivar);
        self.ivar.len() - 1
    }

    /// Adds a range of samples recorded by `det` that `sources` contribute to.
    ///
    /// `point` holds the sky position of each sample, `[len, 2]`. `phase` holds the
    /// response to each flux component, `[len, n_comp]`; `None` means unit response.
    pub fn range(
        &mut self,
        det: usize,
        sources: &[usize],
        point: Array2<f64>,
        phase: Option<Array2<f64>>,
    ) -> &mut Self {
        self.ranges.push(RangeSpec {
            det,
            sources: sources.to_vec(),
            point,
            phase,
        });
        self
    }

    /// Validates the ranges and lays them out back to back. The time stream starts at zero.
    pub fn build(&self) -> Result<SrcScan> {
        let n_samp: usize = self.ranges.iter().map(|r| r.point.nrows()).sum();
        let mut point = Array2::zeros((n_samp, 2));
        let mut phase = Array2::ones((n_samp, self.n_comp));
        let mut ranges = Vec::with_capacity(self.ranges.len());
        let mut range_det = Vec::with_capacity(self.ranges.len());
        let mut src_ranges = vec![Vec::new(); self.n_src];
        let mut start = 0;
        for (ri, spec) in self.ranges.iter().enumerate() {
            let len = spec.point.nrows();
            if spec.point.ncols() != 2 {
                return Err(SamplerError::Operator(format!(
                    "range {ri}: pointing needs 2 columns, got {}",
                    spec.point.ncols()
                )));
            }
            if spec.det >= self.ivar.len() {
                return Err(SamplerError::Operator(format!(
                    "range {ri}: unknown detector {}",
                    spec.det
                )));
            }
            point.slice_mut(s![start..start + len, ..]).assign(&spec.point);
            if let Some(ph) = &spec.phase {
                if ph.dim() != (len, self.n_comp) {
                    return Err(SamplerError::ShapeMismatch {
                        what: "SrcScanBuilder range phase",
                        expected: len * self.n_comp,
                        got: ph.len(),
                    });
                }
                phase.slice_mut(s![start..start + len, ..]).assign(ph);
            }
            for &si in &spec.sources {
                let list = src_ranges.get_mut(si).ok_or_else(|| {
                    SamplerError::Operator(format!("range {ri}: unknown source {si}"))
                })?;
                list.push(ri);
            }
            ranges.push(start..start + len);
            range_det.push(spec.det);
            start += len;
        }
        Ok(SrcScan {
            id: self.id.clone(),
            tod: Array1::zeros(n_samp),
            point,
            phase,
            ranges,
            range_det,
            ivar: Array1::from(self.ivar.clone()),
            src_ranges,
        })
    }
}
