/*!
# Processing one scan.

[`process_scan`] takes a scan and the catalog entries of the sources it may contain through
the whole fit:

1. keep the sources with enough data ([`crate::selection::select_sources`]),
2. build fiducial [`Parameters`] from the catalog, with a common circular beam,
3. group sources that share data ([`crate::grouping::independent_groups`]),
4. estimate each amplitude's S/N and mark the strong ones,
5. run the [`HybridSampler`] on the scan's marginal posterior.
*/

use ndarray::{Array2, Axis};

use crate::config::{fwhm_to_sigma, SamplerConfig};
use crate::error::{Result, SamplerError};
use crate::grouping::independent_groups;
use crate::marginal::ScanTarget;
use crate::params::Parameters;
use crate::sampler::{Chain, HybridSampler};
use crate::scan::ScanModel;
use crate::selection::select_sources;
use crate::significance::{classify_strong, estimate_significance};

/// Fiducial source positions (radians) and amplitudes, one row per source.
#[derive(Debug, Clone, PartialEq)]
pub struct Catalog {
    pub pos: Array2<f64>,
    /// `[n_src, n_comp]`. The first column decides whether a source is a cluster.
    pub amp: Array2<f64>,
}

impl Catalog {
    pub fn new(pos: Array2<f64>, amp: Array2<f64>) -> Result<Self> {
        if pos.dim() != (amp.nrows(), 2) {
            return Err(SamplerError::ShapeMismatch {
                what: "Catalog positions",
                expected: 2 * amp.nrows(),
                got: pos.len(),
            });
        }
        if amp.ncols() == 0 {
            return Err(SamplerError::Config(
                "catalog needs at least one amplitude column".into(),
            ));
        }
        Ok(Self { pos, amp })
    }

    pub fn n_src(&self) -> usize {
        self.amp.nrows()
    }

    /// The entries at `indices`, in that order.
    pub fn subset(&self, indices: &[usize]) -> Self {
        Self {
            pos: self.pos.select(Axis(0), indices),
            amp: self.amp.select(Axis(0), indices),
        }
    }

    /// Fiducial parameters for `n_comp` components with a circular beam of the given FWHM.
    pub fn fiducial_parameters(&self, n_comp: usize, beam_fwhm: f64) -> Result<Parameters> {
        if n_comp > self.amp.ncols() {
            return Err(SamplerError::ShapeMismatch {
                what: "Catalog::fiducial_parameters components",
                expected: n_comp,
                got: self.amp.ncols(),
            });
        }
        let sigma = fwhm_to_sigma(beam_fwhm);
        let beam = Array2::from_shape_fn((self.n_src(), 3), |(_, j)| if j < 2 { sigma } else { 0.0 });
        let amp = self.amp.slice(ndarray::s![.., ..n_comp]).to_owned();
        Parameters::new(self.pos.clone(), beam, amp)
    }
}

/// Everything a fit of one scan produces.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanOutput {
    pub id: String,
    /// Catalog indices of the fitted sources.
    pub sources: Vec<usize>,
    /// Squared S/N at the fiducial amplitudes, `[n_fitted, n_comp]`.
    pub significance: Array2<f64>,
    pub strong: Array2<bool>,
    pub chain: Chain,
}

/// Selects, classifies and samples the sources of `scan`.
pub fn process_scan<S: ScanModel>(
    scan: &S,
    catalog: &Catalog,
    cfg: &SamplerConfig,
) -> Result<ScanOutput> {
    cfg.validate()?;
    let (scan, sources) = select_sources(scan, catalog, &cfg.selection)?;
    let mut params = catalog
        .subset(&sources)
        .fiducial_parameters(scan.n_comp(), cfg.beam_fwhm)?;
    params.groups = independent_groups(&scan);

    let significance = estimate_significance(&scan, &params)?;
    let strong = classify_strong(&significance, cfg.strong_threshold);
    let strong_sn: Vec<String> = significance
        .iter()
        .zip(strong.iter())
        .filter(|(_, s)| **s)
        .map(|(sn, _)| format!("{:.1}", sn.sqrt()))
        .collect();
    log::info!(
        "{}: SN {:.1}, strong: {}",
        scan.id(),
        significance.sum().sqrt(),
        strong_sn.join(",")
    );
    params.strong = strong.clone();

    let mut sampler = HybridSampler::from_config(ScanTarget::new(&scan), params, cfg);
    let chain = sampler.run(&cfg.schedule())?;
    log::debug!("{}: acceptance {:.3}", scan.id(), chain.acceptance);

    Ok(ScanOutput {
        id: scan.id().to_string(),
        sources,
        significance,
        strong,
        chain,
    })
}
