//! Per-source signal-to-noise at the fiducial amplitudes, and the strong/weak split derived
//! from it.
//!
//! For source `s` and component `c` the squared S/N is `mᵀ N⁻¹ m` summed over the ranges of
//! `s`, with `m` the model of that amplitude alone. Sources in the same batch slot share no
//! ranges, so a whole slot is projected in one pass.

use ndarray::{s, Array2};

use crate::error::Result;
use crate::grouping::batch_slots;
use crate::params::Parameters;
use crate::scan::ScanModel;

/// Squared S/N of every fiducial amplitude, `[n_src, n_comp]`.
pub fn estimate_significance<S: ScanModel>(scan: &S, params: &Parameters) -> Result<Array2<f64>> {
    let model = params.model();
    let (n_src, n_comp) = (params.n_src(), params.n_comp());
    let mut sn = Array2::zeros((n_src, n_comp));
    for slot in batch_slots(&params.groups) {
        for c in 0..n_comp {
            let mut amp = Array2::zeros((n_src, n_comp));
            for &si in &slot {
                amp[[si, c]] = model.amp[[si, c]];
            }
            let mtod = scan.forward(&model.with_amplitudes(amp)?)?;
            let mut ntod = mtod.clone();
            scan.noise_weight(&mut ntod)?;
            for &si in &slot {
                sn[[si, c]] = scan
                    .source_ranges(si)
                    .iter()
                    .map(|&ri| {
                        let r = scan.range(ri);
                        mtod.slice(s![r.clone()]).dot(&ntod.slice(s![r]))
                    })
                    .sum();
            }
        }
    }
    Ok(sn)
}

/// Amplitudes whose squared S/N reaches `threshold²`.
pub fn classify_strong(sn: &Array2<f64>, threshold: f64) -> Array2<bool> {
    let limit = threshold * threshold;
    sn.mapv(|v| v >= limit)
}
