/*!
# Amplitude curvature.

Builds the [`AmpPosterior`] of a set of amplitudes at fixed position and beam. The right-hand
side is one backward projection of the noise-weighted data. The curvature `Pᵀ N⁻¹ P` is never
formed from explicit operator matrices: it is probed column by column with unit impulses.
Probing every amplitude separately would cost one forward/backward pass per amplitude, so the
probes are batched. Pass `i` excites the `i`-th amplitude of every source group at once, and
because groups share no data their responses do not mix.
*/

use ndarray::{Array1, Array2, ArrayView1};

use crate::dof::Dof;
use crate::error::{Result, SamplerError};
use crate::grouping::groups_to_dof;
use crate::params::{ModelParams, Parameters};
use crate::posterior::AmpPosterior;
use crate::scan::ScanModel;

/// Posterior of the amplitudes selected by `mask` given `tod`, at the position and beam of
/// `params`. Amplitudes outside the mask are not modelled: subtract them from `tod` first.
pub fn amplitude_posterior<S: ScanModel>(
    scan: &S,
    tod: ArrayView1<f64>,
    params: &Parameters,
    mask: &Array2<bool>,
) -> Result<AmpPosterior> {
    let dof = Dof::new(mask.clone());
    if dof.n() == 0 {
        return AmpPosterior::new(Array2::zeros((0, 0)), Array1::zeros(0), dof);
    }
    let model = params.model();
    let mut weighted = tod.to_owned();
    scan.noise_weight(&mut weighted)?;
    let rhs = dof.zip(scan.backward(weighted.view(), &model)?.view())?;
    let dof_groups = groups_to_dof(&params.groups, &dof);
    let curvature = curvature_matrix(scan, &model, &dof, &dof_groups)?;
    AmpPosterior::new(curvature, rhs, dof)
}

/// `Pᵀ N⁻¹ P` over `dof`, probed in batches. Entries between different groups are left zero.
pub fn curvature_matrix<S: ScanModel>(
    scan: &S,
    model: &ModelParams,
    dof: &Dof,
    dof_groups: &[Vec<usize>],
) -> Result<Array2<f64>> {
    let n = dof.n();
    let covered: usize = dof_groups.iter().map(Vec::len).sum();
    if covered != n {
        return Err(SamplerError::ShapeMismatch {
            what: "curvature_matrix groups",
            expected: n,
            got: covered,
        });
    }
    let depth = dof_groups.iter().map(Vec::len).max().unwrap_or(0);
    let mut curvature = Array2::zeros((n, n));
    for i in 0..depth {
        let mut impulse = Array1::zeros(n);
        for &k in dof_groups.iter().filter_map(|g| g.get(i)) {
            impulse[k] = 1.0;
        }
        let probe = model.with_amplitudes(dof.unzip(impulse.view())?)?;
        let mut tod = scan.forward(&probe)?;
        scan.noise_weight(&mut tod)?;
        let response = dof.zip(scan.backward(tod.view(), model)?.view())?;
        for g in dof_groups {
            if let Some(&k) = g.get(i) {
                for &j in g {
                    curvature[[k, j]] = response[j];
                }
            }
        }
    }
    Ok(curvature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grouping::independent_groups;
    use crate::scan::{ScanData, SrcScan};
    use approx::assert_abs_diff_eq;
    use ndarray::{array, s, Array2};

    fn patch(cx: f64, cy: f64) -> Array2<f64> {
        Array2::from_shape_fn((49, 2), |(k, j)| {
            let v = (if j == 0 { k % 7 } else { k / 7 }) as f64;
            (if j == 0 { cx } else { cy }) + (v - 3.0) * 0.5
        })
    }

    /// Five sources with two components, overlapping in pairs.
    fn fixture() -> (SrcScan, Parameters) {
        let mut b = SrcScan::builder("curv", 5, 2);
        let d0 = b.detector(1.0);
        let d1 = b.detector(2.5);
        let wobble = |n: usize, f: f64| {
            Array2::from_shape_fn((n, 2), |(t, c)| if c == 0 { 1.0 } else { (t as f64 * f).sin() })
        };
        b.range(d0, &[0, 1], patch(0.0, 0.0), Some(wobble(49, 0.2)))
            .range(d1, &[0], patch(-0.5, 0.5), Some(wobble(49, 0.5)))
            .range(d0, &[2, 3], patch(4.0, 0.0), Some(wobble(49, 0.3)))
            .range(d1, &[4], patch(8.0, 0.0), Some(wobble(49, 0.7)));
        let scan = b.build().unwrap();
        let mut p = Parameters::new(
            array![[0.0, 0.0], [0.3, -0.2], [4.0, 0.0], [4.2, 0.4], [8.0, 0.0]],
            Array2::from_shape_fn((5, 3), |(_, j)| if j < 2 { 0.8 } else { 0.0 }),
            Array2::from_elem((5, 2), 1.0),
        )
        .unwrap();
        p.groups = independent_groups(&scan);
        (scan, p)
    }

    /// One forward/backward pass per amplitude.
    fn brute_force(scan: &SrcScan, p: &Parameters, dof: &Dof) -> Array2<f64> {
        let model = p.model();
        let mut out = Array2::zeros((dof.n(), dof.n()));
        for k in 0..dof.n() {
            let mut u = Array1::zeros(dof.n());
            u[k] = 1.0;
            let probe = model.with_amplitudes(dof.unzip(u.view()).unwrap()).unwrap();
            let mut t = scan.forward(&probe).unwrap();
            scan.noise_weight(&mut t).unwrap();
            let r = dof.zip(scan.backward(t.view(), &model).unwrap().view()).unwrap();
            out.slice_mut(s![k, ..]).assign(&r);
        }
        out
    }

    #[test]
    fn test_batched_matches_brute_force_and_is_symmetric() {
        let (scan, p) = fixture();
        assert_eq!(p.groups, vec![vec![0, 1], vec![2, 3], vec![4]]);
        let dof = Dof::new(array![
            [true, true],
            [true, false],
            [true, true],
            [false, true],
            [true, true]
        ]);
        let groups = groups_to_dof(&p.groups, &dof);
        let batched = curvature_matrix(&scan, &p.model(), &dof, &groups).unwrap();
        let exact = brute_force(&scan, &p, &dof);
        assert_abs_diff_eq!(batched, exact, epsilon = 1e-10);
        assert_abs_diff_eq!(batched, batched.t(), epsilon = 1e-10);
    }

    #[test]
    fn test_posterior_recovers_noise_free_amplitudes() {
        let (scan, p) = fixture();
        let truth = array![[3.0, 0.5], [2.0, -1.0], [1.5, 0.2], [4.0, 0.0], [2.5, 1.0]];
        let tod = scan.forward(&p.model().with_amplitudes(truth.clone()).unwrap()).unwrap();
        let scan = scan.with_tod(tod).unwrap();
        let post = amplitude_posterior(&scan, scan.tod(), &p, &p.strong).unwrap();
        assert_eq!(post.n(), 10);
        assert_abs_diff_eq!(post.mean_amplitudes().unwrap(), truth, epsilon = 1e-6);
    }

    #[test]
    fn test_empty_mask() {
        let (scan, p) = fixture();
        let post =
            amplitude_posterior(&scan, scan.tod(), &p, &Array2::from_elem((5, 2), false)).unwrap();
        assert_eq!(post.n(), 0);
        assert_eq!(post.log_det(), 0.0);
    }

    #[test]
    fn test_uncovered_dof_rejected() {
        let (scan, p) = fixture();
        let dof = Dof::full((5, 2));
        let partial = vec![vec![0, 1, 2, 3]];
        assert!(curvature_matrix(&scan, &p.model(), &dof, &partial).is_err());
    }
}
