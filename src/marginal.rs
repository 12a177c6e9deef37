/*!
# Marginal posterior over position and beam.

With the weak amplitudes held at their current values and the strong ones integrated out
analytically, the log-posterior of a position/beam proposal is

```text
log P = ½ x̂ᵀ A x̂  −  ½ rᵀ N⁻¹ r
```

where `r` is the data minus the weak-only model, `A` the strong-amplitude curvature and
`x̂ = A⁻¹ Pᵀ N⁻¹ r` the strong amplitude mean. The first term is the strong contribution
and the second the weak one. The curvature log-determinant is left out.
*/

use ndarray::{Array1, Array2, ArrayView1};
use rand::rngs::SmallRng;

use crate::curvature::amplitude_posterior;
use crate::error::Result;
use crate::params::{ModelParams, Parameters};
use crate::posterior::AmpPosterior;
use crate::sampler::MarginalTarget;
use crate::scan::ScanModel;

/// `tod - forward(model)`.
pub fn subtract_model<S: ScanModel>(
    scan: &S,
    tod: ArrayView1<f64>,
    model: &ModelParams,
) -> Result<Array1<f64>> {
    Ok(&tod - &scan.forward(model)?)
}

/// `-½ rᵀ N⁻¹ r` for the residual of `model`.
pub fn log_likelihood<S: ScanModel>(
    scan: &S,
    tod: ArrayView1<f64>,
    model: &ModelParams,
) -> Result<f64> {
    let resid = subtract_model(scan, tod, model)?;
    chisq_term(scan, &resid)
}

fn chisq_term<S: ScanModel>(scan: &S, resid: &Array1<f64>) -> Result<f64> {
    let mut weighted = resid.clone();
    scan.noise_weight(&mut weighted)?;
    Ok(-0.5 * resid.dot(&weighted))
}

/// Both terms of the marginal log-posterior and the strong-amplitude posterior they came from.
#[derive(Debug, Clone)]
pub struct MarginalPosterior {
    pub strong: f64,
    pub weak: f64,
    pub amplitudes: AmpPosterior,
}

impl MarginalPosterior {
    pub fn log_likelihood(&self) -> f64 {
        self.strong + self.weak
    }
}

/// Marginal log-posterior at `params`, strong amplitudes integrated out.
pub fn marginal_strong<S: ScanModel>(scan: &S, params: &Parameters) -> Result<MarginalPosterior> {
    let weak_model = params.model_without(&params.strong);
    let rest = subtract_model(scan, scan.tod(), &weak_model)?;
    let amplitudes = amplitude_posterior(scan, rest.view(), params, &params.strong)?;
    let strong = amplitudes.quadratic_form(amplitudes.mean().view())?;
    let weak = chisq_term(scan, &rest)?;
    Ok(MarginalPosterior {
        strong,
        weak,
        amplitudes,
    })
}

/// Marginal log-posterior on a regular grid of position offsets, everything else as in
/// `params`. Cell `[i, j]` is evaluated at the centre of the cell spanning
/// `lo[0]..hi[0]` along the first axis and `lo[1]..hi[1]` along the second.
pub fn grid_posterior<S: ScanModel>(
    scan: &S,
    params: &Parameters,
    lo: [f64; 2],
    hi: [f64; 2],
    shape: (usize, usize),
) -> Result<Array2<f64>> {
    let mut probs = Array2::zeros(shape);
    let centre = |k: usize, n: usize, a: usize| lo[a] + (k as f64 + 0.5) * (hi[a] - lo[a]) / n as f64;
    let mut p = params.clone();
    for i in 0..shape.0 {
        for j in 0..shape.1 {
            p.pos_rel = Array1::from(vec![centre(i, shape.0, 0), centre(j, shape.1, 1)]);
            let m = marginal_strong(scan, &p)?;
            probs[[i, j]] = m.log_likelihood();
            log::trace!(
                "grid {i:4} {j:4} {:9.3} {:9.3} {:9.3}",
                probs[[i, j]],
                m.strong,
                m.weak
            );
        }
    }
    Ok(probs)
}

/// The marginal posterior of a scan, as seen by the sampler.
pub struct ScanTarget<'a, S> {
    scan: &'a S,
}

impl<'a, S: ScanModel> ScanTarget<'a, S> {
    pub fn new(scan: &'a S) -> Self {
        Self { scan }
    }

    pub fn scan(&self) -> &S {
        self.scan
    }
}

impl<S: ScanModel> MarginalTarget for ScanTarget<'_, S> {
    fn log_marginal(&self, params: &Parameters) -> Result<f64> {
        Ok(marginal_strong(self.scan, params)?.log_likelihood())
    }

    fn draw_amplitudes(&self, params: &Parameters, rng: &mut SmallRng) -> Result<Array2<f64>> {
        let all = Array2::from_elem(params.strong.dim(), true);
        amplitude_posterior(self.scan, self.scan.tod(), params, &all)?.draw(rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grouping::independent_groups;
    use crate::proposal::{FlatPrior, GaussianSteps, Prior};
    use crate::sampler::HybridSampler;
    use crate::scan::{ScanData, SrcScan};
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use ndarray::array;
    use rand::SeedableRng;

    fn patch(cx: f64) -> Array2<f64> {
        Array2::from_shape_fn((81, 2), |(k, j)| {
            let v = (if j == 0 { k % 9 } else { k / 9 }) as f64;
            (if j == 0 { cx } else { 0.0 }) + (v - 4.0) * 0.4
        })
    }

    /// Two well separated sources, noise-free data at a known offset.
    fn fixture(offset: [f64; 2]) -> (SrcScan, Parameters) {
        let mut b = SrcScan::builder("marg", 2, 1);
        let d = b.detector(4.0);
        b.range(d, &[0], patch(0.0), None).range(d, &[1], patch(5.0), None);
        let scan = b.build().unwrap();
        let mut p = Parameters::new(
            array![[0.0, 0.0], [5.0, 0.0]],
            array![[0.7, 0.7, 0.0], [0.7, 0.7, 0.0]],
            array![[10.0], [6.0]],
        )
        .unwrap();
        p.groups = independent_groups(&scan);
        let truth = p.with_pos_beam(array![offset[0], offset[1]], array![1.0, 1.0, 0.0]);
        let tod = scan.forward(&truth.model()).unwrap();
        (scan.with_tod(tod).unwrap(), p)
    }

    /// Three separated sources observed at a shifted position, the middle one weak.
    fn mixed() -> (SrcScan, Parameters) {
        let mut b = SrcScan::builder("mixed", 3, 1);
        let d = b.detector(4.0);
        b.range(d, &[0], patch(0.0), None)
            .range(d, &[1], patch(5.0), None)
            .range(d, &[2], patch(10.0), None);
        let scan = b.build().unwrap();
        let mut p = Parameters::new(
            array![[0.0, 0.0], [5.0, 0.0], [10.0, 0.0]],
            array![[0.7, 0.7, 0.0], [0.7, 0.7, 0.0], [0.7, 0.7, 0.0]],
            array![[10.0], [6.0], [8.0]],
        )
        .unwrap();
        p.groups = independent_groups(&scan);
        let truth = p.with_pos_beam(array![0.1, -0.1], array![1.0, 1.0, 0.0]);
        let tod = scan.forward(&truth.model()).unwrap();
        p.strong = array![[true], [false], [true]];
        // weak amplitude away from the truth so the weak term is not trivially zero
        let p = p.with_amplitudes(array![[1.0], [4.0], [1.0]].view()).unwrap();
        (scan.with_tod(tod).unwrap(), p)
    }

    #[test]
    fn test_true_model_has_zero_residual() {
        let (scan, p) = fixture([0.0, 0.0]);
        assert_abs_diff_eq!(
            log_likelihood(&scan, scan.tod(), &p.model()).unwrap(),
            0.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_all_weak_is_plain_likelihood() {
        let (scan, mut p) = fixture([0.1, 0.0]);
        p.strong.fill(false);
        let m = marginal_strong(&scan, &p).unwrap();
        assert_eq!(m.strong, 0.0);
        assert_eq!(m.amplitudes.n(), 0);
        let direct = log_likelihood(&scan, scan.tod(), &p.model()).unwrap();
        assert_abs_diff_eq!(m.weak, direct, epsilon = 1e-9);
    }

    #[test]
    fn test_strong_marginal_profiles_out_amplitudes() {
        // with every amplitude strong, strong + weak is the likelihood at the best-fit
        // amplitudes, whatever the current amplitude values are
        let (scan, p) = fixture([0.0, 0.0]);
        let off = p.with_amplitudes(array![[1.0], [1.0]].view()).unwrap();
        let m = marginal_strong(&scan, &off).unwrap();
        assert_abs_diff_eq!(m.log_likelihood(), 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(
            m.amplitudes.mean_amplitudes().unwrap(),
            array![[10.0], [6.0]],
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_mixed_marginal_is_profile_likelihood() {
        // strong amplitudes at their conditional mean, weak ones as given
        let (scan, p) = mixed();
        let m = marginal_strong(&scan, &p).unwrap();
        assert_eq!(m.amplitudes.n(), 2);
        let best = m.amplitudes.mean_amplitudes().unwrap();
        assert_eq!(best[[1, 0]], 0.0);

        let mut plug = p.amplitudes();
        plug[[0, 0]] = best[[0, 0]];
        plug[[2, 0]] = best[[2, 0]];
        let profile = p.with_amplitudes(plug.view()).unwrap();
        let direct = log_likelihood(&scan, scan.tod(), &profile.model()).unwrap();
        assert!(direct < -1.0);
        assert_relative_eq!(m.log_likelihood(), direct, max_relative = 1e-8);

        let weak_only = log_likelihood(&scan, scan.tod(), &p.model_without(&p.strong)).unwrap();
        assert_relative_eq!(m.weak, weak_only, max_relative = 1e-10);
        assert!(m.strong > 0.0);
    }

    #[test]
    fn test_amplitude_draw_rescores_weak_baseline() {
        let (scan, p) = mixed();
        let mut s = HybridSampler::new(
            ScanTarget::new(&scan),
            p.clone(),
            array![0.01, 0.01],
            array![0.0, 0.0, 0.0],
        )
        .with_steps(GaussianSteps)
        .seed(5);
        // the first finite proposal is always taken
        assert!(s.draw_pos_beam().unwrap());
        let before = s.log_posterior();
        assert!(before.is_finite());

        let drawn = s.draw_amps().unwrap();
        assert_eq!(s.params().amplitudes(), drawn.amplitudes());
        assert_ne!(drawn.amplitudes()[[1, 0]], p.amplitudes()[[1, 0]]);
        let expected = FlatPrior.log_prior(&drawn) + s.target().log_marginal(&drawn).unwrap();
        assert_relative_eq!(s.log_posterior(), expected, max_relative = 1e-12);
        assert_ne!(s.log_posterior(), before);
    }

    #[test]
    fn test_grid_peaks_at_true_offset() {
        let (scan, p) = fixture([0.3, -0.3]);
        let grid = grid_posterior(&scan, &p, [-0.8, -0.8], [0.8, 0.8], (8, 8)).unwrap();
        let (best, _) = grid
            .indexed_iter()
            .fold(((0, 0), f64::NEG_INFINITY), |acc, (idx, &v)| {
                if v > acc.1 {
                    (idx, v)
                } else {
                    acc
                }
            });
        // cell centres are at -0.7, -0.5, ..., 0.7
        assert_eq!(best, (5, 2));
    }

    #[test]
    fn test_scan_target_draws_near_truth() {
        let (scan, p) = fixture([0.0, 0.0]);
        let target = ScanTarget::new(&scan);
        let mut rng = SmallRng::seed_from_u64(3);
        let amp = target.draw_amplitudes(&p, &mut rng).unwrap();
        assert_abs_diff_eq!(amp, array![[10.0], [6.0]], epsilon = 0.8);
        assert_eq!(target.scan().n_src(), 2);
    }
}
