/*!
# Adaptive hybrid sampler.

[`HybridSampler`] alternates two kinds of update:

1. Metropolis steps over the shared position offset and relative beam. Each proposal is scored
   by the prior plus the marginal posterior of the target, with the strong amplitudes
   integrated out and the weak ones held at their current values.
2. A Gibbs draw of every amplitude from its Gaussian posterior at the current position and
   beam.

One call to [`HybridSampler::draw`] runs `thin` Metropolis steps followed by one amplitude draw.
The random-walk scales can be tuned towards a target acceptance ratio with
[`HybridSampler::adjust`], which [`HybridSampler::run`] calls periodically during burn-in.

The chain starts with a log-posterior of `-∞`, so the first proposal with finite posterior is
always accepted.

```rust
use ndarray::{array, Array2};
use rand::rngs::SmallRng;
use ptsrc_mcmc::error::Result;
use ptsrc_mcmc::params::Parameters;
use ptsrc_mcmc::sampler::{HybridSampler, MarginalTarget, RunSchedule};

/// Standard normal in the first offset coordinate.
struct Toy;

impl MarginalTarget for Toy {
    fn log_marginal(&self, p: &Parameters) -> Result<f64> {
        Ok(-0.5 * p.pos_rel[0] * p.pos_rel[0])
    }
    fn draw_amplitudes(&self, p: &Parameters, _rng: &mut SmallRng) -> Result<Array2<f64>> {
        Ok(p.amplitudes())
    }
}

let params = Parameters::new(array![[0.0, 0.0]], array![[1.0, 1.0, 0.0]], array![[1.0]]).unwrap();
let mut sampler = HybridSampler::new(Toy, params, array![1.0, 0.0], array![0.0, 0.0, 0.0]).seed(42);
let chain = sampler.run(&RunSchedule { n_samples: 100, burn_in: 50, ..Default::default() }).unwrap();
assert_eq!(chain.pos_rel.nrows(), 100);
```
*/

use ndarray::{s, Array1, Array2, Array3};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::config::{SamplerConfig, ARCMIN, DEGREE};
use crate::error::{Result, SamplerError};
use crate::params::Parameters;
use crate::proposal::{steps_for, BoxPrior, BoxedSteps, CauchySteps, FlatPrior, Prior, StepDistribution};

/// What the sampler needs from the data: a marginal posterior over position and beam, and the
/// conditional amplitude posterior to draw from.
pub trait MarginalTarget {
    /// Log-posterior of `params` with the strong amplitudes integrated out.
    fn log_marginal(&self, params: &Parameters) -> Result<f64>;

    /// One draw of every amplitude, `[n_src, n_comp]`, at the position and beam of `params`.
    fn draw_amplitudes(&self, params: &Parameters, rng: &mut SmallRng) -> Result<Array2<f64>>;
}

/// Phase of the sampler's update cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerState {
    /// Drawing a position/beam candidate.
    Proposing,
    /// Scoring the candidate.
    Evaluating,
    /// Metropolis test.
    AcceptReject,
    /// Gibbs draw of the amplitudes.
    AmplitudeDraw,
}

/// Iteration counts and adaptation settings for [`HybridSampler::run`].
#[derive(Debug, Clone, PartialEq)]
pub struct RunSchedule {
    pub n_samples: usize,
    pub burn_in: usize,
    /// Iterations between step-size adjustments.
    pub adapt_interval: usize,
    pub target_accept: f64,
    /// Adjustments are skipped until this many proposals have been tried.
    pub adapt_min_tries: usize,
    /// Keep adapting while samples are recorded.
    pub adapt_after_burn_in: bool,
}

impl Default for RunSchedule {
    fn default() -> Self {
        Self {
            n_samples: 500,
            burn_in: 100,
            adapt_interval: 25,
            target_accept: 0.25,
            adapt_min_tries: 10,
            adapt_after_burn_in: false,
        }
    }
}

/// Recorded post-burn-in samples.
#[derive(Debug, Clone, PartialEq)]
pub struct Chain {
    /// Position offsets, `[samples, 2]`.
    pub pos_rel: Array2<f64>,
    /// Relative beams `(σ₀, σ₁, φ)`, `[samples, 3]`.
    pub beam_rel: Array2<f64>,
    /// Absolute amplitudes, `[samples, n_src, n_comp]`.
    pub amp: Array3<f64>,
    /// Fraction of position/beam proposals accepted while recording.
    pub acceptance: f64,
}

impl Chain {
    pub fn n_samples(&self) -> usize {
        self.pos_rel.nrows()
    }

    /// All parameters side by side, one row per sample, in [`Chain::parameter_names`] order.
    pub fn flat_samples(&self) -> Array2<f64> {
        let (n, n_src, n_comp) = self.amp.dim();
        let mut out = Array2::zeros((n, 5 + n_src * n_comp));
        out.slice_mut(s![.., 0..2]).assign(&self.pos_rel);
        out.slice_mut(s![.., 2..5]).assign(&self.beam_rel);
        for (i, sample) in self.amp.outer_iter().enumerate() {
            for (k, &a) in sample.iter().enumerate() {
                out[[i, 5 + k]] = a;
            }
        }
        out
    }

    pub fn parameter_names(&self) -> Vec<String> {
        let (_, n_src, n_comp) = self.amp.dim();
        let mut names: Vec<String> = ["pos_rel_0", "pos_rel_1", "beam_rel_0", "beam_rel_1", "beam_angle"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        for si in 0..n_src {
            for c in 0..n_comp {
                names.push(format!("amp_{si}_{c}"));
            }
        }
        names
    }
}

/// Relative widths must be positive and every entry finite for the beam to be invertible.
fn valid_beam(beam_rel: &Array1<f64>) -> bool {
    beam_rel.iter().all(|v| v.is_finite()) && beam_rel[0] > 0.0 && beam_rel[1] > 0.0
}

/// Metropolis-within-Gibbs sampler over position offset, relative beam and amplitudes.
pub struct HybridSampler<T, P = FlatPrior, D = CauchySteps> {
    target: T,
    prior: P,
    steps: D,
    params: Parameters,
    /// Random-walk scale of the two offset coordinates.
    pub dpos: Array1<f64>,
    /// Random-walk scale of the relative beam `(σ₀, σ₁, φ)`.
    pub dbeam: Array1<f64>,
    nstep: usize,
    update_weak_baseline: bool,
    log_post: f64,
    ntry: usize,
    naccept: usize,
    state: SamplerState,
    rng: SmallRng,
}

impl<T: MarginalTarget> HybridSampler<T> {
    /// A sampler with a flat prior, Cauchy steps, one Metropolis step per draw and an
    /// entropy-seeded generator.
    pub fn new(target: T, params: Parameters, dpos: Array1<f64>, dbeam: Array1<f64>) -> Self {
        Self {
            target,
            prior: FlatPrior,
            steps: CauchySteps::default(),
            params,
            dpos,
            dbeam,
            nstep: 1,
            update_weak_baseline: true,
            log_post: f64::NEG_INFINITY,
            ntry: 0,
            naccept: 0,
            state: SamplerState::Proposing,
            rng: SmallRng::seed_from_u64(rand::rng().random::<u64>()),
        }
    }
}

impl<T: MarginalTarget> HybridSampler<T, BoxPrior, BoxedSteps> {
    /// A sampler set up from a run configuration: box prior, configured step kind, scales and
    /// thinning. The generator is seeded from `cfg.seed` when given.
    pub fn from_config(target: T, params: Parameters, cfg: &SamplerConfig) -> Self {
        let sampler = HybridSampler::new(
            target,
            params,
            Array1::from(cfg.pos_step.to_vec()),
            Array1::from(cfg.beam_step.to_vec()),
        )
        .with_prior(BoxPrior::from(&cfg.prior))
        .with_steps(steps_for(cfg.step_distribution))
        .thin(cfg.thin)
        .update_weak_baseline(cfg.update_weak_baseline);
        match cfg.seed {
            Some(seed) => sampler.seed(seed),
            None => sampler,
        }
    }
}

impl<T, P, D> HybridSampler<T, P, D>
where
    T: MarginalTarget,
    P: Prior,
    D: StepDistribution,
{
    pub fn with_prior<P2: Prior>(self, prior: P2) -> HybridSampler<T, P2, D> {
        HybridSampler {
            target: self.target,
            prior,
            steps: self.steps,
            params: self.params,
            dpos: self.dpos,
            dbeam: self.dbeam,
            nstep: self.nstep,
            update_weak_baseline: self.update_weak_baseline,
            log_post: self.log_post,
            ntry: self.ntry,
            naccept: self.naccept,
            state: self.state,
            rng: self.rng,
        }
    }

    pub fn with_steps<D2: StepDistribution>(self, steps: D2) -> HybridSampler<T, P, D2> {
        HybridSampler {
            target: self.target,
            prior: self.prior,
            steps,
            params: self.params,
            dpos: self.dpos,
            dbeam: self.dbeam,
            nstep: self.nstep,
            update_weak_baseline: self.update_weak_baseline,
            log_post: self.log_post,
            ntry: self.ntry,
            naccept: self.naccept,
            state: self.state,
            rng: self.rng,
        }
    }

    /// Metropolis steps per [`HybridSampler::draw`]. Values below one are raised to one.
    pub fn thin(mut self, nstep: usize) -> Self {
        self.nstep = nstep.max(1);
        self
    }

    /// Whether each amplitude draw replaces the weak-amplitude baseline.
    pub fn update_weak_baseline(mut self, update: bool) -> Self {
        self.update_weak_baseline = update;
        self
    }

    /// Reseeds the generator with `1 + seed`.
    pub fn seed(mut self, seed: u64) -> Self {
        self.rng = SmallRng::seed_from_u64(1 + seed);
        self
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    pub fn log_posterior(&self) -> f64 {
        self.log_post
    }

    pub fn state(&self) -> SamplerState {
        self.state
    }

    /// Proposals tried since the last adjustment.
    pub fn ntry(&self) -> usize {
        self.ntry
    }

    /// Proposals accepted since the last adjustment.
    pub fn naccept(&self) -> usize {
        self.naccept
    }

    /// Acceptance ratio since the last adjustment, zero before the first proposal.
    pub fn acceptance(&self) -> f64 {
        if self.ntry == 0 {
            0.0
        } else {
            self.naccept as f64 / self.ntry as f64
        }
    }

    fn check_scales(&self) -> Result<()> {
        if self.dpos.len() != 2 {
            return Err(SamplerError::ShapeMismatch {
                what: "HybridSampler dpos",
                expected: 2,
                got: self.dpos.len(),
            });
        }
        if self.dbeam.len() != 3 {
            return Err(SamplerError::ShapeMismatch {
                what: "HybridSampler dbeam",
                expected: 3,
                got: self.dbeam.len(),
            });
        }
        Ok(())
    }

    /// One Metropolis step over position offset and relative beam. Returns whether the
    /// proposal was accepted.
    pub fn draw_pos_beam(&mut self) -> Result<bool> {
        self.check_scales()?;
        self.state = SamplerState::Proposing;
        let pos_rel = &self.params.pos_rel + &(self.steps.sample(&mut self.rng, 2) * &self.dpos);
        let beam_rel = &self.params.beam_rel + &(self.steps.sample(&mut self.rng, 3) * &self.dbeam);
        let candidate = self.params.with_pos_beam(pos_rel, beam_rel);

        let mut accepted = false;
        let mut log_new = if valid_beam(&candidate.beam_rel) {
            self.prior.log_prior(&candidate)
        } else {
            log::trace!("rejected relative beam {}", candidate.beam_rel);
            f64::NEG_INFINITY
        };
        if log_new.is_finite() {
            self.state = SamplerState::Evaluating;
            log_new += self.target.log_marginal(&candidate)?;
            self.state = SamplerState::AcceptReject;
            let u: f64 = self.rng.random();
            if log_new - self.log_post > u.ln() {
                self.params = candidate;
                self.log_post = log_new;
                self.naccept += 1;
                accepted = true;
            }
        }
        self.ntry += 1;
        self.state = SamplerState::Proposing;
        Ok(accepted)
    }

    /// Gibbs draw of every amplitude at the current position and beam. The returned
    /// parameters carry the drawn amplitudes. When the weak baseline is updated they also
    /// become the sampler's state and the current log-posterior is rescored against them.
    pub fn draw_amps(&mut self) -> Result<Parameters> {
        self.state = SamplerState::AmplitudeDraw;
        let amp = self.target.draw_amplitudes(&self.params, &mut self.rng)?;
        let drawn = self.params.with_amplitudes(amp.view())?;
        if self.update_weak_baseline {
            self.params = drawn.clone();
            if self.params.has_weak() && self.log_post.is_finite() {
                self.log_post =
                    self.prior.log_prior(&self.params) + self.target.log_marginal(&self.params)?;
            }
        }
        self.state = SamplerState::Proposing;
        Ok(drawn)
    }

    /// `thin` Metropolis steps followed by one amplitude draw.
    pub fn draw(&mut self) -> Result<Parameters> {
        for _ in 0..self.nstep {
            self.draw_pos_beam()?;
        }
        self.draw_amps()
    }

    /// Rescales both step vectors by `clamp(acceptance / goal, ¼, 4)` and resets the
    /// counters. Nothing happens before `nmin` proposals have been tried.
    pub fn adjust(&mut self, goal: f64, nmin: usize) -> Option<f64> {
        if self.ntry < nmin.max(1) {
            return None;
        }
        let factor = (self.acceptance() / goal).clamp(0.25, 4.0);
        log::debug!("adjusted steps by {factor:.3}");
        self.dpos *= factor;
        self.dbeam *= factor;
        self.ntry = 0;
        self.naccept = 0;
        Some(factor)
    }

    /// Runs `burn_in` discarded iterations followed by `n_samples` recorded ones.
    pub fn run(&mut self, schedule: &RunSchedule) -> Result<Chain> {
        let n = schedule.n_samples;
        let (n_src, n_comp) = (self.params.n_src(), self.params.n_comp());
        let mut pos_rel = Array2::zeros((n, 2));
        let mut beam_rel = Array2::zeros((n, 3));
        let mut amp = Array3::zeros((n, n_src, n_comp));
        let interval = schedule.adapt_interval.max(1) as i64;
        let (mut tried, mut accepted) = (0, 0);

        for i in -(schedule.burn_in as i64)..n as i64 {
            if (i <= 0 || schedule.adapt_after_burn_in) && i.rem_euclid(interval) == 0 {
                self.adjust(schedule.target_accept, schedule.adapt_min_tries);
            }
            let (ntry0, nacc0) = (self.ntry, self.naccept);
            let p = self.draw()?;
            log::debug!(
                "{:6} {:5.3} {:8.3} {:8.3} {:8.4} {:8.4} {:8.2}",
                i + 1,
                self.acceptance(),
                p.pos_rel[0] / ARCMIN,
                p.pos_rel[1] / ARCMIN,
                p.beam_rel[0],
                p.beam_rel[1],
                (p.beam_rel[2] / DEGREE).rem_euclid(180.0)
            );
            if i >= 0 {
                let k = i as usize;
                tried += self.ntry - ntry0;
                accepted += self.naccept - nacc0;
                pos_rel.row_mut(k).assign(&p.pos_rel);
                beam_rel.row_mut(k).assign(&p.beam_rel);
                amp.slice_mut(s![k, .., ..]).assign(&p.amplitudes());
            }
        }
        Ok(Chain {
            pos_rel,
            beam_rel,
            amp,
            acceptance: if tried == 0 {
                0.0
            } else {
                accepted as f64 / tried as f64
            },
        })
    }
}
