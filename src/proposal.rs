/*!
# Proposal steps and priors for the position/beam walk.

The sampler perturbs the relative position and beam with `step · scale`, where `step` comes from
a [`StepDistribution`]. Heavy-tailed Cauchy steps are the default: most proposals stay local
while an occasional long jump escapes a poor starting point.

A [`Prior`] returns a log-density for a proposed [`Parameters`]. Returning `-∞` rejects the
proposal before the (expensive) marginal posterior is evaluated.

```rust
use ndarray::array;
use ptsrc_mcmc::params::Parameters;
use ptsrc_mcmc::proposal::{BoxPrior, Prior};

let p = Parameters::new(array![[0.0, 0.0]], array![[1.0, 1.0, 0.0]], array![[1.0]]).unwrap();
let prior = BoxPrior { pos_rel_max: 1.0, beam_rel_min: 0.5, beam_rel_max: 2.0, beam_ratio_max: None };
assert_eq!(prior.log_prior(&p), 0.0);

let far = p.with_pos_beam(array![2.0, 0.0], array![1.0, 1.0, 0.0]);
assert_eq!(prior.log_prior(&far), f64::NEG_INFINITY);
```
*/

use ndarray::Array1;
use rand::rngs::SmallRng;
use rand::Rng;
use rand_distr::{Cauchy, StandardNormal};

use crate::config::{PriorConfig, StepKind};
use crate::params::Parameters;

/// Source of unit-scale random-walk steps.
pub trait StepDistribution {
    /// `n` independent steps.
    fn sample(&mut self, rng: &mut SmallRng, n: usize) -> Array1<f64>;
}

/// Standard Cauchy steps.
#[derive(Debug, Clone, Copy)]
pub struct CauchySteps {
    dist: Cauchy<f64>,
}

impl Default for CauchySteps {
    fn default() -> Self {
        Self {
            dist: Cauchy::new(0.0, 1.0).expect("Expected a unit-scale Cauchy to be valid"),
        }
    }
}

impl StepDistribution for CauchySteps {
    fn sample(&mut self, rng: &mut SmallRng, n: usize) -> Array1<f64> {
        Array1::from_shape_simple_fn(n, || rng.sample(self.dist))
    }
}

/// Standard normal steps.
#[derive(Debug, Clone, Copy, Default)]
pub struct GaussianSteps;

impl StepDistribution for GaussianSteps {
    fn sample(&mut self, rng: &mut SmallRng, n: usize) -> Array1<f64> {
        Array1::from_shape_simple_fn(n, || rng.sample(StandardNormal))
    }
}

/// Step distribution chosen at run time.
pub type BoxedSteps = Box<dyn StepDistribution + Send>;

impl StepDistribution for BoxedSteps {
    fn sample(&mut self, rng: &mut SmallRng, n: usize) -> Array1<f64> {
        (**self).sample(rng, n)
    }
}

/// The step distribution configured by `kind`.
pub fn steps_for(kind: StepKind) -> BoxedSteps {
    match kind {
        StepKind::Cauchy => Box::new(CauchySteps::default()),
        StepKind::Gaussian => Box::new(GaussianSteps),
    }
}

/// Log prior density over position/beam proposals.
pub trait Prior {
    fn log_prior(&self, params: &Parameters) -> f64;
}

/// Improper flat prior.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatPrior;

impl Prior for FlatPrior {
    fn log_prior(&self, _params: &Parameters) -> f64 {
        0.0
    }
}

/// Uniform prior over a bounded region: offset radius, relative beam widths and,
/// optionally, their ratio.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxPrior {
    pub pos_rel_max: f64,
    pub beam_rel_min: f64,
    pub beam_rel_max: f64,
    pub beam_ratio_max: Option<f64>,
}

impl From<&PriorConfig> for BoxPrior {
    fn from(cfg: &PriorConfig) -> Self {
        Self {
            pos_rel_max: cfg.pos_rel_max,
            beam_rel_min: cfg.beam_rel_min,
            beam_rel_max: cfg.beam_rel_max,
            beam_ratio_max: cfg.beam_ratio_max,
        }
    }
}

impl Prior for BoxPrior {
    fn log_prior(&self, params: &Parameters) -> f64 {
        let radius = params.pos_rel.dot(&params.pos_rel).sqrt();
        let (w0, w1) = (params.beam_rel[0], params.beam_rel[1]);
        let in_band = |w: f64| w >= self.beam_rel_min && w <= self.beam_rel_max;
        if radius > self.pos_rel_max || !in_band(w0) || !in_band(w1) {
            return f64::NEG_INFINITY;
        }
        if let Some(max) = self.beam_ratio_max {
            if (w0 / w1).max(w1 / w0) > max {
                return f64::NEG_INFINITY;
            }
        }
        0.0
    }
}

impl<F> Prior for F
where
    F: Fn(&Parameters) -> f64,
{
    fn log_prior(&self, params: &Parameters) -> f64 {
        self(params)
    }
}
