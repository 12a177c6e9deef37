/*!
# Sampler configuration.

All numeric knobs of a run live in [`SamplerConfig`]. Every field has a default matching the
reference point-source fits, so a configuration file only needs to name what it changes:

```rust
use ptsrc_mcmc::config::SamplerConfig;

let cfg = SamplerConfig::from_json_str(r#"{ "n_samples": 200, "burn_in": 50 }"#).unwrap();
assert_eq!(cfg.n_samples, 200);
assert_eq!(cfg.thin, 3);
```

Angles are stored in radians. Use [`ARCMIN`] and [`DEGREE`] to convert.
*/

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, SamplerError};

/// One degree in radians.
pub const DEGREE: f64 = std::f64::consts::PI / 180.0;
/// One arcminute in radians.
pub const ARCMIN: f64 = DEGREE / 60.0;

/// Converts a Gaussian full width at half maximum to its standard deviation.
pub fn fwhm_to_sigma(fwhm: f64) -> f64 {
    fwhm / (8.0 * std::f64::consts::LN_2).sqrt()
}

/// Heavy-tailed or Gaussian random-walk steps for the position/beam proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Cauchy,
    Gaussian,
}

/// Hard prior bounds on the position offset and beam perturbation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorConfig {
    /// Maximum offset radius from the fiducial positions (radians).
    pub pos_rel_max: f64,
    /// Smallest allowed relative beam width.
    pub beam_rel_min: f64,
    /// Largest allowed relative beam width.
    pub beam_rel_max: f64,
    /// Largest allowed ratio between the two relative widths. `None`, the default, disables
    /// the check.
    pub beam_ratio_max: Option<f64>,
}

impl Default for PriorConfig {
    fn default() -> Self {
        Self {
            pos_rel_max: 4.0 * ARCMIN,
            beam_rel_min: 0.5,
            beam_rel_max: 2.0,
            beam_ratio_max: None,
        }
    }
}

/// Which catalog sources of a scan are kept for fitting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// A source needs strictly more data ranges than this to be kept.
    pub min_ranges: usize,
    /// Keep sources with non-positive catalog amplitude (clusters).
    pub allow_clusters: bool,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            min_ranges: 0x40,
            allow_clusters: false,
        }
    }
}

/// The numeric configuration record of a sampling run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Number of recorded samples.
    pub n_samples: usize,
    /// Number of discarded leading iterations.
    pub burn_in: usize,
    /// Position/beam Metropolis steps per recorded amplitude draw.
    pub thin: usize,
    /// A source is strong when its S/N reaches this value.
    pub strong_threshold: f64,
    /// Number of burn-in iterations between step-size adaptations.
    pub adapt_interval: usize,
    /// Acceptance ratio the adaptation aims for.
    pub target_accept: f64,
    /// Adaptation is skipped while fewer proposals than this were made.
    pub adapt_min_tries: usize,
    /// Keep adapting after burn-in. Off by default so recorded samples use a fixed proposal.
    pub adapt_after_burn_in: bool,
    /// Initial position step (radians).
    pub pos_step: [f64; 2],
    /// Initial beam step: two relative widths and the angle (radians).
    pub beam_step: [f64; 3],
    pub step_distribution: StepKind,
    /// Fiducial beam FWHM assigned to every source (radians).
    pub beam_fwhm: f64,
    /// Each amplitude draw becomes the new fixed baseline for weak sources.
    pub update_weak_baseline: bool,
    /// Base seed. `None` seeds from entropy.
    pub seed: Option<u64>,
    /// Skip scans whose output already exists.
    pub resume: bool,
    pub prior: PriorConfig,
    pub selection: SelectionConfig,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            n_samples: 500,
            burn_in: 100,
            thin: 3,
            strong_threshold: 3.0,
            adapt_interval: 25,
            target_accept: 0.25,
            adapt_min_tries: 10,
            adapt_after_burn_in: false,
            pos_step: [0.1 * ARCMIN, 0.1 * ARCMIN],
            beam_step: [0.1, 0.1, 20.0 * DEGREE],
            step_distribution: StepKind::Cauchy,
            beam_fwhm: 1.4 * ARCMIN,
            update_weak_baseline: true,
            seed: None,
            resume: false,
            prior: PriorConfig::default(),
            selection: SelectionConfig::default(),
        }
    }
}

impl SamplerConfig {
    /// Parses a JSON document; missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let cfg: SamplerConfig = serde_json::from_str(json)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reads and parses a JSON configuration file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.thin == 0 {
            return Err(SamplerError::Config("thin must be at least 1".into()));
        }
        if self.adapt_interval == 0 {
            return Err(SamplerError::Config(
                "adapt_interval must be at least 1".into(),
            ));
        }
        if !(self.target_accept > 0.0 && self.target_accept < 1.0) {
            return Err(SamplerError::Config(format!(
                "target_accept must lie in (0, 1), got {}",
                self.target_accept
            )));
        }
        if self.strong_threshold < 0.0 {
            return Err(SamplerError::Config(
                "strong_threshold must be non-negative".into(),
            ));
        }
        if self.beam_fwhm <= 0.0 {
            return Err(SamplerError::Config("beam_fwhm must be positive".into()));
        }
        let p = &self.prior;
        if !(p.beam_rel_min > 0.0 && p.beam_rel_min <= 1.0 && p.beam_rel_max >= 1.0) {
            return Err(SamplerError::Config(format!(
                "beam band [{}, {}] must be positive and contain 1",
                p.beam_rel_min, p.beam_rel_max
            )));
        }
        if p.pos_rel_max <= 0.0 {
            return Err(SamplerError::Config("pos_rel_max must be positive".into()));
        }
        Ok(())
    }

    /// The run schedule implied by this configuration.
    pub fn schedule(&self) -> crate::sampler::RunSchedule {
        crate::sampler::RunSchedule {
            n_samples: self.n_samples,
            burn_in: self.burn_in,
            adapt_interval: self.adapt_interval,
            target_accept: self.target_accept,
            adapt_min_tries: self.adapt_min_tries,
            adapt_after_burn_in: self.adapt_after_burn_in,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_defaults_match_reference_run() {
        let cfg = SamplerConfig::default();
        assert_eq!(cfg.n_samples, 500);
        assert_eq!(cfg.burn_in, 100);
        assert_eq!(cfg.thin, 3);
        assert_eq!(cfg.selection.min_ranges, 64);
        assert_eq!(cfg.step_distribution, StepKind::Cauchy);
        assert_relative_eq!(cfg.prior.pos_rel_max, 4.0 * ARCMIN);
        assert_eq!(cfg.prior.beam_ratio_max, None);
        cfg.validate().unwrap();
    }

    #[test]
    fn test_ratio_cap_is_opt_in() {
        use crate::params::Parameters;
        use crate::proposal::{BoxPrior, Prior};
        use ndarray::array;

        let p = Parameters::new(array![[0.0, 0.0]], array![[1.0, 1.0, 0.0]], array![[1.0]])
            .unwrap()
            .with_pos_beam(array![0.0, 0.0], array![0.55, 1.98, 0.0]);
        // both widths inside the default band, ratio 3.6
        assert_eq!(BoxPrior::from(&PriorConfig::default()).log_prior(&p), 0.0);

        let capped = SamplerConfig::from_json_str(r#"{"prior": {"beam_ratio_max": 2.5}}"#).unwrap();
        assert_eq!(capped.prior.beam_ratio_max, Some(2.5));
        assert_eq!(
            BoxPrior::from(&capped.prior).log_prior(&p),
            f64::NEG_INFINITY
        );
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let cfg = SamplerConfig::from_json_str(
            r#"{"thin": 1, "step_distribution": "gaussian", "prior": {"beam_rel_max": 3.0}}"#,
        )
        .unwrap();
        assert_eq!(cfg.thin, 1);
        assert_eq!(cfg.step_distribution, StepKind::Gaussian);
        assert_relative_eq!(cfg.prior.beam_rel_max, 3.0);
        assert_relative_eq!(cfg.prior.beam_rel_min, 0.5);
        assert_eq!(cfg.burn_in, 100);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = SamplerConfig::from_json_str(r#"{"target_accept": 1.5}"#).unwrap_err();
        assert!(err.is_fatal());
        assert!(SamplerConfig::from_json_str(r#"{"thin": 0}"#).is_err());
        assert!(SamplerConfig::from_json_str(r#"{"prior": {"beam_rel_min": 1.5}}"#).is_err());
    }

    #[test]
    fn test_fwhm_to_sigma() {
        assert_relative_eq!(fwhm_to_sigma(2.354_820_045), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_json_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        let mut cfg = SamplerConfig::default();
        cfg.seed = Some(7);
        std::fs::write(&path, serde_json::to_string(&cfg).unwrap()).unwrap();
        assert_eq!(SamplerConfig::from_json_file(&path).unwrap(), cfg);
    }
}
