//! # ptsrc-mcmc
//!
//! Markov chain Monte Carlo fits of point sources in time-ordered data. For each scan the
//! sampler explores a common position offset, a common relative beam and every source's
//! flux amplitudes:
//!
//! - position and beam move by adaptive **Metropolis** random walks, scored on the posterior
//!   with the strong amplitudes **marginalised analytically**,
//! - amplitudes are drawn by **Gibbs** updates from their Gaussian conditional posterior.
//!
//! Sources that share no data are grouped so the amplitude curvature of many sources can be
//! probed with a few projections ([`grouping`], [`curvature`]).
//!
//! ## Getting Started
//!
//! Data enters through the [`scan::ScanModel`] trait: time-ordered data, noise weighting and
//! the projection between source parameters and samples. [`scan::SrcScan`] implements it for
//! Gaussian sources observed with white noise.
//!
//! ```rust
//! use ndarray::{array, Array2};
//! use ptsrc_mcmc::config::{SamplerConfig, SelectionConfig, StepKind};
//! use ptsrc_mcmc::pipeline::{process_scan, Catalog};
//! use ptsrc_mcmc::scan::{ScanModel, SrcScan};
//!
//! // One source at the origin, crossed by three scan lines.
//! let mut b = SrcScan::builder("demo", 1, 1);
//! let det = b.detector(1.0);
//! for y in [-1.0, 0.0, 1.0] {
//!     let point = Array2::from_shape_fn((21, 2), |(t, j)| if j == 0 { -3.0 + 0.3 * t as f64 } else { y });
//!     b.range(det, &[0], point, None);
//! }
//! let scan = b.build()?;
//! let catalog = Catalog::new(array![[0.0, 0.0]], array![[10.0]])?;
//!
//! let cfg = SamplerConfig {
//!     n_samples: 50,
//!     burn_in: 20,
//!     beam_fwhm: 2.0,
//!     pos_step: [2e-4, 2e-4],
//!     step_distribution: StepKind::Gaussian,
//!     seed: Some(42),
//!     selection: SelectionConfig { min_ranges: 1, allow_clusters: false },
//!     ..SamplerConfig::default()
//! };
//! let truth = catalog.fiducial_parameters(1, cfg.beam_fwhm)?.model();
//! let scan = scan.clone().with_tod(scan.forward(&truth)?)?;
//!
//! let out = process_scan(&scan, &catalog, &cfg)?;
//! assert_eq!(out.chain.n_samples(), 50);
//! # Ok::<(), ptsrc_mcmc::error::SamplerError>(())
//! ```
//!
//! Many scans are fitted in parallel with [`batch::BatchRunner`], which can write each
//! result to disk through [`io::csv`]. [`stats::ChainSummary`] reports mean, spread,
//! effective sample size and split R-hat of a chain.

pub mod batch;
pub mod beam;
pub mod config;
pub mod curvature;
pub mod dof;
pub mod error;
pub mod grouping;
pub mod io;
pub mod linalg;
pub mod marginal;
pub mod params;
pub mod pipeline;
pub mod posterior;
pub mod proposal;
pub mod sampler;
pub mod scan;
pub mod selection;
pub mod significance;
pub mod stats;
