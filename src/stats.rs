/*!
# Chain diagnostics.

Split R-hat and effective sample size following Stan's definitions, computed per parameter
over arrays shaped `(chains, samples, parameters)`. A single chain is split in half, so the
diagnostics are meaningful for the one-chain-per-scan runs of this crate as well.

[`ChainSummary`] collects mean, standard deviation, ESS and R-hat for every parameter of one or
more [`Chain`]s.
*/

use core::fmt;
use ndarray::{concatenate, prelude::*, stack};
use rayon::prelude::*;
use rustfft::{num_complex::Complex, FftPlanner};
use std::cmp::Ordering;

use crate::error::{Result, SamplerError};
use crate::sampler::Chain;

/// Order statistics and moments of a set of per-parameter diagnostics.
#[derive(Clone, Debug, PartialEq, PartialOrd)]
pub struct BasicStats {
    pub name: String,
    pub min: f64,
    pub median: f64,
    pub max: f64,
    pub mean: f64,
    pub std: f64,
}

impl fmt::Display for BasicStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} in [{:.2}, {:.2}], median: {:.2}, mean: {:.2} ± {:.2}",
            self.name, self.min, self.max, self.median, self.mean, self.std
        )
    }
}

/// Computes basic statistics of `data`. All fields are NaN when `data` is empty.
pub fn basic_stats(name: &str, data: ArrayView1<f64>) -> BasicStats {
    let mut sorted: Vec<f64> = data.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let nan = f64::NAN;
    BasicStats {
        name: name.to_string(),
        min: sorted.first().copied().unwrap_or(nan),
        median: sorted.get(sorted.len() / 2).copied().unwrap_or(nan),
        max: sorted.last().copied().unwrap_or(nan),
        mean: data.mean().unwrap_or(nan),
        std: if data.len() > 1 { data.std(1.0) } else { nan },
    }
}

/// Takes a (chains, observations, parameters) view and returns a new
/// (2*chains, observations/2, parameters) array by splitting each chain in half.
fn splitcat(sample: ArrayView3<f64>) -> Result<Array3<f64>> {
    let n = sample.shape()[1];
    let half = (n / 2) as isize;
    let first = sample.slice(s![.., ..half, ..]);
    let second = sample.slice(s![.., -half.., ..]);
    concatenate(Axis(0), &[first, second])
        .map_err(|e| SamplerError::Operator(format!("splitting chains: {e}")))
}

/// Split R-hat and ESS of every parameter.
///
/// `sample` has shape (chains, observations, parameters) and needs at least four observations
/// per chain.
pub fn split_rhat_mean_ess(sample: ArrayView3<f64>) -> Result<(Array1<f64>, Array1<f64>)> {
    if sample.shape()[1] < 4 {
        return Err(SamplerError::ShapeMismatch {
            what: "split_rhat_mean_ess observations",
            expected: 4,
            got: sample.shape()[1],
        });
    }
    let splitted = splitcat(sample)?;
    let (within, var) = withinvar(splitted.view());
    Ok((
        rhat(within.view(), var.view()),
        ess(splitted.view(), within.view(), var.view())?,
    ))
}

fn rhat(within: ArrayView1<f64>, var: ArrayView1<f64>) -> Array1<f64> {
    (&var / &within).sqrt()
}

fn withinvar(sample: ArrayView3<f64>) -> (Array1<f64>, Array1<f64>) {
    let (c, n, p) = sample.dim();
    let (within, var): (Vec<f64>, Vec<f64>) = (0..p)
        .into_par_iter()
        .map(|param_idx| {
            let data_p = sample.slice(s![.., .., param_idx]);
            let chain_means = data_p.sum_axis(Axis(1)) / n as f64;
            let overall_mean = chain_means.sum() / c as f64;

            // between-chain variance
            let diff = &chain_means - overall_mean;
            let b = diff.pow2().sum() * (n as f64 / (c - 1) as f64);

            let w = (0..c)
                .map(|chain_i| {
                    let cm = chain_means[chain_i];
                    data_p
                        .row(chain_i)
                        .iter()
                        .map(|v| (v - cm) * (v - cm))
                        .sum::<f64>()
                        / n as f64
                })
                .sum::<f64>()
                / c as f64;
            let v = ((n as f64 - 1.0) / n as f64) * w + b / n as f64;
            (w, v)
        })
        .unzip();
    (Array1::from_vec(within), Array1::from_vec(var))
}

/// Effective sample size per parameter from the averaged chain autocovariances, using
/// Geyer's initial monotone sequence.
fn ess(
    sample: ArrayView3<f64>,
    within: ArrayView1<f64>,
    var: ArrayView1<f64>,
) -> Result<Array1<f64>> {
    let (n_chains, n_steps, n_params) = sample.dim();
    let chain_rho: Vec<Array2<f64>> = sample.outer_iter().map(autocov).collect();
    let views: Vec<ArrayView2<f64>> = chain_rho.iter().map(|x| x.view()).collect();
    let avg_rho = stack(Axis(0), &views)
        .map_err(|e| SamplerError::Operator(format!("stacking autocovariances: {e}")))?
        .sum_axis(Axis(0))
        / n_chains as f64;
    let within = within.insert_axis(Axis(0));
    let var = var.insert_axis(Axis(0));
    let rho = 1.0 - (&within - &avg_rho) / &var;

    let tau: Vec<f64> = (0..n_params)
        .into_par_iter()
        .map(|d| {
            let rho_d = rho.column(d);
            let mut min = if rho_d.len() >= 2 {
                rho_d[0] + rho_d[1]
            } else {
                0.0
            };
            let mut out = 0.0;
            for rho_t in rho_d.to_owned().windows_with_stride(2, 2) {
                let mut p_t = rho_t[0] + rho_t[1];
                if p_t <= 0.0 {
                    break;
                }
                if p_t > min {
                    p_t = min;
                }
                min = p_t;
                out += p_t;
            }
            -1.0 + 2.0 * out
        })
        .collect();
    Ok(Array1::from_vec(tau).recip() * (n_chains * n_steps) as f64)
}

fn autocov(sample: ArrayView2<f64>) -> Array2<f64> {
    if sample.nrows() <= 100 {
        autocov_bf(sample)
    } else {
        autocov_fft(sample)
    }
}

/// Autocovariance of every column of an `(n, d)` array, through a zero-padded FFT.
pub fn autocov_fft(sample: ArrayView2<f64>) -> Array2<f64> {
    let (n, d) = sample.dim();
    if n == 0 {
        return Array2::zeros((0, d));
    }
    let mut planner = FftPlanner::new();
    // next power of two >= 2n - 1 avoids wrap-around
    let n_padded = (2 * n - 1).next_power_of_two();
    let fft = planner.plan_fft_forward(n_padded);
    let ffti = planner.plan_fft_inverse(n_padded);
    let columns: Vec<Vec<f64>> = sample
        .axis_iter(Axis(1))
        .into_par_iter()
        .map(|traj| {
            let traj_mean = traj.sum() / n as f64;
            let mut x: Vec<Complex<f64>> = traj
                .iter()
                .map(|xi| Complex::new(xi - traj_mean, 0.0))
                .chain(std::iter::repeat(Complex::new(0.0, 0.0)).take(n_padded - n))
                .collect();
            fft.process(&mut x);
            x.iter_mut().for_each(|xi| *xi *= xi.conj());
            ffti.process(&mut x);
            // rustfft does not normalise
            x.iter()
                .take(n)
                .map(|xi| xi.re / n_padded as f64 / n as f64)
                .collect()
        })
        .collect();
    Array2::from_shape_fn((n, d), |(lag, col)| columns[col][lag])
}

/// Brute-force autocovariance of every column of an `(n, d)` array:
/// `out[lag, col] = Σₜ x[t, col] x[t + lag, col] / n` on mean-subtracted data.
pub fn autocov_bf(data: ArrayView2<f64>) -> Array2<f64> {
    let (n, d) = data.dim();
    let mut out = Array2::<f64>::zeros((n, d));
    out.axis_iter_mut(Axis(1))
        .into_par_iter()
        .enumerate()
        .for_each(|(col_idx, mut out_col)| {
            let col = data.column(col_idx);
            let mean = col.sum() / n as f64;
            let centred = col.mapv(|v| v - mean);
            for lag in 0..n {
                let s: f64 = (0..n - lag).map(|t| centred[t] * centred[t + lag]).sum();
                out_col[lag] = s / n as f64;
            }
        });
    out
}

/// Per-parameter posterior summary of one or more chains.
#[derive(Clone, Debug, PartialEq)]
pub struct ChainSummary {
    pub names: Vec<String>,
    pub mean: Array1<f64>,
    pub std: Array1<f64>,
    pub ess: Array1<f64>,
    pub rhat: Array1<f64>,
}

impl ChainSummary {
    pub fn from_chain(chain: &Chain) -> Result<Self> {
        Self::from_chains(std::slice::from_ref(chain))
    }

    /// Chains must share their parameter layout and length.
    pub fn from_chains(chains: &[Chain]) -> Result<Self> {
        let first = chains
            .first()
            .ok_or_else(|| SamplerError::Config("no chains to summarise".into()))?;
        let flats: Vec<Array2<f64>> = chains.iter().map(Chain::flat_samples).collect();
        let views: Vec<ArrayView2<f64>> = flats.iter().map(|f| f.view()).collect();
        let sample = stack(Axis(0), &views).map_err(|_| SamplerError::ShapeMismatch {
            what: "ChainSummary chains",
            expected: first.flat_samples().len(),
            got: flats.iter().map(|f| f.len()).max().unwrap_or(0),
        })?;
        let (rhat, ess) = split_rhat_mean_ess(sample.view())?;
        let (c, n, p) = sample.dim();
        let all = sample.to_shape((c * n, p)).map_err(|e| {
            SamplerError::Operator(format!("reshaping samples: {e}"))
        })?;
        Ok(Self {
            names: first.parameter_names(),
            mean: all.sum_axis(Axis(0)) / (c * n) as f64,
            std: all.std_axis(Axis(0), 1.0),
            ess,
            rhat,
        })
    }

    /// ESS and R-hat spread over all parameters.
    pub fn overview(&self) -> (BasicStats, BasicStats) {
        (
            basic_stats("ESS", self.ess.view()),
            basic_stats("Split R-hat", self.rhat.view()),
        )
    }
}

impl fmt::Display for ChainSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:>12} {:>12} {:>12} {:>8} {:>7}", "param", "mean", "std", "ess", "rhat")?;
        for (k, name) in self.names.iter().enumerate() {
            writeln!(
                f,
                "{:>12} {:>12.5e} {:>12.5e} {:>8.1} {:>7.3}",
                name, self.mean[k], self.std[k], self.ess[k], self.rhat[k]
            )?;
        }
        Ok(())
    }
}
