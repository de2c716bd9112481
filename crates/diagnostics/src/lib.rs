//! Monte-Carlo convergence diagnostics over a one-dimensional sample trace:
//! per-lag autocorrelation and effective sample size.

use banditlab_core::{LabError, LabResult};
use serde::{Deserialize, Serialize};

/// Autocorrelation below this value counts as decorrelated.
pub const DECORRELATION_THRESHOLD: f64 = 0.05;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainReport {
    pub total_iterations: usize,
    pub burnin: usize,
    pub max_lag: usize,
    /// Autocorrelation at lags `1..max_lag`; `None` where undefined.
    pub autocorrelation: Vec<Option<f64>>,
    /// Index into `autocorrelation` of the first value below the threshold.
    pub decorrelation_lag: usize,
    pub effective_sample_size: f64,
}

pub struct ConvergenceDiagnostics;

impl ConvergenceDiagnostics {
    /// Pearson correlation between `samples[k..]` and `samples[..n - k]` for
    /// every lag `k` in `1..max_lag`.
    ///
    /// A lag where either sub-sequence has zero variance yields `NaN`, meaning
    /// undefined rather than zero.
    pub fn autocorrelation(samples: &[f64], max_lag: usize) -> LabResult<Vec<f64>> {
        if max_lag < 2 {
            return Err(LabError::invalid(format!(
                "max_lag must be at least 2, got {max_lag}"
            )));
        }
        if samples.len() <= max_lag {
            return Err(LabError::invalid(format!(
                "need more than {max_lag} samples for max_lag {max_lag}, got {}",
                samples.len()
            )));
        }

        let n = samples.len();
        let acf: Vec<f64> = (1..max_lag)
            .map(|k| pearson(&samples[k..], &samples[..n - k]))
            .collect();

        tracing::debug!(samples = n, max_lag, "autocorrelation computed");
        Ok(acf)
    }

    /// Effective number of independent draws in the post-burn-in chain:
    /// `(total - burnin) / (1 + 2 * sum(autocorr[..i]))`, where `i` is the first
    /// index whose value drops below [`DECORRELATION_THRESHOLD`].
    ///
    /// Assumes the autocorrelation has settled near zero by lag `i`; a
    /// transient dip below the threshold is taken at face value.
    pub fn effective_sample_size(
        total_iterations: usize,
        burnin: usize,
        autocorr: &[f64],
    ) -> LabResult<f64> {
        if burnin > total_iterations {
            return Err(LabError::invalid(format!(
                "burnin {burnin} exceeds total iterations {total_iterations}"
            )));
        }

        let lag = Self::decorrelation_lag(autocorr)?;
        let rho_sum: f64 = autocorr[..lag].iter().sum();
        let ess = (total_iterations - burnin) as f64 / (1.0 + 2.0 * rho_sum);

        tracing::debug!(
            total_iterations,
            burnin,
            decorrelation_lag = lag,
            ess,
            "effective sample size computed"
        );
        Ok(ess)
    }

    /// Index of the first autocorrelation value below the threshold. `NaN`
    /// before that point is an error, never a match.
    pub fn decorrelation_lag(autocorr: &[f64]) -> LabResult<usize> {
        for (index, &rho) in autocorr.iter().enumerate() {
            if rho.is_nan() {
                tracing::warn!(lag = index + 1, "undefined autocorrelation");
                return Err(LabError::computation(format!(
                    "autocorrelation undefined (zero variance) at lag {}",
                    index + 1
                )));
            }
            if rho < DECORRELATION_THRESHOLD {
                return Ok(index);
            }
        }
        Err(LabError::computation(format!(
            "no decorrelation detected within {} lags; increase max_lag and retry",
            autocorr.len()
        )))
    }

    /// Drop the burn-in prefix, then compute autocorrelation and effective
    /// sample size over what remains.
    pub fn analyze(samples: &[f64], burnin: usize, max_lag: usize) -> LabResult<ChainReport> {
        if burnin >= samples.len() {
            return Err(LabError::invalid(format!(
                "burnin {burnin} leaves no samples out of {}",
                samples.len()
            )));
        }

        let acf = Self::autocorrelation(&samples[burnin..], max_lag)?;
        let decorrelation_lag = Self::decorrelation_lag(&acf)?;
        let effective_sample_size = Self::effective_sample_size(samples.len(), burnin, &acf)?;

        Ok(ChainReport {
            total_iterations: samples.len(),
            burnin,
            max_lag,
            autocorrelation: acf
                .into_iter()
                .map(|rho| if rho.is_nan() { None } else { Some(rho) })
                .collect(),
            decorrelation_lag,
            effective_sample_size,
        })
    }
}

fn pearson(x: &[f64], y: &[f64]) -> f64 {
    // Checked on the raw values: a rounded mean leaves tiny equal deviations.
    if is_constant(x) || is_constant(y) {
        return f64::NAN;
    }

    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (&a, &b) in x.iter().zip(y) {
        let dx = a - mean_x;
        let dy = b - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x == 0.0 || var_y == 0.0 {
        return f64::NAN;
    }
    cov / (var_x * var_y).sqrt()
}

fn is_constant(values: &[f64]) -> bool {
    match values.first() {
        Some(&first) => values.iter().all(|&v| v == first),
        None => true,
    }
}
