//! Velocity and speed along the linearized track.
//!
//! The stitched position is smoothed with a Gaussian kernel and then
//! differentiated with central differences. Both steps assume a uniform time
//! grid, so the declared sampling frequency is checked against the actual
//! timestamps first.

use crate::error::PreconditionError;
use serde::{Deserialize, Serialize};

/// Kernel half-width in standard deviations.
const TRUNCATE_STD: f64 = 8.0;

/// Smoothed derivative of a 1-D series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kinematics {
    /// Signed velocity in units per second
    pub velocity: Vec<f64>,
    /// |velocity|
    pub speed: Vec<f64>,
}

/// Differentiates uniformly sampled series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KinematicEstimator {
    sampling_frequency: f64,
    smoothing_std_s: f64,
    tolerance: f64,
}

impl KinematicEstimator {
    /// * `sampling_frequency` - declared rate in Hz
    /// * `smoothing_std_s` - Gaussian kernel standard deviation in seconds
    /// * `tolerance` - relative tolerance on sample spacing
    pub fn new(sampling_frequency: f64, smoothing_std_s: f64, tolerance: f64) -> Self {
        Self {
            sampling_frequency,
            smoothing_std_s,
            tolerance,
        }
    }

    pub fn sampling_frequency(&self) -> f64 {
        self.sampling_frequency
    }

    /// Velocity and speed of `values` sampled at `time`.
    ///
    /// # Errors
    /// * `PreconditionError::TooFewSamples` - fewer than two samples
    /// * `PreconditionError::NonFiniteValue` - NaN or infinite value
    /// * `PreconditionError::SamplingRateMismatch` - spacing off the declared rate
    pub fn estimate(&self, time: &[f64], values: &[f64]) -> Result<Kinematics, PreconditionError> {
        if values.len() < 2 || time.len() != values.len() {
            return Err(PreconditionError::TooFewSamples {
                required: 2,
                actual: values.len().min(time.len()),
            });
        }
        if let Some(index) = values.iter().position(|v| !v.is_finite()) {
            return Err(PreconditionError::NonFiniteValue { index });
        }
        check_sampling_rate(time, self.sampling_frequency, self.tolerance)?;

        let sigma_samples = self.smoothing_std_s * self.sampling_frequency;
        let smoothed = gaussian_smooth(values, sigma_samples);
        let velocity = gradient(&smoothed, 1.0 / self.sampling_frequency);
        let speed = velocity.iter().map(|v| v.abs()).collect();

        Ok(Kinematics { velocity, speed })
    }
}

/// Checks that consecutive timestamps are `1 / sampling_frequency` apart
/// within `tolerance` (relative).
pub fn check_sampling_rate(time: &[f64], sampling_frequency: f64, tolerance: f64) -> Result<(), PreconditionError> {
    let dt = 1.0 / sampling_frequency;
    for (i, pair) in time.windows(2).enumerate() {
        let observed_dt = pair[1] - pair[0];
        if !((observed_dt - dt).abs() <= tolerance * dt) {
            return Err(PreconditionError::SamplingRateMismatch {
                sampling_frequency,
                observed_dt,
                index: i + 1,
            });
        }
    }
    Ok(())
}

/// Gaussian smoothing with `sigma` in samples, reflecting at both ends
/// (`d c b a | a b c d | d c b a`).
pub fn gaussian_smooth(values: &[f64], sigma: f64) -> Vec<f64> {
    let n = values.len();
    if n == 0 || !(sigma > 0.0) {
        return values.to_vec();
    }

    let radius = (TRUNCATE_STD * sigma).ceil() as isize;
    let mut kernel: Vec<f64> = (-radius..=radius)
        .map(|k| (-0.5 * (k as f64 / sigma).powi(2)).exp())
        .collect();
    let total: f64 = kernel.iter().sum();
    for w in &mut kernel {
        *w /= total;
    }

    (0..n as isize)
        .map(|i| {
            kernel
                .iter()
                .zip(-radius..=radius)
                .map(|(w, k)| w * values[reflect(i + k, n)])
                .sum()
        })
        .collect()
}

fn reflect(index: isize, n: usize) -> usize {
    let n = n as isize;
    let period = 2 * n;
    let mut i = index.rem_euclid(period);
    if i >= n {
        i = period - 1 - i;
    }
    i as usize
}

/// Central differences in the interior, one-sided at the ends.
pub fn gradient(values: &[f64], dt: f64) -> Vec<f64> {
    let n = values.len();
    if n < 2 {
        return vec![0.0; n];
    }
    (0..n)
        .map(|i| match i {
            0 => (values[1] - values[0]) / dt,
            i if i == n - 1 => (values[n - 1] - values[n - 2]) / dt,
            i => (values[i + 1] - values[i - 1]) / (2.0 * dt),
        })
        .collect()
}
