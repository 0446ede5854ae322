//! Resampling of a time series onto a fixed-interval grid.

use crate::error::EnvError;
use crate::types::TimeSeries;

/// Abstraction for putting an irregular time series onto a fixed grid.
///
/// # Implementations
///
/// - **Production**: [`LinearResampler`] (bin mean + time-weighted linear
///   interpolation)
/// - **Tests**: any deterministic stand-in
pub trait Resampler: Send + Sync {
    /// Resamples every column of `series` onto a grid of spacing
    /// `1 / sampling_frequency` seconds.
    ///
    /// # Returns
    /// * `Ok(series)` - Grid-aligned series; the time index is uniform
    /// * `Err(EnvError::InvalidRecord)` - Non-finite or unsorted time index,
    ///   or a non-positive frequency
    fn resample(&self, series: &TimeSeries, sampling_frequency: f64) -> Result<TimeSeries, EnvError>;
}

/// Bin-mean then time-weighted linear interpolation.
///
/// The grid starts at the first timestamp floored to a multiple of the bin
/// width. Every bin takes the mean of the finite samples falling into it;
/// empty bins are linearly interpolated in time between the nearest filled
/// bins. Bins before the first filled bin stay NaN, bins after the last
/// filled bin hold its value.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearResampler;

impl LinearResampler {
    pub fn new() -> Self {
        Self
    }
}

impl Resampler for LinearResampler {
    fn resample(&self, series: &TimeSeries, sampling_frequency: f64) -> Result<TimeSeries, EnvError> {
        if !(sampling_frequency.is_finite() && sampling_frequency > 0.0) {
            return Err(EnvError::invalid(format!(
                "sampling frequency must be positive, got {sampling_frequency}"
            )));
        }
        if series.is_empty() {
            return Ok(series.clone());
        }
        for (i, pair) in series.time.windows(2).enumerate() {
            if !(pair[0].is_finite() && pair[1].is_finite()) || pair[1] < pair[0] {
                return Err(EnvError::invalid(format!(
                    "time index is not finite and sorted at sample {}",
                    i + 1
                )));
            }
        }
        if !series.time[0].is_finite() {
            return Err(EnvError::invalid("time index is not finite at sample 0"));
        }

        let dt = 1.0 / sampling_frequency;
        let start = (series.time[0] / dt).floor() * dt;
        let last = series.time[series.len() - 1];
        let n_bins = bin_index(last, start, dt) + 1;

        let grid: Vec<f64> = (0..n_bins).map(|k| start + k as f64 * dt).collect();
        let bins: Vec<usize> = series
            .time
            .iter()
            .map(|&t| bin_index(t, start, dt).min(n_bins - 1))
            .collect();

        let mut out = TimeSeries::new(grid.clone());
        for (name, values) in series.columns() {
            let mut sums = vec![0.0; n_bins];
            let mut counts = vec![0usize; n_bins];
            for (&bin, &value) in bins.iter().zip(values) {
                if value.is_finite() {
                    sums[bin] += value;
                    counts[bin] += 1;
                }
            }
            let binned: Vec<f64> = sums
                .iter()
                .zip(&counts)
                .map(|(&s, &c)| if c > 0 { s / c as f64 } else { f64::NAN })
                .collect();

            out.insert(name, interpolate_time(&grid, &binned))?;
        }

        Ok(out)
    }
}

fn bin_index(t: f64, start: f64, dt: f64) -> usize {
    // Small slack so a timestamp sitting on a bin edge is not pushed back by rounding.
    (((t - start) / dt) + 1e-9).floor().max(0.0) as usize
}

/// Fills NaN entries by linear interpolation in time between finite neighbours.
fn interpolate_time(time: &[f64], values: &[f64]) -> Vec<f64> {
    let mut out = values.to_vec();
    let mut prev: Option<usize> = None;

    for i in 0..values.len() {
        if !values[i].is_finite() {
            continue;
        }
        if let Some(p) = prev {
            if i > p + 1 {
                let span = time[i] - time[p];
                for k in (p + 1)..i {
                    let w = (time[k] - time[p]) / span;
                    out[k] = values[p] + w * (values[i] - values[p]);
                }
            }
        }
        prev = Some(i);
    }

    // Trailing gap holds the last value
    if let Some(p) = prev {
        for value in out.iter_mut().skip(p + 1) {
            *value = values[p];
        }
    }

    out
}
