//! Common types exchanged with collaborators.

use crate::error::EnvError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identifies one recording session (animal, day, epoch).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionKey {
    /// Short animal name (e.g. "bon")
    pub animal: String,

    /// Recording day (1-based)
    pub day: u32,

    /// Epoch within the day (1-based)
    pub epoch: u32,
}

impl SessionKey {
    /// Creates a new session key.
    pub fn new(animal: impl Into<String>, day: u32, epoch: u32) -> Self {
        Self {
            animal: animal.into(),
            day,
            epoch,
        }
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.animal, self.day, self.epoch)
    }
}

/// Identifies one recording channel (tetrode) within a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelKey {
    pub session: SessionKey,
    pub tetrode: u32,
}

impl ChannelKey {
    pub fn new(session: SessionKey, tetrode: u32) -> Self {
        Self { session, tetrode }
    }
}

impl std::fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.session, self.tetrode)
    }
}

/// A single raw position record as delivered by the position source.
///
/// Coordinates may be NaN when the tracker lost the animal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionRecord {
    /// Timestamp in seconds
    pub time: f64,
    pub x: f64,
    pub y: f64,
    /// Head speed in cm/s as computed by the tracker
    pub speed: f64,
}

/// Named frequency band of a filtered LFP.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrequencyBand {
    /// 6-12 Hz
    Theta,
    /// 20-50 Hz
    LowGamma,
    /// 150-250 Hz
    Ripple,
    /// Any other band stored by the collaborator
    Named(String),
}

impl std::fmt::Display for FrequencyBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrequencyBand::Theta => write!(f, "theta"),
            FrequencyBand::LowGamma => write!(f, "low_gamma"),
            FrequencyBand::Ripple => write!(f, "ripple"),
            FrequencyBand::Named(name) => write!(f, "{name}"),
        }
    }
}

/// Per-channel indicators aligned to a shared time index.
///
/// `values[c][t]` belongs to `channels[c]` at `time[t]`. NaN means "no event".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiunitIndicators {
    pub time: Vec<f64>,
    pub channels: Vec<ChannelKey>,
    pub values: Vec<Vec<f64>>,
}

impl MultiunitIndicators {
    /// Builds an indicator table, checking every channel is aligned with `time`.
    pub fn new(
        time: Vec<f64>,
        channels: Vec<ChannelKey>,
        values: Vec<Vec<f64>>,
    ) -> Result<Self, EnvError> {
        if channels.len() != values.len() {
            return Err(EnvError::LengthMismatch {
                name: "channels".to_string(),
                expected: channels.len(),
                actual: values.len(),
            });
        }
        for (channel, column) in channels.iter().zip(&values) {
            if column.len() != time.len() {
                return Err(EnvError::LengthMismatch {
                    name: channel.to_string(),
                    expected: time.len(),
                    actual: column.len(),
                });
            }
        }
        Ok(Self {
            time,
            channels,
            values,
        })
    }

    /// Number of channels.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Returns the indicator column for one channel.
    pub fn channel(&self, key: &ChannelKey) -> Option<&[f64]> {
        self.channels
            .iter()
            .position(|c| c == key)
            .map(|idx| self.values[idx].as_slice())
    }
}

/// A band-filtered LFP trace: bandpassed signal, instantaneous phase and
/// envelope magnitude on a shared time index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilteredSignal {
    pub channel: ChannelKey,
    pub band: FrequencyBand,
    pub time: Vec<f64>,
    pub bandpassed: Vec<f64>,
    pub phase: Vec<f64>,
    pub magnitude: Vec<f64>,
}

impl FilteredSignal {
    /// Reconstructs the time index from the stored start time and a fixed
    /// sampling rate, the way filtered LFP files are stored on disk.
    pub fn from_start_time(
        channel: ChannelKey,
        band: FrequencyBand,
        start_time: f64,
        sampling_rate: f64,
        bandpassed: Vec<f64>,
        phase: Vec<f64>,
        magnitude: Vec<f64>,
    ) -> Result<Self, EnvError> {
        if !(sampling_rate.is_finite() && sampling_rate > 0.0) {
            return Err(EnvError::invalid(format!(
                "sampling rate must be positive, got {sampling_rate}"
            )));
        }
        if !start_time.is_finite() {
            return Err(EnvError::invalid("start time is not finite"));
        }
        let n = bandpassed.len();
        for (name, column) in [("phase", &phase), ("magnitude", &magnitude)] {
            if column.len() != n {
                return Err(EnvError::LengthMismatch {
                    name: name.to_string(),
                    expected: n,
                    actual: column.len(),
                });
            }
        }

        let time = (0..n)
            .map(|i| start_time + i as f64 / sampling_rate)
            .collect();

        Ok(Self {
            channel,
            band,
            time,
            bandpassed,
            phase,
            magnitude,
        })
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }
}

/// A time-indexed table of named `f64` columns.
///
/// Used as the exchange format for the [`Resampler`](crate::Resampler).
/// Columns are kept in a `BTreeMap` so iteration order is deterministic.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TimeSeries {
    pub time: Vec<f64>,
    columns: BTreeMap<String, Vec<f64>>,
}

impl TimeSeries {
    /// Creates a table with a time index and no columns.
    pub fn new(time: Vec<f64>) -> Self {
        Self {
            time,
            columns: BTreeMap::new(),
        }
    }

    /// Adds (or replaces) a column, checking alignment with the time index.
    pub fn insert(&mut self, name: impl Into<String>, values: Vec<f64>) -> Result<(), EnvError> {
        let name = name.into();
        if values.len() != self.time.len() {
            return Err(EnvError::LengthMismatch {
                name,
                expected: self.time.len(),
                actual: values.len(),
            });
        }
        self.columns.insert(name, values);
        Ok(())
    }

    /// Builder form of [`TimeSeries::insert`].
    pub fn with_column(mut self, name: impl Into<String>, values: Vec<f64>) -> Result<Self, EnvError> {
        self.insert(name, values)?;
        Ok(self)
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    /// Iterates over `(name, values)` in name order.
    pub fn columns(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_session_key_display() {
        let key = SessionKey::new("bon", 3, 2);
        assert_eq!(key.to_string(), "bon:3:2");

        let channel = ChannelKey::new(key, 14);
        assert_eq!(channel.to_string(), "bon:3:2:14");
    }

    #[test]
    fn test_filtered_signal_time_reconstruction() {
        let channel = ChannelKey::new(SessionKey::new("bon", 3, 2), 1);
        let signal = FilteredSignal::from_start_time(
            channel,
            FrequencyBand::Theta,
            10.0,
            1500.0,
            vec![0.0; 4],
            vec![0.0; 4],
            vec![1.0; 4],
        )
        .unwrap();

        assert_eq!(signal.len(), 4);
        assert_relative_eq!(signal.time[0], 10.0);
        assert_relative_eq!(signal.time[3], 10.0 + 3.0 / 1500.0, epsilon = 1e-12);
    }

    #[test]
    fn test_filtered_signal_rejects_misaligned_columns() {
        let channel = ChannelKey::new(SessionKey::new("bon", 3, 2), 1);
        let result = FilteredSignal::from_start_time(
            channel,
            FrequencyBand::Ripple,
            0.0,
            1500.0,
            vec![0.0; 4],
            vec![0.0; 3],
            vec![1.0; 4],
        );
        assert!(matches!(result, Err(EnvError::LengthMismatch { .. })));
    }

    #[test]
    fn test_time_series_column_alignment() {
        let mut series = TimeSeries::new(vec![0.0, 1.0, 2.0]);
        assert!(series.insert("x", vec![1.0, 2.0, 3.0]).is_ok());
        assert!(series.insert("y", vec![1.0]).is_err());
        assert_eq!(series.column("x"), Some(&[1.0, 2.0, 3.0][..]));
        assert!(series.column("y").is_none());
    }

    #[test]
    fn test_multiunit_lookup() {
        let session = SessionKey::new("bon", 3, 2);
        let a = ChannelKey::new(session.clone(), 1);
        let b = ChannelKey::new(session, 2);
        let table = MultiunitIndicators::new(
            vec![0.0, 0.5],
            vec![a.clone(), b.clone()],
            vec![vec![1.0, f64::NAN], vec![f64::NAN, 2.0]],
        )
        .unwrap();

        assert_eq!(table.channel_count(), 2);
        assert_eq!(table.channel(&b).map(|c| c[1]), Some(2.0));
    }
}
