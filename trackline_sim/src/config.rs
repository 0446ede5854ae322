//! Simulation configuration.

use serde::{Deserialize, Serialize};

/// A forced tracker blackout.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForcedGap {
    /// Start of the blackout in seconds
    pub start_s: f64,
    /// Length of the blackout in seconds
    pub duration_s: f64,
}

/// Configuration for a simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    /// Master seed for determinism
    pub seed: u64,

    /// Tracker frame rate in Hz
    pub sampling_rate_hz: f64,

    /// Length of the recording in seconds
    pub duration_secs: f64,

    /// Running speed between wells in cm/s
    pub walking_speed: f64,

    /// Time spent at each well before the next run, in seconds
    pub well_dwell_s: f64,

    /// Standard deviation of the tracker noise on each coordinate, in cm
    pub sensor_noise_std: f64,

    /// Probability per frame that a dropout burst starts
    pub dropout_rate: f64,

    /// Frames lost per dropout burst
    pub dropout_burst: usize,

    /// Uniform jitter on frame timestamps, in seconds
    pub timing_jitter_s: f64,

    /// Optional long blackout
    pub forced_gap: Option<ForcedGap>,

    /// Number of simulated tetrodes
    pub tetrodes: u32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            sampling_rate_hz: 30.0,
            duration_secs: 60.0,
            walking_speed: 20.0,
            well_dwell_s: 1.0,
            sensor_noise_std: 0.5,
            dropout_rate: 0.0,
            dropout_burst: 3,
            timing_jitter_s: 0.0,
            forced_gap: None,
            tetrodes: 4,
        }
    }
}

impl SimConfig {
    /// Number of tracker frames in the recording.
    pub fn frame_count(&self) -> usize {
        (self.duration_secs * self.sampling_rate_hz).floor().max(0.0) as usize
    }
}
