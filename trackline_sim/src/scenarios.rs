//! Recording scenarios for the simulation harness.

use crate::config::{ForcedGap, SimConfig};
use serde::{Deserialize, Serialize};
use trackline_core::PipelineStage;

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioId {
    /// SIM-001: Low noise, no dropouts
    CleanRun,

    /// SIM-002: Tracker noise large enough to blur the junctions
    NoisyJunctions,

    /// SIM-003: Short dropout bursts, repaired by gap filling
    SensorDropout,

    /// SIM-004: Jittered frame clock, linearized through the session loader
    JitteredClock,

    /// SIM-005: A two second blackout the gap filler must refuse
    LongDropout,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::CleanRun,
            ScenarioId::NoisyJunctions,
            ScenarioId::SensorDropout,
            ScenarioId::JitteredClock,
            ScenarioId::LongDropout,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::CleanRun => "clean_run",
            ScenarioId::NoisyJunctions => "noisy_junctions",
            ScenarioId::SensorDropout => "sensor_dropout",
            ScenarioId::JitteredClock => "jittered_clock",
            ScenarioId::LongDropout => "long_dropout",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::CleanRun => "Well-to-well runs with 0.5cm tracker noise",
            ScenarioId::NoisyJunctions => "2cm tracker noise around every junction",
            ScenarioId::SensorDropout => "1% chance per frame of losing 5 frames",
            ScenarioId::JitteredClock => "±4ms frame jitter, resampled onto a 2ms grid",
            ScenarioId::LongDropout => "2s tracker blackout, must fail at gap fill",
        }
    }

    /// Stage at which the run is expected to fail, if any.
    pub fn expected_failure(&self) -> Option<PipelineStage> {
        match self {
            ScenarioId::LongDropout => Some(PipelineStage::GapFill),
            _ => None,
        }
    }

    /// Whether the scenario goes through the session loader and resampler.
    pub fn uses_session(&self) -> bool {
        matches!(self, ScenarioId::JitteredClock)
    }

    /// Lowest acceptable fraction of correctly classified samples.
    pub fn min_segment_accuracy(&self) -> f64 {
        match self {
            ScenarioId::NoisyJunctions => 0.9,
            _ => 0.95,
        }
    }

    /// Applies the scenario's perturbations to a base configuration.
    pub fn configure(&self, config: &mut SimConfig) {
        match self {
            ScenarioId::CleanRun => {}
            ScenarioId::NoisyJunctions => config.sensor_noise_std = 2.0,
            ScenarioId::SensorDropout => {
                config.dropout_rate = 0.01;
                config.dropout_burst = 5;
            }
            ScenarioId::JitteredClock => config.timing_jitter_s = 0.004,
            ScenarioId::LongDropout => {
                config.forced_gap = Some(ForcedGap {
                    start_s: 0.25 * config.duration_secs,
                    duration_s: 2.0,
                });
            }
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "clean_run" | "cleanrun" | "sim-001" => Ok(ScenarioId::CleanRun),
            "noisy_junctions" | "noisyjunctions" | "sim-002" => Ok(ScenarioId::NoisyJunctions),
            "sensor_dropout" | "sensordropout" | "sim-003" => Ok(ScenarioId::SensorDropout),
            "jittered_clock" | "jitteredclock" | "sim-004" => Ok(ScenarioId::JitteredClock),
            "long_dropout" | "longdropout" | "sim-005" => Ok(ScenarioId::LongDropout),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for scenario in ScenarioId::all() {
            assert_eq!(scenario.name().parse::<ScenarioId>(), Ok(scenario));
        }
        assert_eq!("SIM-004".parse::<ScenarioId>(), Ok(ScenarioId::JitteredClock));
        assert!("chaos".parse::<ScenarioId>().is_err());
    }

    #[test]
    fn test_long_dropout_gap_exceeds_fill_limit() {
        let mut config = SimConfig::default();
        ScenarioId::LongDropout.configure(&mut config);
        let gap = config.forced_gap.unwrap();
        assert!(gap.duration_s * config.sampling_rate_hz > 15.0);
        assert!(gap.start_s + gap.duration_s < config.duration_secs);
        assert_eq!(ScenarioId::LongDropout.expected_failure(), Some(PipelineStage::GapFill));
    }
}
