//! JSON exporter for offline inspection.
//!
//! Exports every linearized row next to its ground truth, so misclassified
//! stretches can be plotted against the maze.

use crate::error::SimError;
use crate::runner::ScenarioMetrics;
use crate::scenarios::ScenarioId;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// A single frame of simulation data.
#[derive(Debug, Clone, Serialize)]
pub struct SimFrame {
    /// Row time in seconds
    pub time: f64,

    pub true_x: f64,
    pub true_y: f64,

    /// Tracker (or resampled) coordinates; null when the tracker lost the animal
    pub measured_x: f64,
    pub measured_y: f64,

    pub true_segment: usize,
    pub segment: usize,

    pub true_linear_distance: f64,
    pub linear_distance: f64,
    pub linear_position: f64,
}

/// Complete simulation export.
#[derive(Debug, Clone, Serialize)]
pub struct SimExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Maze the recording was made on
    pub maze: String,

    /// Duration in seconds
    pub duration_sec: f64,

    /// All frames
    pub frames: Vec<SimFrame>,

    /// Final results
    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<ScenarioMetrics>,
}

impl SimExport {
    /// Creates a new export container.
    pub fn new(scenario: ScenarioId, seed: u64, maze: &str) -> Self {
        Self {
            scenario: scenario.name().to_string(),
            seed,
            maze: maze.to_string(),
            duration_sec: 0.0,
            frames: Vec::new(),
            passed: false,
            metrics: None,
        }
    }

    /// Adds a frame.
    pub fn add_frame(&mut self, frame: SimFrame) {
        self.duration_sec = frame.time;
        self.frames.push(frame);
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, passed: bool, metrics: ScenarioMetrics) {
        self.passed = passed;
        self.metrics = Some(metrics);
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<(), SimError> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(time: f64) -> SimFrame {
        SimFrame {
            time,
            true_x: 1.0,
            true_y: 2.0,
            measured_x: f64::NAN,
            measured_y: 2.1,
            true_segment: 3,
            segment: 3,
            true_linear_distance: 10.0,
            linear_distance: 10.2,
            linear_position: 40.2,
        }
    }

    #[test]
    fn test_export_to_file() {
        let mut export = SimExport::new(ScenarioId::SensorDropout, 42, "w_track");
        export.add_frame(frame(0.0));
        export.add_frame(frame(0.5));
        export.finalize(true, ScenarioMetrics::default());
        assert_eq!(export.duration_sec, 0.5);

        let path = std::env::temp_dir().join(format!("trackline_export_{}.json", std::process::id()));
        export.write_to_file(&path).unwrap();

        let written: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(written["scenario"], "sensor_dropout");
        assert_eq!(written["frames"].as_array().unwrap().len(), 2);
        // NaN coordinates serialize as null
        assert!(written["frames"][0]["measured_x"].is_null());
        assert_eq!(written["passed"], true);
    }
}
