//! Validation of a linearization against ground truth.
//!
//! Used by the simulation harness, where the true segment and the true linear
//! distance of every sample are known.

use crate::error::DataQualityError;
use crate::pipeline::LinearizedPosition;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Ground truth for one sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroundTruthSample {
    pub time: f64,
    pub segment_id: usize,
    pub linear_distance: f64,
}

/// How often samples of `truth` were classified as `predicted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionEntry {
    pub truth: usize,
    pub predicted: usize,
    pub count: usize,
}

/// Agreement between a linearization and ground truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub samples: usize,
    /// Fraction of samples on the right segment
    pub segment_accuracy: f64,
    /// Root mean squared linear distance error, over correctly classified samples
    pub linear_distance_rmse: f64,
    /// Largest absolute linear distance error, over correctly classified samples
    pub linear_distance_max_error: f64,
    /// Segment changes in the linearization
    pub segment_switches: usize,
    /// Segment changes in the ground truth
    pub true_switches: usize,
    /// Non-zero confusion counts, sorted by (truth, predicted)
    pub confusion: Vec<ConfusionEntry>,
}

impl ValidationReport {
    /// Compares row by row; `ground_truth` must be aligned with `linearized`.
    pub fn compare(
        linearized: &LinearizedPosition,
        ground_truth: &[GroundTruthSample],
    ) -> Result<Self, DataQualityError> {
        if linearized.len() != ground_truth.len() {
            return Err(DataQualityError::LengthMismatch {
                name: "ground_truth",
                expected: linearized.len(),
                actual: ground_truth.len(),
            });
        }
        if ground_truth.is_empty() {
            return Err(DataQualityError::NoValidSamples);
        }

        let mut correct = 0usize;
        let mut squared_error = 0.0;
        let mut max_error: f64 = 0.0;
        let mut counts: BTreeMap<(usize, usize), usize> = BTreeMap::new();

        for (row, truth) in linearized.rows.iter().zip(ground_truth) {
            *counts.entry((truth.segment_id, row.track_segment_id)).or_default() += 1;
            if row.track_segment_id == truth.segment_id {
                correct += 1;
                let error = row.linear_distance - truth.linear_distance;
                squared_error += error * error;
                max_error = max_error.max(error.abs());
            }
        }

        let switches = |ids: &mut dyn Iterator<Item = usize>| {
            let mut previous: Option<usize> = None;
            let mut count = 0;
            for id in ids {
                if previous.is_some_and(|p| p != id) {
                    count += 1;
                }
                previous = Some(id);
            }
            count
        };

        Ok(Self {
            samples: ground_truth.len(),
            segment_accuracy: correct as f64 / ground_truth.len() as f64,
            linear_distance_rmse: if correct > 0 {
                (squared_error / correct as f64).sqrt()
            } else {
                0.0
            },
            linear_distance_max_error: max_error,
            segment_switches: switches(&mut linearized.rows.iter().map(|r| r.track_segment_id)),
            true_switches: switches(&mut ground_truth.iter().map(|g| g.segment_id)),
            confusion: counts
                .into_iter()
                .map(|((truth, predicted), count)| ConfusionEntry {
                    truth,
                    predicted,
                    count,
                })
                .collect(),
        })
    }

    /// Switches beyond those present in the ground truth.
    pub fn spurious_switches(&self) -> usize {
        self.segment_switches.saturating_sub(self.true_switches)
    }
}
