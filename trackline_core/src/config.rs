//! Configuration values: maze geometry and engine tunables.
//!
//! Maze constants (node coordinates, edges, center well, layout) are an
//! explicit immutable value rather than module constants, so several mazes can
//! be linearized side by side.

use crate::error::{ConfigurationError, LinearizeError};
use crate::track_graph::TrackGraph;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ============================================================================
// MAZE GEOMETRY
// ============================================================================

/// Gap(s) inserted between consecutive segments in the stitched coordinate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EdgeSpacing {
    /// One gap used between every pair
    Uniform(f64),
    /// One gap per adjacent pair, `len(edge_order) - 1` entries
    PerPair(Vec<f64>),
}

impl EdgeSpacing {
    /// Gap between `edge_order[pair]` and `edge_order[pair + 1]`.
    ///
    /// Callers go through a validated [`EdgeLayout`](crate::stitcher::EdgeLayout),
    /// where every pair has a gap. A pair past the end of a `PerPair` list
    /// gets no gap rather than a panic.
    pub(crate) fn gap(&self, pair: usize) -> f64 {
        match self {
            EdgeSpacing::Uniform(gap) => *gap,
            EdgeSpacing::PerPair(gaps) => gaps.get(pair).copied().unwrap_or(0.0),
        }
    }

    /// Checks the spacing against an edge order of `order_len` segments.
    pub fn validate(&self, order_len: usize) -> Result<(), ConfigurationError> {
        let gaps: &[f64] = match self {
            EdgeSpacing::Uniform(gap) => std::slice::from_ref(gap),
            EdgeSpacing::PerPair(gaps) => {
                let expected = order_len.saturating_sub(1);
                if gaps.len() != expected {
                    return Err(ConfigurationError::SpacingLengthMismatch {
                        expected,
                        actual: gaps.len(),
                    });
                }
                gaps
            }
        };
        for &gap in gaps {
            if !(gap.is_finite() && gap >= 0.0) {
                return Err(ConfigurationError::InvalidParameter {
                    name: "edge_spacing",
                    value: gap,
                    reason: "must be finite and non-negative",
                });
            }
        }
        Ok(())
    }
}

impl Default for EdgeSpacing {
    fn default() -> Self {
        EdgeSpacing::Uniform(30.0)
    }
}

/// Everything that is specific to one physical maze.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MazeGeometry {
    /// Human-readable maze name (for logging)
    #[serde(default)]
    pub name: String,

    /// Node coordinates `[x, y]` in cm; the node id is the index
    pub node_positions: Vec<[f64; 2]>,

    /// Segments as node-id pairs; the segment id is the index
    pub edges: Vec<(usize, usize)>,

    /// Node from which linear distance is measured
    pub center_well_id: usize,

    /// Order in which segments are laid out on the 1-D axis
    pub edge_order: Vec<usize>,

    /// Gap(s) between consecutive segments of `edge_order`
    #[serde(default)]
    pub edge_spacing: EdgeSpacing,
}

impl MazeGeometry {
    /// The six-well W-track: ten nodes (six wells, four intersections), nine
    /// segments, measured from the bottom-left well.
    pub fn w_track() -> Self {
        Self {
            name: "w_track".to_string(),
            node_positions: vec![
                [18.091, 55.053], // 0 - top left well
                [33.583, 48.357], // 1 - top middle intersection
                [47.753, 56.512], // 2 - top right well
                [33.973, 31.406], // 3 - middle intersection
                [21.166, 21.631], // 4 - bottom left intersection
                [4.585, 28.966],  // 5 - middle left well
                [48.539, 24.572], // 6 - middle right intersection
                [22.507, 5.012],  // 7 - bottom left well
                [49.726, 7.439],  // 8 - bottom right well
                [62.755, 33.410], // 9 - middle right well
            ],
            edges: vec![
                (0, 1),
                (1, 2),
                (1, 3),
                (3, 4),
                (4, 5),
                (3, 6),
                (6, 9),
                (4, 7),
                (6, 8),
            ],
            center_well_id: 7,
            edge_order: vec![6, 5, 3, 8, 7, 4, 2, 0, 1],
            edge_spacing: EdgeSpacing::Uniform(15.0),
        }
    }

    /// Parses a geometry from JSON.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigurationError> {
        serde_json::from_str(json).map_err(|e| ConfigurationError::Geometry(e.to_string()))
    }

    /// Reads a geometry from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::Geometry(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&json)
    }

    /// Node coordinates as points.
    pub fn node_points(&self) -> Vec<Point2<f64>> {
        self.node_positions
            .iter()
            .map(|&[x, y]| Point2::new(x, y))
            .collect()
    }

    /// Builds the track graph and checks the center well exists.
    pub fn build_graph(&self) -> Result<TrackGraph, LinearizeError> {
        let graph = TrackGraph::new(&self.node_points(), &self.edges)?;
        graph.node(self.center_well_id)?;
        Ok(graph)
    }
}

// ============================================================================
// ENGINE TUNABLES
// ============================================================================

/// Parameters of the probabilistic segment classifier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Standard deviation of the position sensor in cm (default: 10.0)
    pub sensor_std_dev: f64,

    /// Scale of the exponential penalty on |route - euclidean| in cm
    /// (default: 0.1)
    pub route_euclidean_distance_scaling: f64,

    /// Extra probability mass for staying on the same segment (default: 0.1)
    pub diagonal_bias: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            sensor_std_dev: 10.0,
            route_euclidean_distance_scaling: 0.1,
            diagonal_bias: 0.1,
        }
    }
}

impl ClassifierConfig {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        positive("sensor_std_dev", self.sensor_std_dev)?;
        positive(
            "route_euclidean_distance_scaling",
            self.route_euclidean_distance_scaling,
        )?;
        if !(self.diagonal_bias.is_finite() && self.diagonal_bias >= 0.0) {
            return Err(ConfigurationError::InvalidParameter {
                name: "diagonal_bias",
                value: self.diagonal_bias,
                reason: "must be finite and non-negative",
            });
        }
        Ok(())
    }
}

/// Configuration of a whole linearization run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearizationConfig {
    pub classifier: ClassifierConfig,

    /// Fraction of missing samples tolerated before the run fails (default: 0.2)
    pub max_missing_fraction: f64,

    /// Longest run of missing samples that may be filled on a raw series
    /// (default: 15 = 0.5s at 30 Hz)
    pub max_fill_gap: usize,

    /// Longest time a segment id may be carried forward onto a resampled
    /// grid, in seconds (default: 0.5)
    pub max_fill_gap_s: f64,

    /// Grid frequency used when resampling, in Hz (default: 500 = 2 ms bins)
    pub resample_frequency: f64,

    /// Relative tolerance between declared and observed sample spacing
    /// (default: 0.01)
    pub sampling_tolerance: f64,

    /// Standard deviation of the Gaussian smoothing kernel applied before
    /// differentiation, in seconds (default: 0.1)
    pub smoothing_std_s: f64,

    /// Fail instead of warn when samples fall on segments missing from the
    /// edge order (default: false)
    pub reject_unordered_segments: bool,
}

impl Default for LinearizationConfig {
    fn default() -> Self {
        Self {
            classifier: ClassifierConfig::default(),
            max_missing_fraction: 0.2,
            max_fill_gap: 15,
            max_fill_gap_s: 0.5,
            resample_frequency: 500.0,
            sampling_tolerance: 0.01,
            smoothing_std_s: 0.1,
            reject_unordered_segments: false,
        }
    }
}

impl LinearizationConfig {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.classifier.validate()?;
        if !(0.0..=1.0).contains(&self.max_missing_fraction) {
            return Err(ConfigurationError::InvalidParameter {
                name: "max_missing_fraction",
                value: self.max_missing_fraction,
                reason: "must be within [0, 1]",
            });
        }
        if !(self.max_fill_gap_s.is_finite() && self.max_fill_gap_s >= 0.0) {
            return Err(ConfigurationError::InvalidParameter {
                name: "max_fill_gap_s",
                value: self.max_fill_gap_s,
                reason: "must be finite and non-negative",
            });
        }
        positive("resample_frequency", self.resample_frequency)?;
        positive("sampling_tolerance", self.sampling_tolerance)?;
        positive("smoothing_std_s", self.smoothing_std_s)?;
        Ok(())
    }
}

fn positive(name: &'static str, value: f64) -> Result<(), ConfigurationError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigurationError::InvalidParameter {
            name,
            value,
            reason: "must be finite and positive",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_w_track_builds() {
        let geometry = MazeGeometry::w_track();
        let graph = geometry.build_graph().unwrap();
        assert_eq!(graph.node_count(), 10);
        assert_eq!(graph.edge_count(), 9);
        assert!(geometry.edge_spacing.validate(geometry.edge_order.len()).is_ok());
    }

    #[test]
    fn test_unknown_center_well() {
        let geometry = MazeGeometry {
            center_well_id: 42,
            ..MazeGeometry::w_track()
        };
        assert!(matches!(
            geometry.build_graph(),
            Err(LinearizeError::Configuration(ConfigurationError::UnknownNode { node_id: 42, .. }))
        ));
    }

    #[test]
    fn test_geometry_json_round_trip() {
        let json = r#"{
            "name": "linear",
            "node_positions": [[0.0, 0.0], [10.0, 0.0], [10.0, 20.0]],
            "edges": [[0, 1], [1, 2]],
            "center_well_id": 0,
            "edge_order": [0, 1],
            "edge_spacing": [5.0]
        }"#;
        let geometry = MazeGeometry::from_json_str(json).unwrap();
        assert_eq!(geometry.edges, vec![(0, 1), (1, 2)]);
        assert_eq!(geometry.edge_spacing, EdgeSpacing::PerPair(vec![5.0]));

        let uniform = r#"{
            "node_positions": [[0.0, 0.0], [10.0, 0.0]],
            "edges": [[0, 1]],
            "center_well_id": 0,
            "edge_order": [0],
            "edge_spacing": 15.0
        }"#;
        let geometry = MazeGeometry::from_json_str(uniform).unwrap();
        assert_eq!(geometry.edge_spacing, EdgeSpacing::Uniform(15.0));
        assert!(MazeGeometry::from_json_str("{").is_err());
    }

    #[test]
    fn test_spacing_validation() {
        assert!(EdgeSpacing::Uniform(5.0).validate(3).is_ok());
        assert!(EdgeSpacing::Uniform(-1.0).validate(3).is_err());
        assert!(EdgeSpacing::PerPair(vec![1.0, 2.0]).validate(3).is_ok());
        assert_eq!(
            EdgeSpacing::PerPair(vec![1.0]).validate(3),
            Err(ConfigurationError::SpacingLengthMismatch {
                expected: 2,
                actual: 1
            })
        );
        assert_eq!(EdgeSpacing::PerPair(vec![1.0, 2.0]).gap(1), 2.0);
    }

    #[test]
    fn test_gap_past_last_pair_is_zero() {
        let spacing = EdgeSpacing::PerPair(vec![1.0, 2.0]);
        assert!(spacing.validate(3).is_ok());
        assert_eq!(spacing.gap(2), 0.0);
        assert_eq!(EdgeSpacing::Uniform(4.0).gap(99), 4.0);
    }

    #[test]
    fn test_classifier_config_validation() {
        assert!(ClassifierConfig::default().validate().is_ok());
        let bad = ClassifierConfig {
            sensor_std_dev: 0.0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
        let bad_bias = ClassifierConfig {
            diagonal_bias: -0.5,
            ..Default::default()
        };
        assert!(bad_bias.validate().is_err());
        assert!(LinearizationConfig::default().validate().is_ok());
    }
}
