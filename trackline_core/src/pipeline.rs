//! The linearization pipeline.
//!
//! ```text
//!  samples ──► classify ──► linear distance ──► gap fill ──┬──────────────┐
//!                                                          │ (resampled)  │
//!                                                          ▼              │
//!                                     resample + pad-reindex segment ids  │
//!                                                          │              │
//!                                                          ▼              ▼
//!                                                   stitch ──► kinematics ──► table
//! ```
//!
//! Kinematics differentiate the linear distance, not the stitched position,
//! so the spacing inserted between segments never shows up as speed.
//!
//! Every failure comes back as a [`PipelineError`] naming the stage.

use crate::config::{LinearizationConfig, MazeGeometry};
use crate::error::{DataQualityError, PipelineError, PipelineStage, PreconditionError, StageExt};
use crate::gap_fill::{check_missing_fraction, fill_linear_distance, fill_segment_ids, reindex_pad, GapRun};
use crate::kinematics::KinematicEstimator;
use crate::linear_distance::LinearDistanceCalculator;
use crate::sample::PositionSample;
use crate::segment_classifier::SegmentClassifier;
use crate::stitcher::{EdgeLayout, SegmentPlacement, StitchedPosition};
use crate::track_graph::TrackGraph;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use trackline_env::{Resampler, TimeSeries};

/// One row of the linearized position table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearizedRow {
    pub time: f64,
    /// Raw (or resampled) coordinate; NaN where the tracker lost the animal
    pub x: f64,
    pub y: f64,
    pub speed: Option<f64>,
    pub track_segment_id: usize,
    pub projected_x: f64,
    pub projected_y: f64,
    pub linear_distance: f64,
    pub linear_position: f64,
    pub linear_velocity: f64,
    pub linear_speed: f64,
}

/// What the gap repair did to a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepairReport {
    /// Samples the classifier could not assign
    pub missing_samples: usize,
    /// Runs of segment ids that were carried forward/back
    pub segment_gaps: Vec<GapRun>,
    /// Runs of linear distance that were interpolated or held
    pub distance_gaps: Vec<GapRun>,
    /// Log-probability of the decoded segment path
    pub path_log_probability: f64,
}

/// The linearized position table plus how it was laid out and repaired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearizedPosition {
    pub rows: Vec<LinearizedRow>,
    pub sampling_frequency: f64,
    pub placements: Vec<SegmentPlacement>,
    pub unordered_segments: Vec<usize>,
    pub repair: RepairReport,
}

impl LinearizedPosition {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn time(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.time).collect()
    }

    pub fn segment_ids(&self) -> Vec<usize> {
        self.rows.iter().map(|r| r.track_segment_id).collect()
    }

    pub fn linear_distance(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.linear_distance).collect()
    }

    pub fn linear_position(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.linear_position).collect()
    }
}

/// Series after classification and repair, before stitching.
struct Repaired {
    time: Vec<f64>,
    x: Vec<f64>,
    y: Vec<f64>,
    speed: Vec<Option<f64>>,
    segment_ids: Vec<usize>,
    linear_distance: Vec<f64>,
    report: RepairReport,
}

/// Turns 2-D position into 1-D linear position for one maze.
///
/// Built once per maze; immutable afterwards and safe to share across
/// threads.
#[derive(Debug, Clone)]
pub struct Linearizer {
    geometry: MazeGeometry,
    config: LinearizationConfig,
    graph: Arc<TrackGraph>,
    layout: EdgeLayout,
}

impl Linearizer {
    /// Builds the graph and validates the configuration and edge layout.
    pub fn new(geometry: MazeGeometry, config: LinearizationConfig) -> Result<Self, PipelineError> {
        let graph = geometry.build_graph().at_stage(PipelineStage::Setup)?;
        Self::with_graph(geometry, config, Arc::new(graph))
    }

    /// Reuses an already built graph for `geometry`.
    pub fn with_graph(
        geometry: MazeGeometry,
        config: LinearizationConfig,
        graph: Arc<TrackGraph>,
    ) -> Result<Self, PipelineError> {
        config.validate().at_stage(PipelineStage::Setup)?;
        graph.node(geometry.center_well_id).at_stage(PipelineStage::Setup)?;
        let layout = EdgeLayout::new(
            geometry.edge_order.clone(),
            geometry.edge_spacing.clone(),
            graph.edge_count(),
        )
        .at_stage(PipelineStage::Setup)?
        .rejecting_unordered_segments(config.reject_unordered_segments);

        info!(
            maze = %geometry.name,
            nodes = graph.node_count(),
            segments = graph.edge_count(),
            center_well = geometry.center_well_id,
            "linearizer ready"
        );

        Ok(Self {
            geometry,
            config,
            graph,
            layout,
        })
    }

    pub fn geometry(&self) -> &MazeGeometry {
        &self.geometry
    }

    pub fn config(&self) -> &LinearizationConfig {
        &self.config
    }

    pub fn graph(&self) -> &Arc<TrackGraph> {
        &self.graph
    }

    pub fn layout(&self) -> &EdgeLayout {
        &self.layout
    }

    /// Linearizes a series sampled uniformly at `sampling_frequency`.
    pub fn linearize(
        &self,
        samples: &[PositionSample],
        sampling_frequency: f64,
    ) -> Result<LinearizedPosition, PipelineError> {
        info!(samples = samples.len(), sampling_frequency, "linearizing");
        let repaired = self.classify_and_repair(samples)?;
        self.finish(repaired, sampling_frequency)
    }

    /// Linearizes an irregular series, resampling onto a uniform grid.
    ///
    /// Segments and distances are computed on the raw samples. Coordinates,
    /// speed and linear distance are then resampled through `resampler`, and
    /// segment ids are carried onto the grid from the most recent raw sample.
    pub fn linearize_resampled(
        &self,
        samples: &[PositionSample],
        resampler: &dyn Resampler,
        sampling_frequency: f64,
    ) -> Result<LinearizedPosition, PipelineError> {
        info!(
            samples = samples.len(),
            sampling_frequency, "linearizing with resampling"
        );
        let raw = self.classify_and_repair(samples)?;

        let to_column = |values: &[Option<f64>]| values.iter().map(|v| v.unwrap_or(f64::NAN)).collect::<Vec<_>>();
        let series = TimeSeries::new(raw.time.clone())
            .with_column("x", raw.x.clone())
            .and_then(|s| s.with_column("y", raw.y.clone()))
            .and_then(|s| s.with_column("speed", to_column(&raw.speed)))
            .and_then(|s| s.with_column("linear_distance", raw.linear_distance.clone()))
            .at_stage(PipelineStage::Resampling)?;

        let resampled = resampler
            .resample(&series, sampling_frequency)
            .at_stage(PipelineStage::Resampling)?;
        let column = |name: &'static str| {
            resampled
                .column(name)
                .map(<[f64]>::to_vec)
                .ok_or(DataQualityError::LengthMismatch {
                    name,
                    expected: resampled.len(),
                    actual: 0,
                })
                .at_stage(PipelineStage::Resampling)
        };

        let segment_ids = reindex_pad(
            &raw.time,
            &raw.segment_ids,
            &resampled.time,
            self.config.max_fill_gap_s,
        )
        .at_stage(PipelineStage::GapFill)?;

        // Interpolation may undershoot; distance and speed are non-negative
        let linear_distance: Vec<f64> = column("linear_distance")?.into_iter().map(|d| d.max(0.0)).collect();
        let speed = column("speed")?
            .into_iter()
            .map(|s| s.is_finite().then(|| s.max(0.0)))
            .collect();

        debug!(
            raw = raw.time.len(),
            resampled = resampled.len(),
            "resampled position"
        );

        let repaired = Repaired {
            time: resampled.time.clone(),
            x: column("x")?,
            y: column("y")?,
            speed,
            segment_ids,
            linear_distance,
            report: raw.report,
        };
        self.finish(repaired, sampling_frequency)
    }

    /// Classification, linear distance and gap repair on the raw samples.
    fn classify_and_repair(&self, samples: &[PositionSample]) -> Result<Repaired, PipelineError> {
        if samples.len() < 2 {
            return Err(PipelineError::new(
                PipelineStage::Validation,
                PreconditionError::TooFewSamples {
                    required: 2,
                    actual: samples.len(),
                },
            ));
        }
        if let Some(index) = samples.windows(2).position(|w| !(w[1].time > w[0].time)) {
            return Err(PipelineError::new(
                PipelineStage::Validation,
                DataQualityError::UnorderedTime { index: index + 1 },
            ));
        }

        let classifier =
            SegmentClassifier::new(&self.graph, self.config.classifier).at_stage(PipelineStage::Classification)?;
        let classification = classifier.classify(samples).at_stage(PipelineStage::Classification)?;

        let calculator = LinearDistanceCalculator::new(&self.graph, self.geometry.center_well_id)
            .at_stage(PipelineStage::LinearDistance)?;
        let distances = calculator
            .calculate(&classification.segment_ids, samples)
            .at_stage(PipelineStage::LinearDistance)?;

        check_missing_fraction(&classification.segment_ids, self.config.max_missing_fraction)
            .at_stage(PipelineStage::GapFill)?;
        let ids = fill_segment_ids(&classification.segment_ids, self.config.max_fill_gap)
            .at_stage(PipelineStage::GapFill)?;
        let filled = fill_linear_distance(&distances, &ids.values, self.config.max_fill_gap)
            .at_stage(PipelineStage::GapFill)?;

        let report = RepairReport {
            missing_samples: samples.len() - classification.assigned_count(),
            segment_gaps: ids.repaired,
            distance_gaps: filled.repaired,
            path_log_probability: classification.path_log_probability,
        };
        debug!(
            missing = report.missing_samples,
            repaired_runs = report.segment_gaps.len(),
            switches = classification.switch_count(),
            "classified and repaired"
        );

        Ok(Repaired {
            time: samples.iter().map(|s| s.time).collect(),
            x: samples.iter().map(|s| s.x).collect(),
            y: samples.iter().map(|s| s.y).collect(),
            speed: samples.iter().map(|s| s.speed).collect(),
            segment_ids: ids.values,
            linear_distance: filled.values,
            report,
        })
    }

    /// Stitching, kinematics and table assembly.
    fn finish(&self, repaired: Repaired, sampling_frequency: f64) -> Result<LinearizedPosition, PipelineError> {
        let StitchedPosition {
            linear_position,
            placements,
            unordered_segments,
        } = self
            .layout
            .stitch(&repaired.linear_distance, &repaired.segment_ids)
            .at_stage(PipelineStage::Stitching)?;

        let kinematics = KinematicEstimator::new(
            sampling_frequency,
            self.config.smoothing_std_s,
            self.config.sampling_tolerance,
        )
        .estimate(&repaired.time, &repaired.linear_distance)
        .at_stage(PipelineStage::Kinematics)?;

        let calculator = LinearDistanceCalculator::new(&self.graph, self.geometry.center_well_id)
            .at_stage(PipelineStage::LinearDistance)?;

        let mut rows = Vec::with_capacity(repaired.time.len());
        for i in 0..repaired.time.len() {
            let segment = repaired.segment_ids[i];
            // A loop segment has two points per distance; prefer the measured one
            let projected = match PositionSample::new(repaired.time[i], repaired.x[i], repaired.y[i]).point() {
                Some(point) => {
                    self.graph
                        .project(&point, segment)
                        .at_stage(PipelineStage::LinearDistance)?
                        .point
                }
                None => calculator
                    .point_at_distance(segment, repaired.linear_distance[i])
                    .at_stage(PipelineStage::LinearDistance)?,
            };
            rows.push(LinearizedRow {
                time: repaired.time[i],
                x: repaired.x[i],
                y: repaired.y[i],
                speed: repaired.speed[i],
                track_segment_id: segment,
                projected_x: projected.x,
                projected_y: projected.y,
                linear_distance: repaired.linear_distance[i],
                linear_position: linear_position[i],
                linear_velocity: kinematics.velocity[i],
                linear_speed: kinematics.speed[i],
            });
        }

        info!(
            rows = rows.len(),
            placed_segments = placements.len(),
            repaired_runs = repaired.report.segment_gaps.len(),
            "linearization complete"
        );

        Ok(LinearizedPosition {
            rows,
            sampling_frequency,
            placements,
            unordered_segments,
            repair: repaired.report,
        })
    }
}
