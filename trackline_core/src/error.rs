//! Error taxonomy for the linearization engine.
//!
//! Three families, mirroring how a failure should be handled:
//! - [`ConfigurationError`]: the maze description or layout is malformed.
//!   Every downstream distance would be wrong, so the run aborts.
//! - [`DataQualityError`]: the samples themselves are unusable beyond what
//!   local repair may fix.
//! - [`ComputationError`]: a geometric/graph query has no answer.
//!
//! Failures of an injected collaborator (the resampler) pass through as
//! [`EnvError`].
//!
//! The pipeline wraps all of them in [`PipelineError`], which names the stage
//! that failed.

use thiserror::Error;
use trackline_env::EnvError;

/// Malformed graph description, layout or parameters.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("track graph has no nodes")]
    EmptyGraph,

    #[error("track graph has no segments to classify onto")]
    NoSegments,

    #[error("edge {edge_id} references node {node_id}, but only {node_count} nodes exist")]
    DanglingEdge {
        edge_id: usize,
        node_id: usize,
        node_count: usize,
    },

    #[error("track graph is disconnected: nodes {unreachable:?} cannot be reached from node {origin}")]
    DisconnectedGraph {
        origin: usize,
        unreachable: Vec<usize>,
    },

    #[error("node {node_id} has a non-finite coordinate")]
    NonFiniteNode { node_id: usize },

    #[error("node {node_id} does not exist (graph has {node_count} nodes)")]
    UnknownNode { node_id: usize, node_count: usize },

    #[error("segment {segment_id} does not exist (graph has {edge_count} edges)")]
    UnknownSegment { segment_id: usize, edge_count: usize },

    #[error("segment {segment_id} appears more than once in the edge order")]
    DuplicateSegment { segment_id: usize },

    #[error("edge spacing has {actual} gaps, expected {expected} for the edge order")]
    SpacingLengthMismatch { expected: usize, actual: usize },

    #[error("segment {segment_id} has samples but is not part of the edge order")]
    UnorderedSegment { segment_id: usize },

    #[error("parameter {name} = {value} is invalid: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },

    #[error("failed to read maze geometry: {0}")]
    Geometry(String),
}

/// Precondition violated by a time series handed to the kinematic stage.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PreconditionError {
    #[error(
        "sample spacing {observed_dt}s at sample {index} does not match the declared \
         sampling frequency {sampling_frequency}Hz"
    )]
    SamplingRateMismatch {
        sampling_frequency: f64,
        observed_dt: f64,
        index: usize,
    },

    #[error("need at least {required} samples, got {actual}")]
    TooFewSamples { required: usize, actual: usize },

    #[error("non-finite value at sample {index}")]
    NonFiniteValue { index: usize },
}

/// The samples are unusable beyond what local repair may fix.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataQualityError {
    #[error("{missing} of {total} samples are missing, above the tolerated fraction {max_fraction}")]
    TooManyMissing {
        missing: usize,
        total: usize,
        max_fraction: f64,
    },

    #[error("samples {start}..={end} are missing, longer than the fill limit of {max_gap}")]
    UnfilledGap {
        start: usize,
        end: usize,
        max_gap: usize,
    },

    #[error("segment id carried onto sample {index} is {staleness}s old, beyond the fill limit of {max_gap_s}s")]
    StaleSegment {
        index: usize,
        staleness: f64,
        max_gap_s: f64,
    },

    #[error("no valid samples to work with")]
    NoValidSamples,

    #[error("{name} has {actual} entries, expected {expected}")]
    LengthMismatch {
        name: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("timestamps are not increasing at sample {index}")]
    UnorderedTime { index: usize },

    #[error(transparent)]
    Precondition(#[from] PreconditionError),
}

/// A graph or geometry query has no answer.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ComputationError {
    #[error("no path between node {from} and node {to}")]
    Unreachable { from: usize, to: usize },

    #[error("edge {edge_id} has zero length")]
    DegenerateEdge { edge_id: usize },
}

/// Union of every error the engine can raise.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LinearizeError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    DataQuality(#[from] DataQualityError),

    #[error(transparent)]
    Computation(#[from] ComputationError),

    #[error("collaborator failed: {0}")]
    Environment(#[from] EnvError),
}

impl From<PreconditionError> for LinearizeError {
    fn from(err: PreconditionError) -> Self {
        Self::DataQuality(DataQualityError::Precondition(err))
    }
}

/// Pipeline stages, used to report where a run failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Setup,
    Validation,
    Classification,
    LinearDistance,
    Resampling,
    GapFill,
    Stitching,
    Kinematics,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PipelineStage::Setup => "setup",
            PipelineStage::Validation => "validation",
            PipelineStage::Classification => "segment classification",
            PipelineStage::LinearDistance => "linear distance",
            PipelineStage::Resampling => "resampling",
            PipelineStage::GapFill => "gap fill",
            PipelineStage::Stitching => "stitching",
            PipelineStage::Kinematics => "kinematics",
        };
        f.write_str(name)
    }
}

/// A failed linearization run: which stage failed and why.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{stage} stage failed: {source}")]
pub struct PipelineError {
    pub stage: PipelineStage,
    pub source: LinearizeError,
}

impl PipelineError {
    pub fn new(stage: PipelineStage, source: impl Into<LinearizeError>) -> Self {
        Self {
            stage,
            source: source.into(),
        }
    }
}

/// Tags a stage onto any engine result.
pub(crate) trait StageExt<T> {
    fn at_stage(self, stage: PipelineStage) -> Result<T, PipelineError>;
}

impl<T, E: Into<LinearizeError>> StageExt<T> for Result<T, E> {
    fn at_stage(self, stage: PipelineStage) -> Result<T, PipelineError> {
        self.map_err(|e| PipelineError::new(stage, e))
    }
}
