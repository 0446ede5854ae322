//! Trackline Core - linearization of animal position on a track maze
//!
//! Turns 2-D tracker output into a 1-D "linear position" for decoding
//! analysis. Three hard parts:
//! 1. **Which arm?** Noisy samples near junctions are ambiguous; a Viterbi
//!    classifier over the track segments uses sensor noise and on-track
//!    continuity to pick the most plausible segment sequence
//! 2. **How far?** Distance along the track from the center well, through the
//!    maze graph rather than through walls
//! 3. **One axis.** Segments are laid out in a chosen order with gaps, so arms
//!    at the same distance from the center stay apart
//!
//! ```text
//! ┌────────────┐   ┌────────────┐   ┌────────────┐   ┌──────────┐   ┌────────────┐
//! │ TrackGraph │──►│ Classifier │──►│ Linear     │──►│ Stitcher │──►│ Kinematics │
//! │ (petgraph) │   │ (Viterbi)  │   │ distance   │   │          │   │            │
//! └────────────┘   └────────────┘   └────────────┘   └──────────┘   └────────────┘
//! ```

pub mod config;
pub mod error;
pub mod gap_fill;
pub mod kinematics;
pub mod linear_distance;
pub mod pipeline;
pub mod sample;
pub mod segment_classifier;
pub mod session;
pub mod stitcher;
pub mod track_graph;
pub mod validation;

// Re-export key types for convenience
pub use config::{ClassifierConfig, EdgeSpacing, LinearizationConfig, MazeGeometry};
pub use error::{
    ComputationError, ConfigurationError, DataQualityError, LinearizeError, PipelineError, PipelineStage,
    PreconditionError,
};
pub use linear_distance::{calculate_linear_distance, LinearDistanceCalculator};
pub use pipeline::{LinearizedPosition, LinearizedRow, Linearizer, RepairReport};
pub use sample::PositionSample;
pub use segment_classifier::{classify_track_segments, SegmentClassification, SegmentClassifier};
pub use session::{load_session, SessionData, SessionError, SessionRequest, SessionSources};
pub use stitcher::{stitch_linear_position, EdgeLayout, SegmentPlacement, StitchedPosition};
pub use track_graph::{Projection, TrackEdge, TrackGraph, TrackNode};
pub use validation::{GroundTruthSample, ValidationReport};
