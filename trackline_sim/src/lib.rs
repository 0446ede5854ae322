//! Trackline Deterministic Simulation Harness
//!
//! Runs the linearizer against recordings whose truth is known. Every
//! source of randomness (route choice, tracker noise, dropouts, clock
//! jitter, neural data) derives from a single 64-bit seed, so any failing
//! run can be replayed exactly.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      ScenarioRunner                         │
//! │  ┌───────────────────────────┐                              │
//! │  │          Oracle           │  true path, segment and      │
//! │  │ (walks the maze graph)    │  linear distance per frame   │
//! │  └─────────────┬─────────────┘                              │
//! │                │ noisy frames                               │
//! │       ┌────────┴─────────┐                                  │
//! │  ┌────▼──────┐      ┌────▼──────────────┐                   │
//! │  │Linearizer │      │ SimSession        │                   │
//! │  │ (direct)  │      │ + load_session    │                   │
//! │  └────┬──────┘      └────┬──────────────┘                   │
//! │       └────────┬─────────┘                                  │
//! │        ┌───────▼──────────┐     ┌───────────┐               │
//! │        │ ValidationReport │────►│ SimExport │               │
//! │        └──────────────────┘     └───────────┘               │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use trackline_sim::{ScenarioRunner, ScenarioId};
//!
//! let result = ScenarioRunner::new(42).with_duration(30.0).run(ScenarioId::CleanRun);
//! assert!(result.passed);
//! ```

mod config;
mod error;
mod exporter;
mod oracle;
mod runner;
pub mod scenarios;
mod source;

pub use config::{ForcedGap, SimConfig};
pub use error::SimError;
pub use exporter::{SimExport, SimFrame};
pub use oracle::{Oracle, Trajectory};
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use scenarios::ScenarioId;
pub use source::{SimSession, LFP_SAMPLING_RATE};
