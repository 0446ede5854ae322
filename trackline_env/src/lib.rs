//! Trackline Environment Abstraction Layer
//!
//! This crate holds the narrow interfaces through which the linearization
//! engine talks to the outside world. Nothing in here knows about track
//! graphs; it only describes *where data comes from*:
//!
//! - **Position**: ordered `(time, x, y, speed)` records for a recording session
//! - **Multiunit**: per-channel indicators aligned to a time index
//! - **Filtered signal**: band-filtered LFP (signal, phase, envelope)
//! - **Resampling**: interpolation of a time series onto a fixed grid
//!
//! # Implementations
//!
//! - **Production**: file-backed loaders living outside this workspace, plus
//!   the [`LinearResampler`] shipped here
//! - **Simulation**: `trackline_sim` implements every source trait from a
//!   seeded ground-truth oracle
//!
//! # Example
//!
//! ```ignore
//! use trackline_env::{PositionSource, SessionKey};
//!
//! fn count_samples<S: PositionSource>(source: &S) -> usize {
//!     let key = SessionKey::new("bon", 3, 2);
//!     source.position(&key).map(|records| records.len()).unwrap_or(0)
//! }
//! ```

mod error;
mod resample;
mod source;
mod types;

pub use error::EnvError;
pub use resample::{LinearResampler, Resampler};
pub use source::{FilteredSignalSource, MultiunitSource, PositionSource};
pub use types::{
    ChannelKey, FilteredSignal, FrequencyBand, MultiunitIndicators, PositionRecord, SessionKey,
    TimeSeries,
};
