//! Data source traits implemented by collaborators.

use crate::error::EnvError;
use crate::types::{
    ChannelKey, FilteredSignal, FrequencyBand, MultiunitIndicators, PositionRecord, SessionKey,
};

/// Retrieval of raw animal position.
///
/// # Implementations
///
/// - **Production**: reads the tracker output for the session from disk
/// - **Simulation**: `trackline_sim::SimSession`, noisy samples of a seeded
///   ground-truth trajectory
pub trait PositionSource: Send + Sync {
    /// Returns the ordered position records for a session.
    ///
    /// # Returns
    /// * `Ok(records)` - Records sorted by time; coordinates may be NaN
    /// * `Err(EnvError::NotFound)` - Unknown session
    fn position(&self, session: &SessionKey) -> Result<Vec<PositionRecord>, EnvError>;
}

/// Retrieval of multi-channel neural indicators.
///
/// Channels are independent, so an implementation may serve them from
/// separate workers; no shared mutable state is implied by this trait.
pub trait MultiunitSource: Send + Sync {
    /// Lists the channels recorded in a session.
    fn channels(&self, session: &SessionKey) -> Result<Vec<ChannelKey>, EnvError>;

    /// Returns indicators for `channels`, aligned to `time`.
    fn multiunit_indicators(
        &self,
        channels: &[ChannelKey],
        time: &[f64],
    ) -> Result<MultiunitIndicators, EnvError>;
}

/// Retrieval of a band-filtered LFP for one channel.
pub trait FilteredSignalSource: Send + Sync {
    fn filtered_signal(
        &self,
        channel: &ChannelKey,
        band: &FrequencyBand,
    ) -> Result<FilteredSignal, EnvError>;
}
