//! Session bundle assembly.
//!
//! Pulls everything downstream decoding needs for one recording session
//! through the collaborator traits and hands it back as one value: the
//! linearized position table on a fixed grid, multiunit indicators aligned to
//! that grid and, optionally, a band-filtered reference channel.

use crate::error::PipelineError;
use crate::pipeline::{LinearizedPosition, Linearizer};
use crate::sample::PositionSample;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use trackline_env::{
    ChannelKey, EnvError, FilteredSignal, FilteredSignalSource, FrequencyBand, MultiunitIndicators, MultiunitSource,
    PositionSource, Resampler, SessionKey,
};

/// Errors raised while assembling a session.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error("session {session}: {source}")]
    Env { session: SessionKey, source: EnvError },

    #[error("session {session}: {source}")]
    Pipeline { session: SessionKey, source: PipelineError },

    #[error("session {session}: a reference channel was requested but no filtered signal source is available")]
    NoFilteredSource { session: SessionKey },
}

/// Channel whose filtered LFP is bundled with the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceChannel {
    pub tetrode: u32,
    pub band: FrequencyBand,
}

/// Which session to load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRequest {
    pub session: SessionKey,
    pub reference_channel: Option<ReferenceChannel>,
}

impl SessionRequest {
    pub fn new(session: SessionKey) -> Self {
        Self {
            session,
            reference_channel: None,
        }
    }

    pub fn with_reference(mut self, tetrode: u32, band: FrequencyBand) -> Self {
        self.reference_channel = Some(ReferenceChannel { tetrode, band });
        self
    }
}

/// The collaborators a session is loaded from.
#[derive(Clone, Copy)]
pub struct SessionSources<'a> {
    pub position: &'a dyn PositionSource,
    pub multiunit: &'a dyn MultiunitSource,
    pub filtered: Option<&'a dyn FilteredSignalSource>,
}

/// Everything downstream analysis needs for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    pub session: SessionKey,
    pub position_info: LinearizedPosition,
    pub multiunit: MultiunitIndicators,
    pub reference_lfp: Option<FilteredSignal>,
}

/// Loads, linearizes and aligns one session.
///
/// Position is resampled onto a grid at the linearizer's configured
/// `resample_frequency`; multiunit indicators are requested on that same time
/// index.
pub fn load_session(
    request: &SessionRequest,
    sources: SessionSources<'_>,
    linearizer: &Linearizer,
    resampler: &dyn Resampler,
) -> Result<SessionData, SessionError> {
    let session = &request.session;
    let env_err = |source: EnvError| SessionError::Env {
        session: session.clone(),
        source,
    };

    let records = sources.position.position(session).map_err(env_err)?;
    let samples: Vec<PositionSample> = records.into_iter().map(PositionSample::from).collect();
    info!(session = %session, samples = samples.len(), "loaded position");

    let position_info = linearizer
        .linearize_resampled(&samples, resampler, linearizer.config().resample_frequency)
        .map_err(|source| SessionError::Pipeline {
            session: session.clone(),
            source,
        })?;

    let time = position_info.time();
    let channels = sources.multiunit.channels(session).map_err(env_err)?;
    let multiunit = sources
        .multiunit
        .multiunit_indicators(&channels, &time)
        .map_err(env_err)?;
    if multiunit.time.len() != time.len() {
        return Err(env_err(EnvError::LengthMismatch {
            name: "multiunit time".to_string(),
            expected: time.len(),
            actual: multiunit.time.len(),
        }));
    }
    debug!(channels = multiunit.channel_count(), "loaded multiunit indicators");

    let reference_lfp = match &request.reference_channel {
        Some(reference) => {
            let source = sources.filtered.ok_or_else(|| SessionError::NoFilteredSource {
                session: session.clone(),
            })?;
            let channel = ChannelKey::new(session.clone(), reference.tetrode);
            let signal = source.filtered_signal(&channel, &reference.band).map_err(env_err)?;
            debug!(channel = %channel, band = %reference.band, samples = signal.len(), "loaded reference signal");
            Some(signal)
        }
        None => None,
    };

    info!(
        session = %session,
        rows = position_info.len(),
        channels = multiunit.channel_count(),
        "session ready"
    );

    Ok(SessionData {
        session: session.clone(),
        position_info,
        multiunit,
        reference_lfp,
    })
}
