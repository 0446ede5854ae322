//! Simulated session implementing the trackline collaborator traits.

use crate::config::SimConfig;
use crate::oracle::Trajectory;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use std::f64::consts::TAU;
use trackline_env::{
    ChannelKey, EnvError, FilteredSignal, FilteredSignalSource, FrequencyBand, MultiunitIndicators, MultiunitSource,
    PositionRecord, PositionSource, SessionKey,
};

/// Sampling rate of the synthetic filtered LFP
pub const LFP_SAMPLING_RATE: f64 = 1500.0;

/// Probability that a channel carries a multiunit event at a grid point
const EVENT_PROBABILITY: f64 = 0.05;

/// One simulated recording session.
///
/// Serves the oracle's tracker output as position, and seeded synthetic
/// multiunit indicators and filtered LFP for every simulated tetrode.
/// Everything is a pure function of the seed, so repeated requests return
/// identical data.
#[derive(Debug, Clone)]
pub struct SimSession {
    key: SessionKey,
    records: Vec<PositionRecord>,
    tetrodes: u32,

    /// Seed for neural data, independent of the physics seed
    neural_seed: u64,
}

impl SimSession {
    pub fn new(key: SessionKey, trajectory: &Trajectory, config: &SimConfig) -> Self {
        Self {
            key,
            records: trajectory.records(),
            tetrodes: config.tetrodes,
            neural_seed: config.seed.wrapping_mul(0x517cc1b727220a95),
        }
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    fn check_session(&self, session: &SessionKey) -> Result<(), EnvError> {
        if session == &self.key {
            Ok(())
        } else {
            Err(EnvError::not_found(format!("session {}", session)))
        }
    }

    fn check_channel(&self, channel: &ChannelKey) -> Result<(), EnvError> {
        self.check_session(&channel.session)?;
        if (1..=self.tetrodes).contains(&channel.tetrode) {
            Ok(())
        } else {
            Err(EnvError::not_found(format!("channel {}", channel)))
        }
    }

    fn channel_rng(&self, tetrode: u32) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(self.neural_seed ^ u64::from(tetrode))
    }
}

/// Centre frequency of a band, for the synthetic oscillation.
fn band_frequency(band: &FrequencyBand) -> Option<f64> {
    match band {
        FrequencyBand::Theta => Some(8.0),
        FrequencyBand::LowGamma => Some(35.0),
        FrequencyBand::Ripple => Some(200.0),
        FrequencyBand::Named(_) => None,
    }
}

impl PositionSource for SimSession {
    fn position(&self, session: &SessionKey) -> Result<Vec<PositionRecord>, EnvError> {
        self.check_session(session)?;
        Ok(self.records.clone())
    }
}

impl MultiunitSource for SimSession {
    fn channels(&self, session: &SessionKey) -> Result<Vec<ChannelKey>, EnvError> {
        self.check_session(session)?;
        Ok((1..=self.tetrodes)
            .map(|tetrode| ChannelKey::new(self.key.clone(), tetrode))
            .collect())
    }

    fn multiunit_indicators(&self, channels: &[ChannelKey], time: &[f64]) -> Result<MultiunitIndicators, EnvError> {
        let amplitude = Normal::new(80.0, 20.0).map_err(|e| EnvError::Source(e.to_string()))?;
        let mut values = Vec::with_capacity(channels.len());
        for channel in channels {
            self.check_channel(channel)?;
            let mut rng = self.channel_rng(channel.tetrode);
            let column = time
                .iter()
                .map(|_| {
                    if rng.gen_bool(EVENT_PROBABILITY) {
                        f64::abs(amplitude.sample(&mut rng))
                    } else {
                        f64::NAN
                    }
                })
                .collect();
            values.push(column);
        }
        MultiunitIndicators::new(time.to_vec(), channels.to_vec(), values)
    }
}

impl FilteredSignalSource for SimSession {
    fn filtered_signal(&self, channel: &ChannelKey, band: &FrequencyBand) -> Result<FilteredSignal, EnvError> {
        self.check_channel(channel)?;
        let frequency = band_frequency(band).ok_or_else(|| EnvError::not_found(format!("band {}", band)))?;
        let (Some(first), Some(last)) = (self.records.first(), self.records.last()) else {
            return Err(EnvError::not_found(format!("signal for {}", channel)));
        };

        let n = ((last.time - first.time) * LFP_SAMPLING_RATE).floor() as usize + 1;
        let amplitude = 50.0 + 10.0 * f64::from(channel.tetrode);
        let phase: Vec<f64> = (0..n)
            .map(|i| (TAU * frequency * i as f64 / LFP_SAMPLING_RATE).rem_euclid(TAU))
            .collect();
        let bandpassed = phase.iter().map(|p| amplitude * p.cos()).collect();

        FilteredSignal::from_start_time(
            channel.clone(),
            band.clone(),
            first.time,
            LFP_SAMPLING_RATE,
            bandpassed,
            phase,
            vec![amplitude; n],
        )
    }
}
