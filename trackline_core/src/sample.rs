//! Raw position samples.

use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use trackline_env::PositionRecord;

/// A timestamped 2-D position, optionally with the tracker's speed.
///
/// Non-finite coordinates mean the tracker lost the animal for this sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    /// Timestamp in seconds
    pub time: f64,
    pub x: f64,
    pub y: f64,
    /// Speed in cm/s, if the tracker reports one
    pub speed: Option<f64>,
}

impl PositionSample {
    pub fn new(time: f64, x: f64, y: f64) -> Self {
        Self {
            time,
            x,
            y,
            speed: None,
        }
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = Some(speed);
        self
    }

    /// A sample with both coordinates missing.
    pub fn missing(time: f64) -> Self {
        Self::new(time, f64::NAN, f64::NAN)
    }

    /// The coordinate, or `None` when it is missing.
    #[inline]
    pub fn point(&self) -> Option<Point2<f64>> {
        if self.x.is_finite() && self.y.is_finite() {
            Some(Point2::new(self.x, self.y))
        } else {
            None
        }
    }

    #[inline]
    pub fn is_missing(&self) -> bool {
        self.point().is_none()
    }
}

impl From<PositionRecord> for PositionSample {
    fn from(record: PositionRecord) -> Self {
        Self {
            time: record.time,
            x: record.x,
            y: record.y,
            speed: record.speed.is_finite().then_some(record.speed),
        }
    }
}
