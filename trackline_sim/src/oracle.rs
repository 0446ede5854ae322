//! Ground truth oracle for simulation.
//!
//! The Oracle maintains the "God's eye view" of the simulated recording:
//! - The true path of the animal, running well-to-well along the track
//! - The true segment and linear distance of every frame
//! - Tracker readings generated from the truth (noise, dropouts, jitter)

use crate::config::SimConfig;
use crate::error::SimError;
use nalgebra::Point2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use std::collections::VecDeque;
use std::sync::Arc;
use trackline_core::{GroundTruthSample, LinearDistanceCalculator, LinearizeError, PositionSample, TrackGraph};
use trackline_env::PositionRecord;

/// One edge traversed in a fixed direction.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Leg {
    edge_id: usize,
    from: usize,
    to: usize,
    length: f64,
}

/// A simulated recording: the truth and what the tracker saw.
#[derive(Debug, Clone)]
pub struct Trajectory {
    /// True position of the animal per frame
    pub true_positions: Vec<Point2<f64>>,

    /// True segment and linear distance per frame
    pub truth: Vec<GroundTruthSample>,

    /// Tracker output per frame (NaN coordinates for lost frames)
    pub samples: Vec<PositionSample>,
}

impl Trajectory {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Frames the tracker lost.
    pub fn missing_count(&self) -> usize {
        self.samples.iter().filter(|s| s.is_missing()).count()
    }

    /// The tracker output as collaborator records.
    pub fn records(&self) -> Vec<PositionRecord> {
        self.samples
            .iter()
            .map(|s| PositionRecord {
                time: s.time,
                x: s.x,
                y: s.y,
                speed: s.speed.unwrap_or(f64::NAN),
            })
            .collect()
    }
}

/// The Oracle - walks the maze and generates tracker readings.
pub struct Oracle {
    /// Seed for the walk and the sensor noise
    physics_seed: u64,

    /// RNG for route choice, noise and dropouts
    rng: ChaCha8Rng,

    graph: Arc<TrackGraph>,

    /// Where every recording starts
    center_well_id: usize,

    /// Candidate run targets (dead ends of the maze)
    wells: Vec<usize>,

    config: SimConfig,
}

impl Oracle {
    /// Creates an oracle for `graph`.
    ///
    /// The physics seed is derived from `config.seed` so that it does not
    /// collide with the seeds used for synthetic neural data.
    pub fn new(graph: Arc<TrackGraph>, center_well_id: usize, config: SimConfig) -> Result<Self, SimError> {
        graph.node(center_well_id).map_err(LinearizeError::from)?;
        if graph.edge_count() == 0 {
            return Err(SimError::Setup("maze has no segments to walk".to_string()));
        }
        if !(config.sampling_rate_hz.is_finite() && config.sampling_rate_hz > 0.0) {
            return Err(SimError::Setup(format!("invalid sampling rate {}", config.sampling_rate_hz)));
        }
        if !(config.walking_speed.is_finite() && config.walking_speed > 0.0) {
            return Err(SimError::Setup(format!("invalid walking speed {}", config.walking_speed)));
        }
        if !(0.0..=1.0).contains(&config.dropout_rate) {
            return Err(SimError::Setup(format!("invalid dropout rate {}", config.dropout_rate)));
        }
        if !(config.timing_jitter_s >= 0.0 && config.timing_jitter_s < 0.5 / config.sampling_rate_hz) {
            return Err(SimError::Setup(format!(
                "timing jitter {}s would reorder frames",
                config.timing_jitter_s
            )));
        }

        let mut degree = vec![0usize; graph.node_count()];
        for edge in graph.edges() {
            degree[edge.start] += 1;
            degree[edge.end] += 1;
        }
        let mut wells: Vec<usize> = (0..graph.node_count()).filter(|&n| degree[n] == 1).collect();
        if wells.len() < 2 {
            wells = (0..graph.node_count()).collect();
        }

        let physics_seed = config.seed.wrapping_mul(0x9e3779b97f4a7c15);
        Ok(Self {
            physics_seed,
            rng: ChaCha8Rng::seed_from_u64(physics_seed),
            graph,
            center_well_id,
            wells,
            config,
        })
    }

    pub fn physics_seed(&self) -> u64 {
        self.physics_seed
    }

    pub fn wells(&self) -> &[usize] {
        &self.wells
    }

    /// First leg of a shortest route from `from` to `target`.
    ///
    /// Among equally short routes the lowest segment id wins.
    fn next_leg(&self, from: usize, target: usize) -> Result<Leg, SimError> {
        let remaining = self.graph.node_distance(from, target)?;
        for edge in self.graph.edges() {
            let other = if edge.start == from {
                edge.end
            } else if edge.end == from {
                edge.start
            } else {
                continue;
            };
            let via = edge.length + self.graph.node_distance(other, target)?;
            if (via - remaining).abs() <= 1e-9 * remaining.max(1.0) {
                return Ok(Leg {
                    edge_id: edge.id,
                    from,
                    to: other,
                    length: edge.length,
                });
            }
        }
        Err(SimError::Setup(format!("no route from node {} to node {}", from, target)))
    }

    /// Picks a random well other than `from` and plans the route there.
    fn plan_route(&mut self, from: usize) -> Result<VecDeque<Leg>, SimError> {
        let candidates: Vec<usize> = self.wells.iter().copied().filter(|&w| w != from).collect();
        if candidates.is_empty() {
            return Err(SimError::Setup("maze has no second well to run to".to_string()));
        }
        let target = candidates[self.rng.gen_range(0..candidates.len())];

        let mut legs = VecDeque::new();
        let mut node = from;
        while node != target {
            let leg = self.next_leg(node, target)?;
            node = leg.to;
            legs.push_back(leg);
        }
        Ok(legs)
    }

    /// Generates a full recording.
    pub fn generate(&mut self) -> Result<Trajectory, SimError> {
        let frames = self.config.frame_count();
        let dt = 1.0 / self.config.sampling_rate_hz;
        let jitter = self.config.timing_jitter_s;
        let graph = Arc::clone(&self.graph);
        let calculator = LinearDistanceCalculator::new(&graph, self.center_well_id)?;
        let noise = Normal::new(0.0, self.config.sensor_noise_std).map_err(|e| SimError::Setup(e.to_string()))?;

        let mut legs = self.plan_route(self.center_well_id)?;
        let mut progress = 0.0;
        let mut dwell_left = 0.0;
        let mut dropout_left = 0usize;
        let mut cooldown = false;

        let mut trajectory = Trajectory {
            true_positions: Vec::with_capacity(frames),
            truth: Vec::with_capacity(frames),
            samples: Vec::with_capacity(frames),
        };

        for i in 0..frames {
            let leg = *legs
                .front()
                .ok_or_else(|| SimError::Setup("walker ran out of route".to_string()))?;
            let from = graph.node(leg.from).map_err(LinearizeError::from)?.position;
            let to = graph.node(leg.to).map_err(LinearizeError::from)?.position;
            let position = from + (to - from) * (progress / leg.length);

            let projection = graph.project(&position, leg.edge_id).map_err(LinearizeError::from)?;
            let linear_distance = calculator.distance(&projection)?;

            let time = if jitter > 0.0 {
                i as f64 * dt + self.rng.gen_range(-jitter..=jitter)
            } else {
                i as f64 * dt
            };
            let moving = dwell_left <= 0.0;

            trajectory.true_positions.push(position);
            trajectory.truth.push(GroundTruthSample {
                time,
                segment_id: leg.edge_id,
                linear_distance,
            });

            // Tracker reading
            let burst_lost = if dropout_left > 0 {
                dropout_left -= 1;
                cooldown = dropout_left == 0;
                true
            } else if cooldown {
                cooldown = false;
                false
            } else if self.config.dropout_burst > 0 && self.rng.gen_bool(self.config.dropout_rate) {
                dropout_left = self.config.dropout_burst - 1;
                cooldown = dropout_left == 0;
                true
            } else {
                false
            };
            let forced_lost = self
                .config
                .forced_gap
                .is_some_and(|gap| time >= gap.start_s && time < gap.start_s + gap.duration_s);

            let sample = if burst_lost || forced_lost {
                PositionSample::missing(time)
            } else {
                let x = position.x + noise.sample(&mut self.rng);
                let y = position.y + noise.sample(&mut self.rng);
                let speed = if moving { self.config.walking_speed } else { 0.0 };
                PositionSample::new(time, x, y).with_speed(speed)
            };
            trajectory.samples.push(sample);

            // Advance the walker
            if dwell_left > 0.0 {
                dwell_left -= dt;
                if dwell_left <= 0.0 {
                    legs = self.plan_route(leg.to)?;
                    progress = 0.0;
                }
                continue;
            }

            let mut step = self.config.walking_speed * dt;
            while let Some(&current) = legs.front() {
                let left = current.length - progress;
                if step < left {
                    progress += step;
                    break;
                }
                if legs.len() == 1 {
                    // Arrived at the well
                    if self.config.well_dwell_s > 0.0 {
                        progress = current.length;
                        dwell_left = self.config.well_dwell_s;
                    } else {
                        legs = self.plan_route(current.to)?;
                        progress = 0.0;
                    }
                    break;
                }
                step -= left;
                legs.pop_front();
                progress = 0.0;
            }
        }

        Ok(trajectory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use trackline_core::MazeGeometry;

    fn w_track_oracle(config: SimConfig) -> Oracle {
        let geometry = MazeGeometry::w_track();
        let graph = Arc::new(geometry.build_graph().unwrap());
        Oracle::new(graph, geometry.center_well_id, config).unwrap()
    }

    fn short() -> SimConfig {
        SimConfig {
            duration_secs: 20.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_wells_are_dead_ends() {
        let oracle = w_track_oracle(short());
        assert_eq!(oracle.wells(), &[0, 2, 5, 7, 8, 9]);
    }

    #[test]
    fn test_truth_lies_on_its_segment() {
        let mut oracle = w_track_oracle(short());
        let trajectory = oracle.generate().unwrap();
        assert_eq!(trajectory.len(), 600);

        let graph = MazeGeometry::w_track().build_graph().unwrap();
        for (position, truth) in trajectory.true_positions.iter().zip(&trajectory.truth) {
            let projection = graph.project(position, truth.segment_id).unwrap();
            assert!(projection.distance < 1e-9);
        }
        // Recording starts at the center well
        assert_relative_eq!(trajectory.truth[0].linear_distance, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_walker_moves_at_walking_speed() {
        let config = SimConfig {
            well_dwell_s: 0.0,
            ..short()
        };
        let mut oracle = w_track_oracle(config.clone());
        let trajectory = oracle.generate().unwrap();
        let step = config.walking_speed / config.sampling_rate_hz;
        for pair in trajectory.true_positions.windows(2) {
            // Straight-line displacement never exceeds the on-track step
            assert!((pair[1] - pair[0]).norm() <= step + 1e-9);
        }
    }

    #[test]
    fn test_oracle_deterministic() {
        let a = w_track_oracle(short()).generate().unwrap();
        let b = w_track_oracle(short()).generate().unwrap();
        assert_eq!(a.samples, b.samples);
        assert_eq!(a.truth, b.truth);

        let c = w_track_oracle(SimConfig { seed: 7, ..short() }).generate().unwrap();
        assert_ne!(a.samples, c.samples);
    }

    #[test]
    fn test_dropout_bursts_are_bounded() {
        let config = SimConfig {
            dropout_rate: 0.05,
            dropout_burst: 5,
            ..short()
        };
        let trajectory = w_track_oracle(config).generate().unwrap();
        assert!(trajectory.missing_count() > 0);

        let mut run = 0;
        for sample in &trajectory.samples {
            run = if sample.is_missing() { run + 1 } else { 0 };
            assert!(run <= 5);
        }
    }

    #[test]
    fn test_forced_gap_and_jitter() {
        let config = SimConfig {
            forced_gap: Some(crate::config::ForcedGap {
                start_s: 5.0,
                duration_s: 2.0,
            }),
            timing_jitter_s: 0.004,
            ..short()
        };
        let trajectory = w_track_oracle(config).generate().unwrap();
        assert!(trajectory.samples.windows(2).all(|w| w[1].time > w[0].time));
        assert!(trajectory.samples[165].is_missing());
        assert!(trajectory.samples[100].speed.is_some());
        assert!(trajectory.records()[165].x.is_nan());
    }

    #[test]
    fn test_invalid_setup_rejected() {
        let geometry = MazeGeometry::w_track();
        let graph = Arc::new(geometry.build_graph().unwrap());
        let jittery = SimConfig {
            timing_jitter_s: 0.1,
            ..Default::default()
        };
        assert!(matches!(Oracle::new(graph.clone(), 7, jittery), Err(SimError::Setup(_))));
        assert!(Oracle::new(graph, 42, SimConfig::default()).is_err());
    }
}
