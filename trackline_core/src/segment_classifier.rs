//! The "SEGMENT" Engine - probabilistic track segment classification
//!
//! Assigns every 2-D position sample to the track segment the animal was most
//! likely on. The hidden state at time t is "on edge e, at the projection of
//! the sample onto e"; the most probable state sequence is found with an
//! explicit Viterbi dynamic program:
//!
//! 1. **Observation**: Gaussian in the perpendicular distance to each edge
//! 2. **Transition**: exponential penalty on the mismatch between the
//!    on-track route length and the raw Euclidean displacement, plus a
//!    diagonal bias that favours staying on the same edge
//! 3. **Decoding**: max-product recursion in log space with explicit
//!    tie-breaking (stay on the same edge, then lower segment id)
//!
//! Samples with missing coordinates are skipped by the recursion and come
//! back unassigned.

use crate::config::ClassifierConfig;
use crate::error::{ConfigurationError, DataQualityError, LinearizeError};
use crate::sample::PositionSample;
use crate::track_graph::{Projection, TrackGraph};
use nalgebra::{DMatrix, Point2};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::debug;

/// Per-sample segment assignment plus the projection onto the assigned edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentClassification {
    /// Assigned segment per sample; `None` for samples with missing coordinates
    pub segment_ids: Vec<Option<usize>>,

    /// Projection of each sample onto its assigned segment
    pub projections: Vec<Option<Projection>>,

    /// Log-probability of the decoded path
    pub path_log_probability: f64,
}

impl SegmentClassification {
    pub fn len(&self) -> usize {
        self.segment_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segment_ids.is_empty()
    }

    /// Number of samples that received a segment.
    pub fn assigned_count(&self) -> usize {
        self.segment_ids.iter().filter(|id| id.is_some()).count()
    }

    /// Number of segment changes between consecutive assigned samples.
    pub fn switch_count(&self) -> usize {
        let assigned: Vec<usize> = self.segment_ids.iter().flatten().copied().collect();
        assigned.windows(2).filter(|w| w[0] != w[1]).count()
    }
}

/// Viterbi segment classifier bound to one track graph.
#[derive(Debug, Clone)]
pub struct SegmentClassifier<'a> {
    graph: &'a TrackGraph,
    config: ClassifierConfig,
}

impl<'a> SegmentClassifier<'a> {
    /// Creates a classifier, validating the tunables.
    pub fn new(graph: &'a TrackGraph, config: ClassifierConfig) -> Result<Self, ConfigurationError> {
        config.validate()?;
        if graph.edge_count() == 0 {
            return Err(ConfigurationError::NoSegments);
        }
        Ok(Self { graph, config })
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    // ========================================================================
    // OBSERVATION MODEL
    // ========================================================================

    /// Log-likelihood of each candidate projection.
    ///
    /// log N(d; 0, σ) = -½(d/σ)² - ln(σ√(2π))
    pub fn observation_log_likelihood(&self, candidates: &[Projection]) -> Vec<f64> {
        let sigma = self.config.sensor_std_dev;
        let log_norm = (sigma * (2.0 * PI).sqrt()).ln();
        candidates
            .iter()
            .map(|p| -0.5 * (p.distance / sigma).powi(2) - log_norm)
            .collect()
    }

    // ========================================================================
    // TRANSITION MODEL
    // ========================================================================

    /// Log transition matrix between two consecutive valid samples.
    ///
    /// Entry `(i, j)` is the log-probability of moving from edge `i` at the
    /// previous sample to edge `j` at the current one. Rows sum to one.
    pub fn transition_log_matrix(
        &self,
        previous: &[Projection],
        current: &[Projection],
        euclidean_distance: f64,
    ) -> DMatrix<f64> {
        let n = previous.len();
        let scale = self.config.route_euclidean_distance_scaling;
        let bias = self.config.diagonal_bias;
        let log_scale = scale.ln();
        let log_bias = if bias > 0.0 { bias.ln() } else { f64::NEG_INFINITY };
        let log_renorm = (1.0 + bias).ln();

        let mut log_a = DMatrix::from_element(n, n, f64::NEG_INFINITY);
        let mut row = vec![f64::NEG_INFINITY; n];

        for i in 0..n {
            // Exponential pdf of |route - euclidean|
            for (j, value) in row.iter_mut().enumerate() {
                let route = self.graph.route_distance(&previous[i], &current[j]);
                let mismatch = (route - euclidean_distance).abs();
                *value = if mismatch.is_finite() {
                    -mismatch / scale - log_scale
                } else {
                    f64::NEG_INFINITY
                };
            }

            // Normalize over destinations; a row that underflowed entirely
            // falls back to uniform.
            let total = log_sum_exp(&row);
            for (j, value) in row.iter().enumerate() {
                let normalized = if total.is_finite() {
                    value - total
                } else {
                    -(n as f64).ln()
                };
                // (p_ij + bias·δ_ij) / (1 + bias)
                log_a[(i, j)] = if i == j {
                    log_add_exp(normalized, log_bias) - log_renorm
                } else {
                    normalized - log_renorm
                };
            }
        }

        log_a
    }

    // ========================================================================
    // DECODING
    // ========================================================================

    /// Classifies a whole series.
    ///
    /// # Errors
    /// * `DataQualityError::NoValidSamples` - every sample is missing
    pub fn classify(&self, samples: &[PositionSample]) -> Result<SegmentClassification, LinearizeError> {
        let n_states = self.graph.edge_count();

        // Candidate projections for every valid sample
        let valid: Vec<(usize, Point2<f64>, Vec<Projection>)> = samples
            .iter()
            .enumerate()
            .filter_map(|(index, sample)| {
                let point = sample.point()?;
                Some((index, point, self.graph.project_all(&point)))
            })
            .collect();

        if valid.is_empty() {
            return Err(DataQualityError::NoValidSamples.into());
        }

        // Initialization: uniform prior
        let log_prior = -(n_states as f64).ln();
        let mut scores: Vec<f64> = self
            .observation_log_likelihood(&valid[0].2)
            .into_iter()
            .map(|ll| log_prior + ll)
            .collect();

        // Recursion
        let mut backpointers: Vec<Vec<usize>> = Vec::with_capacity(valid.len().saturating_sub(1));
        for pair in valid.windows(2) {
            let (_, previous_point, previous) = &pair[0];
            let (_, current_point, current) = &pair[1];

            let euclidean = (current_point - previous_point).norm();
            let log_a = self.transition_log_matrix(previous, current, euclidean);
            let log_likelihood = self.observation_log_likelihood(current);

            let mut next = vec![f64::NEG_INFINITY; n_states];
            let mut pointers = vec![0usize; n_states];
            for j in 0..n_states {
                // Staying on the same edge is the incumbent; a switch must be strictly better
                let mut best_state = j;
                let mut best_score = scores[j] + log_a[(j, j)];
                for i in 0..n_states {
                    if i == j {
                        continue;
                    }
                    let candidate = scores[i] + log_a[(i, j)];
                    if candidate > best_score {
                        best_score = candidate;
                        best_state = i;
                    }
                }
                next[j] = best_score + log_likelihood[j];
                pointers[j] = best_state;
            }

            scores = next;
            backpointers.push(pointers);
        }

        // Termination: lowest segment id wins ties
        let mut state = 0;
        for j in 1..n_states {
            if scores[j] > scores[state] {
                state = j;
            }
        }
        let path_log_probability = scores[state];

        // Backtracking
        let mut path = vec![0usize; valid.len()];
        path[valid.len() - 1] = state;
        for t in (1..valid.len()).rev() {
            state = backpointers[t - 1][state];
            path[t - 1] = state;
        }

        let mut segment_ids = vec![None; samples.len()];
        let mut projections = vec![None; samples.len()];
        for ((index, _, candidates), &segment) in valid.iter().zip(&path) {
            segment_ids[*index] = Some(segment);
            projections[*index] = Some(candidates[segment]);
        }

        let classification = SegmentClassification {
            segment_ids,
            projections,
            path_log_probability,
        };

        debug!(
            samples = samples.len(),
            assigned = classification.assigned_count(),
            switches = classification.switch_count(),
            "classified track segments"
        );

        Ok(classification)
    }
}

/// Classifies `samples` onto the segments of `graph`.
pub fn classify_track_segments(
    graph: &TrackGraph,
    samples: &[PositionSample],
    config: ClassifierConfig,
) -> Result<SegmentClassification, LinearizeError> {
    SegmentClassifier::new(graph, config)?.classify(samples)
}

/// ln(Σ exp(xᵢ)) without overflow. Returns -inf for an all -inf input.
fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    max + values.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}

/// ln(exp(a) + exp(b)).
fn log_add_exp(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    let max = a.max(b);
    max + ((a - max).exp() + (b - max).exp()).ln()
}
