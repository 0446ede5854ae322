//! The "LAYOUT" Engine - stitching per-segment distances into one axis
//!
//! Linear distance alone is ambiguous: two arms at the same distance from the
//! center well collapse onto the same value. The stitcher lays the segments
//! out one after another in a caller-chosen order, separated by a gap:
//!
//! ```text
//!   order:  [ seg 6 ]  gap  [ seg 5 ]  gap  [ seg 3 ] ...
//!   axis:   0 ------ a      b ------ c      d ------ e
//!                      b = a + gap     d = c + gap
//! ```
//!
//! The first populated segment keeps its own distances; each following one is
//! shifted so that its minimum sits exactly one gap past the maximum of the
//! previous one.

use crate::config::EdgeSpacing;
use crate::error::{ConfigurationError, DataQualityError, LinearizeError, PreconditionError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Where one segment landed on the stitched axis.
///
/// A sample on this segment maps as `position = (distance - min_distance) + offset`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SegmentPlacement {
    pub segment_id: usize,
    /// Smallest linear distance observed on the segment
    pub min_distance: f64,
    /// Linear position assigned to `min_distance`
    pub offset: f64,
    /// Smallest and largest linear position of the segment's samples
    pub start: f64,
    pub end: f64,
}

impl SegmentPlacement {
    #[inline]
    fn place(&self, distance: f64) -> f64 {
        (distance - self.min_distance) + self.offset
    }

    #[inline]
    fn unplace(&self, position: f64) -> f64 {
        (position - self.offset) + self.min_distance
    }
}

/// Result of stitching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StitchedPosition {
    pub linear_position: Vec<f64>,

    /// One placement per populated segment of the edge order, in order
    pub placements: Vec<SegmentPlacement>,

    /// Segments with samples that the edge order does not mention; their
    /// samples keep their unshifted linear distance
    pub unordered_segments: Vec<usize>,
}

impl StitchedPosition {
    pub fn placement(&self, segment_id: usize) -> Option<&SegmentPlacement> {
        self.placements.iter().find(|p| p.segment_id == segment_id)
    }

    /// Recovers linear distance from the stitched positions.
    pub fn to_linear_distance(&self, segment_ids: &[usize]) -> Result<Vec<f64>, DataQualityError> {
        if segment_ids.len() != self.linear_position.len() {
            return Err(DataQualityError::LengthMismatch {
                name: "segment_ids",
                expected: self.linear_position.len(),
                actual: segment_ids.len(),
            });
        }
        let lookup: BTreeMap<usize, &SegmentPlacement> =
            self.placements.iter().map(|p| (p.segment_id, p)).collect();

        Ok(self
            .linear_position
            .iter()
            .zip(segment_ids)
            .map(|(&position, id)| match lookup.get(id) {
                Some(placement) => placement.unplace(position),
                None => position,
            })
            .collect())
    }
}

/// A validated edge order with its spacing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeLayout {
    order: Vec<usize>,
    spacing: EdgeSpacing,
    edge_count: usize,
    reject_unordered_segments: bool,
}

impl EdgeLayout {
    /// Validates `order` and `spacing` against a graph with `edge_count` segments.
    ///
    /// # Errors
    /// * `ConfigurationError::UnknownSegment` - id outside the graph
    /// * `ConfigurationError::DuplicateSegment` - id listed twice
    /// * `ConfigurationError::SpacingLengthMismatch` / `InvalidParameter` -
    ///   bad spacing
    pub fn new(order: Vec<usize>, spacing: EdgeSpacing, edge_count: usize) -> Result<Self, ConfigurationError> {
        let mut seen = BTreeSet::new();
        for &segment_id in &order {
            if segment_id >= edge_count {
                return Err(ConfigurationError::UnknownSegment { segment_id, edge_count });
            }
            if !seen.insert(segment_id) {
                return Err(ConfigurationError::DuplicateSegment { segment_id });
            }
        }
        spacing.validate(order.len())?;

        Ok(Self {
            order,
            spacing,
            edge_count,
            reject_unordered_segments: false,
        })
    }

    /// Fail on samples from segments outside the order instead of warning.
    pub fn rejecting_unordered_segments(mut self, reject: bool) -> Self {
        self.reject_unordered_segments = reject;
        self
    }

    pub fn order(&self) -> &[usize] {
        &self.order
    }

    pub fn spacing(&self) -> &EdgeSpacing {
        &self.spacing
    }

    /// Lays `distances` out along one axis.
    ///
    /// `segment_ids` must be fully assigned (see
    /// [`fill_segment_ids`](crate::gap_fill::fill_segment_ids)).
    pub fn stitch(&self, distances: &[f64], segment_ids: &[usize]) -> Result<StitchedPosition, LinearizeError> {
        if distances.len() != segment_ids.len() {
            return Err(DataQualityError::LengthMismatch {
                name: "segment_ids",
                expected: distances.len(),
                actual: segment_ids.len(),
            }
            .into());
        }
        if let Some(index) = distances.iter().position(|d| !d.is_finite()) {
            return Err(PreconditionError::NonFiniteValue { index }.into());
        }

        // Sample indices per segment
        let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (index, &segment_id) in segment_ids.iter().enumerate() {
            if segment_id >= self.edge_count {
                return Err(ConfigurationError::UnknownSegment {
                    segment_id,
                    edge_count: self.edge_count,
                }
                .into());
            }
            groups.entry(segment_id).or_default().push(index);
        }

        let ordered: BTreeSet<usize> = self.order.iter().copied().collect();
        let unordered_segments: Vec<usize> = groups.keys().copied().filter(|s| !ordered.contains(s)).collect();
        if let Some(&segment_id) = unordered_segments.first() {
            if self.reject_unordered_segments {
                return Err(ConfigurationError::UnorderedSegment { segment_id }.into());
            }
            warn!(
                segments = ?unordered_segments,
                "samples on segments outside the edge order keep their linear distance"
            );
        }

        let mut linear_position = distances.to_vec();
        let mut placements = Vec::with_capacity(self.order.len());
        let mut running_end: Option<f64> = None;

        for (k, &segment_id) in self.order.iter().enumerate() {
            let Some(indices) = groups.get(&segment_id) else {
                debug!(segment = segment_id, "segment in edge order has no samples");
                continue;
            };

            let min_distance = indices.iter().map(|&i| distances[i]).fold(f64::INFINITY, f64::min);
            let mut placement = match running_end {
                // First populated segment keeps its distances
                None => SegmentPlacement {
                    segment_id,
                    min_distance: 0.0,
                    offset: 0.0,
                    start: 0.0,
                    end: 0.0,
                },
                Some(end) => SegmentPlacement {
                    segment_id,
                    min_distance,
                    offset: end + self.spacing.gap(k - 1),
                    start: 0.0,
                    end: 0.0,
                },
            };

            let mut start = f64::INFINITY;
            let mut end = f64::NEG_INFINITY;
            for &i in indices {
                let position = placement.place(distances[i]);
                linear_position[i] = position;
                start = start.min(position);
                end = end.max(position);
            }
            placement.start = start;
            placement.end = end;

            running_end = Some(end);
            placements.push(placement);
        }

        Ok(StitchedPosition {
            linear_position,
            placements,
            unordered_segments,
        })
    }
}

/// One-shot stitch with a freshly validated layout.
pub fn stitch_linear_position(
    distances: &[f64],
    segment_ids: &[usize],
    order: &[usize],
    spacing: &EdgeSpacing,
    edge_count: usize,
) -> Result<StitchedPosition, LinearizeError> {
    EdgeLayout::new(order.to_vec(), spacing.clone(), edge_count)?.stitch(distances, segment_ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn layout(order: &[usize], spacing: EdgeSpacing, edge_count: usize) -> EdgeLayout {
        EdgeLayout::new(order.to_vec(), spacing, edge_count).unwrap()
    }

    #[test]
    fn test_single_segment_is_identity() {
        let stitched = layout(&[0], EdgeSpacing::Uniform(30.0), 1)
            .stitch(&[0.0, 5.0, 10.0], &[0, 0, 0])
            .unwrap();
        assert_eq!(stitched.linear_position, vec![0.0, 5.0, 10.0]);
    }

    #[test]
    fn test_second_segment_follows_first_plus_gap() {
        // Edge 1 samples sit 10..30 from the center well, locally 0..20
        let stitched = layout(&[0, 1], EdgeSpacing::Uniform(5.0), 2)
            .stitch(&[0.0, 10.0, 10.0, 30.0], &[0, 0, 1, 1])
            .unwrap();
        assert_eq!(stitched.linear_position, vec![0.0, 10.0, 15.0, 35.0]);

        let placement = stitched.placement(1).unwrap();
        assert_eq!(placement.start, 15.0);
        assert_eq!(placement.end, 35.0);
    }

    #[test]
    fn test_no_overlap_is_exact() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let order = [3, 0, 2, 1];
        let gaps = vec![0.7, 15.0, 3.3];
        let n = 400;
        let ids: Vec<usize> = (0..n).map(|_| rng.gen_range(0..4)).collect();
        let distances: Vec<f64> = (0..n).map(|_| rng.gen_range(0.0..123.456)).collect();

        let stitched = layout(&order, EdgeSpacing::PerPair(gaps.clone()), 4)
            .stitch(&distances, &ids)
            .unwrap();

        let extent = |segment: usize| {
            let values: Vec<f64> = ids
                .iter()
                .zip(&stitched.linear_position)
                .filter(|(&id, _)| id == segment)
                .map(|(_, &lp)| lp)
                .collect();
            let min = values.iter().copied().fold(f64::INFINITY, f64::min);
            let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            (min, max)
        };

        for (k, pair) in order.windows(2).enumerate() {
            let (_, prev_max) = extent(pair[0]);
            let (cur_min, _) = extent(pair[1]);
            assert_eq!(cur_min, prev_max + gaps[k]);
        }
    }

    #[test]
    fn test_stitch_is_deterministic() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let ids: Vec<usize> = (0..200).map(|_| rng.gen_range(0..3)).collect();
        let distances: Vec<f64> = (0..200).map(|_| rng.gen_range(0.0..50.0)).collect();
        let layout = layout(&[2, 0, 1], EdgeSpacing::Uniform(15.0), 3);

        let a = layout.stitch(&distances, &ids).unwrap();
        let b = layout.stitch(&distances, &ids).unwrap();
        let bits = |s: &StitchedPosition| s.linear_position.iter().map(|v| v.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(&a), bits(&b));
    }

    #[test]
    fn test_inversion_recovers_distance() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let ids: Vec<usize> = (0..300).map(|_| rng.gen_range(0..5)).collect();
        let distances: Vec<f64> = (0..300).map(|_| rng.gen_range(0.0..80.0)).collect();

        // Segment 4 deliberately left out of the order
        let stitched = layout(&[1, 3, 0, 2], EdgeSpacing::Uniform(30.0), 5)
            .stitch(&distances, &ids)
            .unwrap();
        let recovered = stitched.to_linear_distance(&ids).unwrap();
        for (r, d) in recovered.iter().zip(&distances) {
            assert_relative_eq!(*r, *d, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_empty_segment_in_order_is_skipped() {
        let stitched = layout(&[0, 1, 2], EdgeSpacing::PerPair(vec![5.0, 7.0]), 3)
            .stitch(&[0.0, 10.0, 20.0, 25.0], &[0, 0, 2, 2])
            .unwrap();
        // Segment 2 follows segment 0 using the (1, 2) gap
        assert_eq!(stitched.linear_position, vec![0.0, 10.0, 17.0, 22.0]);
        assert_eq!(stitched.placements.len(), 2);
    }

    #[test]
    fn test_unordered_segment_flagged_or_rejected() {
        let distances = [0.0, 4.0, 9.0];
        let ids = [0, 0, 1];

        let stitched = layout(&[0], EdgeSpacing::Uniform(30.0), 2).stitch(&distances, &ids).unwrap();
        assert_eq!(stitched.unordered_segments, vec![1]);
        assert_eq!(stitched.linear_position[2], 9.0);

        let strict = layout(&[0], EdgeSpacing::Uniform(30.0), 2).rejecting_unordered_segments(true);
        assert_eq!(
            strict.stitch(&distances, &ids).unwrap_err(),
            LinearizeError::Configuration(ConfigurationError::UnorderedSegment { segment_id: 1 })
        );
    }

    #[test]
    fn test_layout_validation() {
        assert_eq!(
            EdgeLayout::new(vec![0, 4], EdgeSpacing::Uniform(1.0), 3).unwrap_err(),
            ConfigurationError::UnknownSegment {
                segment_id: 4,
                edge_count: 3
            }
        );
        assert_eq!(
            EdgeLayout::new(vec![0, 1, 0], EdgeSpacing::Uniform(1.0), 3).unwrap_err(),
            ConfigurationError::DuplicateSegment { segment_id: 0 }
        );
        assert!(matches!(
            EdgeLayout::new(vec![0, 1, 2], EdgeSpacing::PerPair(vec![1.0]), 3),
            Err(ConfigurationError::SpacingLengthMismatch { expected: 2, actual: 1 })
        ));
    }

    #[test]
    fn test_stitch_input_errors() {
        let layout = layout(&[0], EdgeSpacing::Uniform(1.0), 1);
        assert!(matches!(
            layout.stitch(&[0.0, f64::NAN], &[0, 0]),
            Err(LinearizeError::DataQuality(DataQualityError::Precondition(
                PreconditionError::NonFiniteValue { index: 1 }
            )))
        ));
        assert!(matches!(
            layout.stitch(&[0.0], &[3]),
            Err(LinearizeError::Configuration(ConfigurationError::UnknownSegment { .. }))
        ));
        assert!(stitch_linear_position(&[0.0], &[0], &[0], &EdgeSpacing::Uniform(1.0), 1).is_ok());
    }

    proptest! {
        #[test]
        fn test_stitch_layout_properties(
            samples in prop::collection::vec((0usize..4, 0.0f64..200.0), 1..120),
            gap in 0.0f64..40.0,
        ) {
            let (ids, distances): (Vec<usize>, Vec<f64>) = samples.into_iter().unzip();
            let order = [2, 0, 3, 1];
            let stitched = layout(&order, EdgeSpacing::Uniform(gap), 4).stitch(&distances, &ids).unwrap();

            // Consecutive placements abut exactly one gap apart
            for pair in stitched.placements.windows(2) {
                prop_assert_eq!(pair[1].start, pair[0].end + gap);
            }
            // Distances are recoverable
            let recovered = stitched.to_linear_distance(&ids).unwrap();
            for (r, d) in recovered.iter().zip(&distances) {
                prop_assert!((r - d).abs() <= 1e-9);
            }
        }
    }
}
