//! Distance along the track from the center well.
//!
//! A sample's linear distance is the shortest on-track distance from the center
//! well to its projection on the assigned segment, entering the segment through
//! either endpoint. On a tree-shaped maze every segment is entered through the
//! same endpoint, so the value is monotone in arc-length. A segment that closes
//! a loop is reached from both ends and its distance peaks somewhere inside it.

use crate::error::{DataQualityError, LinearizeError};
use crate::sample::PositionSample;
use crate::track_graph::{Projection, TrackGraph};
use nalgebra::Point2;

/// Computes linear distances for one graph and one center well.
#[derive(Debug, Clone)]
pub struct LinearDistanceCalculator<'a> {
    graph: &'a TrackGraph,
    center_well_id: usize,
    /// On-track distance from the center well to every node
    center_distances: Vec<f64>,
}

impl<'a> LinearDistanceCalculator<'a> {
    pub fn new(graph: &'a TrackGraph, center_well_id: usize) -> Result<Self, LinearizeError> {
        graph.node(center_well_id)?;
        let center_distances = graph.distances_from(center_well_id)?;
        Ok(Self {
            graph,
            center_well_id,
            center_distances,
        })
    }

    pub fn center_well_id(&self) -> usize {
        self.center_well_id
    }

    /// Linear distance of an on-track point.
    pub fn distance(&self, projection: &Projection) -> Result<f64, LinearizeError> {
        let edge = self.graph.edge(projection.edge_id)?;
        let via_start = self.center_distances[edge.start] + projection.arc_length;
        let via_end = self.center_distances[edge.end] + (edge.length - projection.arc_length);
        Ok(via_start.min(via_end).max(0.0))
    }

    /// Inverse of [`distance`](Self::distance): the arc-length on
    /// `segment_id` that lies `distance` from the center well, clamped to the
    /// segment.
    ///
    /// On a loop segment two arc-lengths share each distance below the peak;
    /// the one reached through the segment's `start` node is returned.
    pub fn arc_length(&self, segment_id: usize, distance: f64) -> Result<f64, LinearizeError> {
        let edge = self.graph.edge(segment_id)?;
        let via_start = self.center_distances[edge.start];
        let via_end = self.center_distances[edge.end];

        // Arc-length where both routes meet
        let peak = ((via_end + edge.length - via_start) / 2.0).clamp(0.0, edge.length);
        let rising = (distance - via_start).clamp(0.0, peak);
        let falling = (edge.length - (distance - via_end)).clamp(peak, edge.length);

        let miss = |arc: f64| (via_start + arc).min(via_end + edge.length - arc) - distance;
        Ok(if miss(rising).abs() <= miss(falling).abs() {
            rising
        } else {
            falling
        })
    }

    /// The on-track point of `segment_id` at the given linear distance.
    pub fn point_at_distance(&self, segment_id: usize, distance: f64) -> Result<Point2<f64>, LinearizeError> {
        let arc = self.arc_length(segment_id, distance)?;
        Ok(self.graph.point_at(segment_id, arc)?)
    }

    /// Linear distance for every sample.
    ///
    /// Samples that are missing or unassigned yield `None`.
    pub fn calculate(
        &self,
        segment_ids: &[Option<usize>],
        samples: &[PositionSample],
    ) -> Result<Vec<Option<f64>>, LinearizeError> {
        if segment_ids.len() != samples.len() {
            return Err(DataQualityError::LengthMismatch {
                name: "segment_ids",
                expected: samples.len(),
                actual: segment_ids.len(),
            }
            .into());
        }

        segment_ids
            .iter()
            .zip(samples)
            .map(|(segment_id, sample)| match (segment_id, sample.point()) {
                (Some(segment_id), Some(point)) => {
                    let projection = self.graph.project(&point, *segment_id)?;
                    self.distance(&projection).map(Some)
                }
                _ => Ok(None),
            })
            .collect()
    }
}

/// Linear distance of each sample from `center_well_id` along the track.
pub fn calculate_linear_distance(
    graph: &TrackGraph,
    segment_ids: &[Option<usize>],
    center_well_id: usize,
    samples: &[PositionSample],
) -> Result<Vec<Option<f64>>, LinearizeError> {
    LinearDistanceCalculator::new(graph, center_well_id)?.calculate(segment_ids, samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigurationError;
    use approx::assert_relative_eq;

    fn t_graph() -> TrackGraph {
        let nodes = [
            Point2::new(0.0, 0.0),
            Point2::new(10.0, 0.0),
            Point2::new(20.0, 0.0),
            Point2::new(10.0, -5.0),
        ];
        TrackGraph::new(&nodes, &[(0, 1), (1, 2), (1, 3)]).unwrap()
    }

    #[test]
    fn test_single_edge_distances() {
        let graph = TrackGraph::new(&[Point2::new(0.0, 0.0), Point2::new(10.0, 0.0)], &[(0, 1)]).unwrap();
        let samples = [
            PositionSample::new(0.0, 0.0, 0.0),
            PositionSample::new(0.1, 5.0, 0.0),
            PositionSample::new(0.2, 10.0, 0.0),
        ];
        let ids = [Some(0); 3];
        let distances = calculate_linear_distance(&graph, &ids, 0, &samples).unwrap();
        assert_eq!(distances, vec![Some(0.0), Some(5.0), Some(10.0)]);

        // Measured from the other end the order flips
        let reversed = calculate_linear_distance(&graph, &ids, 1, &samples).unwrap();
        assert_eq!(reversed, vec![Some(10.0), Some(5.0), Some(0.0)]);
    }

    #[test]
    fn test_distance_is_monotone_along_segment() {
        let graph = t_graph();
        let calculator = LinearDistanceCalculator::new(&graph, 3).unwrap();

        for segment in 0..graph.edge_count() {
            let length = graph.edges()[segment].length;
            let values: Vec<f64> = (0..=20)
                .map(|k| {
                    let arc = length * k as f64 / 20.0;
                    let point = graph.point_at(segment, arc).unwrap();
                    let projection = graph.project(&point, segment).unwrap();
                    calculator.distance(&projection).unwrap()
                })
                .collect();
            let increasing = values.windows(2).all(|w| w[1] >= w[0]);
            let decreasing = values.windows(2).all(|w| w[1] <= w[0]);
            assert!(increasing || decreasing, "segment {} not monotone: {:?}", segment, values);
        }
    }

    #[test]
    fn test_matches_shortest_path_with_inserted_point() {
        let graph = t_graph();
        let sample = PositionSample::new(0.0, 10.4, -3.0);
        let distances = calculate_linear_distance(&graph, &[Some(2)], 0, &[sample]).unwrap();

        // Split edge 1-3 at the projected point and ask Dijkstra
        let split = TrackGraph::new(
            &[
                Point2::new(0.0, 0.0),
                Point2::new(10.0, 0.0),
                Point2::new(20.0, 0.0),
                Point2::new(10.0, -5.0),
                Point2::new(10.0, -3.0),
            ],
            &[(0, 1), (1, 2), (1, 4), (4, 3)],
        )
        .unwrap();
        assert_relative_eq!(distances[0].unwrap(), split.node_distance(0, 4).unwrap(), epsilon = 1e-12);
        assert_relative_eq!(distances[0].unwrap(), 13.0, epsilon = 1e-12);
    }

    #[test]
    fn test_arc_length_inverts_distance() {
        let graph = t_graph();
        let calculator = LinearDistanceCalculator::new(&graph, 2).unwrap();

        // Edge 0 is entered from its end (node 1) when measured from node 2
        let projection = graph.project(&Point2::new(3.0, 0.0), 0).unwrap();
        let distance = calculator.distance(&projection).unwrap();
        assert_relative_eq!(distance, 17.0);
        assert_relative_eq!(calculator.arc_length(0, distance).unwrap(), 3.0);

        let point = calculator.point_at_distance(2, 12.5).unwrap();
        assert_relative_eq!(point.y, -2.5);
        assert_relative_eq!(calculator.arc_length(2, 100.0).unwrap(), 5.0);
    }

    /// Equilateral triangle of side 10; every segment closes the loop.
    fn triangle() -> TrackGraph {
        let nodes = [
            Point2::new(0.0, 0.0),
            Point2::new(10.0, 0.0),
            Point2::new(5.0, 75.0_f64.sqrt()),
        ];
        TrackGraph::new(&nodes, &[(0, 1), (1, 2), (2, 0)]).unwrap()
    }

    #[test]
    fn test_loop_segment_takes_shorter_way_round() {
        let graph = triangle();
        let calculator = LinearDistanceCalculator::new(&graph, 0).unwrap();

        // 9 along edge 1-2 is 1 short of node 2, which is 10 from the center
        let point = graph.point_at(1, 9.0).unwrap();
        let projection = graph.project(&point, 1).unwrap();
        let distance = calculator.distance(&projection).unwrap();
        assert_relative_eq!(distance, 11.0, epsilon = 1e-9);

        // Split edge 1-2 at the point and ask Dijkstra
        let split = TrackGraph::new(
            &[
                Point2::new(0.0, 0.0),
                Point2::new(10.0, 0.0),
                Point2::new(5.0, 75.0_f64.sqrt()),
                point,
            ],
            &[(0, 1), (1, 3), (3, 2), (2, 0)],
        )
        .unwrap();
        assert_relative_eq!(distance, split.node_distance(0, 3).unwrap(), epsilon = 1e-9);

        // Halfway along the far segment both ways round are equally long
        let midpoint = graph.project(&graph.point_at(1, 5.0).unwrap(), 1).unwrap();
        assert_relative_eq!(calculator.distance(&midpoint).unwrap(), 15.0, epsilon = 1e-9);
    }

    #[test]
    fn test_loop_segment_inverse_lands_at_same_distance() {
        let graph = triangle();
        let calculator = LinearDistanceCalculator::new(&graph, 0).unwrap();

        for k in 0..=20 {
            let arc = 10.0 * k as f64 / 20.0;
            let projection = graph.project(&graph.point_at(1, arc).unwrap(), 1).unwrap();
            let distance = calculator.distance(&projection).unwrap();

            let back = calculator.point_at_distance(1, distance).unwrap();
            let reprojected = graph.project(&back, 1).unwrap();
            assert_relative_eq!(calculator.distance(&reprojected).unwrap(), distance, epsilon = 1e-9);
        }

        // Beyond the peak the point sits at the peak
        assert_relative_eq!(calculator.arc_length(1, 40.0).unwrap(), 5.0, epsilon = 1e-9);
        // Edges touching the center well are entered from their center end
        assert_relative_eq!(calculator.arc_length(0, 4.0).unwrap(), 4.0, epsilon = 1e-9);
        assert_relative_eq!(calculator.arc_length(2, 4.0).unwrap(), 6.0, epsilon = 1e-9);
    }

    #[test]
    fn test_missing_and_unassigned_are_none() {
        let graph = t_graph();
        let samples = [
            PositionSample::missing(0.0),
            PositionSample::new(0.1, 5.0, 0.0),
            PositionSample::new(0.2, 6.0, 0.0),
        ];
        let distances = calculate_linear_distance(&graph, &[Some(0), None, Some(0)], 0, &samples).unwrap();
        assert_eq!(distances, vec![None, None, Some(6.0)]);
    }

    #[test]
    fn test_errors() {
        let graph = t_graph();
        let samples = [PositionSample::new(0.0, 1.0, 0.0)];

        assert!(matches!(
            calculate_linear_distance(&graph, &[Some(0)], 9, &samples),
            Err(LinearizeError::Configuration(ConfigurationError::UnknownNode { node_id: 9, .. }))
        ));
        assert!(matches!(
            calculate_linear_distance(&graph, &[Some(7)], 0, &samples),
            Err(LinearizeError::Configuration(ConfigurationError::UnknownSegment { segment_id: 7, .. }))
        ));
        assert!(matches!(
            calculate_linear_distance(&graph, &[Some(0), Some(0)], 0, &samples),
            Err(LinearizeError::DataQuality(DataQualityError::LengthMismatch { .. }))
        ));
    }
}
