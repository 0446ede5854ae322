//! The track graph: maze nodes, straight track segments and on-track distances.
//!
//! Nodes are reward wells and intersections; edges are the straight segments
//! between them. Edge weights are Euclidean lengths. All node-to-node
//! shortest paths are computed once at build time (Dijkstra per node) so the
//! classifier can ask for route distances in O(1).

use crate::error::{ComputationError, ConfigurationError, LinearizeError};
use nalgebra::{DMatrix, Point2};
use petgraph::algo::dijkstra;
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};

/// Edges shorter than this are treated as zero-length.
const MIN_EDGE_LENGTH: f64 = 1e-9;

/// A maze node (well or intersection).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackNode {
    pub id: usize,
    pub position: Point2<f64>,
}

/// A straight track segment between two nodes.
///
/// The edge is undirected, but arc-length along it is measured from `start`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackEdge {
    /// Segment id (position in the edge list)
    pub id: usize,
    pub start: usize,
    pub end: usize,
    /// Euclidean length
    pub length: f64,
}

impl TrackEdge {
    /// Arc-length of one of the edge's endpoints.
    #[inline]
    pub fn arc_of(&self, node: usize) -> Option<f64> {
        if node == self.start {
            Some(0.0)
        } else if node == self.end {
            Some(self.length)
        } else {
            None
        }
    }
}

/// The orthogonal projection of a point onto one edge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    pub edge_id: usize,
    /// Distance along the edge from its `start` node, in `[0, length]`
    pub arc_length: f64,
    /// The projected point itself
    pub point: Point2<f64>,
    /// Perpendicular distance from the raw point to `point`
    pub distance: f64,
}

/// Undirected, weighted, connected maze graph. Immutable after construction.
#[derive(Debug, Clone)]
pub struct TrackGraph {
    nodes: Vec<TrackNode>,
    edges: Vec<TrackEdge>,
    /// Shortest on-track distance between every pair of nodes
    node_distances: DMatrix<f64>,
}

impl TrackGraph {
    /// Builds a graph from node coordinates and node-id pairs.
    ///
    /// Node ids are positions in `node_positions`; segment ids are positions
    /// in `edges`.
    ///
    /// # Errors
    /// * `ConfigurationError::EmptyGraph` - no nodes
    /// * `ConfigurationError::NonFiniteNode` - NaN/infinite coordinate
    /// * `ConfigurationError::DanglingEdge` - edge refers to a missing node
    /// * `ComputationError::DegenerateEdge` - zero-length edge or self loop
    /// * `ConfigurationError::DisconnectedGraph` - some node is unreachable
    pub fn new(
        node_positions: &[Point2<f64>],
        edges: &[(usize, usize)],
    ) -> Result<Self, LinearizeError> {
        if node_positions.is_empty() {
            return Err(ConfigurationError::EmptyGraph.into());
        }

        let mut nodes = Vec::with_capacity(node_positions.len());
        for (id, position) in node_positions.iter().enumerate() {
            if !(position.x.is_finite() && position.y.is_finite()) {
                return Err(ConfigurationError::NonFiniteNode { node_id: id }.into());
            }
            nodes.push(TrackNode {
                id,
                position: *position,
            });
        }

        let node_count = nodes.len();
        let mut track_edges = Vec::with_capacity(edges.len());
        for (id, &(start, end)) in edges.iter().enumerate() {
            for node_id in [start, end] {
                if node_id >= node_count {
                    return Err(ConfigurationError::DanglingEdge {
                        edge_id: id,
                        node_id,
                        node_count,
                    }
                    .into());
                }
            }
            let length = (nodes[end].position - nodes[start].position).norm();
            if start == end || length < MIN_EDGE_LENGTH {
                return Err(ComputationError::DegenerateEdge { edge_id: id }.into());
            }
            track_edges.push(TrackEdge {
                id,
                start,
                end,
                length,
            });
        }

        let graph = Self::to_petgraph(node_count, &track_edges);
        let node_distances = Self::all_pairs_shortest_paths(&graph, node_count);

        let unreachable: Vec<usize> = (0..node_count)
            .filter(|&n| !node_distances[(0, n)].is_finite())
            .collect();
        if !unreachable.is_empty() {
            return Err(ConfigurationError::DisconnectedGraph {
                origin: 0,
                unreachable,
            }
            .into());
        }

        Ok(Self {
            nodes,
            edges: track_edges,
            node_distances,
        })
    }

    fn to_petgraph(node_count: usize, edges: &[TrackEdge]) -> UnGraph<(), f64> {
        let mut graph = UnGraph::<(), f64>::with_capacity(node_count, edges.len());
        for _ in 0..node_count {
            graph.add_node(());
        }
        for edge in edges {
            graph.add_edge(
                NodeIndex::new(edge.start),
                NodeIndex::new(edge.end),
                edge.length,
            );
        }
        graph
    }

    /// Dijkstra from every node. Unreachable pairs stay at infinity.
    fn all_pairs_shortest_paths(graph: &UnGraph<(), f64>, node_count: usize) -> DMatrix<f64> {
        let mut distances = DMatrix::from_element(node_count, node_count, f64::INFINITY);
        for source in 0..node_count {
            let costs = dijkstra(graph, NodeIndex::new(source), None, |e| *e.weight());
            for (target, cost) in costs {
                distances[(source, target.index())] = cost;
            }
        }
        distances
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    pub fn nodes(&self) -> &[TrackNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[TrackEdge] {
        &self.edges
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn node(&self, node_id: usize) -> Result<&TrackNode, ConfigurationError> {
        self.nodes.get(node_id).ok_or(ConfigurationError::UnknownNode {
            node_id,
            node_count: self.nodes.len(),
        })
    }

    pub fn edge(&self, segment_id: usize) -> Result<&TrackEdge, ConfigurationError> {
        self.edges.get(segment_id).ok_or(ConfigurationError::UnknownSegment {
            segment_id,
            edge_count: self.edges.len(),
        })
    }

    /// Total length of all segments.
    pub fn total_length(&self) -> f64 {
        self.edges.iter().map(|e| e.length).sum()
    }

    // ========================================================================
    // DISTANCES
    // ========================================================================

    /// Shortest on-track distance between two nodes.
    pub fn node_distance(&self, from: usize, to: usize) -> Result<f64, LinearizeError> {
        self.node(from)?;
        self.node(to)?;
        let distance = self.node_distances[(from, to)];
        if distance.is_finite() {
            Ok(distance)
        } else {
            Err(ComputationError::Unreachable { from, to }.into())
        }
    }

    /// Shortest on-track distance from `origin` to every node.
    pub fn distances_from(&self, origin: usize) -> Result<Vec<f64>, LinearizeError> {
        (0..self.nodes.len())
            .map(|node| self.node_distance(origin, node))
            .collect()
    }

    /// Length of the shortest on-track route between two projected points.
    ///
    /// On the same edge the direct arc difference competes with any detour
    /// through the graph; across edges the route must leave `from`'s edge
    /// through one of its endpoints and enter `to`'s edge through one of its.
    /// Returns infinity for projections that do not belong to this graph.
    pub fn route_distance(&self, from: &Projection, to: &Projection) -> f64 {
        let (Some(a), Some(b)) = (self.edges.get(from.edge_id), self.edges.get(to.edge_id)) else {
            return f64::INFINITY;
        };

        let mut best = if a.id == b.id {
            (from.arc_length - to.arc_length).abs()
        } else {
            f64::INFINITY
        };

        let exits = [(a.start, from.arc_length), (a.end, a.length - from.arc_length)];
        let entries = [(b.start, to.arc_length), (b.end, b.length - to.arc_length)];
        for &(exit_node, to_exit) in &exits {
            for &(entry_node, from_entry) in &entries {
                let through = to_exit + self.node_distances[(exit_node, entry_node)] + from_entry;
                best = best.min(through);
            }
        }

        best
    }

    // ========================================================================
    // PROJECTION
    // ========================================================================

    /// Projects a point onto one edge (clamped to the segment).
    pub fn project(&self, point: &Point2<f64>, segment_id: usize) -> Result<Projection, ConfigurationError> {
        let edge = self.edge(segment_id)?;
        Ok(self.project_onto(point, edge))
    }

    /// Projects a point onto every edge, in segment-id order.
    pub fn project_all(&self, point: &Point2<f64>) -> Vec<Projection> {
        self.edges
            .iter()
            .map(|edge| self.project_onto(point, edge))
            .collect()
    }

    fn project_onto(&self, point: &Point2<f64>, edge: &TrackEdge) -> Projection {
        let a = self.nodes[edge.start].position;
        let b = self.nodes[edge.end].position;
        let direction = b - a;

        // Project onto the infinite line, clamp to [0, 1]
        let t = ((*point - a).dot(&direction) / direction.norm_squared()).clamp(0.0, 1.0);
        let projected = a + direction * t;

        Projection {
            edge_id: edge.id,
            arc_length: t * edge.length,
            point: projected,
            distance: (*point - projected).norm(),
        }
    }

    /// The point at a given arc-length along an edge.
    pub fn point_at(&self, segment_id: usize, arc_length: f64) -> Result<Point2<f64>, ConfigurationError> {
        let edge = self.edge(segment_id)?;
        let a = self.nodes[edge.start].position;
        let b = self.nodes[edge.end].position;
        let t = (arc_length / edge.length).clamp(0.0, 1.0);
        Ok(a + (b - a) * t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn points(coords: &[(f64, f64)]) -> Vec<Point2<f64>> {
        coords.iter().map(|&(x, y)| Point2::new(x, y)).collect()
    }

    /// A "T": 0 -(10)- 1 -(10)- 2, with 3 hanging 5 below node 1.
    fn t_graph() -> TrackGraph {
        let nodes = points(&[(0.0, 0.0), (10.0, 0.0), (20.0, 0.0), (10.0, -5.0)]);
        TrackGraph::new(&nodes, &[(0, 1), (1, 2), (1, 3)]).unwrap()
    }

    /// Floyd-Warshall over the raw edge list, as an independent reference.
    fn reference_distances(nodes: &[Point2<f64>], edges: &[(usize, usize)]) -> Vec<Vec<f64>> {
        let n = nodes.len();
        let mut d = vec![vec![f64::INFINITY; n]; n];
        for (i, row) in d.iter_mut().enumerate() {
            row[i] = 0.0;
        }
        for &(a, b) in edges {
            let w = (nodes[a] - nodes[b]).norm();
            d[a][b] = d[a][b].min(w);
            d[b][a] = d[b][a].min(w);
        }
        for k in 0..n {
            for i in 0..n {
                for j in 0..n {
                    if d[i][k] + d[k][j] < d[i][j] {
                        d[i][j] = d[i][k] + d[k][j];
                    }
                }
            }
        }
        d
    }

    #[test]
    fn test_edge_lengths_are_euclidean() {
        let graph = t_graph();
        assert_eq!(graph.edge_count(), 3);
        assert_relative_eq!(graph.edges()[0].length, 10.0);
        assert_relative_eq!(graph.edges()[2].length, 5.0);
        assert_relative_eq!(graph.total_length(), 25.0);
    }

    #[test]
    fn test_dangling_edge_rejected() {
        let nodes = points(&[(0.0, 0.0), (1.0, 0.0)]);
        let result = TrackGraph::new(&nodes, &[(0, 1), (1, 5)]);
        assert_eq!(
            result.unwrap_err(),
            LinearizeError::Configuration(ConfigurationError::DanglingEdge {
                edge_id: 1,
                node_id: 5,
                node_count: 2,
            })
        );
    }

    #[test]
    fn test_disconnected_graph_rejected() {
        // Two separate segments: 0-1 and 2-3
        let nodes = points(&[(0.0, 0.0), (1.0, 0.0), (5.0, 5.0), (6.0, 5.0)]);
        let result = TrackGraph::new(&nodes, &[(0, 1), (2, 3)]);
        match result {
            Err(LinearizeError::Configuration(ConfigurationError::DisconnectedGraph {
                unreachable,
                ..
            })) => assert_eq!(unreachable, vec![2, 3]),
            other => panic!("expected DisconnectedGraph, got {:?}", other),
        }
    }

    #[test]
    fn test_isolated_node_rejected() {
        let nodes = points(&[(0.0, 0.0), (1.0, 0.0), (9.0, 9.0)]);
        assert!(matches!(
            TrackGraph::new(&nodes, &[(0, 1)]),
            Err(LinearizeError::Configuration(ConfigurationError::DisconnectedGraph { .. }))
        ));
    }

    #[test]
    fn test_degenerate_edge_rejected() {
        let nodes = points(&[(0.0, 0.0), (0.0, 0.0), (1.0, 0.0)]);
        assert_eq!(
            TrackGraph::new(&nodes, &[(0, 2), (0, 1)]).unwrap_err(),
            LinearizeError::Computation(ComputationError::DegenerateEdge { edge_id: 1 })
        );
        assert!(TrackGraph::new(&nodes, &[(2, 2)]).is_err());
    }

    #[test]
    fn test_empty_and_non_finite_rejected() {
        assert!(matches!(
            TrackGraph::new(&[], &[]),
            Err(LinearizeError::Configuration(ConfigurationError::EmptyGraph))
        ));
        let nodes = points(&[(0.0, 0.0), (f64::NAN, 1.0)]);
        assert!(matches!(
            TrackGraph::new(&nodes, &[(0, 1)]),
            Err(LinearizeError::Configuration(ConfigurationError::NonFiniteNode { node_id: 1 }))
        ));
    }

    #[test]
    fn test_node_distance_follows_track() {
        let graph = t_graph();
        assert_relative_eq!(graph.node_distance(0, 2).unwrap(), 20.0);
        // 0 -> 1 -> 3, not the straight line
        assert_relative_eq!(graph.node_distance(0, 3).unwrap(), 15.0);
        assert!(graph.node_distance(0, 9).is_err());
    }

    #[test]
    fn test_projection_clamps_to_segment() {
        let graph = t_graph();

        let p = graph.project(&Point2::new(4.0, 3.0), 0).unwrap();
        assert_relative_eq!(p.arc_length, 4.0);
        assert_relative_eq!(p.distance, 3.0);

        let beyond = graph.project(&Point2::new(-3.0, 4.0), 0).unwrap();
        assert_relative_eq!(beyond.arc_length, 0.0);
        assert_relative_eq!(beyond.distance, 5.0);

        assert_eq!(graph.project_all(&Point2::new(1.0, 1.0)).len(), 3);
    }

    #[test]
    fn test_route_distance_same_edge_and_across() {
        let graph = t_graph();
        let a = graph.project(&Point2::new(2.0, 0.0), 0).unwrap();
        let b = graph.project(&Point2::new(7.0, 0.0), 0).unwrap();
        assert_relative_eq!(graph.route_distance(&a, &b), 5.0);

        // From arc 2 on edge 0 to 3 below node 1: 8 + 3
        let c = graph.project(&Point2::new(10.0, -3.0), 2).unwrap();
        assert_relative_eq!(graph.route_distance(&a, &c), 11.0);
        assert_relative_eq!(graph.route_distance(&c, &a), 11.0);
    }

    #[test]
    fn test_point_at() {
        let graph = t_graph();
        let p = graph.point_at(2, 2.5).unwrap();
        assert_relative_eq!(p.x, 10.0);
        assert_relative_eq!(p.y, -2.5);
    }

    #[test]
    fn test_distances_match_reference_and_triangle_inequality() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        for _ in 0..20 {
            let n = rng.gen_range(3..9);
            let nodes: Vec<Point2<f64>> = (0..n)
                .map(|_| Point2::new(rng.gen_range(0.0..100.0), rng.gen_range(0.0..100.0)))
                .collect();

            // Spanning chain keeps it connected, then random extra edges
            let mut edges: Vec<(usize, usize)> = (1..n).map(|i| (i - 1, i)).collect();
            for _ in 0..n {
                let a = rng.gen_range(0..n);
                let b = rng.gen_range(0..n);
                if a != b {
                    edges.push((a, b));
                }
            }

            let graph = TrackGraph::new(&nodes, &edges).unwrap();
            let reference = reference_distances(&nodes, &edges);

            for i in 0..n {
                for j in 0..n {
                    let dij = graph.node_distance(i, j).unwrap();
                    assert_relative_eq!(dij, reference[i][j], epsilon = 1e-9);
                    assert_relative_eq!(dij, graph.node_distance(j, i).unwrap(), epsilon = 1e-9);
                    for k in 0..n {
                        let via = graph.node_distance(i, k).unwrap() + graph.node_distance(k, j).unwrap();
                        assert!(dij <= via + 1e-9);
                    }
                }
            }
        }
    }
}
