use crate::queries::_structs::StopId;
use crate::utils::load_graph::Graph;
use ordered_float::OrderedFloat;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

/// Dijkstra over a stop graph.
///
/// Returns the distance in meters and the stops along the path, or
/// `(f64::INFINITY, vec![])` when `to` cannot be reached from `from`.
/// `from == to` yields `(0.0, vec![from])` for a stop present in the graph.
pub fn shortest_path(graph: &Graph, from: StopId, to: StopId) -> (f64, Vec<StopId>) {
    if !graph.contains_key(&from) {
        return (f64::INFINITY, Vec::new());
    }

    let mut dist: HashMap<StopId, OrderedFloat<f64>> = HashMap::new();
    let mut previous: HashMap<StopId, StopId> = HashMap::new();
    let mut frontier = BinaryHeap::new();

    dist.insert(from, OrderedFloat(0.0));
    frontier.push(Reverse((OrderedFloat(0.0), from)));

    while let Some(Reverse((d, node))) = frontier.pop() {
        if node == to {
            return (d.into_inner(), rebuild_path(&previous, from, to));
        }
        if dist.get(&node).is_some_and(|best| d > *best) {
            continue;
        }
        let Some(edges) = graph.get(&node) else {
            continue;
        };
        for (&next, &weight) in edges {
            let candidate = d + weight;
            let improved = dist.get(&next).map_or(true, |known| candidate < *known);
            if improved {
                dist.insert(next, candidate);
                previous.insert(next, node);
                frontier.push(Reverse((candidate, next)));
            }
        }
    }

    (f64::INFINITY, Vec::new())
}

fn rebuild_path(previous: &HashMap<StopId, StopId>, from: StopId, to: StopId) -> Vec<StopId> {
    let mut path = vec![to];
    let mut current = to;
    while current != from {
        match previous.get(&current) {
            Some(&p) => {
                path.push(p);
                current = p;
            }
            None => break,
        }
    }
    path.reverse();
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::load_graph::build_graph;
    use crate::utils::load_graph::tests::route_stop;

    fn line_graph() -> Graph {
        build_graph(&[
            route_stop(1, 0, 27.70, 85.30, Some(100.0)),
            route_stop(2, 1, 27.71, 85.30, Some(250.0)),
            route_stop(3, 2, 27.72, 85.30, Some(400.0)),
            route_stop(4, 3, 27.73, 85.30, None),
        ])
    }

    #[test]
    fn test_forward_distance_is_sum_of_edges() {
        let graph = line_graph();
        let (d, path) = shortest_path(&graph, 1, 4);
        assert_eq!(d, 750.0);
        assert_eq!(path, vec![1, 2, 3, 4]);

        let (d, path) = shortest_path(&graph, 2, 3);
        assert_eq!(d, 250.0);
        assert_eq!(path, vec![2, 3]);
    }

    #[test]
    fn test_no_reverse_edges() {
        let graph = line_graph();
        let (d, path) = shortest_path(&graph, 4, 1);
        assert!(d.is_infinite());
        assert!(path.is_empty());
    }

    #[test]
    fn test_unknown_stop_is_unreachable() {
        let graph = line_graph();
        assert!(shortest_path(&graph, 99, 1).0.is_infinite());
        assert!(shortest_path(&graph, 1, 99).0.is_infinite());
    }

    #[test]
    fn test_same_stop() {
        let graph = line_graph();
        assert_eq!(shortest_path(&graph, 2, 2), (0.0, vec![2]));
    }
}
