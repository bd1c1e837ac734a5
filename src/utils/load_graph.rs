use crate::queries::_structs::{RouteStop, StopId};
use crate::utils::geo_math::distance_meters;
use ordered_float::OrderedFloat;
use std::collections::BTreeMap;

/// Directed stop graph: `graph[a][b]` is the edge weight in meters.
pub type Graph = BTreeMap<StopId, BTreeMap<StopId, OrderedFloat<f64>>>;

/// Builds the graph of a route from its stops in route order.
///
/// Only consecutive stops are linked, forward only: a route is a simple
/// directed path. Reverse travel is a different route.
pub fn build_graph(stops: &[RouteStop]) -> Graph {
    let mut graph: Graph = BTreeMap::new();

    for stop in stops {
        graph.entry(stop.stop.id).or_default();
    }

    for pair in stops.windows(2) {
        let (current, next) = (&pair[0], &pair[1]);
        let weight = match current.distance_to_next_m {
            Some(d) if d > 0.0 => d,
            _ => distance_meters(
                current.stop.latitude,
                current.stop.longitude,
                next.stop.latitude,
                next.stop.longitude,
            ),
        };
        graph
            .entry(current.stop.id)
            .or_default()
            .insert(next.stop.id, OrderedFloat(weight));
    }

    graph
}

pub fn edge_count(graph: &Graph) -> usize {
    graph.values().map(BTreeMap::len).sum()
}
