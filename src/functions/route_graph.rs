use crate::algorithms::shortest_path;
use crate::queries::_structs::{RouteId, RouteStop, StopId};
use crate::utils::geo_math::{distance_km, nearest_index};
use crate::utils::load_graph::{build_graph, edge_count, Graph};
use geo_types::{LineString, Point};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// A route's ordered stops together with its directed stop graph.
#[derive(Debug, Clone)]
pub struct RouteGraph {
    pub route_id: RouteId,
    pub stops: Vec<RouteStop>,
    pub graph: Graph,
}

#[derive(Debug, Clone, Serialize)]
pub struct PathResult {
    pub distance_m: f64,
    pub stop_ids: Vec<StopId>,
}

impl PathResult {
    pub fn is_reachable(&self) -> bool {
        self.distance_m.is_finite()
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct NearestStop {
    pub index: usize,
    pub stop_id: StopId,
    pub distance_km: f64,
}

impl RouteGraph {
    pub fn new(route_id: RouteId, mut stops: Vec<RouteStop>) -> Self {
        stops.sort_by_key(|rs| rs.order);
        let graph = build_graph(&stops);
        debug!(
            "Built graph for route {}: {} stops, {} edges",
            route_id,
            stops.len(),
            edge_count(&graph)
        );
        Self {
            route_id,
            stops,
            graph,
        }
    }

    pub fn index_of(&self, stop_id: StopId) -> Option<usize> {
        self.stops.iter().position(|rs| rs.stop.id == stop_id)
    }

    pub fn shortest_path(&self, from: StopId, to: StopId) -> PathResult {
        let (distance_m, stop_ids) = shortest_path(&self.graph, from, to);
        PathResult { distance_m, stop_ids }
    }

    /// Stop of this route closest to the given position.
    pub fn nearest_stop(&self, lat: f64, lng: f64) -> Option<NearestStop> {
        let points: Vec<Point<f64>> = self.stops.iter().map(|rs| rs.stop.point()).collect();
        let index = nearest_index(Point::new(lng, lat), &points)?;
        let stop = &self.stops[index].stop;
        Some(NearestStop {
            index,
            stop_id: stop.id,
            distance_km: distance_km(lat, lng, stop.latitude, stop.longitude),
        })
    }

    /// Sum of all edge weights, first stop to last.
    pub fn length_m(&self) -> f64 {
        self.graph
            .values()
            .flat_map(|edges| edges.values())
            .map(|w| w.into_inner())
            .sum()
    }

    pub fn line_string(&self) -> LineString<f64> {
        self.stops
            .iter()
            .map(|rs| (rs.stop.longitude, rs.stop.latitude))
            .collect::<Vec<_>>()
            .into()
    }
}

/// Per-route graph cache. An entry is reused only while the route's stop list
/// is unchanged, so edits to reference data take effect on the next query.
#[derive(Debug, Default)]
pub struct RouteGraphCache {
    graphs: RwLock<HashMap<RouteId, Arc<RouteGraph>>>,
}

impl RouteGraphCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_build(&self, route_id: RouteId, stops: Vec<RouteStop>) -> Arc<RouteGraph> {
        if let Some(cached) = self.graphs.read().await.get(&route_id) {
            if cached.stops == stops {
                return cached.clone();
            }
        }

        let built = Arc::new(RouteGraph::new(route_id, stops));
        self.graphs.write().await.insert(route_id, built.clone());
        built
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::load_graph::tests::route_stop;

    fn sample() -> Vec<RouteStop> {
        vec![
            route_stop(10, 0, 27.700, 85.300, Some(1000.0)),
            route_stop(11, 1, 27.710, 85.300, Some(1200.0)),
            route_stop(12, 2, 27.720, 85.300, None),
        ]
    }

    #[test]
    fn test_nearest_stop_and_index() {
        let rg = RouteGraph::new(1, sample());
        let nearest = rg.nearest_stop(27.709, 85.300).unwrap();
        assert_eq!(nearest.index, 1);
        assert_eq!(nearest.stop_id, 11);
        assert!(nearest.distance_km < 0.2);
        assert_eq!(rg.index_of(12), Some(2));
        assert_eq!(rg.index_of(99), None);
    }

    #[test]
    fn test_length_and_path() {
        let rg = RouteGraph::new(1, sample());
        assert_eq!(rg.length_m(), 2200.0);
        let path = rg.shortest_path(10, 12);
        assert!(path.is_reachable());
        assert_eq!(path.stop_ids, vec![10, 11, 12]);
        assert!(!rg.shortest_path(12, 10).is_reachable());
        assert_eq!(rg.line_string().0.len(), 3);
    }

    #[test]
    fn test_stops_sorted_by_order() {
        let mut stops = sample();
        stops.reverse();
        let rg = RouteGraph::new(1, stops);
        assert_eq!(rg.stops[0].stop.id, 10);
    }

    #[tokio::test]
    async fn test_cache_rebuilds_when_stops_change() {
        let cache = RouteGraphCache::new();
        let first = cache.get_or_build(1, sample()).await;
        let again = cache.get_or_build(1, sample()).await;
        assert!(Arc::ptr_eq(&first, &again));

        let mut changed = sample();
        changed.pop();
        let rebuilt = cache.get_or_build(1, changed).await;
        assert!(!Arc::ptr_eq(&first, &rebuilt));
        assert_eq!(rebuilt.stops.len(), 2);
    }
}
