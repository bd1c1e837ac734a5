use super::{StopRef, Tracker};
use crate::error::TrackerResult;
use crate::functions::eta::{cmp_missing_last, EtaStatus};
use crate::functions::route_graph::RouteGraph;
use crate::queries::_structs::{Bus, BusId, BusRoute, RouteId, Stop};
use chrono::Utc;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Serialize)]
pub struct RankedBus {
    pub bus_id: BusId,
    pub number_plate: String,
    pub route_id: RouteId,
    pub route_name: String,
    pub status: EtaStatus,
    pub eta_minutes: Option<u32>,
    pub available_seats: i64,
    pub nearest_stop: Option<String>,
    pub stops_between: Option<usize>,
    pub pickup_to_dest_km: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BusSearch {
    pub pickup: Stop,
    pub destination: Stop,
    pub buses: Vec<RankedBus>,
}

/// A route serving pickup before destination, with its buses.
struct Candidate {
    route: BusRoute,
    graph: Arc<RouteGraph>,
    pickup_idx: usize,
    pickup_to_dest_km: Option<f64>,
    buses: Vec<(Bus, i64)>,
}

impl Tracker {
    /// Buses that can take a passenger from `pickup` to `destination`,
    /// shortest ride first, then soonest arrival.
    pub async fn rank_buses(&self, pickup: &StopRef, destination: &StopRef, show_passed: bool) -> TrackerResult<BusSearch> {
        let pickup = self.resolve_stop(pickup).await?;
        let destination = self.resolve_stop(destination).await?;
        info!("Searching buses from {} to {}", pickup.name, destination.name);

        let mut candidates = Vec::new();
        for route in self.store.active_routes().await? {
            let stops = self.store.route_stops(route.id).await?;
            let graph = self.graphs.get_or_build(route.id, stops).await;
            let (Some(pickup_idx), Some(dest_idx)) = (graph.index_of(pickup.id), graph.index_of(destination.id)) else {
                continue;
            };
            if pickup_idx >= dest_idx {
                debug!("Route {} runs the wrong way ({} >= {})", route.name, pickup_idx, dest_idx);
                continue;
            }

            let path = graph.shortest_path(pickup.id, destination.id);
            let pickup_to_dest_km = (path.is_reachable() && path.distance_m > 0.0).then(|| path.distance_m / 1000.0);

            let mut buses = Vec::new();
            for bus in self.store.buses_on_route(route.id).await? {
                let seats = self.store.available_seats(bus.id).await?;
                buses.push((bus, seats));
            }
            candidates.push(Candidate {
                route,
                graph,
                pickup_idx,
                pickup_to_dest_km,
                buses,
            });
        }
        debug!("{} candidate routes", candidates.len());

        let now = Utc::now();
        let estimator = self.estimator();
        let mut ranked: Vec<RankedBus> = candidates
            .par_iter()
            .flat_map_iter(|c| {
                c.buses.iter().map(move |(bus, seats)| {
                    let estimate = estimator.estimate(&bus.live, &c.graph, c.pickup_idx, now);
                    RankedBus {
                        bus_id: bus.id,
                        number_plate: bus.number_plate.clone(),
                        route_id: c.route.id,
                        route_name: c.route.name.clone(),
                        status: estimate.status,
                        eta_minutes: estimate.eta_minutes,
                        available_seats: *seats,
                        nearest_stop: estimate
                            .nearest_stop_index
                            .map(|idx| c.graph.stops[idx].stop.name.clone()),
                        stops_between: estimate.stops_between,
                        pickup_to_dest_km: c.pickup_to_dest_km,
                    }
                })
            })
            .collect();

        ranked.sort_by(|a, b| {
            cmp_missing_last(a.pickup_to_dest_km, b.pickup_to_dest_km)
                .then_with(|| cmp_missing_last(a.eta_minutes, b.eta_minutes))
        });
        if !show_passed {
            ranked.retain(|b| b.status != EtaStatus::Passed);
        }

        Ok(BusSearch {
            pickup,
            destination,
            buses: ranked,
        })
    }

    /// Every stop served by an active route, by name.
    pub async fn list_stops(&self) -> TrackerResult<Vec<Stop>> {
        let mut stops = BTreeMap::new();
        for route in self.store.active_routes().await? {
            for rs in self.store.route_stops(route.id).await? {
                stops.insert((rs.stop.name.clone(), rs.stop.id), rs.stop);
            }
        }
        Ok(stops.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::store::memory::{tests::sample_seed, SeedBus};
    use crate::store::MemoryStore;
    use crate::tracker::tests::tracker;

    #[tokio::test]
    async fn test_only_forward_routes_match() {
        let tracker = tracker();
        let search = tracker
            .rank_buses(&StopRef::Name("ratna park".into()), &StopRef::Id(12), false)
            .await
            .unwrap();
        assert_eq!(search.pickup.id, 10);
        assert_eq!(search.buses.len(), 1);
        let bus = &search.buses[0];
        assert_eq!(bus.route_id, 1);
        assert_eq!(bus.status, EtaStatus::NoLocation);
        assert_eq!(bus.available_seats, 4);
        assert!((bus.pickup_to_dest_km.unwrap() - 2.2239).abs() < 0.001);

        // Route 2 runs Lazimpat -> Ratna Park, and has no bus.
        let back = tracker
            .rank_buses(&StopRef::Id(12), &StopRef::Id(10), false)
            .await
            .unwrap();
        assert!(back.buses.is_empty());
    }

    #[tokio::test]
    async fn test_passed_buses_are_hidden_by_default() {
        let tracker = tracker();
        tracker.record_location(7, 27.720, 85.300).await.unwrap();

        let hidden = tracker
            .rank_buses(&StopRef::Id(11), &StopRef::Id(12), false)
            .await
            .unwrap();
        assert!(hidden.buses.is_empty());

        let shown = tracker
            .rank_buses(&StopRef::Id(11), &StopRef::Id(12), true)
            .await
            .unwrap();
        assert_eq!(shown.buses[0].status, EtaStatus::Passed);
        assert_eq!(shown.buses[0].nearest_stop.as_deref(), Some("Lazimpat"));
    }

    #[tokio::test]
    async fn test_tracked_bus_ranks_before_untracked() {
        let mut seed = sample_seed();
        seed.buses.push(SeedBus {
            id: 8,
            number_plate: "BA 3 KHA 42".into(),
            total_seats: 2,
            driver_id: 5,
            route_id: 1,
        });
        let tracker = Tracker::new(Arc::new(MemoryStore::from_seed(seed)), Config::default());
        tracker.record_location(8, 27.700, 85.300).await.unwrap();

        let search = tracker
            .rank_buses(&StopRef::Id(11), &StopRef::Id(12), false)
            .await
            .unwrap();
        let order: Vec<BusId> = search.buses.iter().map(|b| b.bus_id).collect();
        assert_eq!(order, vec![8, 7]);
        assert_eq!(search.buses[0].eta_minutes, Some(4));
        assert_eq!(search.buses[1].eta_minutes, None);
    }

    #[tokio::test]
    async fn test_unknown_stop() {
        let tracker = tracker();
        assert!(tracker
            .rank_buses(&StopRef::Name("Nowhere".into()), &StopRef::Id(12), false)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_list_stops_sorted_by_name() {
        let tracker = tracker();
        let names: Vec<String> = tracker.list_stops().await.unwrap().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["Jamal", "Lazimpat", "Ratna Park"]);
    }
}
