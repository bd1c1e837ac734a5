//! The tracking core as seen by its collaborators (HTTP handlers, sockets,
//! admin tooling). Built once at startup and shared behind an `Arc`.

mod driver;
mod messages;
mod pickups;
mod search;

pub use driver::{RouteInfo, RouteSummary, RouteSwitch};
pub use pickups::{DriverInbox, DRIVER_INBOX_LIMIT};
pub use search::{BusSearch, RankedBus};

use crate::broadcast::{topic, BroadcastHub, ConnectionHandle, ConnectionId, OutboundEvent, TrackingStatus};
use crate::config::Config;
use crate::error::{TrackerError, TrackerResult};
use crate::functions::eta::{EtaEstimate, EtaEstimator};
use crate::functions::live_state::{FixOutcome, LiveBusState};
use crate::functions::route_graph::{PathResult, RouteGraph, RouteGraphCache};
use crate::queries::_structs::*;
use crate::store::TrackerStore;
use crate::utils::geo_math::valid_coordinates;
use crate::utils::keyed_lock::KeyedLocks;
use chrono::{DateTime, Utc};
use geo::BoundingRect;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

/// A stop given either by id or by (case-insensitive) name.
#[derive(Debug, Clone, PartialEq)]
pub enum StopRef {
    Id(StopId),
    Name(String),
}

impl StopRef {
    pub fn parse(raw: &str) -> TrackerResult<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(TrackerError::invalid("empty stop"));
        }
        Ok(match raw.parse::<StopId>() {
            Ok(id) => StopRef::Id(id),
            Err(_) => StopRef::Name(raw.to_string()),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NearestStopView {
    pub route_id: RouteId,
    pub index: usize,
    pub stop: Stop,
    pub distance_km: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EtaView {
    pub bus_id: BusId,
    pub pickup_stop_id: StopId,
    #[serde(flatten)]
    pub estimate: EtaEstimate,
    pub nearest_stop: Option<String>,
    pub available_seats: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BusStatus {
    pub id: BusId,
    pub number_plate: String,
    #[serde(flatten)]
    pub live: LiveFields,
    pub route_id: RouteId,
    pub route_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RouteGeometry {
    pub route_id: RouteId,
    pub name: String,
    pub length_m: f64,
    pub stops: Vec<Stop>,
    pub geometry: geojson::Geometry,
}

pub struct Tracker {
    store: Arc<dyn TrackerStore>,
    hub: Arc<BroadcastHub>,
    graphs: Arc<RouteGraphCache>,
    live: LiveBusState,
    pickup_locks: KeyedLocks<(UserId, BusId)>,
    config: Config,
}

impl Tracker {
    pub fn new(store: Arc<dyn TrackerStore>, config: Config) -> Self {
        let graphs = Arc::new(RouteGraphCache::new());
        let live = LiveBusState::new(store.clone(), graphs.clone(), &config.tracking);
        Self {
            store,
            hub: Arc::new(BroadcastHub::with_queue_capacity(config.fanout.queue_capacity)),
            graphs,
            live,
            pickup_locks: KeyedLocks::new(),
            config,
        }
    }

    pub fn store(&self) -> &dyn TrackerStore {
        self.store.as_ref()
    }

    pub fn hub(&self) -> &BroadcastHub {
        &self.hub
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn estimator(&self) -> &EtaEstimator {
        self.live.estimator()
    }

    pub(crate) async fn bus(&self, bus_id: BusId) -> TrackerResult<Bus> {
        self.store
            .bus(bus_id)
            .await?
            .ok_or_else(|| TrackerError::not_found(format!("Bus {}", bus_id)))
    }

    pub(crate) async fn user(&self, user_id: UserId) -> TrackerResult<User> {
        self.store
            .user(user_id)
            .await?
            .ok_or_else(|| TrackerError::not_found(format!("User {}", user_id)))
    }

    pub(crate) async fn route(&self, route_id: RouteId) -> TrackerResult<BusRoute> {
        self.store
            .route(route_id)
            .await?
            .ok_or_else(|| TrackerError::not_found(format!("Route {}", route_id)))
    }

    pub(crate) async fn resolve_stop(&self, stop: &StopRef) -> TrackerResult<Stop> {
        let found = match stop {
            StopRef::Id(id) => self.store.stop(*id).await?,
            StopRef::Name(name) => self.store.stop_by_name(name).await?,
        };
        found.ok_or_else(|| TrackerError::not_found(format!("Stop {:?}", stop)))
    }

    /// Graph of a route, rebuilt when its stop list changed.
    pub async fn route_graph(&self, route_id: RouteId) -> TrackerResult<Arc<RouteGraph>> {
        self.route(route_id).await?;
        let stops = self.store.route_stops(route_id).await?;
        Ok(self.graphs.get_or_build(route_id, stops).await)
    }

    pub async fn compute_route_shortest_path(
        &self,
        route_id: RouteId,
        from: StopId,
        to: StopId,
    ) -> TrackerResult<PathResult> {
        let graph = self.route_graph(route_id).await?;
        for stop_id in [from, to] {
            if graph.index_of(stop_id).is_none() {
                return Err(TrackerError::not_found(format!("Stop {} on route {}", stop_id, route_id)));
            }
        }
        if from == to {
            return Ok(PathResult {
                distance_m: 0.0,
                stop_ids: vec![from],
            });
        }
        Ok(graph.shortest_path(from, to))
    }

    pub async fn nearest_stop(&self, route_id: RouteId, lat: f64, lng: f64) -> TrackerResult<NearestStopView> {
        if !valid_coordinates(lat, lng) {
            return Err(TrackerError::invalid(format!("coordinates ({}, {})", lat, lng)));
        }
        let graph = self.route_graph(route_id).await?;
        let nearest = graph
            .nearest_stop(lat, lng)
            .ok_or_else(|| TrackerError::not_found(format!("Stops of route {}", route_id)))?;
        Ok(NearestStopView {
            route_id,
            index: nearest.index,
            stop: graph.stops[nearest.index].stop.clone(),
            distance_km: nearest.distance_km,
        })
    }

    pub async fn current_eta(&self, bus_id: BusId, pickup_stop_id: StopId) -> TrackerResult<EtaView> {
        self.current_eta_at(bus_id, pickup_stop_id, Utc::now()).await
    }

    pub(crate) async fn current_eta_at(
        &self,
        bus_id: BusId,
        pickup_stop_id: StopId,
        now: DateTime<Utc>,
    ) -> TrackerResult<EtaView> {
        let bus = self.bus(bus_id).await?;
        let graph = self.route_graph(bus.route_id).await?;
        let pickup_idx = graph.index_of(pickup_stop_id).ok_or_else(|| {
            TrackerError::not_found(format!("Stop {} on route {}", pickup_stop_id, bus.route_id))
        })?;

        let estimate = self.estimator().estimate(&bus.live, &graph, pickup_idx, now);
        debug!("Bus {} to stop {}: {:?}", bus_id, pickup_stop_id, estimate.status);
        Ok(EtaView {
            bus_id,
            pickup_stop_id,
            nearest_stop: estimate
                .nearest_stop_index
                .map(|idx| graph.stops[idx].stop.name.clone()),
            estimate,
            available_seats: self.store.available_seats(bus_id).await?,
        })
    }

    /// Stores a GPS fix for a bus. Returns whether it passed the movement
    /// filter. Publishing is up to the caller.
    pub async fn record_location(&self, bus_id: BusId, lat: f64, lng: f64) -> TrackerResult<FixOutcome> {
        self.live.apply_location_update(bus_id, lat, lng, Utc::now()).await
    }

    /// Drops the live position and tells the bus topic tracking stopped.
    /// Watchers hear `disconnected` even when the store write fails.
    pub async fn clear_location(&self, bus_id: BusId) -> TrackerResult<()> {
        let cleared = self.live.clear_location(bus_id).await;
        self.publish(&topic::bus(bus_id), &OutboundEvent::status(TrackingStatus::Disconnected))
            .await;
        cleared
    }

    pub async fn publish(&self, topic: &str, event: &OutboundEvent) -> usize {
        self.hub.publish(topic, event).await
    }

    pub async fn join(&self, topic: &str, connection: &ConnectionHandle) {
        self.hub.join(topic, connection).await
    }

    pub async fn leave(&self, topic: &str, connection_id: ConnectionId) {
        self.hub.leave(topic, connection_id).await
    }

    pub async fn bus_status(&self, bus_id: BusId) -> TrackerResult<BusStatus> {
        let bus = self.bus(bus_id).await?;
        let route_name = self.store.route(bus.route_id).await?.map(|r| r.name);
        Ok(BusStatus {
            id: bus.id,
            number_plate: bus.number_plate,
            live: bus.live,
            route_id: bus.route_id,
            route_name,
        })
    }

    pub async fn route_geometry(&self, route_id: RouteId) -> TrackerResult<RouteGeometry> {
        let route = self.route(route_id).await?;
        let graph = self.route_graph(route_id).await?;
        let line = graph.line_string();
        Ok(RouteGeometry {
            route_id,
            name: route.name,
            length_m: graph.length_m(),
            stops: graph.stops.iter().map(|rs| rs.stop.clone()).collect(),
            geometry: geojson::Geometry {
                bbox: line
                    .bounding_rect()
                    .map(|r| vec![r.min().x, r.min().y, r.max().x, r.max().y]),
                value: geojson::Value::from(&line),
                foreign_members: None,
            },
        })
    }

    /// Flips a seat. Only the driver of the seat's bus may do this; the
    /// change is published on the bus topic.
    pub async fn toggle_seat(&self, user_id: UserId, seat_id: SeatId) -> TrackerResult<Seat> {
        let seat = self
            .store
            .seat(seat_id)
            .await?
            .ok_or_else(|| TrackerError::not_found(format!("Seat {}", seat_id)))?;
        let bus = self.bus(seat.bus_id).await?;
        self.require_bus_driver(user_id, &bus).await?;

        let seat = self.store.set_seat_available(seat_id, !seat.is_available).await?;
        info!("Seat {} of bus {} available={}", seat.seat_number, bus.id, seat.is_available);
        self.publish(
            &topic::bus(bus.id),
            &OutboundEvent::SeatUpdate {
                seat_id: seat.id,
                is_available: seat.is_available,
                seat_number: seat.seat_number,
                bus_id: bus.id,
            },
        )
        .await;
        Ok(seat)
    }

    /// Driver profile of `user_id`, or `Unauthorized`.
    pub(crate) async fn driver_of_user(&self, user_id: UserId) -> TrackerResult<Driver> {
        self.store
            .driver_by_user(user_id)
            .await?
            .ok_or(TrackerError::Unauthorized)
    }

    pub(crate) async fn require_bus_driver(&self, user_id: UserId, bus: &Bus) -> TrackerResult<Driver> {
        let driver = self.driver_of_user(user_id).await?;
        if driver.id != bus.driver_id {
            return Err(TrackerError::Unauthorized);
        }
        Ok(driver)
    }

    /// Account id of the driver assigned to a bus.
    pub(crate) async fn bus_driver_user(&self, bus: &Bus) -> TrackerResult<UserId> {
        self.store
            .driver(bus.driver_id)
            .await?
            .map(|d| d.user_id)
            .ok_or_else(|| TrackerError::not_found(format!("Driver {}", bus.driver_id)))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::functions::eta::EtaStatus;
    use crate::store::memory::tests::sample_seed;
    use crate::store::MemoryStore;

    pub(crate) fn tracker() -> Arc<Tracker> {
        let store = Arc::new(MemoryStore::from_seed(sample_seed()));
        Arc::new(Tracker::new(store, Config::default()))
    }

    #[test]
    fn test_stop_ref_parse() {
        assert_eq!(StopRef::parse(" 12 ").unwrap(), StopRef::Id(12));
        assert_eq!(StopRef::parse("Jamal").unwrap(), StopRef::Name("Jamal".into()));
        assert!(StopRef::parse("  ").is_err());
    }

    #[tokio::test]
    async fn test_shortest_path_on_route() {
        let tracker = tracker();
        let path = tracker.compute_route_shortest_path(1, 10, 12).await.unwrap();
        assert_eq!(path.stop_ids, vec![10, 11, 12]);
        assert!((path.distance_m - 2223.9).abs() < 1.0, "got {}", path.distance_m);

        let back = tracker.compute_route_shortest_path(1, 12, 10).await.unwrap();
        assert!(!back.is_reachable());
        assert!(back.stop_ids.is_empty());

        let same = tracker.compute_route_shortest_path(1, 11, 11).await.unwrap();
        assert_eq!(same.distance_m, 0.0);

        assert!(matches!(
            tracker.compute_route_shortest_path(1, 10, 99).await,
            Err(TrackerError::NotFound(_))
        ));
        assert!(matches!(
            tracker.compute_route_shortest_path(42, 10, 12).await,
            Err(TrackerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_nearest_stop() {
        let tracker = tracker();
        let nearest = tracker.nearest_stop(2, 27.719, 85.3).await.unwrap();
        assert_eq!(nearest.index, 0);
        assert_eq!(nearest.stop.name, "Lazimpat");
        assert!(matches!(
            tracker.nearest_stop(2, 200.0, 85.3).await,
            Err(TrackerError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_current_eta_tracks_live_position() {
        let tracker = tracker();
        let before = tracker.current_eta(7, 12).await.unwrap();
        assert_eq!(before.estimate.status, EtaStatus::NoLocation);
        assert_eq!(before.available_seats, 4);

        assert!(tracker.record_location(7, 27.700, 85.300).await.unwrap().is_accepted());
        let eta = tracker.current_eta(7, 12).await.unwrap();
        // 2.22 km at 25 km/h plus two stops of dwell.
        assert_eq!(eta.estimate.eta_minutes, Some(7));
        assert_eq!(eta.estimate.status, EtaStatus::Catchable);
        assert_eq!(eta.nearest_stop.as_deref(), Some("Ratna Park"));

        let later = Utc::now() + chrono::Duration::minutes(6);
        let stale = tracker.current_eta_at(7, 12, later).await.unwrap();
        assert_eq!(stale.estimate.status, EtaStatus::NoLocation);

        tracker.record_location(7, 27.720, 85.300).await.unwrap();
        let passed = tracker.current_eta(7, 11).await.unwrap();
        assert_eq!(passed.estimate.status, EtaStatus::Passed);
    }

    #[tokio::test]
    async fn test_route_geometry() {
        let tracker = tracker();
        let geometry = tracker.route_geometry(1).await.unwrap();
        assert_eq!(geometry.stops.len(), 3);
        assert!((geometry.length_m - 2223.9).abs() < 1.0);
        let json = serde_json::to_value(&geometry.geometry).unwrap();
        assert_eq!(json["type"], "LineString");
        assert_eq!(json["coordinates"][0][0], 85.3);
        assert_eq!(json["bbox"][1], 27.7);
        assert_eq!(json["bbox"][3], 27.72);
    }

    #[tokio::test]
    async fn test_toggle_seat_publishes_to_bus() {
        let tracker = tracker();
        let (conn, mut rx) = tracker.hub().open_connection();
        tracker.join(&topic::bus(7), &conn).await;

        let seat = tracker.store().seat(1).await.unwrap().unwrap();
        assert_eq!(seat.bus_id, 7);
        let toggled = tracker.toggle_seat(2, seat.id).await.unwrap();
        assert!(!toggled.is_available);
        assert_eq!(
            rx.try_recv().unwrap(),
            OutboundEvent::SeatUpdate {
                seat_id: seat.id,
                is_available: false,
                seat_number: seat.seat_number,
                bus_id: 7
            }
        );
        assert_eq!(tracker.store().available_seats(7).await.unwrap(), 3);

        assert!(matches!(
            tracker.toggle_seat(1, seat.id).await,
            Err(TrackerError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn test_bus_status_snapshot() {
        let tracker = tracker();
        tracker.record_location(7, 27.710, 85.300).await.unwrap();
        let status = tracker.bus_status(7).await.unwrap();
        assert_eq!(status.live.nearest_stop_index, Some(1));
        assert_eq!(status.route_name.as_deref(), Some("Ratna Park - Lazimpat"));

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["current_lat"], 27.71);
    }

    #[tokio::test]
    async fn test_leave_stops_delivery() {
        let tracker = tracker();
        let (conn, mut rx) = tracker.hub().open_connection();
        tracker.join("chat:lobby", &conn).await;

        let event = OutboundEvent::status(TrackingStatus::Waiting);
        assert_eq!(tracker.publish("chat:lobby", &event).await, 1);
        tracker.leave("chat:lobby", conn.id).await;
        assert_eq!(tracker.publish("chat:lobby", &event).await, 0);

        assert_eq!(rx.try_recv().unwrap(), event);
        assert!(rx.try_recv().is_err());
    }
}
