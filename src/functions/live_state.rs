use crate::config::TrackingConfig;
use crate::error::{TrackerError, TrackerResult};
use crate::functions::eta::EtaEstimator;
use crate::functions::route_graph::RouteGraphCache;
use crate::queries::_structs::{Bus, BusId, LiveFields, RouteId};
use crate::store::TrackerStore;
use crate::utils::geo_math::{distance_meters, valid_coordinates};
use chrono::{DateTime, Utc};
use crate::utils::keyed_lock::KeyedLocks;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, info};

/// Result of offering a GPS fix to [`LiveBusState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixOutcome {
    /// Within the minimum-movement radius; nothing was written.
    Ignored,
    /// Stored. `first_fix` is set when the bus had no position before.
    Accepted { first_fix: bool },
}

impl FixOutcome {
    pub fn is_accepted(self) -> bool {
        matches!(self, FixOutcome::Accepted { .. })
    }
}

/// Authoritative live record of every bus.
///
/// All writes to a bus's live fields go through here and are serialized per
/// bus; updates to different buses never wait on each other.
pub struct LiveBusState {
    store: Arc<dyn TrackerStore>,
    graphs: Arc<RouteGraphCache>,
    estimator: EtaEstimator,
    min_movement_m: f64,
    locks: KeyedLocks<BusId>,
}

impl LiveBusState {
    pub fn new(store: Arc<dyn TrackerStore>, graphs: Arc<RouteGraphCache>, config: &TrackingConfig) -> Self {
        Self {
            store,
            graphs,
            estimator: EtaEstimator::from_config(config),
            min_movement_m: config.min_movement_m,
            locks: KeyedLocks::new(),
        }
    }

    async fn load_bus(&self, bus_id: BusId) -> TrackerResult<Bus> {
        self.store
            .bus(bus_id)
            .await?
            .ok_or_else(|| TrackerError::not_found(format!("Bus {}", bus_id)))
    }

    /// Applies a GPS fix. Fixes within the minimum-movement radius of the
    /// stored position come back as [`FixOutcome::Ignored`].
    pub async fn apply_location_update(
        &self,
        bus_id: BusId,
        lat: f64,
        lng: f64,
        now: DateTime<Utc>,
    ) -> TrackerResult<FixOutcome> {
        if !valid_coordinates(lat, lng) {
            return Err(TrackerError::invalid(format!("coordinates ({}, {})", lat, lng)));
        }

        let _guard = self.locks.lock(bus_id).await;
        let bus = self.load_bus(bus_id).await?;
        let previous = bus.live;

        if let Some((prev_lat, prev_lng)) = previous.position() {
            let moved = distance_meters(prev_lat, prev_lng, lat, lng);
            if moved < self.min_movement_m {
                debug!("Bus {}: ignoring {:.1} m move", bus_id, moved);
                return Ok(FixOutcome::Ignored);
            }
        }

        let stops = self.store.route_stops(bus.route_id).await?;
        let route = self.graphs.get_or_build(bus.route_id, stops).await;

        let mut live = LiveFields {
            current_lat: Some(lat),
            current_lng: Some(lng),
            eta_passed_counter: previous.eta_passed_counter,
            updated_at: Some(now),
            ..LiveFields::default()
        };

        if let Some(nearest) = route.nearest_stop(lat, lng) {
            let index = nearest.index as i32;
            let raw = self.estimator.seconds_to(nearest.distance_km);
            live.nearest_stop_index = Some(index);
            live.eta_seconds = Some(raw);
            live.eta_smoothed_seconds = Some(self.estimator.smooth(raw as f64, previous.eta_smoothed_seconds));
            live.eta_passed_counter = match previous.nearest_stop_index.map(|prev| index.cmp(&prev)) {
                Some(Ordering::Greater) => previous.eta_passed_counter + 1,
                Some(Ordering::Less) => 0,
                _ => previous.eta_passed_counter,
            };
        }

        debug!(
            "Bus {}: at ({}, {}), nearest stop {:?}, eta {:?}s",
            bus_id, lat, lng, live.nearest_stop_index, live.eta_seconds
        );
        self.store.save_live(bus_id, live).await?;
        Ok(FixOutcome::Accepted {
            first_fix: previous.position().is_none(),
        })
    }

    /// Forgets the bus position and the figures derived from it.
    pub async fn clear_location(&self, bus_id: BusId) -> TrackerResult<()> {
        let _guard = self.locks.lock(bus_id).await;
        let mut live = self.load_bus(bus_id).await?.live;
        live.clear_position();
        self.store.save_live(bus_id, live).await?;
        info!("Bus {}: live location cleared", bus_id);
        Ok(())
    }

    /// Puts the bus on another route with empty live fields and a zeroed
    /// passed-stop counter.
    pub async fn reassign_route(&self, bus_id: BusId, route_id: RouteId) -> TrackerResult<()> {
        let _guard = self.locks.lock(bus_id).await;
        self.store
            .assign_route(bus_id, route_id, LiveFields::default())
            .await?;
        info!("Bus {}: moved to route {}", bus_id, route_id);
        Ok(())
    }

    pub fn estimator(&self) -> &EtaEstimator {
        &self.estimator
    }
}
