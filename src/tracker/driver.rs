use super::Tracker;
use crate::error::{TrackerError, TrackerResult};
use crate::queries::_structs::{Bus, BusId, BusRoute, Driver, RouteId, UserId};
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteSummary {
    pub id: RouteId,
    pub name: String,
    pub stops_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteSwitch {
    pub bus_id: BusId,
    pub old_route: RouteSummary,
    pub new_route: RouteSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteInfo {
    pub bus_id: BusId,
    pub current_route: RouteSummary,
    pub reverse_route: Option<RouteSummary>,
    pub can_switch: bool,
}

impl Tracker {
    /// The bus a driver account operates (its first one).
    pub(crate) async fn driver_bus(&self, user_id: UserId) -> TrackerResult<(Driver, Bus)> {
        let driver = self.driver_of_user(user_id).await?;
        let bus = self
            .store
            .buses_for_driver(driver.id)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| TrackerError::not_found(format!("Bus for driver {}", driver.id)))?;
        Ok((driver, bus))
    }

    async fn summary(&self, route: &BusRoute) -> TrackerResult<RouteSummary> {
        Ok(RouteSummary {
            id: route.id,
            name: route.name.clone(),
            stops_count: self.store.route_stops(route.id).await?.len(),
        })
    }

    /// Reverses the direction of the driver's bus by moving it onto the
    /// reverse route. Live fields are cleared and the passed-stop counter
    /// starts again from zero.
    pub async fn switch_route(&self, user_id: UserId) -> TrackerResult<RouteSwitch> {
        let (driver, bus) = self.driver_bus(user_id).await?;
        let current = self.route(bus.route_id).await?;
        let reverse_id = current
            .reverse_route
            .ok_or_else(|| TrackerError::invalid(format!("No reverse route configured for {}", current.name)))?;
        if reverse_id == current.id {
            return Err(TrackerError::invalid(format!("Route {} is its own reverse", current.name)));
        }
        let reverse = self.route(reverse_id).await?;

        self.live.reassign_route(bus.id, reverse.id).await?;
        info!(
            "Driver {} (bus {}) switched route: {} -> {}",
            driver.id, bus.number_plate, current.name, reverse.name
        );

        Ok(RouteSwitch {
            bus_id: bus.id,
            old_route: self.summary(&current).await?,
            new_route: self.summary(&reverse).await?,
        })
    }

    pub async fn route_info(&self, user_id: UserId) -> TrackerResult<RouteInfo> {
        let (_, bus) = self.driver_bus(user_id).await?;
        let current = self.route(bus.route_id).await?;
        let reverse = match current.reverse_route {
            Some(id) if id != current.id => self.store.route(id).await?,
            _ => None,
        };

        let reverse_route = match &reverse {
            Some(route) => Some(self.summary(route).await?),
            None => None,
        };
        Ok(RouteInfo {
            bus_id: bus.id,
            current_route: self.summary(&current).await?,
            can_switch: reverse_route.is_some(),
            reverse_route,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::error::TrackerError;
    use crate::store::memory::tests::sample_seed;
    use crate::store::MemoryStore;
    use crate::tracker::tests::tracker;
    use crate::tracker::Tracker;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_switch_route_resets_live_state() {
        let tracker = tracker();
        tracker.record_location(7, 27.700, 85.300).await.unwrap();
        tracker.record_location(7, 27.710, 85.300).await.unwrap();
        assert_eq!(tracker.bus_status(7).await.unwrap().live.eta_passed_counter, 1);

        let switch = tracker.switch_route(2).await.unwrap();
        assert_eq!(switch.old_route.id, 1);
        assert_eq!(switch.new_route.id, 2);
        assert_eq!(switch.new_route.stops_count, 3);

        let status = tracker.bus_status(7).await.unwrap();
        assert_eq!(status.route_id, 2);
        assert_eq!(status.live.position(), None);
        assert_eq!(status.live.nearest_stop_index, None);
        assert_eq!(status.live.eta_smoothed_seconds, None);
        assert_eq!(status.live.eta_passed_counter, 0);

        // And back again.
        assert_eq!(tracker.switch_route(2).await.unwrap().new_route.id, 1);
    }

    #[tokio::test]
    async fn test_route_info() {
        let tracker = tracker();
        let info = tracker.route_info(2).await.unwrap();
        assert_eq!(info.bus_id, 7);
        assert_eq!(info.current_route.name, "Ratna Park - Lazimpat");
        assert!(info.can_switch);
        assert_eq!(info.reverse_route.unwrap().id, 2);
    }

    #[tokio::test]
    async fn test_self_reverse_is_rejected() {
        let mut seed = sample_seed();
        seed.routes[0].reverse_route = Some(1);
        let tracker = Tracker::new(Arc::new(MemoryStore::from_seed(seed)), Config::default());

        assert!(matches!(tracker.switch_route(2).await, Err(TrackerError::InvalidInput(_))));
        assert!(!tracker.route_info(2).await.unwrap().can_switch);
        assert_eq!(tracker.bus_status(7).await.unwrap().route_id, 1);
    }

    #[tokio::test]
    async fn test_only_drivers_switch() {
        let tracker = tracker();
        assert!(matches!(tracker.switch_route(1).await, Err(TrackerError::Unauthorized)));
        assert!(matches!(tracker.route_info(3).await, Err(TrackerError::Unauthorized)));
    }
}
