use super::{StoreFuture, TrackerStore};
use crate::db;
use crate::error::{TrackerError, TrackerResult};
use crate::queries::_structs::*;
use crate::queries::{buses, messages, pickups, routes};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use tokio_postgres::Client;

/// [`TrackerStore`] backed by PostgreSQL (schema in `sql/schema.sql`).
pub struct PgStore {
    client: Client,
}

impl PgStore {
    pub async fn connect(db_url: &str) -> TrackerResult<Self> {
        let client = db::connect_to_db(db_url).await?;
        db::ensure_schema(&client).await?;
        Ok(Self { client })
    }
}

impl TrackerStore for PgStore {
    fn user(&self, id: UserId) -> StoreFuture<'_, Option<User>> {
        async move { Ok(buses::find_user(id, &self.client).await?) }.boxed()
    }

    fn stop(&self, id: StopId) -> StoreFuture<'_, Option<Stop>> {
        async move { Ok(routes::find_stop(id, &self.client).await?) }.boxed()
    }

    fn stop_by_name<'a>(&'a self, name: &'a str) -> StoreFuture<'a, Option<Stop>> {
        async move { Ok(routes::find_stop_by_name(name, &self.client).await?) }.boxed()
    }

    fn route(&self, id: RouteId) -> StoreFuture<'_, Option<BusRoute>> {
        async move { Ok(routes::find_route(id, &self.client).await?) }.boxed()
    }

    fn active_routes(&self) -> StoreFuture<'_, Vec<BusRoute>> {
        async move { Ok(routes::active_routes(&self.client).await?) }.boxed()
    }

    fn route_stops(&self, route_id: RouteId) -> StoreFuture<'_, Vec<RouteStop>> {
        async move { Ok(routes::route_stops(route_id, &self.client).await?) }.boxed()
    }

    fn bus(&self, id: BusId) -> StoreFuture<'_, Option<Bus>> {
        async move { Ok(buses::find_bus(id, &self.client).await?) }.boxed()
    }

    fn buses_on_route(&self, route_id: RouteId) -> StoreFuture<'_, Vec<Bus>> {
        async move { Ok(buses::buses_on_route(route_id, &self.client).await?) }.boxed()
    }

    fn buses_for_driver(&self, driver_id: DriverId) -> StoreFuture<'_, Vec<Bus>> {
        async move { Ok(buses::buses_for_driver(driver_id, &self.client).await?) }.boxed()
    }

    fn driver(&self, id: DriverId) -> StoreFuture<'_, Option<Driver>> {
        async move { Ok(buses::find_driver(id, &self.client).await?) }.boxed()
    }

    fn driver_by_user(&self, user_id: UserId) -> StoreFuture<'_, Option<Driver>> {
        async move { Ok(buses::find_driver_by_user(user_id, &self.client).await?) }.boxed()
    }

    fn save_live(&self, bus_id: BusId, live: LiveFields) -> StoreFuture<'_, ()> {
        async move {
            if buses::save_live(bus_id, None, &live, &self.client).await? {
                Ok(())
            } else {
                Err(TrackerError::not_found(format!("Bus {}", bus_id)))
            }
        }
        .boxed()
    }

    fn assign_route(&self, bus_id: BusId, route_id: RouteId, live: LiveFields) -> StoreFuture<'_, ()> {
        async move {
            if buses::save_live(bus_id, Some(route_id), &live, &self.client).await? {
                Ok(())
            } else {
                Err(TrackerError::not_found(format!("Bus {}", bus_id)))
            }
        }
        .boxed()
    }

    fn seat(&self, id: SeatId) -> StoreFuture<'_, Option<Seat>> {
        async move { Ok(buses::find_seat(id, &self.client).await?) }.boxed()
    }

    fn set_seat_available(&self, id: SeatId, available: bool) -> StoreFuture<'_, Seat> {
        async move {
            buses::set_seat_available(id, available, &self.client)
                .await?
                .ok_or_else(|| TrackerError::not_found(format!("Seat {}", id)))
        }
        .boxed()
    }

    fn available_seats(&self, bus_id: BusId) -> StoreFuture<'_, i64> {
        async move { Ok(buses::available_seats(bus_id, &self.client).await?) }.boxed()
    }

    fn insert_message(&self, message: NewMessage) -> StoreFuture<'_, Message> {
        async move { Ok(messages::insert_message(&message, &self.client).await?) }.boxed()
    }

    fn last_sender_to(&self, user_id: UserId) -> StoreFuture<'_, Option<UserId>> {
        async move { Ok(messages::last_sender_to(user_id, &self.client).await?) }.boxed()
    }

    fn conversation(&self, a: UserId, b: UserId, limit: usize) -> StoreFuture<'_, Vec<Message>> {
        async move {
            let limit = i64::try_from(limit).unwrap_or(i64::MAX);
            Ok(messages::conversation(a, b, limit, &self.client).await?)
        }
        .boxed()
    }

    fn delete_conversation(&self, a: UserId, b: UserId) -> StoreFuture<'_, u64> {
        async move { Ok(messages::delete_conversation(a, b, &self.client).await?) }.boxed()
    }

    fn insert_pickup(&self, pickup: NewPickup) -> StoreFuture<'_, PickupRequest> {
        async move { Ok(pickups::insert_pickup(&pickup, &self.client).await?) }.boxed()
    }

    fn pending_pickup_since(
        &self,
        user_id: UserId,
        bus_id: BusId,
        since: DateTime<Utc>,
    ) -> StoreFuture<'_, Option<PickupRequest>> {
        async move { Ok(pickups::pending_since(user_id, bus_id, since, &self.client).await?) }.boxed()
    }

    fn pickup(&self, id: PickupId) -> StoreFuture<'_, Option<PickupRequest>> {
        async move { Ok(pickups::find_pickup(id, &self.client).await?) }.boxed()
    }

    fn set_pickup_status(&self, id: PickupId, status: PickupStatus) -> StoreFuture<'_, ()> {
        async move {
            match pickups::set_status(id, status, &self.client).await? {
                0 => Err(TrackerError::not_found(format!("Pickup request {}", id))),
                _ => Ok(()),
            }
        }
        .boxed()
    }

    fn mark_pickup_seen(&self, id: PickupId) -> StoreFuture<'_, bool> {
        async move { Ok(pickups::mark_seen(id, &self.client).await? > 0) }.boxed()
    }

    fn mark_driver_pickups_seen(&self, driver_id: DriverId) -> StoreFuture<'_, u64> {
        async move { Ok(pickups::mark_all_seen_for_driver(driver_id, &self.client).await?) }.boxed()
    }

    fn driver_pickups(&self, driver_id: DriverId, limit: usize) -> StoreFuture<'_, Vec<PickupRequest>> {
        async move {
            let limit = i64::try_from(limit).unwrap_or(i64::MAX);
            Ok(pickups::for_driver(driver_id, limit, &self.client).await?)
        }
        .boxed()
    }

    fn unseen_pickup_count(&self, driver_id: DriverId) -> StoreFuture<'_, u64> {
        async move {
            let count = pickups::count_unseen_for_driver(driver_id, &self.client).await?;
            Ok(count.max(0) as u64)
        }
        .boxed()
    }
}
