//! Persistence seam of the tracker.
//!
//! Everything the core reads or writes goes through [`TrackerStore`]. The
//! service picks [`PgStore`] when a database URL is configured and
//! [`MemoryStore`] otherwise; tests always use the memory store.

pub mod memory;
pub mod postgres;

pub use memory::{MemoryStore, Seed};
pub use postgres::PgStore;

use crate::error::TrackerResult;
use crate::queries::_structs::*;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;

pub type StoreFuture<'a, T> = BoxFuture<'a, TrackerResult<T>>;

pub trait TrackerStore: Send + Sync {
    fn user(&self, id: UserId) -> StoreFuture<'_, Option<User>>;

    fn stop(&self, id: StopId) -> StoreFuture<'_, Option<Stop>>;
    /// Case-insensitive exact match on the stop name.
    fn stop_by_name<'a>(&'a self, name: &'a str) -> StoreFuture<'a, Option<Stop>>;

    fn route(&self, id: RouteId) -> StoreFuture<'_, Option<BusRoute>>;
    fn active_routes(&self) -> StoreFuture<'_, Vec<BusRoute>>;
    /// Stops of a route sorted by `order`.
    fn route_stops(&self, route_id: RouteId) -> StoreFuture<'_, Vec<RouteStop>>;

    fn bus(&self, id: BusId) -> StoreFuture<'_, Option<Bus>>;
    fn buses_on_route(&self, route_id: RouteId) -> StoreFuture<'_, Vec<Bus>>;
    fn buses_for_driver(&self, driver_id: DriverId) -> StoreFuture<'_, Vec<Bus>>;

    fn driver(&self, id: DriverId) -> StoreFuture<'_, Option<Driver>>;
    fn driver_by_user(&self, user_id: UserId) -> StoreFuture<'_, Option<Driver>>;

    /// Writes the live fields of a bus and mirrors its position onto the
    /// owning driver.
    fn save_live(&self, bus_id: BusId, live: LiveFields) -> StoreFuture<'_, ()>;
    /// Moves a bus to another route, replacing its live fields in the same write.
    fn assign_route(&self, bus_id: BusId, route_id: RouteId, live: LiveFields) -> StoreFuture<'_, ()>;

    fn seat(&self, id: SeatId) -> StoreFuture<'_, Option<Seat>>;
    fn set_seat_available(&self, id: SeatId, available: bool) -> StoreFuture<'_, Seat>;
    fn available_seats(&self, bus_id: BusId) -> StoreFuture<'_, i64>;

    fn insert_message(&self, message: NewMessage) -> StoreFuture<'_, Message>;
    /// Most recent sender (other than `user_id`) of a message to `user_id`.
    fn last_sender_to(&self, user_id: UserId) -> StoreFuture<'_, Option<UserId>>;
    /// The newest `limit` messages between two users, returned oldest first.
    fn conversation(&self, a: UserId, b: UserId, limit: usize) -> StoreFuture<'_, Vec<Message>>;
    fn delete_conversation(&self, a: UserId, b: UserId) -> StoreFuture<'_, u64>;

    fn insert_pickup(&self, pickup: NewPickup) -> StoreFuture<'_, PickupRequest>;
    fn pending_pickup_since(
        &self,
        user_id: UserId,
        bus_id: BusId,
        since: DateTime<Utc>,
    ) -> StoreFuture<'_, Option<PickupRequest>>;
    fn pickup(&self, id: PickupId) -> StoreFuture<'_, Option<PickupRequest>>;
    fn set_pickup_status(&self, id: PickupId, status: PickupStatus) -> StoreFuture<'_, ()>;
    /// Returns whether the pickup existed.
    fn mark_pickup_seen(&self, id: PickupId) -> StoreFuture<'_, bool>;
    fn mark_driver_pickups_seen(&self, driver_id: DriverId) -> StoreFuture<'_, u64>;
    /// Newest first, across every bus the driver owns.
    fn driver_pickups(&self, driver_id: DriverId, limit: usize) -> StoreFuture<'_, Vec<PickupRequest>>;
    fn unseen_pickup_count(&self, driver_id: DriverId) -> StoreFuture<'_, u64>;
}
