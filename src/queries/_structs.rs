use chrono::{DateTime, Utc};
use geo_types::Point;
use postgres_types::{FromSql, ToSql};
use serde::{Deserialize, Serialize};

pub type UserId = i32;
pub type StopId = i32;
pub type RouteId = i32;
pub type BusId = i32;
pub type DriverId = i32;
pub type PickupId = i32;
pub type MessageId = i32;
pub type SeatId = i32;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    pub id: StopId,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl Stop {
    /// x = longitude, y = latitude.
    pub fn point(&self) -> Point<f64> {
        Point::new(self.longitude, self.latitude)
    }
}

/// One stop of a route, already resolved and in route order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteStop {
    pub route_id: RouteId,
    pub stop: Stop,
    pub order: i32,
    pub distance_to_next_m: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusRoute {
    pub id: RouteId,
    pub name: String,
    pub is_active: bool,
    pub reverse_route: Option<RouteId>,
}

/// Fields owned by the driver session streaming positions for a bus.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiveFields {
    pub current_lat: Option<f64>,
    pub current_lng: Option<f64>,
    pub nearest_stop_index: Option<i32>,
    pub eta_seconds: Option<i32>,
    pub eta_smoothed_seconds: Option<f64>,
    pub eta_passed_counter: i32,
    pub updated_at: Option<DateTime<Utc>>,
}

impl LiveFields {
    pub fn position(&self) -> Option<(f64, f64)> {
        match (self.current_lat, self.current_lng) {
            (Some(lat), Some(lng)) => Some((lat, lng)),
            _ => None,
        }
    }

    /// Drops the position and everything derived from it. The passed-stop
    /// counter and the update time are kept.
    pub fn clear_position(&mut self) {
        self.current_lat = None;
        self.current_lng = None;
        self.nearest_stop_index = None;
        self.eta_seconds = None;
        self.eta_smoothed_seconds = None;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bus {
    pub id: BusId,
    pub number_plate: String,
    pub total_seats: i32,
    pub driver_id: DriverId,
    pub route_id: RouteId,
    #[serde(flatten)]
    pub live: LiveFields,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Driver {
    pub id: DriverId,
    pub user_id: UserId,
    pub phone: String,
    pub vehicle_number: String,
    pub verified: bool,
    pub current_lat: Option<f64>,
    pub current_lng: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Seat {
    pub id: SeatId,
    pub bus_id: BusId,
    pub seat_number: i32,
    pub is_available: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSql, FromSql)]
#[serde(rename_all = "snake_case")]
#[postgres(name = "pickup_status")]
pub enum PickupStatus {
    #[postgres(name = "pending")]
    Pending,
    #[postgres(name = "acknowledged")]
    Acknowledged,
    #[postgres(name = "rejected")]
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PickupRequest {
    pub id: PickupId,
    pub user_id: UserId,
    pub bus_id: BusId,
    pub stop: String,
    pub stop_id: Option<StopId>,
    pub message: String,
    pub status: PickupStatus,
    pub seen_by_driver: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPickup {
    pub user_id: UserId,
    pub bus_id: BusId,
    pub stop: String,
    pub stop_id: Option<StopId>,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub sender_id: UserId,
    pub recipient_id: UserId,
    pub bus_id: Option<BusId>,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub read: bool,
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub sender_id: UserId,
    pub recipient_id: UserId,
    pub bus_id: Option<BusId>,
    pub content: String,
    pub created_at: DateTime<Utc>,
}
