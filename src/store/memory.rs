use super::{StoreFuture, TrackerStore};
use crate::error::{TrackerError, TrackerResult};
use crate::queries::_structs::*;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tokio::sync::RwLock;
use tracing::info;

/// Reference data a memory store starts from (TOML seed file or tests).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Seed {
    pub users: Vec<User>,
    pub stops: Vec<Stop>,
    pub routes: Vec<SeedRoute>,
    pub drivers: Vec<SeedDriver>,
    pub buses: Vec<SeedBus>,
    pub seats: Vec<Seat>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedRoute {
    pub id: RouteId,
    pub name: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub reverse_route: Option<RouteId>,
    #[serde(default)]
    pub stops: Vec<SeedRouteStop>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedRouteStop {
    pub stop_id: StopId,
    pub order: i32,
    #[serde(default)]
    pub distance_to_next_m: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedDriver {
    pub id: DriverId,
    pub user_id: UserId,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub vehicle_number: String,
    #[serde(default)]
    pub verified: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedBus {
    pub id: BusId,
    pub number_plate: String,
    #[serde(default = "default_seats")]
    pub total_seats: i32,
    pub driver_id: DriverId,
    pub route_id: RouteId,
}

fn default_true() -> bool {
    true
}

fn default_seats() -> i32 {
    25
}

impl Seed {
    pub fn from_file(path: &Path) -> TrackerResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| TrackerError::Config(format!("seed {}: {}", path.display(), e)))
    }
}

#[derive(Debug, Default)]
struct Tables {
    users: BTreeMap<UserId, User>,
    stops: BTreeMap<StopId, Stop>,
    routes: BTreeMap<RouteId, BusRoute>,
    route_stops: BTreeMap<RouteId, Vec<(StopId, i32, Option<f64>)>>,
    drivers: BTreeMap<DriverId, Driver>,
    buses: BTreeMap<BusId, Bus>,
    seats: BTreeMap<SeatId, Seat>,
    messages: Vec<Message>,
    pickups: BTreeMap<PickupId, PickupRequest>,
    next_message_id: MessageId,
    next_pickup_id: PickupId,
}

/// In-process store: the whole data set behind one async lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: Seed) -> Self {
        let mut t = Tables {
            next_message_id: 1,
            next_pickup_id: 1,
            ..Tables::default()
        };

        t.users = seed.users.into_iter().map(|u| (u.id, u)).collect();
        t.stops = seed.stops.into_iter().map(|s| (s.id, s)).collect();
        for route in seed.routes {
            let mut members: Vec<_> = route
                .stops
                .iter()
                .map(|rs| (rs.stop_id, rs.order, rs.distance_to_next_m))
                .collect();
            members.sort_by_key(|(_, order, _)| *order);
            t.route_stops.insert(route.id, members);
            t.routes.insert(
                route.id,
                BusRoute {
                    id: route.id,
                    name: route.name,
                    is_active: route.is_active,
                    reverse_route: route.reverse_route,
                },
            );
        }
        t.drivers = seed
            .drivers
            .into_iter()
            .map(|d| {
                (
                    d.id,
                    Driver {
                        id: d.id,
                        user_id: d.user_id,
                        phone: d.phone,
                        vehicle_number: d.vehicle_number,
                        verified: d.verified,
                        current_lat: None,
                        current_lng: None,
                    },
                )
            })
            .collect();
        for bus in seed.buses {
            t.buses.insert(
                bus.id,
                Bus {
                    id: bus.id,
                    number_plate: bus.number_plate,
                    total_seats: bus.total_seats,
                    driver_id: bus.driver_id,
                    route_id: bus.route_id,
                    live: LiveFields::default(),
                },
            );
        }

        t.seats = seed.seats.into_iter().map(|s| (s.id, s)).collect();
        // Buses without explicit seats get 1..=total_seats, all available.
        let mut next_seat = t.seats.keys().max().copied().unwrap_or(0) + 1;
        let seatless: Vec<(BusId, i32)> = t
            .buses
            .values()
            .filter(|b| !t.seats.values().any(|s| s.bus_id == b.id))
            .map(|b| (b.id, b.total_seats))
            .collect();
        for (bus_id, total) in seatless {
            for seat_number in 1..=total {
                t.seats.insert(
                    next_seat,
                    Seat {
                        id: next_seat,
                        bus_id,
                        seat_number,
                        is_available: true,
                    },
                );
                next_seat += 1;
            }
        }

        info!(
            "Memory store seeded: {} stops, {} routes, {} buses",
            t.stops.len(),
            t.routes.len(),
            t.buses.len()
        );
        Self {
            tables: RwLock::new(t),
        }
    }
}

fn conversation_between(m: &Message, a: UserId, b: UserId) -> bool {
    (m.sender_id == a && m.recipient_id == b) || (m.sender_id == b && m.recipient_id == a)
}

impl TrackerStore for MemoryStore {
    fn user(&self, id: UserId) -> StoreFuture<'_, Option<User>> {
        async move { Ok(self.tables.read().await.users.get(&id).cloned()) }.boxed()
    }

    fn stop(&self, id: StopId) -> StoreFuture<'_, Option<Stop>> {
        async move { Ok(self.tables.read().await.stops.get(&id).cloned()) }.boxed()
    }

    fn stop_by_name<'a>(&'a self, name: &'a str) -> StoreFuture<'a, Option<Stop>> {
        async move {
            let t = self.tables.read().await;
            Ok(t.stops.values().find(|s| s.name.eq_ignore_ascii_case(name)).cloned())
        }
        .boxed()
    }

    fn route(&self, id: RouteId) -> StoreFuture<'_, Option<BusRoute>> {
        async move { Ok(self.tables.read().await.routes.get(&id).cloned()) }.boxed()
    }

    fn active_routes(&self) -> StoreFuture<'_, Vec<BusRoute>> {
        async move {
            let t = self.tables.read().await;
            Ok(t.routes.values().filter(|r| r.is_active).cloned().collect())
        }
        .boxed()
    }

    fn route_stops(&self, route_id: RouteId) -> StoreFuture<'_, Vec<RouteStop>> {
        async move {
            let t = self.tables.read().await;
            let Some(members) = t.route_stops.get(&route_id) else {
                return Ok(Vec::new());
            };
            Ok(members
                .iter()
                .filter_map(|(stop_id, order, distance)| {
                    t.stops.get(stop_id).map(|stop| RouteStop {
                        route_id,
                        stop: stop.clone(),
                        order: *order,
                        distance_to_next_m: *distance,
                    })
                })
                .collect())
        }
        .boxed()
    }

    fn bus(&self, id: BusId) -> StoreFuture<'_, Option<Bus>> {
        async move { Ok(self.tables.read().await.buses.get(&id).cloned()) }.boxed()
    }

    fn buses_on_route(&self, route_id: RouteId) -> StoreFuture<'_, Vec<Bus>> {
        async move {
            let t = self.tables.read().await;
            Ok(t.buses.values().filter(|b| b.route_id == route_id).cloned().collect())
        }
        .boxed()
    }

    fn buses_for_driver(&self, driver_id: DriverId) -> StoreFuture<'_, Vec<Bus>> {
        async move {
            let t = self.tables.read().await;
            Ok(t.buses.values().filter(|b| b.driver_id == driver_id).cloned().collect())
        }
        .boxed()
    }

    fn driver(&self, id: DriverId) -> StoreFuture<'_, Option<Driver>> {
        async move { Ok(self.tables.read().await.drivers.get(&id).cloned()) }.boxed()
    }

    fn driver_by_user(&self, user_id: UserId) -> StoreFuture<'_, Option<Driver>> {
        async move {
            let t = self.tables.read().await;
            Ok(t.drivers.values().find(|d| d.user_id == user_id).cloned())
        }
        .boxed()
    }

    fn save_live(&self, bus_id: BusId, live: LiveFields) -> StoreFuture<'_, ()> {
        async move {
            let mut t = self.tables.write().await;
            let bus = t
                .buses
                .get_mut(&bus_id)
                .ok_or_else(|| TrackerError::not_found(format!("Bus {}", bus_id)))?;
            let driver_id = bus.driver_id;
            let (lat, lng) = (live.current_lat, live.current_lng);
            bus.live = live;
            if let Some(driver) = t.drivers.get_mut(&driver_id) {
                driver.current_lat = lat;
                driver.current_lng = lng;
            }
            Ok(())
        }
        .boxed()
    }

    fn assign_route(&self, bus_id: BusId, route_id: RouteId, live: LiveFields) -> StoreFuture<'_, ()> {
        async move {
            let mut t = self.tables.write().await;
            let bus = t
                .buses
                .get_mut(&bus_id)
                .ok_or_else(|| TrackerError::not_found(format!("Bus {}", bus_id)))?;
            bus.route_id = route_id;
            let driver_id = bus.driver_id;
            let (lat, lng) = (live.current_lat, live.current_lng);
            bus.live = live;
            if let Some(driver) = t.drivers.get_mut(&driver_id) {
                driver.current_lat = lat;
                driver.current_lng = lng;
            }
            Ok(())
        }
        .boxed()
    }

    fn seat(&self, id: SeatId) -> StoreFuture<'_, Option<Seat>> {
        async move { Ok(self.tables.read().await.seats.get(&id).cloned()) }.boxed()
    }

    fn set_seat_available(&self, id: SeatId, available: bool) -> StoreFuture<'_, Seat> {
        async move {
            let mut t = self.tables.write().await;
            let seat = t
                .seats
                .get_mut(&id)
                .ok_or_else(|| TrackerError::not_found(format!("Seat {}", id)))?;
            seat.is_available = available;
            Ok(seat.clone())
        }
        .boxed()
    }

    fn available_seats(&self, bus_id: BusId) -> StoreFuture<'_, i64> {
        async move {
            let t = self.tables.read().await;
            Ok(t.seats
                .values()
                .filter(|s| s.bus_id == bus_id && s.is_available)
                .count() as i64)
        }
        .boxed()
    }

    fn insert_message(&self, message: NewMessage) -> StoreFuture<'_, Message> {
        async move {
            let mut t = self.tables.write().await;
            if !t.users.contains_key(&message.sender_id) {
                return Err(TrackerError::not_found(format!("User {}", message.sender_id)));
            }
            if !t.users.contains_key(&message.recipient_id) {
                return Err(TrackerError::not_found(format!("User {}", message.recipient_id)));
            }
            let id = t.next_message_id.max(1);
            t.next_message_id = id + 1;
            let stored = Message {
                id,
                sender_id: message.sender_id,
                recipient_id: message.recipient_id,
                bus_id: message.bus_id.filter(|b| t.buses.contains_key(b)),
                content: message.content,
                created_at: message.created_at,
                read: false,
            };
            t.messages.push(stored.clone());
            Ok(stored)
        }
        .boxed()
    }

    fn last_sender_to(&self, user_id: UserId) -> StoreFuture<'_, Option<UserId>> {
        async move {
            let t = self.tables.read().await;
            Ok(t.messages
                .iter()
                .filter(|m| m.recipient_id == user_id && m.sender_id != user_id)
                .max_by_key(|m| (m.created_at, m.id))
                .map(|m| m.sender_id))
        }
        .boxed()
    }

    fn conversation(&self, a: UserId, b: UserId, limit: usize) -> StoreFuture<'_, Vec<Message>> {
        async move {
            let t = self.tables.read().await;
            let mut messages: Vec<Message> = t
                .messages
                .iter()
                .filter(|m| conversation_between(m, a, b))
                .cloned()
                .collect();
            messages.sort_by_key(|m| (m.created_at, m.id));
            let skip = messages.len().saturating_sub(limit);
            Ok(messages.split_off(skip))
        }
        .boxed()
    }

    fn delete_conversation(&self, a: UserId, b: UserId) -> StoreFuture<'_, u64> {
        async move {
            let mut t = self.tables.write().await;
            let before = t.messages.len();
            t.messages.retain(|m| !conversation_between(m, a, b));
            Ok((before - t.messages.len()) as u64)
        }
        .boxed()
    }

    fn insert_pickup(&self, pickup: NewPickup) -> StoreFuture<'_, PickupRequest> {
        async move {
            let mut t = self.tables.write().await;
            let id = t.next_pickup_id.max(1);
            t.next_pickup_id = id + 1;
            let stored = PickupRequest {
                id,
                user_id: pickup.user_id,
                bus_id: pickup.bus_id,
                stop: pickup.stop,
                stop_id: pickup.stop_id,
                message: pickup.message,
                status: PickupStatus::Pending,
                seen_by_driver: false,
                created_at: pickup.created_at,
            };
            t.pickups.insert(id, stored.clone());
            Ok(stored)
        }
        .boxed()
    }

    fn pending_pickup_since(
        &self,
        user_id: UserId,
        bus_id: BusId,
        since: DateTime<Utc>,
    ) -> StoreFuture<'_, Option<PickupRequest>> {
        async move {
            let t = self.tables.read().await;
            Ok(t.pickups
                .values()
                .find(|p| {
                    p.user_id == user_id
                        && p.bus_id == bus_id
                        && p.status == PickupStatus::Pending
                        && p.created_at >= since
                })
                .cloned())
        }
        .boxed()
    }

    fn pickup(&self, id: PickupId) -> StoreFuture<'_, Option<PickupRequest>> {
        async move { Ok(self.tables.read().await.pickups.get(&id).cloned()) }.boxed()
    }

    fn set_pickup_status(&self, id: PickupId, status: PickupStatus) -> StoreFuture<'_, ()> {
        async move {
            let mut t = self.tables.write().await;
            let pickup = t
                .pickups
                .get_mut(&id)
                .ok_or_else(|| TrackerError::not_found(format!("Pickup request {}", id)))?;
            pickup.status = status;
            Ok(())
        }
        .boxed()
    }

    fn mark_pickup_seen(&self, id: PickupId) -> StoreFuture<'_, bool> {
        async move {
            let mut t = self.tables.write().await;
            Ok(match t.pickups.get_mut(&id) {
                Some(p) => {
                    p.seen_by_driver = true;
                    true
                }
                None => false,
            })
        }
        .boxed()
    }

    fn mark_driver_pickups_seen(&self, driver_id: DriverId) -> StoreFuture<'_, u64> {
        async move {
            let mut guard = self.tables.write().await;
            let t = &mut *guard;
            let mut count = 0;
            for pickup in t.pickups.values_mut() {
                let owned = t
                    .buses
                    .get(&pickup.bus_id)
                    .is_some_and(|b| b.driver_id == driver_id);
                if owned && !pickup.seen_by_driver {
                    pickup.seen_by_driver = true;
                    count += 1;
                }
            }
            Ok(count)
        }
        .boxed()
    }

    fn driver_pickups(&self, driver_id: DriverId, limit: usize) -> StoreFuture<'_, Vec<PickupRequest>> {
        async move {
            let t = self.tables.read().await;
            let mut pickups: Vec<PickupRequest> = t
                .pickups
                .values()
                .filter(|p| t.buses.get(&p.bus_id).is_some_and(|b| b.driver_id == driver_id))
                .cloned()
                .collect();
            pickups.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
            pickups.truncate(limit);
            Ok(pickups)
        }
        .boxed()
    }

    fn unseen_pickup_count(&self, driver_id: DriverId) -> StoreFuture<'_, u64> {
        async move {
            let t = self.tables.read().await;
            let count = t
                .pickups
                .values()
                .filter(|p| !p.seen_by_driver)
                .filter(|p| t.buses.get(&p.bus_id).is_some_and(|b| b.driver_id == driver_id))
                .count();
            Ok(count as u64)
        }
        .boxed()
    }
}
