use super::Role;
use crate::broadcast::{topic, ConnectionHandle, EventReceiver, InboundEvent, OutboundEvent, TrackingStatus};
use crate::error::TrackerResult;
use crate::functions::live_state::FixOutcome;
use crate::queries::_structs::{BusId, UserId};
use crate::tracker::Tracker;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One socket watching (passenger) or feeding (driver) a bus.
pub struct LocationSession {
    tracker: Arc<Tracker>,
    bus_id: BusId,
    user_id: Option<UserId>,
    role: Role,
    topic: String,
    connection: ConnectionHandle,
    sequence: i64,
    closed: bool,
}

impl LocationSession {
    /// Joins the bus topic. Only the bus's own driver gets the driver role;
    /// everyone else, anonymous included, is a passenger and receives the
    /// last known position straight away.
    pub async fn connect(
        tracker: Arc<Tracker>,
        bus_id: BusId,
        user_id: Option<UserId>,
    ) -> TrackerResult<(Self, EventReceiver)> {
        let bus = tracker.bus(bus_id).await?;
        let role = match user_id {
            Some(uid) if tracker.bus_driver_user(&bus).await? == uid => Role::Driver,
            _ => Role::Passenger,
        };

        let (connection, receiver) = tracker.hub().open_connection();
        let topic = topic::bus(bus_id);
        tracker.join(&topic, &connection).await;
        info!(
            "Location session {} opened: bus={} user={:?} role={:?}",
            connection.id, bus_id, user_id, role
        );

        if role == Role::Passenger {
            if let Some((lat, lng)) = bus.live.position() {
                connection.send(OutboundEvent::historical_location(lat, lng));
            }
            if tracker.estimator().usable_position(&bus.live, Utc::now()).is_none() {
                connection.send(OutboundEvent::status(TrackingStatus::Waiting));
            }
        }

        let session = Self {
            tracker,
            bus_id,
            user_id,
            role,
            topic,
            connection,
            sequence: 0,
            closed: false,
        };
        Ok((session, receiver))
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn bus_id(&self) -> BusId {
        self.bus_id
    }

    /// Handles one text frame. Returns whether a location update went out.
    pub async fn on_text(&mut self, text: &str) -> TrackerResult<bool> {
        match InboundEvent::parse(text)? {
            InboundEvent::Location { lat, lng } => self.on_location(lat, lng).await,
            InboundEvent::ChatMessage { .. } => {
                debug!("Location session {}: ignoring chat frame", self.connection.id);
                Ok(false)
            }
        }
    }

    async fn on_location(&mut self, lat: f64, lng: f64) -> TrackerResult<bool> {
        if !self.role.is_driver() {
            warn!(
                "Location session {}: dropping location from non-driver {:?}",
                self.connection.id, self.user_id
            );
            return Ok(false);
        }
        let FixOutcome::Accepted { first_fix } = self.tracker.record_location(self.bus_id, lat, lng).await? else {
            return Ok(false);
        };

        // A bus cleared under a live session announces itself again.
        self.sequence += 1;
        if self.sequence == 1 || first_fix {
            self.tracker
                .publish(&self.topic, &OutboundEvent::status(TrackingStatus::Connected))
                .await;
        }
        self.tracker
            .publish(&self.topic, &OutboundEvent::live_location(lat, lng, self.sequence))
            .await;
        debug!("Bus {}: location #{} published", self.bus_id, self.sequence);
        Ok(true)
    }

    /// Leaves the bus topic. When the bus's driver goes away the live
    /// position is cleared and watchers are told tracking stopped.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.tracker.hub().leave_all(self.connection.id).await;

        if self.role.is_driver() {
            if let Err(e) = self.tracker.clear_location(self.bus_id).await {
                warn!("Bus {}: failed to clear location: {}", self.bus_id, e);
            }
        }
        info!(
            "Location session {} closed: bus={} role={:?}",
            self.connection.id, self.bus_id, self.role
        );
    }
}
