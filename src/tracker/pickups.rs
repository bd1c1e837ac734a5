use super::{StopRef, Tracker};
use crate::broadcast::{topic, OutboundEvent};
use crate::error::{TrackerError, TrackerResult};
use crate::queries::_structs::{BusId, NewPickup, PickupId, PickupRequest, PickupStatus, UserId};
use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::info;

pub const DRIVER_INBOX_LIMIT: usize = 50;

/// A driver's recent pickup requests and how many are still unseen.
#[derive(Debug, Clone, Serialize)]
pub struct DriverInbox {
    pub pickups: Vec<PickupRequest>,
    pub unread_count: u64,
}

impl Tracker {
    /// Files a pickup request and notifies the bus's driver. A user may hold
    /// only one pending request per bus inside the dedup window.
    pub async fn create_pickup(
        &self,
        user_id: UserId,
        bus_id: BusId,
        stop: &str,
        message: &str,
    ) -> TrackerResult<PickupRequest> {
        let user = self.user(user_id).await?;
        let bus = self.bus(bus_id).await?;

        // Held until the insert so the dedup check and the write are atomic.
        let _guard = self.pickup_locks.lock((user_id, bus_id)).await;
        let now = Utc::now();
        let since = now - Duration::seconds(self.config.tracking.pickup_dedup_window_secs);

        if let Some(existing) = self.store.pending_pickup_since(user_id, bus_id, since).await? {
            let minutes = (now - existing.created_at).num_minutes();
            return Err(TrackerError::Conflict {
                message: format!(
                    "You already have an active pickup request for this bus from {} minutes ago. Please wait or cancel the previous request.",
                    minutes
                ),
                existing_id: Some(existing.id),
            });
        }

        // A stop that does not resolve is kept as free text.
        let stop_ref = StopRef::parse(stop)?;
        let (stop_name, stop_id) = match self.resolve_stop(&stop_ref).await {
            Ok(found) => (found.name, Some(found.id)),
            Err(TrackerError::NotFound(_)) => (stop.trim().to_string(), None),
            Err(e) => return Err(e),
        };

        let pickup = self
            .store
            .insert_pickup(NewPickup {
                user_id,
                bus_id,
                stop: stop_name,
                stop_id,
                message: message.to_string(),
                created_at: now,
            })
            .await?;
        info!(
            "Pickup request {} by {} for bus {} at {}",
            pickup.id, user.username, bus.id, pickup.stop
        );

        let driver_user = self.bus_driver_user(&bus).await?;
        self.publish(
            &topic::driver(driver_user),
            &OutboundEvent::PickupNotification {
                pickup_id: pickup.id,
                user_id,
                bus_id,
                stop: pickup.stop.clone(),
                message: pickup.message.clone(),
            },
        )
        .await;
        Ok(pickup)
    }

    /// Owner-only cancel. Anyone else sees `NotFound`.
    pub async fn cancel_pickup(&self, user_id: UserId, pickup_id: PickupId) -> TrackerResult<PickupRequest> {
        let mut pickup = self
            .store
            .pickup(pickup_id)
            .await?
            .filter(|p| p.user_id == user_id)
            .ok_or_else(|| TrackerError::not_found(format!("Pickup request {}", pickup_id)))?;

        self.store
            .set_pickup_status(pickup_id, PickupStatus::Rejected)
            .await?;
        pickup.status = PickupStatus::Rejected;
        info!("Pickup request {} cancelled by user {}", pickup_id, user_id);

        let bus = self.bus(pickup.bus_id).await?;
        let driver_user = self.bus_driver_user(&bus).await?;
        self.publish(
            &topic::driver(driver_user),
            &OutboundEvent::PickupRequestCanceled {
                pickup_id,
                user_id,
                message: "Pickup request canceled".to_string(),
            },
        )
        .await;
        Ok(pickup)
    }

    pub async fn mark_pickup_seen(&self, user_id: UserId, pickup_id: PickupId) -> TrackerResult<()> {
        let pickup = self
            .store
            .pickup(pickup_id)
            .await?
            .ok_or_else(|| TrackerError::not_found(format!("Pickup request {}", pickup_id)))?;
        let bus = self.bus(pickup.bus_id).await?;
        self.require_bus_driver(user_id, &bus).await?;
        self.store.mark_pickup_seen(pickup_id).await?;
        Ok(())
    }

    /// Newest pickups across the driver's buses, at most
    /// [`DRIVER_INBOX_LIMIT`]. The unread count covers every unseen request.
    pub async fn driver_pickups(&self, user_id: UserId, limit: usize) -> TrackerResult<DriverInbox> {
        let driver = self.driver_of_user(user_id).await?;
        let limit = limit.clamp(1, DRIVER_INBOX_LIMIT);
        let pickups = self.store.driver_pickups(driver.id, limit).await?;
        let unread_count = self.store.unseen_pickup_count(driver.id).await?;
        Ok(DriverInbox { pickups, unread_count })
    }

    /// Marks every unseen pickup on the driver's buses as seen.
    pub async fn clear_all_pickups(&self, user_id: UserId) -> TrackerResult<u64> {
        let driver = self.driver_of_user(user_id).await?;
        let cleared = self.store.mark_driver_pickups_seen(driver.id).await?;
        info!("Driver {} cleared {} pickup notifications", driver.id, cleared);
        Ok(cleared)
    }
}
