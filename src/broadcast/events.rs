use crate::error::{TrackerError, TrackerResult};
use crate::queries::_structs::{BusId, PickupId, SeatId, UserId};
use serde::{Deserialize, Serialize};

/// Sequence number carried by replayed positions.
pub const HISTORICAL_SEQUENCE: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingStatus {
    Waiting,
    Connected,
    Disconnected,
}

impl TrackingStatus {
    pub fn default_message(self) -> &'static str {
        match self {
            TrackingStatus::Waiting => "Waiting for driver to start tracking...",
            TrackingStatus::Connected => "Driver started tracking",
            TrackingStatus::Disconnected => "Driver stopped tracking",
        }
    }
}

/// Everything the fabric delivers to subscribers, serialized as
/// `{"type": "<snake_case variant>", ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEvent {
    LocationUpdate {
        lat: f64,
        lng: f64,
        is_historical: bool,
        sequence: i64,
    },
    TrackingStatus {
        status: TrackingStatus,
        message: String,
    },
    SeatUpdate {
        seat_id: SeatId,
        is_available: bool,
        seat_number: i32,
        bus_id: BusId,
    },
    ChatMessage {
        sender_id: UserId,
        sender_name: Option<String>,
        recipient_id: UserId,
        content: String,
        bus_id: Option<BusId>,
    },
    PickupNotification {
        pickup_id: PickupId,
        user_id: UserId,
        bus_id: BusId,
        stop: String,
        message: String,
    },
    PickupRequestCanceled {
        pickup_id: PickupId,
        user_id: UserId,
        message: String,
    },
}

impl OutboundEvent {
    pub fn live_location(lat: f64, lng: f64, sequence: i64) -> Self {
        OutboundEvent::LocationUpdate {
            lat,
            lng,
            is_historical: false,
            sequence,
        }
    }

    pub fn historical_location(lat: f64, lng: f64) -> Self {
        OutboundEvent::LocationUpdate {
            lat,
            lng,
            is_historical: true,
            sequence: HISTORICAL_SEQUENCE,
        }
    }

    pub fn status(status: TrackingStatus) -> Self {
        OutboundEvent::TrackingStatus {
            status,
            message: status.default_message().to_string(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            OutboundEvent::LocationUpdate { .. } => "location_update",
            OutboundEvent::TrackingStatus { .. } => "tracking_status",
            OutboundEvent::SeatUpdate { .. } => "seat_update",
            OutboundEvent::ChatMessage { .. } => "chat_message",
            OutboundEvent::PickupNotification { .. } => "pickup_notification",
            OutboundEvent::PickupRequestCanceled { .. } => "pickup_request_canceled",
        }
    }

    pub fn to_json(&self) -> TrackerResult<String> {
        serde_json::to_string(self).map_err(|e| TrackerError::invalid(e.to_string()))
    }
}

/// Client to server frames.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    Location {
        lat: f64,
        lng: f64,
    },
    ChatMessage {
        #[serde(default)]
        recipient_id: Option<UserId>,
        #[serde(default)]
        bus_id: Option<BusId>,
        #[serde(default)]
        content: String,
    },
}

impl InboundEvent {
    pub fn parse(text: &str) -> TrackerResult<Self> {
        serde_json::from_str(text).map_err(|e| TrackerError::invalid(format!("event payload: {}", e)))
    }
}
