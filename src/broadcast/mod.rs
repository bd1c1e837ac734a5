//! Topic based publish/subscribe between connections.

pub mod events;
pub mod hub;
pub mod topic;

pub use events::{InboundEvent, OutboundEvent, TrackingStatus};
pub use hub::{BroadcastHub, ConnectionHandle, ConnectionId, EventReceiver};
