//! Per-connection state machines for the location and chat sockets.
//!
//! A session is transport agnostic: the socket layer feeds it text frames
//! and drains its event receiver. Both kinds of session follow
//! `connect` (Active) → `on_text`* → `close` (Closed), and `close` is safe to
//! call more than once.

pub mod chat;
pub mod location;

pub use chat::ChatSession;
pub use location::LocationSession;

use crate::error::TrackerResult;
use crate::queries::_structs::UserId;
use crate::store::TrackerStore;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Driver,
    Passenger,
}

impl Role {
    /// An account is a driver when it owns a driver profile.
    pub async fn of_user(store: &dyn TrackerStore, user_id: UserId) -> TrackerResult<Role> {
        Ok(match store.driver_by_user(user_id).await? {
            Some(_) => Role::Driver,
            None => Role::Passenger,
        })
    }

    pub fn is_driver(self) -> bool {
        self == Role::Driver
    }
}
