use super::Role;
use crate::broadcast::topic::{self, ChatParty};
use crate::broadcast::{ConnectionHandle, EventReceiver, InboundEvent, OutboundEvent};
use crate::error::TrackerResult;
use crate::queries::_structs::{BusId, Message, NewMessage, User, UserId};
use crate::tracker::Tracker;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One chat socket: receives on its identity topic (and an optional legacy
/// room) and sends messages through the fan-out plan.
pub struct ChatSession {
    tracker: Arc<Tracker>,
    user: Option<User>,
    role: Role,
    room: Option<String>,
    connection: ConnectionHandle,
    closed: bool,
}

impl ChatSession {
    pub async fn connect(
        tracker: Arc<Tracker>,
        user_id: Option<UserId>,
        room: Option<String>,
    ) -> TrackerResult<(Self, EventReceiver)> {
        let user = match user_id {
            Some(id) => {
                let user = tracker.store().user(id).await?;
                if user.is_none() {
                    warn!("Chat connect with unknown user {}, treating as anonymous", id);
                }
                user
            }
            None => None,
        };
        let role = match &user {
            Some(u) => Role::of_user(tracker.store(), u.id).await?,
            None => Role::Passenger,
        };

        let (connection, receiver) = tracker.hub().open_connection();
        if let Some(room) = &room {
            tracker.join(&topic::room(room), &connection).await;
        }
        if let Some(user) = &user {
            let via_legacy_user_room = room.as_deref().is_some_and(|r| r.starts_with("user_"));
            if role == Role::Driver || !via_legacy_user_room {
                tracker.join(&topic::identity(role, user.id), &connection).await;
            } else {
                debug!("User {} connected via legacy room {:?}", user.id, room);
            }
        }
        info!(
            "Chat session {} opened: user={:?} role={:?} room={:?}",
            connection.id,
            user.as_ref().map(|u| u.id),
            role,
            room
        );

        let session = Self {
            tracker,
            user,
            role,
            room,
            connection,
            closed: false,
        };
        Ok((session, receiver))
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn room(&self) -> Option<&str> {
        self.room.as_deref()
    }

    /// Handles one text frame. Returns the stored message when one was sent.
    pub async fn on_text(&mut self, text: &str) -> TrackerResult<Option<Message>> {
        match InboundEvent::parse(text)? {
            InboundEvent::ChatMessage {
                recipient_id,
                bus_id,
                content,
            } => self.send_message(recipient_id, bus_id, content).await,
            InboundEvent::Location { .. } => {
                debug!("Chat session {}: ignoring location frame", self.connection.id);
                Ok(None)
            }
        }
    }

    async fn send_message(
        &self,
        recipient_id: Option<UserId>,
        bus_id: Option<BusId>,
        content: String,
    ) -> TrackerResult<Option<Message>> {
        let Some(sender) = &self.user else {
            debug!("Chat session {}: anonymous message dropped", self.connection.id);
            return Ok(None);
        };
        if content.trim().is_empty() {
            return Ok(None);
        }
        let Some(recipient_id) = self.resolve_recipient(sender.id, recipient_id, bus_id).await? else {
            debug!("Chat session {}: no recipient for message from {}", self.connection.id, sender.id);
            return Ok(None);
        };

        let message = self
            .tracker
            .store()
            .insert_message(NewMessage {
                sender_id: sender.id,
                recipient_id,
                bus_id,
                content: content.clone(),
                created_at: Utc::now(),
            })
            .await?;

        let recipient_role = Role::of_user(self.tracker.store(), recipient_id).await?;
        let event = OutboundEvent::ChatMessage {
            sender_id: sender.id,
            sender_name: Some(sender.username.clone()),
            recipient_id,
            content,
            bus_id,
        };
        let targets = topic::chat_targets(
            &self.tracker.config().fanout,
            ChatParty {
                id: sender.id,
                role: self.role,
            },
            ChatParty {
                id: recipient_id,
                role: recipient_role,
            },
        );
        for target in &targets {
            self.tracker.publish(target, &event).await;
        }
        info!(
            "Chat message {} from {} to {} fanned out to {} topics",
            message.id,
            sender.id,
            recipient_id,
            targets.len()
        );
        Ok(Some(message))
    }

    /// Explicit recipient, else the driver of the given bus (passengers
    /// only), else for drivers the last user who wrote to them.
    async fn resolve_recipient(
        &self,
        sender_id: UserId,
        explicit: Option<UserId>,
        bus_id: Option<BusId>,
    ) -> TrackerResult<Option<UserId>> {
        if explicit.is_some() {
            return Ok(explicit);
        }
        let store = self.tracker.store();
        if let (Some(bus_id), Role::Passenger) = (bus_id, self.role) {
            if let Some(bus) = store.bus(bus_id).await? {
                if let Some(driver) = store.driver(bus.driver_id).await? {
                    return Ok(Some(driver.user_id));
                }
            }
        }
        if self.role.is_driver() {
            return store.last_sender_to(sender_id).await;
        }
        Ok(None)
    }

    /// Called after an event was written to the socket. A pickup
    /// notification that reached a driver counts as seen.
    pub async fn on_delivered(&self, event: &OutboundEvent) -> TrackerResult<()> {
        if let (Role::Driver, OutboundEvent::PickupNotification { pickup_id, .. }) = (self.role, event) {
            self.tracker.store().mark_pickup_seen(*pickup_id).await?;
        }
        Ok(())
    }

    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.tracker.hub().leave_all(self.connection.id).await;
        info!(
            "Chat session {} closed: user={:?}",
            self.connection.id,
            self.user.as_ref().map(|u| u.id)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::tests::tracker;

    fn drain(rx: &mut EventReceiver) -> Vec<OutboundEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_bus_only_message_reaches_driver() {
        let tracker = tracker();
        let (driver, mut driver_rx) = ChatSession::connect(tracker.clone(), Some(2), None).await.unwrap();
        assert_eq!(driver.role(), Role::Driver);
        let (mut passenger, mut passenger_rx) = ChatSession::connect(tracker.clone(), Some(1), None).await.unwrap();
        let (_legacy, mut legacy_rx) =
            ChatSession::connect(tracker.clone(), None, Some("user_2_driver_1".into())).await.unwrap();

        let sent = passenger
            .on_text(r#"{"type":"chat_message","bus_id":7,"content":"Are you near Jamal?"}"#)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sent.recipient_id, 2);

        let expected = OutboundEvent::ChatMessage {
            sender_id: 1,
            sender_name: Some("asha".into()),
            recipient_id: 2,
            content: "Are you near Jamal?".into(),
            bus_id: Some(7),
        };
        assert_eq!(drain(&mut driver_rx), vec![expected.clone()]);
        assert_eq!(drain(&mut passenger_rx), vec![expected.clone()]);
        assert_eq!(drain(&mut legacy_rx), vec![expected]);

        let history = tracker.fetch_messages(1, 2).await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn test_driver_reply_goes_to_last_sender() {
        let tracker = tracker();
        let (mut driver, mut driver_rx) = ChatSession::connect(tracker.clone(), Some(2), None).await.unwrap();
        let (mut asha, mut asha_rx) = ChatSession::connect(tracker.clone(), Some(1), None).await.unwrap();
        let (mut chandra, mut chandra_rx) = ChatSession::connect(tracker.clone(), Some(3), None).await.unwrap();

        asha.on_text(r#"{"type":"chat_message","recipient_id":2,"content":"hi"}"#).await.unwrap();
        chandra.on_text(r#"{"type":"chat_message","bus_id":7,"content":"wait for me"}"#).await.unwrap();
        drain(&mut asha_rx);
        drain(&mut chandra_rx);
        drain(&mut driver_rx);

        let reply = driver
            .on_text(r#"{"type":"chat_message","content":"ok"}"#)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply.recipient_id, 3);
        assert_eq!(drain(&mut chandra_rx).len(), 1);
        assert!(drain(&mut asha_rx).is_empty());
        // Echo on the driver's own topic.
        assert_eq!(drain(&mut driver_rx).len(), 1);
    }

    #[tokio::test]
    async fn test_driver_does_not_resolve_through_bus() {
        let tracker = tracker();
        let (mut driver, _rx) = ChatSession::connect(tracker.clone(), Some(2), None).await.unwrap();
        // No one wrote to the driver yet, and a bus id alone does not name a
        // recipient for a driver.
        assert!(driver
            .on_text(r#"{"type":"chat_message","bus_id":7,"content":"hello?"}"#)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_dropped_messages() {
        let tracker = tracker();
        let (mut passenger, mut rx) = ChatSession::connect(tracker.clone(), Some(1), None).await.unwrap();
        assert!(passenger
            .on_text(r#"{"type":"chat_message","recipient_id":2,"content":"   "}"#)
            .await
            .unwrap()
            .is_none());
        assert!(passenger
            .on_text(r#"{"type":"chat_message","content":"to nobody"}"#)
            .await
            .unwrap()
            .is_none());

        let (mut anonymous, _anon_rx) =
            ChatSession::connect(tracker.clone(), None, Some("user_1_driver_2".into())).await.unwrap();
        assert!(anonymous
            .on_text(r#"{"type":"chat_message","recipient_id":2,"content":"hi"}"#)
            .await
            .unwrap()
            .is_none());

        assert!(drain(&mut rx).is_empty());
        assert!(tracker.fetch_messages(1, 2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_legacy_user_room_replaces_identity_topic() {
        let tracker = tracker();
        let (session, _rx) =
            ChatSession::connect(tracker.clone(), Some(1), Some("user_1_driver_2".into())).await.unwrap();
        assert_eq!(session.room(), Some("user_1_driver_2"));
        assert_eq!(tracker.hub().member_count("user:1").await, 0);
        assert_eq!(tracker.hub().member_count("chat:user_1_driver_2").await, 1);

        let (_other, _rx2) = ChatSession::connect(tracker.clone(), Some(3), Some("lobby".into())).await.unwrap();
        assert_eq!(tracker.hub().member_count("user:3").await, 1);
    }

    #[tokio::test]
    async fn test_pickup_delivery_marks_seen() {
        let tracker = tracker();
        let (driver, mut driver_rx) = ChatSession::connect(tracker.clone(), Some(2), None).await.unwrap();
        let pickup = tracker.create_pickup(1, 7, "Jamal", "").await.unwrap();

        let event = driver_rx.try_recv().unwrap();
        assert!(matches!(event, OutboundEvent::PickupNotification { .. }));
        driver.on_delivered(&event).await.unwrap();
        assert!(tracker.store().pickup(pickup.id).await.unwrap().unwrap().seen_by_driver);
    }

    #[tokio::test]
    async fn test_close_leaves_all_topics() {
        let tracker = tracker();
        let (mut session, _rx) = ChatSession::connect(tracker.clone(), Some(1), Some("lobby".into())).await.unwrap();
        assert_eq!(tracker.hub().topic_count().await, 2);
        session.close().await;
        assert_eq!(tracker.hub().topic_count().await, 0);
    }
}
