//! WebSocket endpoints. The socket is only a pipe: text frames go to the
//! session, fabric events go back out, and the session is always closed when
//! the loop ends, whichever side hung up.

use super::identity::Identity;
use crate::broadcast::{EventReceiver, OutboundEvent};
use crate::queries::_structs::BusId;
use crate::session::{ChatSession, LocationSession};
use crate::tracker::Tracker;
use actix_web::{web, HttpRequest, HttpResponse};
use actix_ws::Message;
use futures::StreamExt;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// Ping cadence and silence limit for one socket.
#[derive(Debug, Clone, Copy)]
struct Liveness {
    every: Duration,
    timeout: Duration,
}

impl Liveness {
    fn from_tracker(tracker: &Tracker) -> Self {
        let server = &tracker.config().server;
        Self {
            every: Duration::from_secs(server.heartbeat_secs),
            timeout: Duration::from_secs(server.client_timeout_secs),
        }
    }
}

/// Any frame from the client, pongs included, counts as a sign of life.
#[derive(Debug)]
struct Heartbeat {
    last_seen: Instant,
    timeout: Duration,
}

impl Heartbeat {
    fn new(now: Instant, timeout: Duration) -> Self {
        Self { last_seen: now, timeout }
    }

    fn beat(&mut self, now: Instant) {
        self.last_seen = now;
    }

    fn expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_seen) > self.timeout
    }
}

trait SocketSession {
    async fn handle_text(&mut self, text: &str);
    async fn delivered(&mut self, event: &OutboundEvent);
    async fn finish(&mut self);
}

impl SocketSession for LocationSession {
    async fn handle_text(&mut self, text: &str) {
        if let Err(e) = self.on_text(text).await {
            warn!("Bus {} socket: dropped frame: {}", self.bus_id(), e);
        }
    }

    async fn delivered(&mut self, _event: &OutboundEvent) {}

    async fn finish(&mut self) {
        self.close().await
    }
}

impl SocketSession for ChatSession {
    async fn handle_text(&mut self, text: &str) {
        if let Err(e) = self.on_text(text).await {
            warn!("Chat socket: dropped frame: {}", e);
        }
    }

    async fn delivered(&mut self, event: &OutboundEvent) {
        if let Err(e) = self.on_delivered(event).await {
            warn!("Chat socket: post-delivery update failed: {}", e);
        }
    }

    async fn finish(&mut self) {
        self.close().await
    }
}

async fn pump<S: SocketSession>(
    mut session: S,
    mut events: EventReceiver,
    mut socket: actix_ws::Session,
    mut frames: actix_ws::MessageStream,
    liveness: Liveness,
) {
    let mut heartbeat = Heartbeat::new(Instant::now(), liveness.timeout);
    let mut ticker = interval_at(Instant::now() + liveness.every, liveness.every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if heartbeat.expired(Instant::now()) {
                    warn!("Socket silent for more than {:?}, closing", liveness.timeout);
                    break;
                }
                if socket.ping(b"").await.is_err() {
                    break;
                }
            }
            frame = frames.next() => {
                if let Some(Ok(_)) = &frame {
                    heartbeat.beat(Instant::now());
                }
                match frame {
                    Some(Ok(Message::Text(text))) => session.handle_text(&text).await,
                    Some(Ok(Message::Ping(bytes))) => {
                        if socket.pong(&bytes).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(reason))) => {
                        debug!("Client closed socket: {:?}", reason);
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("Socket protocol error: {}", e);
                        break;
                    }
                    None => break,
                }
            }
            event = events.recv() => match event {
                Some(event) => {
                    let text = match event.to_json() {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("Could not encode {}: {}", event.kind(), e);
                            continue;
                        }
                    };
                    if socket.text(text).await.is_err() {
                        break;
                    }
                    session.delivered(&event).await;
                }
                None => break,
            },
        }
    }

    session.finish().await;
    let _ = socket.close(None).await;
}

pub async fn bus_socket(
    req: HttpRequest,
    body: web::Payload,
    tracker: web::Data<Tracker>,
    bus_id: web::Path<BusId>,
) -> Result<HttpResponse, actix_web::Error> {
    let identity = Identity::from_request_headers(&req);
    let liveness = Liveness::from_tracker(&tracker);
    let (mut session, events) = LocationSession::connect(tracker.into_inner(), bus_id.into_inner(), identity.0).await?;

    match actix_ws::handle(&req, body) {
        Ok((response, socket, frames)) => {
            actix_web::rt::spawn(pump(session, events, socket, frames, liveness));
            Ok(response)
        }
        Err(e) => {
            session.close().await;
            Err(e)
        }
    }
}

async fn open_chat(
    req: HttpRequest,
    body: web::Payload,
    tracker: web::Data<Tracker>,
    room: Option<String>,
) -> Result<HttpResponse, actix_web::Error> {
    let identity = Identity::from_request_headers(&req);
    let liveness = Liveness::from_tracker(&tracker);
    let (mut session, events) = ChatSession::connect(tracker.into_inner(), identity.0, room).await?;

    match actix_ws::handle(&req, body) {
        Ok((response, socket, frames)) => {
            actix_web::rt::spawn(pump(session, events, socket, frames, liveness));
            Ok(response)
        }
        Err(e) => {
            session.close().await;
            Err(e)
        }
    }
}

pub async fn chat_socket(
    req: HttpRequest,
    body: web::Payload,
    tracker: web::Data<Tracker>,
) -> Result<HttpResponse, actix_web::Error> {
    open_chat(req, body, tracker, None).await
}

pub async fn chat_room_socket(
    req: HttpRequest,
    body: web::Payload,
    tracker: web::Data<Tracker>,
    room: web::Path<String>,
) -> Result<HttpResponse, actix_web::Error> {
    open_chat(req, body, tracker, Some(room.into_inner())).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heartbeat_expires_after_silence() {
        let t0 = Instant::now();
        let mut heartbeat = Heartbeat::new(t0, Duration::from_secs(30));
        assert!(!heartbeat.expired(t0 + Duration::from_secs(30)));
        assert!(heartbeat.expired(t0 + Duration::from_secs(31)));

        heartbeat.beat(t0 + Duration::from_secs(25));
        assert!(!heartbeat.expired(t0 + Duration::from_secs(50)));
        assert!(heartbeat.expired(t0 + Duration::from_secs(56)));
    }

    #[test]
    fn test_liveness_follows_server_config() {
        let tracker = crate::tracker::tests::tracker();
        let liveness = Liveness::from_tracker(&tracker);
        assert_eq!(liveness.every, Duration::from_secs(10));
        assert_eq!(liveness.timeout, Duration::from_secs(30));
    }
}
