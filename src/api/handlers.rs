use super::identity::Identity;
use crate::error::TrackerError;
use crate::queries::_structs::{BusId, PickupId, RouteId, SeatId, StopId, UserId};
use crate::tracker::{StopRef, Tracker, DRIVER_INBOX_LIMIT};
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

type HandlerResult = Result<HttpResponse, TrackerError>;

fn success(body: serde_json::Value) -> HttpResponse {
    let mut body = body;
    if let Some(map) = body.as_object_mut() {
        map.insert("status".to_string(), json!("success"));
    }
    HttpResponse::Ok().json(body)
}

#[derive(Deserialize)]
pub struct PathQuery {
    from: StopId,
    to: StopId,
}

pub async fn shortest_path(
    tracker: web::Data<Tracker>,
    route_id: web::Path<RouteId>,
    query: web::Query<PathQuery>,
) -> HandlerResult {
    let path = tracker
        .compute_route_shortest_path(route_id.into_inner(), query.from, query.to)
        .await?;
    Ok(success(json!({
        "reachable": path.is_reachable(),
        "distance_m": path.is_reachable().then_some(path.distance_m),
        "stop_ids": path.stop_ids,
    })))
}

#[derive(Deserialize)]
pub struct PointQuery {
    lat: f64,
    lng: f64,
}

pub async fn nearest_stop(
    tracker: web::Data<Tracker>,
    route_id: web::Path<RouteId>,
    query: web::Query<PointQuery>,
) -> HandlerResult {
    let nearest = tracker
        .nearest_stop(route_id.into_inner(), query.lat, query.lng)
        .await?;
    Ok(success(json!({ "nearest": nearest })))
}

pub async fn route_geometry(tracker: web::Data<Tracker>, route_id: web::Path<RouteId>) -> HandlerResult {
    let geometry = tracker.route_geometry(route_id.into_inner()).await?;
    Ok(success(json!({ "route": geometry })))
}

pub async fn list_stops(tracker: web::Data<Tracker>) -> HandlerResult {
    let stops = tracker.list_stops().await?;
    Ok(success(json!({ "stops": stops })))
}

#[derive(Deserialize)]
pub struct SearchQuery {
    pickup: String,
    destination: String,
    #[serde(default)]
    show_passed: Option<String>,
}

pub async fn search_buses(tracker: web::Data<Tracker>, query: web::Query<SearchQuery>) -> HandlerResult {
    let pickup = StopRef::parse(&query.pickup)?;
    let destination = StopRef::parse(&query.destination)?;
    let show_passed = matches!(query.show_passed.as_deref(), Some("1") | Some("true"));
    let search = tracker.rank_buses(&pickup, &destination, show_passed).await?;
    Ok(success(json!({ "search": search })))
}

#[derive(Deserialize)]
pub struct EtaQuery {
    pickup_stop_id: StopId,
}

pub async fn bus_eta(
    tracker: web::Data<Tracker>,
    bus_id: web::Path<BusId>,
    query: web::Query<EtaQuery>,
) -> HandlerResult {
    let eta = tracker.current_eta(bus_id.into_inner(), query.pickup_stop_id).await?;
    Ok(success(json!({ "eta": eta })))
}

pub async fn bus_status(tracker: web::Data<Tracker>, bus_id: web::Path<BusId>) -> HandlerResult {
    let status = tracker.bus_status(bus_id.into_inner()).await?;
    Ok(success(json!({ "bus": status })))
}

#[derive(Deserialize)]
pub struct LocationBody {
    lat: f64,
    lng: f64,
}

/// Driver-side fallback for clients without a socket. Stores the fix only;
/// live streaming to watchers happens on the bus socket.
pub async fn record_location(
    tracker: web::Data<Tracker>,
    identity: Identity,
    bus_id: web::Path<BusId>,
    body: web::Json<LocationBody>,
) -> HandlerResult {
    let user_id = identity.require()?;
    let bus = tracker.bus(bus_id.into_inner()).await?;
    tracker.require_bus_driver(user_id, &bus).await?;
    let outcome = tracker.record_location(bus.id, body.lat, body.lng).await?;
    Ok(success(json!({ "accepted": outcome.is_accepted() })))
}

pub async fn toggle_seat(
    tracker: web::Data<Tracker>,
    identity: Identity,
    seat_id: web::Path<SeatId>,
) -> HandlerResult {
    let seat = tracker
        .toggle_seat(identity.require()?, seat_id.into_inner())
        .await?;
    Ok(success(json!({ "is_available": seat.is_available, "seat": seat })))
}

#[derive(Deserialize)]
pub struct PickupBody {
    bus_id: BusId,
    stop: String,
    #[serde(default)]
    message: String,
}

pub async fn create_pickup(
    tracker: web::Data<Tracker>,
    identity: Identity,
    body: web::Json<PickupBody>,
) -> HandlerResult {
    let pickup = tracker
        .create_pickup(identity.require()?, body.bus_id, &body.stop, &body.message)
        .await?;
    Ok(success(json!({
        "pickup_id": pickup.id,
        "pickup": pickup,
        "message": "Pickup request sent successfully!",
    })))
}

pub async fn cancel_pickup(
    tracker: web::Data<Tracker>,
    identity: Identity,
    pickup_id: web::Path<PickupId>,
) -> HandlerResult {
    let pickup = tracker
        .cancel_pickup(identity.require()?, pickup_id.into_inner())
        .await?;
    Ok(success(json!({
        "pickup": pickup,
        "message": "Pickup request cancelled successfully",
    })))
}

pub async fn pickup_seen(
    tracker: web::Data<Tracker>,
    identity: Identity,
    pickup_id: web::Path<PickupId>,
) -> HandlerResult {
    tracker
        .mark_pickup_seen(identity.require()?, pickup_id.into_inner())
        .await?;
    Ok(success(json!({})))
}

#[derive(Deserialize)]
pub struct InboxQuery {
    limit: Option<usize>,
}

pub async fn driver_pickups(
    tracker: web::Data<Tracker>,
    identity: Identity,
    query: web::Query<InboxQuery>,
) -> HandlerResult {
    let limit = query.limit.unwrap_or(DRIVER_INBOX_LIMIT);
    let inbox = tracker.driver_pickups(identity.require()?, limit).await?;
    Ok(success(json!({
        "pickups": inbox.pickups,
        "unread_count": inbox.unread_count,
    })))
}

pub async fn clear_pickups(tracker: web::Data<Tracker>, identity: Identity) -> HandlerResult {
    let cleared = tracker.clear_all_pickups(identity.require()?).await?;
    Ok(success(json!({ "cleared": cleared })))
}

pub async fn fetch_messages(
    tracker: web::Data<Tracker>,
    identity: Identity,
    other: web::Path<UserId>,
) -> HandlerResult {
    let messages = tracker
        .fetch_messages(identity.require()?, other.into_inner())
        .await?;
    Ok(success(json!({ "messages": messages })))
}

pub async fn clear_chat(
    tracker: web::Data<Tracker>,
    identity: Identity,
    other: web::Path<UserId>,
) -> HandlerResult {
    let deleted = tracker
        .clear_chat(identity.require()?, other.into_inner())
        .await?;
    Ok(success(json!({ "deleted": deleted })))
}

pub async fn switch_route(tracker: web::Data<Tracker>, identity: Identity) -> HandlerResult {
    let switch = tracker.switch_route(identity.require()?).await?;
    Ok(success(json!({
        "message": "Route switched successfully!",
        "switch": switch,
    })))
}

pub async fn route_info(tracker: web::Data<Tracker>, identity: Identity) -> HandlerResult {
    let info = tracker.route_info(identity.require()?).await?;
    Ok(success(json!({ "info": info })))
}
