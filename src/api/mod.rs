use actix_web::web;

pub mod handlers;
pub mod identity;
pub mod ws;

use handlers::*;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/stops", web::get().to(list_stops))
            .route("/routes/{id}/shortest_path", web::get().to(shortest_path))
            .route("/routes/{id}/nearest_stop", web::get().to(nearest_stop))
            .route("/routes/{id}/geometry", web::get().to(route_geometry))
            .route("/buses/search", web::get().to(search_buses))
            .route("/buses/{id}/eta", web::get().to(bus_eta))
            .route("/buses/{id}/status", web::get().to(bus_status))
            .route("/buses/{id}/location", web::post().to(record_location))
            .route("/seats/{id}/toggle", web::post().to(toggle_seat))
            .route("/pickups", web::get().to(driver_pickups))
            .route("/pickups", web::post().to(create_pickup))
            .route("/pickups/clear", web::post().to(clear_pickups))
            .route("/pickups/{id}/cancel", web::post().to(cancel_pickup))
            .route("/pickups/{id}/seen", web::post().to(pickup_seen))
            .route("/messages/{other}", web::get().to(fetch_messages))
            .route("/messages/{other}", web::delete().to(clear_chat))
            .route("/driver/switch_route", web::post().to(switch_route))
            .route("/driver/route_info", web::get().to(route_info)),
    )
    .service(
        web::scope("/ws")
            .route("/bus/{bus_id}", web::get().to(ws::bus_socket))
            .route("/chat", web::get().to(ws::chat_socket))
            .route("/chat/{room}", web::get().to(ws::chat_room_socket)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::identity::USER_ID_HEADER;
    use crate::tracker::tests::tracker;
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use serde_json::Value;

    macro_rules! app {
        ($tracker:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::from($tracker.clone()))
                    .configure(config),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn test_shortest_path_endpoint() {
        let tracker = tracker();
        let app = app!(tracker);

        let req = test::TestRequest::get()
            .uri("/api/routes/1/shortest_path?from=10&to=12")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "success");
        assert_eq!(body["reachable"], true);
        assert_eq!(body["stop_ids"], serde_json::json!([10, 11, 12]));

        let req = test::TestRequest::get()
            .uri("/api/routes/1/shortest_path?from=12&to=10")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["reachable"], false);
        assert!(body["distance_m"].is_null());

        let req = test::TestRequest::get()
            .uri("/api/routes/9/shortest_path?from=10&to=12")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_location_requires_the_bus_driver() {
        let tracker = tracker();
        let app = app!(tracker);

        let req = test::TestRequest::post()
            .uri("/api/buses/7/location")
            .set_json(serde_json::json!({"lat": 27.70, "lng": 85.30}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

        let req = test::TestRequest::post()
            .uri("/api/buses/7/location")
            .insert_header((USER_ID_HEADER, "1"))
            .set_json(serde_json::json!({"lat": 27.70, "lng": 85.30}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

        let req = test::TestRequest::post()
            .uri("/api/buses/7/location")
            .insert_header((USER_ID_HEADER, "2"))
            .set_json(serde_json::json!({"lat": 27.70, "lng": 85.30}))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["accepted"], true);

        let req = test::TestRequest::get()
            .uri("/api/buses/7/eta?pickup_stop_id=12")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["eta"]["status"], "catchable");
        assert_eq!(body["eta"]["eta_minutes"], 7);
    }

    #[actix_web::test]
    async fn test_search_endpoint() {
        let tracker = tracker();
        let app = app!(tracker);

        let req = test::TestRequest::get()
            .uri("/api/buses/search?pickup=Ratna%20Park&destination=Lazimpat")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["search"]["buses"][0]["bus_id"], 7);
        assert_eq!(body["search"]["buses"][0]["status"], "no_location");
    }

    #[actix_web::test]
    async fn test_duplicate_pickup_is_conflict() {
        let tracker = tracker();
        let app = app!(tracker);
        let request = || {
            test::TestRequest::post()
                .uri("/api/pickups")
                .insert_header((USER_ID_HEADER, "1"))
                .set_json(serde_json::json!({"bus_id": 7, "stop": "Jamal"}))
                .to_request()
        };

        let body: Value = test::call_and_read_body_json(&app, request()).await;
        let first = body["pickup_id"].as_i64().unwrap();

        let resp = test::call_service(&app, request()).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "error");
        assert_eq!(body["existing_request_id"], first);
    }

    #[actix_web::test]
    async fn test_driver_route_endpoints() {
        let tracker = tracker();
        let app = app!(tracker);

        let req = test::TestRequest::get()
            .uri("/api/driver/route_info")
            .insert_header((USER_ID_HEADER, "2"))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["info"]["can_switch"], true);

        let req = test::TestRequest::post()
            .uri("/api/driver/switch_route")
            .insert_header((USER_ID_HEADER, "2"))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["switch"]["new_route"]["id"], 2);
    }

    #[actix_web::test]
    async fn test_driver_inbox_endpoint() {
        let tracker = tracker();
        let app = app!(tracker);
        for (user, stop) in [("1", "Jamal"), ("3", "Lazimpat")] {
            let req = test::TestRequest::post()
                .uri("/api/pickups")
                .insert_header((USER_ID_HEADER, user))
                .set_json(serde_json::json!({"bus_id": 7, "stop": stop}))
                .to_request();
            assert!(test::call_service(&app, req).await.status().is_success());
        }

        let req = test::TestRequest::get()
            .uri("/api/pickups?limit=1")
            .insert_header((USER_ID_HEADER, "2"))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["unread_count"], 2);
        assert_eq!(body["pickups"].as_array().unwrap().len(), 1);
        assert_eq!(body["pickups"][0]["stop"], "Lazimpat");

        let req = test::TestRequest::get()
            .uri("/api/pickups")
            .insert_header((USER_ID_HEADER, "1"))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn test_location_cannot_be_cleared_over_http() {
        let tracker = tracker();
        let app = app!(tracker);
        tracker.record_location(7, 27.70, 85.30).await.unwrap();

        let req = test::TestRequest::delete()
            .uri("/api/buses/7/location")
            .insert_header((USER_ID_HEADER, "2"))
            .to_request();
        assert!(!test::call_service(&app, req).await.status().is_success());
        assert!(tracker.bus_status(7).await.unwrap().live.position().is_some());
    }
}
