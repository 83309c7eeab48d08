use actix_web::test;
use chrono::DateTime;

#[macro_use]
mod common;

#[actix_rt::test]
async fn test_health_check() {
    let state = common::lazy_state();
    let app = test_app!(state);

    let req = test::TestRequest::get().uri("/health").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    let json: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(json["status"], "healthy");
    assert!(DateTime::parse_from_rfc3339(json["timestamp"].as_str().unwrap()).is_ok());
    assert!(json["database"]["total_connections"].is_u64());
}

#[actix_rt::test]
async fn test_unknown_route_returns_json_error() {
    let state = common::lazy_state();
    let app = test_app!(state);

    let req = test::TestRequest::get().uri("/does/not/exist").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);

    let json: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(json["error"]["status"], 404);
}
