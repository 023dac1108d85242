use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;
use ulid::Ulid;

use placebook::api::{create_router, AppState};
use placebook::engine::{Engine, EngineConfig, CONFLICT_MESSAGE};

// ── Test infrastructure ──────────────────────────────────────

fn test_app() -> Router {
    test_app_with_token(None)
}

fn test_app_with_token(token: Option<&str>) -> Router {
    let dir = std::env::temp_dir().join(format!("placebook_http_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    let engine = Arc::new(Engine::new(EngineConfig::new(dir.join("placebook.wal"))).unwrap());
    create_router(AppState::new(engine, token.map(str::to_string)))
}

struct Caller {
    user: &'static str,
    roles: &'static str,
}

const ADMIN: Caller = Caller {
    user: "root",
    roles: "admin",
};
const ANA: Caller = Caller {
    user: "ana",
    roles: "user",
};
const BOB: Caller = Caller {
    user: "bob",
    roles: "user",
};

async fn send(
    app: &Router,
    caller: Option<&Caller>,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(caller) = caller {
        builder = builder
            .header("x-user-id", caller.user)
            .header("x-user-roles", caller.roles);
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
    };
    (status, value)
}

fn place_body(name: &str) -> Value {
    json!({
        "name": name,
        "description": "Projector and whiteboard",
        "capacity": 12,
        "type": "sala de reunion",
        "default_days": ["Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Sab", "Dom"],
        "default_hours": "08:00-22:00"
    })
}

fn booking_body(place_id: &str, date: &str, start: &str, end: &str) -> Value {
    json!({
        "place_id": place_id,
        "start_date": date,
        "end_date": date,
        "start_time": start,
        "end_time": end,
        "event_name": "Taller de Rust"
    })
}

async fn create_place(app: &Router, name: &str) -> String {
    let (status, body) = send(app, Some(&ADMIN), Method::POST, "/places", Some(place_body(name))).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["data"]["place"]["id"].as_str().unwrap().to_string()
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn health_needs_no_identity() {
    let app = test_app();
    let (status, body) = send(&app, None, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("OK".into()));
}

#[tokio::test]
async fn requests_without_identity_are_unauthenticated() {
    let app = test_app();
    let (status, body) = send(&app, None, Method::GET, "/places", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn gateway_token_enforced() {
    let app = test_app_with_token(Some("s3cret"));
    let (status, _) = send(&app, Some(&ANA), Method::GET, "/places", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .uri("/places")
        .header("x-user-id", "ana")
        .header("authorization", "Bearer s3cret")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn place_lifecycle() {
    let app = test_app();

    let (status, body) = send(&app, Some(&ANA), Method::GET, "/places", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "No places found.");
    assert_eq!(body["data"]["places"], json!([]));

    let id = create_place(&app, "Sala Norte").await;

    let (status, body) = send(&app, Some(&ANA), Method::GET, &format!("/places/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Place retrieved successfully.");
    assert_eq!(body["data"]["place"]["name"], "Sala Norte");
    assert_eq!(body["data"]["place"]["type"], "sala de reunion");
    assert_eq!(body["data"]["availability"]["hours"], "08:00-22:00");
    assert_eq!(body["data"]["availability"]["days"].as_array().unwrap().len(), 7);

    let (status, body) = send(
        &app,
        Some(&ADMIN),
        Method::PUT,
        &format!("/places/{id}"),
        Some(json!({ "capacity": 30, "available_to": "2025-06-30" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Place updated successfully.");
    assert_eq!(body["data"]["place"]["capacity"], 30);
    assert_eq!(body["data"]["place"]["available_to"], "2025-06-30");

    let (status, body) = send(
        &app,
        Some(&ADMIN),
        Method::PUT,
        &format!("/places/{id}"),
        Some(json!({ "available_to": null })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["place"]["available_to"], Value::Null);

    let (status, body) = send(&app, Some(&ADMIN), Method::DELETE, &format!("/places/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Place deleted successfully.");

    let (status, body) = send(&app, Some(&ANA), Method::GET, &format!("/places/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Place not found.");
}

#[tokio::test]
async fn place_management_is_admin_only() {
    let app = test_app();
    let (status, body) = send(&app, Some(&ANA), Method::POST, "/places", Some(place_body("Mine"))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["success"], false);

    let id = create_place(&app, "Sala Sur").await;
    let (status, _) = send(&app, Some(&ANA), Method::DELETE, &format!("/places/{id}"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn place_validation_reports_every_field() {
    let app = test_app();
    let (status, body) = send(
        &app,
        Some(&ADMIN),
        Method::POST,
        "/places",
        Some(json!({ "capacity": 0, "type": "garage", "default_hours": "18:00-09:00" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["success"], false);
    for field in ["name", "description", "capacity", "type", "default_hours"] {
        assert!(body["data"][field].is_array(), "missing {field} in {body}");
    }
}

#[tokio::test]
async fn malformed_requests_are_bad_requests() {
    let app = test_app();
    let (status, _) = send(&app, Some(&ANA), Method::GET, "/places/not-a-ulid", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/bookings")
        .header("x-user-id", "ana")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn booking_conflict_flow() {
    let app = test_app();
    let place = create_place(&app, "Sala Centro").await;

    let (status, body) = send(
        &app,
        Some(&ANA),
        Method::POST,
        "/bookings",
        Some(booking_body(&place, "2024-10-15", "14:00", "16:00")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["message"], "Booking created successfully.");
    assert_eq!(body["data"]["booking"]["status"], "booked");
    assert_eq!(body["data"]["booking"]["start_time"], "14:00");
    let first = body["data"]["booking"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        Some(&BOB),
        Method::POST,
        "/bookings",
        Some(booking_body(&place, "2024-10-15", "15:00", "17:00")),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], CONFLICT_MESSAGE);

    let (status, _) = send(
        &app,
        Some(&BOB),
        Method::POST,
        "/bookings",
        Some(booking_body(&place, "2024-10-16", "14:00", "16:00")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        &app,
        Some(&ANA),
        Method::POST,
        &format!("/bookings/{first}/cancel"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Booking cancelled successfully.");
    assert_eq!(body["data"]["booking"]["status"], "cancelled");

    let (status, _) = send(
        &app,
        Some(&BOB),
        Method::POST,
        "/bookings",
        Some(booking_body(&place, "2024-10-15", "14:00", "16:00")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        &app,
        Some(&ANA),
        Method::GET,
        &format!("/places/{place}/booked-schedule"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["schedule"].as_array().unwrap().len(), 2);
    assert!(body["data"]["schedule"][0].get("user_id").is_none());
}

#[tokio::test]
async fn booking_validation_and_ownership() {
    let app = test_app();
    let place = create_place(&app, "Sala Este").await;

    let (status, body) = send(
        &app,
        Some(&ANA),
        Method::POST,
        "/bookings",
        Some(json!({ "place_id": place, "start_date": "15/10/2024", "start_time": "9am" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    for field in ["start_date", "end_date", "start_time", "end_time", "event_name"] {
        assert!(body["data"][field].is_array(), "missing {field} in {body}");
    }

    let (status, body) = send(
        &app,
        Some(&ANA),
        Method::POST,
        "/bookings",
        Some(booking_body(&place, "2024-10-15", "16:00", "14:00")),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["data"]["end_time"].is_array());

    let (_, body) = send(
        &app,
        Some(&ANA),
        Method::POST,
        "/bookings",
        Some(booking_body(&place, "2024-10-15", "09:00", "10:00")),
    )
    .await;
    let id = body["data"]["booking"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(&app, Some(&BOB), Method::GET, &format!("/bookings/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Booking not found.");

    let (status, body) = send(&app, Some(&ANA), Method::GET, &format!("/bookings/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Booking details.");

    let (status, body) = send(&app, Some(&BOB), Method::GET, "/bookings", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["bookings"], json!([]));
}

#[tokio::test]
async fn booking_update_and_delete() {
    let app = test_app();
    let place = create_place(&app, "Sala Oeste").await;

    let (_, body) = send(
        &app,
        Some(&ANA),
        Method::POST,
        "/bookings",
        Some(booking_body(&place, "2024-10-15", "09:00", "10:00")),
    )
    .await;
    let id = body["data"]["booking"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        Some(&ANA),
        Method::PUT,
        &format!("/bookings/{id}"),
        Some(json!({ "start_time": "11:00", "end_time": "12:30", "event_name": null })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["message"], "Booking updated successfully.");
    assert_eq!(body["data"]["booking"]["start_time"], "11:00");
    assert_eq!(body["data"]["booking"]["event_name"], "Taller de Rust");

    let (status, body) = send(&app, Some(&ANA), Method::DELETE, &format!("/bookings/{id}"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);

    let (status, _) = send(&app, Some(&ANA), Method::GET, &format!("/bookings/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn filter_places_by_query() {
    let app = test_app();
    let busy = create_place(&app, "Sala Ocupada").await;
    let free = create_place(&app, "Sala Libre").await;

    let (status, _) = send(
        &app,
        Some(&ANA),
        Method::POST,
        "/bookings",
        Some(booking_body(&busy, "2024-10-15", "14:00", "16:00")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        &app,
        Some(&BOB),
        Method::GET,
        "/filter-places?start_date=2024-10-15&end_date=2024-10-15&start_time=15:00&end_time=17:00",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Filtered places obtained successfully.");
    let ids: Vec<&str> = body["data"]["places"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec![free.as_str()]);

    let (status, body) = send(&app, Some(&BOB), Method::GET, "/filter-places?capacity=50", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["places"], json!([]));

    let (status, _) = send(
        &app,
        Some(&BOB),
        Method::GET,
        "/filter-places?type=sala%20de%20reunion",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, Some(&BOB), Method::GET, "/filter-places?start_date=tomorrow", None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["data"]["start_date"].is_array());
}
