mod common;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use common::{photo_base64, setup, setup_with};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use visiride::protocol::ERROR_MARKER;
use visiride::service::router;
use visiride::{AppState, Config, MemoryStore};

const LAT: &str = "43.6532";
const LON: &str = "-79.3832";

async fn send(state: &AppState, req: Request<Body>) -> Response {
    router(state.clone()).oneshot(req).await.unwrap()
}

async fn text(resp: Response) -> String {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn post_form(uri: &str, fields: &[(&str, &str)]) -> Request<Body> {
    let body = fields
        .iter()
        .map(|(k, v)| format!("{}={}", urlencode(k), urlencode(v)))
        .collect::<Vec<_>>()
        .join("&");
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from(body))
        .unwrap()
}

fn urlencode(raw: &str) -> String {
    raw.bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' => (b as char).to_string(),
            _ => format!("%{:02X}", b),
        })
        .collect()
}

fn sign_up_body(username: &str, image: String) -> Value {
    json!({
        "username": username,
        "password": "hunter22",
        "lat": LAT.parse::<f64>().unwrap(),
        "lon": LON,
        "image": image,
    })
}

async fn provision(state: &AppState) {
    let uri = format!("/add_scooter?scooterId=scooter1&charge=80&lat={}&lon={}", LAT, LON);
    let resp = send(state, Request::builder().method("POST").uri(uri).body(Body::empty()).unwrap()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(text(resp).await, "New Scooter Added!");

    let resp = send(state, post_json("/sign_up", &sign_up_body("alice_rider", photo_base64()))).await;
    assert_eq!(text(resp).await, "New User Added!");
}

fn gps_fix() -> [(&'static str, &'static str); 4] {
    [("scooterId", "scooter1"), ("lat", LAT), ("lon", LON), ("valid", "true")]
}

#[tokio::test]
async fn health_is_ok() {
    let (state, _tmp) = setup(true);
    let resp = send(&state, get("/health")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(text(resp).await, "ok");
}

#[tokio::test]
async fn unlock_cycle_over_http() {
    let (state, _tmp) = setup(true);
    provision(&state).await;

    let resp = send(&state, get("/sign_in?username=alice_rider&password=hunter22")).await;
    assert_eq!(text(resp).await, photo_base64());

    let resp = send(
        &state,
        post_json("/update_user_location", &json!({"username": "alice_rider", "lat": LAT, "lon": -79.3832})),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let assigned: Value = serde_json::from_str(&text(resp).await).unwrap();
    assert_eq!(assigned, json!([]));

    let resp = send(&state, post_form("/gps", &gps_fix())).await;
    assert_eq!(text(resp).await, "photo*");

    let encoded = photo_base64();
    let (head, tail) = encoded.split_at(encoded.len() / 2);
    let resp = send(&state, post_form("/checkFace", &[("scooterId", "scooter1"), ("size", "1"), ("data_0", head)])).await;
    assert_eq!(text(resp).await, "Chunk data_0 received*");
    let resp = send(&state, post_form("/checkFace", &[("scooterId", "scooter1"), ("data_1", tail)])).await;
    assert_eq!(text(resp).await, "Final Chunk*");

    // Classification finishes after the reply
    let mut scooters = Value::Null;
    for _ in 0..250 {
        scooters = serde_json::from_str(&text(send(&state, get("/scooters")).await).await).unwrap();
        if scooters[0]["user"] == "alice_rider" && !state.coordinator.in_flight().is_set() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(scooters[0]["scooterId"], "scooter1");
    assert_eq!(scooters[0]["user"], "alice_rider");
    assert_eq!(scooters[0]["currentCharge"], "80");
    assert_eq!(scooters[0]["location"]["lat"], 43.6532);

    let resp = send(&state, post_form("/gps", &gps_fix())).await;
    assert_eq!(text(resp).await, "unlock*");

    let resp = send(
        &state,
        post_json("/free_scooter", &json!({"scooterId": "scooter1", "username": "alice_rider"})),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let elapsed: i64 = text(resp).await.parse().unwrap();
    assert!(elapsed >= 0);

    let scooters: Value = serde_json::from_str(&text(send(&state, get("/scooters")).await).await).unwrap();
    assert_eq!(scooters[0]["user"], "_none");
}

#[tokio::test]
async fn users_listing_shape() {
    let (state, _tmp) = setup(true);
    provision(&state).await;

    let users: Value = serde_json::from_str(&text(send(&state, get("/users")).await).await).unwrap();
    assert_eq!(users, json!([{"username": "alice_rider", "lat": 43.6532, "lon": -79.3832}]));
}

#[tokio::test]
async fn unknown_scooter_gps_is_locked() {
    let (state, _tmp) = setup(true);
    let resp = send(&state, post_form("/gps", &[("scooterId", "ghost"), ("lat", "1"), ("lon", "1"), ("valid", "true")])).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(text(resp).await, "lock*");
}

#[tokio::test]
async fn firmware_errors_carry_marker() {
    let (state, _tmp) = setup(true);
    provision(&state).await;

    let resp = send(&state, post_form("/gps", &[("lat", "1"), ("lon", "1"), ("valid", "true")])).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(text(resp).await, ERROR_MARKER);

    // Chunk with no declared size
    let resp = send(&state, post_form("/checkFace", &[("scooterId", "scooter1"), ("data_0", "aGk=")])).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(text(resp).await, ERROR_MARKER);

    let resp = send(&state, post_form("/checkFace", &[("scooterId", "scooter1"), ("size", "two")])).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(text(resp).await, ERROR_MARKER);
}

#[tokio::test]
async fn client_errors_carry_reason() {
    let (state, _tmp) = setup(true);
    provision(&state).await;

    let dup = format!("/add_scooter?scooterId=scooter1&lat={}&lon={}", LAT, LON);
    let resp = send(&state, Request::builder().method("POST").uri(dup).body(Body::empty()).unwrap()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(text(resp).await.starts_with("Already exists"));

    let resp = send(
        &state,
        post_json("/update_user_location", &json!({"username": "alice_rider", "lat": "north", "lon": 1})),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(text(resp).await, "Invalid lat/lon");

    let resp = send(&state, get("/sign_in?username=alice_rider&password=nope")).await;
    assert_eq!(text(resp).await, "Incorrect username or password");
}

#[tokio::test]
async fn photo_larger_than_two_megabytes_is_accepted() {
    let (state, _tmp) = setup(true);
    assert_eq!(state.config.server.max_body_bytes, 16 * 1024 * 1024);

    // ~3.2 MB of base64
    let image = BASE64.encode(vec![7u8; 2_400_000]);
    let resp = send(&state, post_json("/sign_up", &sign_up_body("bulky_rider", image))).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(text(resp).await, "New User Added!");
}

#[tokio::test]
async fn body_over_configured_limit_is_rejected() {
    let mut config = Config::default();
    config.server.max_body_bytes = 4 * 1024;
    let (state, _tmp) = setup_with(config, Arc::new(MemoryStore::new()), true);

    let image = BASE64.encode(vec![7u8; 16 * 1024]);
    let resp = send(&state, post_json("/sign_up", &sign_up_body("bulky_rider", image))).await;
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(state.list_users().await.unwrap().is_empty());
}
