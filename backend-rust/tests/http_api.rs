//! Query API routes, exercised in-process through `tower::ServiceExt::oneshot`.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

use uwb_tracker::calibration::{Calibration, Pixel, ScaleBar};
use uwb_tracker::handlers::{router, ApiState};
use uwb_tracker::source::{status_channel, SourceStatus};
use uwb_tracker::{SharedTracker, TrackerContext, TrackerHandle};
use uwb_types::{AnchorMap, Measurement, Position};

fn triangle() -> AnchorMap {
    [
        ("A1".to_string(), Position::new(0.0, 0.0)),
        ("A2".to_string(), Position::new(10.0, 0.0)),
        ("A3".to_string(), Position::new(0.0, 10.0)),
    ]
    .into()
}

fn calibration() -> Calibration {
    // 50 px/m, bottom-left pixel of a 200×100 image at world (0, 0)
    let transform = ScaleBar::measure(Pixel::new(0.0, 0.0), Pixel::new(100.0, 0.0), 2.0)
        .unwrap()
        .with_origin(Pixel::new(0.0, 100.0), Position::new(0.0, 0.0))
        .unwrap();
    Calibration::new(transform, [100, 200], Some("floor.png".into()))
}

fn app(shared: SharedTracker, status: SourceStatus) -> axum::Router {
    let (status_tx, status_rx) = status_channel();
    status_tx.send_replace(status);
    router(ApiState { tracker: TrackerHandle::new(shared), source_status: status_rx })
}

async fn get_json(app: axum::Router, uri: &str) -> (StatusCode, Value) {
    let res = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = res.status();
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn solve_at(shared: &SharedTracker, truth: Position, ts: u64) {
    let batch = triangle()
        .iter()
        .map(|(id, p)| Measurement::new(ts, id.clone(), p.distance_to(&truth)))
        .collect();
    shared.write().await.apply_batch(batch);
}

#[tokio::test]
async fn current_state_before_any_fix_has_null_position() {
    let shared = TrackerContext::new(triangle(), None, 10).into_shared();
    let (status, body) = get_json(app(shared, SourceStatus::Starting), "/api/current_state").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["position"].is_null());
    assert_eq!(body["distances"], serde_json::json!({}));
}

#[tokio::test]
async fn current_state_and_history_after_fixes() {
    let shared = TrackerContext::new(triangle(), None, 10).into_shared();
    solve_at(&shared, Position::new(2.0, 3.0), 100).await;
    solve_at(&shared, Position::new(2.5, 3.5), 200).await;

    let (_, body) = get_json(app(shared.clone(), SourceStatus::Starting), "/api/current_state").await;
    assert_eq!(body["position"]["timestamp_ms"], 200);
    assert!((body["position"]["x"].as_f64().unwrap() - 2.5).abs() < 1e-6);
    assert_eq!(body["distances"].as_object().unwrap().len(), 3);

    let (_, body) = get_json(app(shared.clone(), SourceStatus::Starting), "/api/history").await;
    assert_eq!(body["history"].as_array().unwrap().len(), 2);

    let (_, body) = get_json(app(shared, SourceStatus::Starting), "/api/history?limit=1").await;
    let history = body["history"].as_array().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["timestamp_ms"], 200);
}

#[tokio::test]
async fn anchors_are_listed_as_pairs() {
    let shared = TrackerContext::new(triangle(), None, 10).into_shared();
    let (_, body) = get_json(app(shared, SourceStatus::Starting), "/api/anchors").await;
    assert_eq!(body["anchors"]["A2"], serde_json::json!([10.0, 0.0]));
}

#[tokio::test]
async fn config_reports_transform_and_extent() {
    let shared = TrackerContext::new(triangle(), Some(calibration()), 321).into_shared();
    let (_, body) = get_json(app(shared, SourceStatus::Starting), "/api/config").await;

    assert_eq!(body["max_history"], 321);
    assert_eq!(body["image_transform"]["type"], "scale_origin");
    assert_eq!(body["image_transform"]["image_file"], "floor.png");
    assert_eq!(body["extent"]["max_x"], 4.0);
    assert_eq!(body["extent"]["max_y"], 2.0);
}

#[tokio::test]
async fn config_without_calibration_has_nulls() {
    let shared = TrackerContext::new(triangle(), None, 10).into_shared();
    let (_, body) = get_json(app(shared, SourceStatus::Starting), "/api/config").await;
    assert!(body["image_transform"].is_null());
    assert!(body["extent"].is_null());
}

#[tokio::test]
async fn status_reports_source_state() {
    let shared = TrackerContext::new(triangle(), None, 10).into_shared();
    let status = SourceStatus::Unavailable { reason: "no such file".into() };
    let (_, body) = get_json(app(shared, status), "/api/status").await;

    assert_eq!(body["source"]["state"], "UNAVAILABLE");
    assert_eq!(body["source"]["detail"]["reason"], "no such file");
}

#[tokio::test]
async fn pixel_to_world_uses_calibration() {
    let shared = TrackerContext::new(triangle(), Some(calibration()), 10).into_shared();
    let (status, body) = get_json(app(shared, SourceStatus::Starting), "/api/pixel_to_world?u=50&v=50").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!({ "x": 1.0, "y": 1.0 }));

    let shared = TrackerContext::new(triangle(), None, 10).into_shared();
    let (status, body) = get_json(app(shared, SourceStatus::Starting), "/api/pixel_to_world?u=1&v=1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());
}
