//! Read-only HTTP query API for external renderers.
//!
//! Every handler goes through [`TrackerHandle`], so nothing here can mutate
//! the tracker. Floorplan images and HTML pages are not served.

use std::collections::BTreeMap;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use uwb_types::{AnchorId, AnchorMap};

use crate::calibration::Pixel;
use crate::source::SourceStatus;
use crate::state::{CurrentState, TrackerHandle};

// ─── Shared Handler State ─────────────────────────────────────────────────────

#[derive(Clone)]
pub struct ApiState {
    pub tracker: TrackerHandle,
    pub source_status: watch::Receiver<SourceStatus>,
}

pub fn router(state: ApiState) -> Router {
    // Allow all origins; renderers are usually served from elsewhere
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/current_state", get(current_state))
        .route("/api/anchors", get(anchors))
        .route("/api/history", get(history))
        .route("/api/config", get(config))
        .route("/api/status", get(status))
        .route("/api/pixel_to_world", get(pixel_to_world))
        .layer(cors)
        .with_state(state)
}

fn anchors_json(anchors: &AnchorMap) -> BTreeMap<&AnchorId, [f64; 2]> {
    anchors.iter().map(|(id, p)| (id, p.to_array())).collect()
}

// ─── Handlers ─────────────────────────────────────────────────────────────────

async fn current_state(State(api): State<ApiState>) -> Json<CurrentState> {
    Json(api.tracker.current_state().await)
}

async fn anchors(State(api): State<ApiState>) -> Json<Value> {
    let anchors = api.tracker.anchors().await;
    Json(json!({ "anchors": anchors_json(&anchors) }))
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
}

async fn history(State(api): State<ApiState>, Query(q): Query<HistoryQuery>) -> Json<Value> {
    Json(json!({ "history": api.tracker.history(q.limit).await }))
}

async fn config(State(api): State<ApiState>) -> Json<Value> {
    let anchors = api.tracker.anchors().await;
    let calibration = api.tracker.calibration().await;
    Json(json!({
        "anchors": anchors_json(&anchors),
        "image_transform": calibration.as_ref().map(|c| c.to_record()),
        "max_history": api.tracker.history_capacity().await,
        "extent": calibration.as_ref().map(|c| c.extent()),
    }))
}

async fn status(State(api): State<ApiState>) -> Json<Value> {
    let source = api.source_status.borrow().clone();
    Json(json!({ "source": source }))
}

#[derive(Debug, Deserialize)]
struct PixelQuery {
    u: f64,
    v: f64,
}

async fn pixel_to_world(State(api): State<ApiState>, Query(q): Query<PixelQuery>) -> Response {
    match api.tracker.calibration().await {
        Some(cal) => {
            let w = cal.transform.pixel_to_world(Pixel::new(q.u, q.v));
            Json(json!({ "x": w.x, "y": w.y })).into_response()
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "no floorplan calibration loaded" })),
        )
            .into_response(),
    }
}
