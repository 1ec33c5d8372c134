use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use crate::state::AppState;
use crate::translate::{TranslationRequest, TranslationResult};

pub fn create_routes() -> Router<AppState> {
    Router::new()
        .route("/translate", post(translate))
        .route("/health", get(health))
        .route("/stats", get(stats))
}

async fn translate(
    State(state): State<AppState>,
    Json(request): Json<TranslationRequest>,
) -> Json<TranslationResult> {
    if request.text.trim().is_empty() {
        return Json(TranslationResult::echo(&request, false));
    }
    Json(state.coordinator.translate(request).await)
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let last_success = state
        .coordinator
        .stats()
        .snapshot()
        .last_success
        .map(|ts| ts.timestamp_millis() as f64 / 1000.0);

    Json(json!({
        "status": "ok",
        "uptime_seconds": round_to(state.started_at.elapsed().as_secs_f64(), 1),
        "last_successful_translation": last_success
    }))
}

async fn stats(State(state): State<AppState>) -> Json<Value> {
    let s = state.coordinator.stats().snapshot();
    Json(json!({
        "total_requests": s.total_requests,
        "successful": s.successful,
        "failed": s.failed,
        "retries": s.retries,
        "fallbacks": s.fallbacks,
        "success_rate": round_to(s.success_rate, 4),
        "avg_response_time_ms": round_to(s.avg_response_time_ms, 1)
    }))
}

fn round_to(value: f64, digits: i32) -> f64 {
    let factor = 10f64.powi(digits);
    (value * factor).round() / factor
}
