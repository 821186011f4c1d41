use axum::{Json, extract::State};
use std::sync::Arc;

use crate::models::HealthBody;
use crate::state::AppState;

pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthBody> {
    Json(HealthBody {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        rate_limit_records: state.rate_limiter.len(),
    })
}
