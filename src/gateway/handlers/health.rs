//! Health check handler

use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::super::state::AppState;
use super::super::types::{ApiResponse, error_codes};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub timestamp_ms: i64,
}

/// GET /api/v1/health
///
/// - Healthy: 200 + `{code: 0, data: {timestamp_ms}}`
/// - Database unreachable or not configured: 503, no details exposed
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<ApiResponse<HealthResponse>>) {
    let healthy = match &state.db {
        Some(db) => match db.health_check().await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(error = %e, "[HEALTH] PostgreSQL ping failed");
                false
            }
        },
        None => {
            tracing::error!("[HEALTH] No database configured");
            false
        }
    };

    if healthy {
        (
            StatusCode::OK,
            Json(ApiResponse::success(HealthResponse {
                timestamp_ms: Utc::now().timestamp_millis(),
            })),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiResponse {
                code: error_codes::SERVICE_UNAVAILABLE,
                msg: "unavailable".to_string(),
                data: None,
            }),
        )
    }
}
