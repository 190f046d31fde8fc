use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::error::Result;
use crate::models::LifecycleState;
use crate::state::AppState;

/// Health response structure
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub session: String,
    pub signaling_url: String,
    pub participants: usize,
    pub timestamp: String,
}

/// Health routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

/// GET /health - Health check endpoint
async fn health_check(State(state): State<AppState>) -> Result<Json<HealthResponse>> {
    let (status, session) = match state.session.snapshot().await {
        Ok(snapshot) => {
            let session = match snapshot.lifecycle_state {
                LifecycleState::Disconnected => "disconnected",
                LifecycleState::Joining => "joining",
                LifecycleState::Joined => "joined",
                LifecycleState::Leaving => "leaving",
            };
            ("healthy", session)
        }
        Err(e) => {
            tracing::error!(error = %e, "Session actor not responding");
            ("unhealthy", "unavailable")
        }
    };

    Ok(Json(HealthResponse {
        status: status.to_string(),
        session: session.to_string(),
        signaling_url: state.config.signaling_url.clone(),
        participants: state.participants.len(),
        timestamp: Utc::now().to_rfc3339(),
    }))
}
