use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};

use crate::error::{AppError, Result};
use crate::models::{CreateRelayRequest, ExpireRelayResponse, RelayRequest};
use crate::state::AppState;

/// Relay routes
pub fn relay_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_relays).post(create_relay))
        .route("/{request_id}", get(get_relay).delete(stop_relay))
        .route("/{request_id}/accept", post(accept_relay))
        .route("/{request_id}/reject", post(reject_relay))
        .route("/{request_id}/expire", post(expire_relay))
}

/// GET /api/v1/relays - Every relay this participant knows about
async fn list_relays(State(state): State<AppState>) -> Result<Json<Vec<RelayRequest>>> {
    Ok(Json(state.session.relays().await?))
}

/// POST /api/v1/relays - Ask another room to receive our media
async fn create_relay(
    State(state): State<AppState>,
    Json(request): Json<CreateRelayRequest>,
) -> Result<Json<RelayRequest>> {
    let relay = state
        .session
        .request_relay(&request.destination_room_id, &request.token, request.kinds)
        .await?;

    tracing::info!(
        request_id = %relay.request_id,
        destination_room_id = %relay.destination_room_id,
        "Relay requested via API"
    );

    Ok(Json(relay))
}

/// GET /api/v1/relays/{request_id}
async fn get_relay(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> Result<Json<RelayRequest>> {
    let relay = state
        .session
        .relay(&request_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Relay {} not found", request_id)))?;
    Ok(Json(relay))
}

/// DELETE /api/v1/relays/{request_id} - Stop an accepted or active relay
async fn stop_relay(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> Result<Json<RelayRequest>> {
    Ok(Json(state.session.stop_relay(&request_id).await?))
}

/// POST /api/v1/relays/{request_id}/accept
async fn accept_relay(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> Result<Json<RelayRequest>> {
    Ok(Json(state.session.accept_relay(&request_id).await?))
}

/// POST /api/v1/relays/{request_id}/reject
async fn reject_relay(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> Result<Json<RelayRequest>> {
    Ok(Json(state.session.reject_relay(&request_id).await?))
}

/// POST /api/v1/relays/{request_id}/expire - Stop waiting on a pending request
async fn expire_relay(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> Result<Json<ExpireRelayResponse>> {
    let expired = state.session.expire_relay(&request_id).await?;
    if !expired && state.session.relay(&request_id).await?.is_none() {
        return Err(AppError::NotFound(format!("Relay {} not found", request_id)));
    }
    Ok(Json(ExpireRelayResponse {
        request_id,
        expired,
    }))
}
