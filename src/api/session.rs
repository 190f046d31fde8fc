use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};

use crate::error::{AppError, Result};
use crate::models::{
    JoinSessionRequest, MediaEnabled, Participant, SessionSnapshot, SetMediaRequest,
    SwitchRoomRequest,
};
use crate::session::{JoinOutcome, SwitchOutcome};
use crate::state::AppState;

/// Session routes
pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_session))
        .route("/join", post(join))
        .route("/switch", post(switch_room))
        .route("/leave", post(leave))
        .route("/media", post(set_media))
}

pub fn participant_routes() -> Router<AppState> {
    Router::new().route("/", get(list_participants))
}

/// GET /api/v1/session - Current session snapshot
async fn get_session(State(state): State<AppState>) -> Result<Json<SessionSnapshot>> {
    Ok(Json(state.session.snapshot().await?))
}

/// POST /api/v1/session/join - Join a room and wait for the server's answer
async fn join(
    State(state): State<AppState>,
    Json(request): Json<JoinSessionRequest>,
) -> Result<Json<JoinOutcome>> {
    let display_name = request.display_name.as_deref().map(str::trim);
    if display_name.is_some_and(|d| d.len() > 100) {
        return Err(AppError::InvalidInput(
            "Display name must be at most 100 characters".to_string(),
        ));
    }

    let outcome = state
        .session
        .join(&request.room_id, &request.token, display_name)
        .await?;
    Ok(Json(outcome))
}

/// POST /api/v1/session/switch - Move the home room without reconnecting
async fn switch_room(
    State(state): State<AppState>,
    Json(request): Json<SwitchRoomRequest>,
) -> Result<Json<SwitchOutcome>> {
    let outcome = state
        .session
        .switch_to(&request.room_id, &request.token)
        .await?;
    Ok(Json(outcome))
}

/// POST /api/v1/session/leave
async fn leave(State(state): State<AppState>) -> Result<Json<SessionSnapshot>> {
    state.session.leave().await?;
    Ok(Json(state.session.snapshot().await?))
}

/// POST /api/v1/session/media - Toggle local mic/camera
async fn set_media(
    State(state): State<AppState>,
    Json(request): Json<SetMediaRequest>,
) -> Result<Json<MediaEnabled>> {
    let media = state
        .session
        .set_media(request.mic, request.camera)
        .await?;
    Ok(Json(media))
}

/// GET /api/v1/participants - Participants of the home room
async fn list_participants(State(state): State<AppState>) -> Json<Vec<Participant>> {
    Json(state.participants.all())
}
