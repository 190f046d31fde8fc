pub mod events;
pub mod health;
pub mod relays;
pub mod session;

use axum::Router;

use crate::state::AppState;

/// Create the API router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", api_routes())
        .merge(health::health_routes())
        .merge(events::event_routes())
        .with_state(state)
}

/// API v1 routes
fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/session", session::session_routes())
        .nest("/participants", session::participant_routes())
        .nest("/relays", relays::relay_routes())
}
