use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use roomrelay::api;
use roomrelay::config::Config;
use roomrelay::session::{
    spawn_session, ActorSettings, EventPublisher, ParticipantRegistry, SessionManager,
};
use roomrelay::signaling::{self, SignalingConnection};
use roomrelay::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    tracing::info!("Starting roomrelay...");

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!(
        host = %config.control_host,
        port = %config.control_port,
        signaling_url = %config.signaling_url,
        "Configuration loaded"
    );

    // Connect to the signaling server
    let SignalingConnection {
        transport,
        inbound,
        tasks: socket_tasks,
    } = signaling::connect(&config.signaling_url).await?;

    // Start the session actor
    let events = EventPublisher::new(config.event_buffer);
    let participants = Arc::new(ParticipantRegistry::new());
    let manager = SessionManager::new(
        config.display_name.clone(),
        Arc::new(transport),
        participants.clone(),
        events.clone(),
    );
    let (session, session_task) = spawn_session(manager, inbound, ActorSettings::from(&config));
    tracing::info!("Session actor initialized");

    // Create application state
    let state = AppState::new(config.clone(), session, participants, events);

    // Build router
    let app = Router::new()
        .merge(api::create_router(state))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr: SocketAddr = config.control_addr().parse()?;
    let listener = TcpListener::bind(addr).await?;

    tracing::info!(address = %addr, "Control API listening");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    session_task.abort();
    socket_tasks.abort();
    tracing::info!("Shutdown complete");

    Ok(())
}

/// Handle shutdown signals
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, shutting down...");
        },
    }
}
