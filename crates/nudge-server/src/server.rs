use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use nudge_engine::{ChatService, MutationEngine, SessionQueryService};
use nudge_store::NudgeRepo;

use crate::handlers;

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 5000,
            request_timeout: Duration::from_secs(120),
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub mutations: Arc<MutationEngine>,
    pub queries: Arc<SessionQueryService>,
    pub chat: Arc<ChatService>,
    pub nudges: Arc<NudgeRepo>,
}

/// Routes under a session base path.
fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/create", post(handlers::create_session))
        .route("/recent/active", get(handlers::recent_active))
        .route("/owner/{owner_id}", get(handlers::by_owner))
        .route("/user/{owner_id}", get(handlers::by_owner))
        .route("/{session_id}", get(handlers::get_session))
        .route("/{session_id}/stats", get(handlers::get_stats))
        .route("/{session_id}/message", post(handlers::add_message))
        .route("/{session_id}/feedback/{index}", post(handlers::set_feedback))
        .route("/{session_id}/spin/{index}", post(handlers::add_spin))
        .route("/{session_id}/card", post(handlers::add_card))
        .route("/{session_id}/end", post(handlers::end_session))
        .route("/{session_id}/scratchpad-snapshot", post(handlers::add_scratchpad_snapshot))
        .route("/{session_id}/nudge", post(handlers::push_nudge))
}

/// Build the Axum router with all routes.
///
/// Session routes are served under `/api/sessions` and, for older clients,
/// `/api/session`.
pub fn build_router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/chat", post(handlers::chat))
        .nest("/api/sessions", session_routes())
        .nest("/api/session", session_routes())
        .route("/api/nudges", post(handlers::create_nudge))
        .route("/api/nudges/random", get(handlers::random_nudge))
        .route("/api/nudges/{nudge_id}/feedback", post(handlers::nudge_feedback))
        .with_state(state)
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind and serve. Returns once the listener is up.
pub async fn start(config: ServerConfig, state: AppState) -> Result<ServerHandle, std::io::Error> {
    let router = build_router(state, config.request_timeout);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(addr = %local_addr, "nudge server started");

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router)
            .with_graceful_shutdown(signal.cancelled_owned())
            .await
        {
            tracing::error!(error = %e, "server stopped with error");
        }
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        shutdown,
        server,
    })
}

/// Handle returned by `start()`.
pub struct ServerHandle {
    pub port: u16,
    shutdown: CancellationToken,
    server: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    /// Stop accepting connections and wait for in-flight requests to finish.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        let _ = self.server.await;
    }
}
