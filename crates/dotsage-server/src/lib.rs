// Library root: application state, router construction and the serve loop.
//
// Kept separate from main.rs so integration tests can drive the router
// in-process.

pub mod error;
pub mod routes;

use std::sync::Arc;

use anyhow::Context;
use axum::{
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        Method,
    },
    routing::{get, post},
    Router,
};
use dotsage_core::config::Config;
use dotsage_core::ledger::QuestionLedger;
use dotsage_core::protocol::LedgerEvent;
use dotsage_llm::Answerer;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Buffered ledger events per feed subscriber before it starts lagging.
pub const EVENT_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

/// Shared handles every handler needs. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub ledger: Arc<QuestionLedger>,
    pub answerer: Arc<dyn Answerer>,
    /// Publishes ledger writes to the event feed.
    pub events: broadcast::Sender<LedgerEvent>,
}

impl AppState {
    pub fn new(config: Config, ledger: QuestionLedger, answerer: Arc<dyn Answerer>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            config: Arc::new(config),
            ledger: Arc::new(ledger),
            answerer,
            events,
        }
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION]);

    Router::new()
        .route("/ask", post(routes::ask))
        .route("/ask/stream", post(routes::ask_stream))
        .route(
            "/questions",
            get(routes::list_questions).post(routes::create_question),
        )
        .route("/questions/:id", get(routes::get_question))
        .route("/questions/:id/answer", get(routes::question_answer))
        .route("/questions/:id/share", get(routes::share_question))
        .route("/questions/:id/vote", post(routes::vote))
        .route("/explore", get(routes::explore_questions))
        .route("/analytics", get(routes::site_analytics))
        .route("/users/:address", get(routes::user_profile))
        .route("/health", get(routes::health))
        .fallback(routes::not_found)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Serving
// ---------------------------------------------------------------------------

/// Serve the API on `listener` until Ctrl+C or SIGTERM.
pub async fn serve(listener: TcpListener, state: AppState) -> anyhow::Result<()> {
    let app = build_router(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                warn!("Failed to install Ctrl+C handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
