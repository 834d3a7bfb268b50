//! `carpark serve` -- HTTP JSON API server for the parking engine.
//!
//! Maps the REST surface onto [`carpark_engine::ParkingService`] running
//! over the in-memory store. The store handle is built once here and
//! injected into the service; nothing in the process holds global state.
//!
//! Endpoints:
//! - POST /parking/generate-spaces      - Regenerate the lot
//! - GET  /parking/spaces               - List spaces (zone/status filters)
//! - GET  /parking/spaces/{number}      - One space
//! - POST /parking/reserve              - Reserve a free space
//! - POST /parking/occupy               - Occupy a space
//! - POST /parking/free                 - Free a space
//! - POST /parking/cancel-reservation   - Cancel a reservation
//! - POST /parking/out-of-service       - Withdraw a space
//! - POST /parking/in-service           - Restore a space
//! - GET  /parking/history/{number}     - Per-space history
//! - GET  /parking/history              - Paginated global history
//! - POST /parking/cleanup-expired      - Run the expiry sweeper
//! - POST /sessions                     - Start a session
//! - PUT  /sessions/{id}/end            - End a session
//! - GET  /sessions/{id}, GET /sessions - Session queries
//! - GET  /alerts, PUT /alerts/{id}/read- Operator alerts
//! - GET  /stats, GET /health           - Occupancy stats, liveness
//!
//! All responses use Content-Type: application/json.

mod error;
mod handlers;
mod sessions;
mod state;

use std::sync::Arc;
use std::time::Duration;

use axum::http::Method;
use axum::routing::{get, post, put};
use axum::Router;
use time::OffsetDateTime;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use carpark_engine::ParkingService;
use carpark_storage::MemoryStore;

use self::handlers::{
    handle_cancel_reservation, handle_cleanup_expired, handle_free, handle_generate,
    handle_get_space, handle_health, handle_history, handle_in_service, handle_list_spaces,
    handle_not_found, handle_occupy, handle_out_of_service, handle_reserve, handle_space_history,
};
use self::sessions::{
    handle_end_session, handle_get_session, handle_list_alerts, handle_list_sessions,
    handle_mark_alert_read, handle_start_session, handle_stats,
};
use self::state::AppState;

pub(crate) struct ServeOptions {
    pub port: u16,
    /// Seed the lot with this many spaces before serving.
    pub generate: Option<usize>,
    pub zones: usize,
    /// Background sweep period in seconds; 0 leaves expiry on demand only.
    pub sweep_interval: u64,
}

/// Build the API router over the given shared state.
pub(crate) fn router(state: Arc<AppState>) -> Router {
    // CORS: permissive for local dev.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers(Any);

    Router::new()
        .route("/parking/generate-spaces", post(handle_generate))
        .route("/parking/spaces", get(handle_list_spaces))
        .route("/parking/spaces/{number}", get(handle_get_space))
        .route("/parking/reserve", post(handle_reserve))
        .route("/parking/occupy", post(handle_occupy))
        .route("/parking/free", post(handle_free))
        .route("/parking/cancel-reservation", post(handle_cancel_reservation))
        .route("/parking/out-of-service", post(handle_out_of_service))
        .route("/parking/in-service", post(handle_in_service))
        .route("/parking/history", get(handle_history))
        .route("/parking/history/{number}", get(handle_space_history))
        .route("/parking/cleanup-expired", post(handle_cleanup_expired))
        .route("/sessions", post(handle_start_session).get(handle_list_sessions))
        .route("/sessions/{id}", get(handle_get_session))
        .route("/sessions/{id}/end", put(handle_end_session))
        .route("/alerts", get(handle_list_alerts))
        .route("/alerts/{id}/read", put(handle_mark_alert_read))
        .route("/stats", get(handle_stats))
        .route("/health", get(handle_health))
        .fallback(handle_not_found)
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server, optionally seeding the lot and running a
/// periodic background sweep.
pub(crate) async fn start_server(opts: ServeOptions) -> Result<(), Box<dyn std::error::Error>> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let store = Arc::new(MemoryStore::new());
    let service = ParkingService::new(store);

    if let Some(total) = opts.generate {
        let spaces = service.generate(total, opts.zones).await?;
        info!(total = spaces.len(), zones = opts.zones, "seeded parking lot");
    }

    if opts.sweep_interval > 0 {
        let sweeper = service.clone();
        let period = Duration::from_secs(opts.sweep_interval);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await; // immediate first tick
            loop {
                interval.tick().await;
                match sweeper.sweep_expired(OffsetDateTime::now_utc()).await {
                    Ok(outcome) if outcome.freed > 0 => {
                        info!(freed = outcome.freed, "background sweep freed spaces");
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "background sweep failed"),
                }
            }
        });
        info!(period_secs = opts.sweep_interval, "background sweeper enabled");
    }

    let state = Arc::new(AppState { service });
    let app = router(state);

    let address = format!("0.0.0.0:{}", opts.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!("carpark listening on http://{address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server shut down");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
        info!("received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
        info!("received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
