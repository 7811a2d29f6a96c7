//! routewarden-api — the read-only reporting surface over the watchdog.
//!
//! Thin JSON serializers over the core's snapshot API. These handlers never
//! block on, or are blocked by, the supervision loops: every query is an
//! atomic read of runner state.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/livez` | Process liveness, always `ok` |
//! | GET | `/readyz` | Readiness; 503 when a critical target is not up |
//! | GET | `/api/v1/targets` | Snapshots of all supervised targets |
//! | GET | `/api/v1/targets/{name}` | Snapshot of one target |

pub mod handlers;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use routewarden_core::Watchdog;

/// Build the reporting router over a shared watchdog.
pub fn build_router(watchdog: Arc<Watchdog>) -> Router {
    let api_routes = Router::new()
        .route("/targets", get(handlers::list_targets))
        .route("/targets/{name}", get(handlers::get_target))
        .with_state(watchdog.clone());

    Router::new()
        .route("/livez", get(handlers::livez))
        .route("/readyz", get(handlers::readyz).with_state(watchdog))
        .nest("/api/v1", api_routes)
}
