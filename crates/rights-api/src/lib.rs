//! # rights-api — Licensing Engine and HTTP Service
//!
//! The engine behind the rights licensing platform and a thin Axum surface
//! over it.
//!
//! ## Layout
//!
//! | Module          | Concern                                              |
//! |-----------------|------------------------------------------------------|
//! | [`state`]       | Row-locked in-memory tables and collaborators        |
//! | [`guard`]       | Account standing, roles and ownership checks         |
//! | [`engine`]      | Every licensing operation                            |
//! | [`dispatch`]    | Post-commit side effects with retry and dedup        |
//! | [`notify`]      | Notification events and sinks                        |
//! | [`db`]          | Postgres write-behind and startup hydration          |
//! | [`routes`]      | HTTP handlers                                        |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → MetricsMiddleware → Handler
//! ```

pub mod bootstrap;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod extractors;
pub mod guard;
pub mod middleware;
pub mod notify;
pub mod routes;
pub mod state;

use axum::middleware::from_fn;
use axum::routing::get;
use axum::{Extension, Json, Router};

use crate::middleware::metrics::{ApiMetrics, MetricsSnapshot};
use crate::state::AppState;

/// Assemble the full application router with all routes and middleware.
pub fn app(state: AppState) -> Router {
    let metrics = ApiMetrics::new();

    let api = Router::new()
        .merge(routes::assets::router())
        .merge(routes::licenses::router())
        .merge(routes::products::router())
        .merge(routes::transactions::router())
        .merge(routes::chains::router())
        .route("/metrics", get(metrics_report))
        .layer(from_fn(middleware::metrics::metrics_middleware))
        .layer(middleware::tracing_layer::layer())
        .layer(Extension(metrics))
        .with_state(state);

    let health = Router::new()
        .route("/health/liveness", get(liveness))
        .route("/health/readiness", get(readiness));

    Router::new().merge(health).merge(api)
}

async fn liveness() -> &'static str {
    "ok"
}

async fn readiness() -> &'static str {
    "ready"
}

async fn metrics_report(Extension(metrics): Extension<ApiMetrics>) -> Json<MetricsSnapshot> {
    Json(metrics.snapshot())
}
