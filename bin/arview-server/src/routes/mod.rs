//! Axum router construction.
//!
//! [`build`] assembles the complete application router, including:
//! - Middleware layers (CORS, per-request trace-ID spans)
//! - Optional Swagger UI / OpenAPI spec endpoint (disable with `ARVIEW_ENABLE_SWAGGER=false`)
//! - Health route, model registry routes and the QR route
//! - Static files from `ARVIEW_STATIC_DIR` for every other path

pub mod doc;
mod health;
mod models;
mod qr;

use std::sync::Arc;

use axum::{Router, middleware};
use tower_http::services::ServeDir;
use tracing::info;
use utoipa_swagger_ui::SwaggerUi;

use crate::middleware::{cors, trace};
use crate::state::AppState;

// ── Router builder ────────────────────────────────────────────────────────────

/// Build the complete Axum [`Router`] for the application.
pub fn build(state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .merge(health::router::<Arc<AppState>>())
        .merge(models::router(state.config.max_upload_bytes))
        .merge(qr::router());

    let mut app = Router::new().merge(api_router);

    if state.config.enable_swagger {
        app = app.merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", doc::get_docs()));
    }

    if let Some(dir) = &state.config.static_dir {
        info!(dir = %dir.display(), "serving static files");
        app = app.fallback_service(ServeDir::new(dir));
    }

    app
        // Outermost layers execute first on the way in.
        .layer(cors::cors_layer(&state.config))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            trace::trace_middleware,
        ))
        .with_state(state)
}

// ── Tests ──────────────────────────────────────────────────────────────────────
