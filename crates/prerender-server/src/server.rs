//! HTTP host: static SPA files, `/health`, and the prerender middleware.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::{
    extract::State,
    middleware,
    response::Json as AxumJson,
    routing::get,
    Router,
};
use prerender::{prerender_middleware, ChromiumRenderer, NoopRenderer, Prerender, PrerenderConfig, Renderer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared server state passed to handlers via axum State.
pub struct AppState {
    pub prerender: Arc<Prerender>,
    pub started_at: Instant,
}

/// Chromium when available, otherwise the no-op renderer.
pub fn build_renderer(config: &PrerenderConfig) -> Arc<dyn Renderer> {
    match ChromiumRenderer::new(config) {
        Ok(renderer) => {
            info!(executable = %renderer.executable().display(), "Chromium renderer initialized");
            Arc::new(renderer)
        }
        Err(e) => {
            warn!("{e}");
            warn!("crawler requests will receive the 400 failure snapshot");
            Arc::new(NoopRenderer)
        }
    }
}

/// Build the router: files under `root` with `index.html` as the SPA fallback.
pub fn router(prerender: Arc<Prerender>, root: &Path) -> Router {
    let state = Arc::new(AppState {
        prerender: Arc::clone(&prerender),
        started_at: Instant::now(),
    });

    let spa = ServeDir::new(root).fallback(ServeFile::new(root.join("index.html")));

    Router::new()
        .route("/health", get(handle_health))
        .fallback_service(spa)
        .layer(middleware::from_fn_with_state(prerender, prerender_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve `app` on `addr` until Ctrl-C.
pub async fn run(addr: &str, app: Router) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!("prerender server listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("prerender server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
}

/// Health check endpoint.
async fn handle_health(State(state): State<Arc<AppState>>) -> AxumJson<serde_json::Value> {
    let config = state.prerender.config();
    AxumJson(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "active_render_sessions": state.prerender.renderer().active_sessions(),
        "blacklist_patterns": config.blacklist_len(),
        "whitelist_patterns": config.whitelist_len(),
    }))
}
