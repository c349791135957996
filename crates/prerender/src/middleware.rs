//! Axum middleware that intercepts crawler requests.
//!
//! Install with [`axum::middleware::from_fn_with_state`]:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use axum::{middleware, routing::get, Router};
//! use prerender::{NoopRenderer, Prerender, PrerenderConfig, prerender_middleware};
//!
//! let prerender = Arc::new(Prerender::new(
//!     Arc::new(PrerenderConfig::default()),
//!     Arc::new(NoopRenderer),
//! ));
//! let app: Router = Router::new()
//!     .route("/", get(|| async { "app" }))
//!     .layer(middleware::from_fn_with_state(prerender, prerender_middleware));
//! ```
//!
//! Failures never reach the host: anything that goes wrong while
//! classifying, rendering or relaying is logged and the request continues
//! through normal handling. A render that fails cleanly still produces the
//! 400 snapshot response.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::{HeaderMap, HOST, REFERER, USER_AGENT};
use axum::middleware::Next;
use axum::response::Response;
use futures::FutureExt;
use tracing::{debug, info, warn};
use url::Url;

use crate::classifier::{should_prerender, RequestInfo};
use crate::config::PrerenderConfig;
use crate::relay;
use crate::renderer::chromium::RENDERER_MARKER_HEADER;
use crate::renderer::{navigation_url, render, Renderer};
use crate::types::{PrerenderError, PrerenderResult};

/// Shared state for [`prerender_middleware`].
pub struct Prerender {
    config: Arc<PrerenderConfig>,
    renderer: Arc<dyn Renderer>,
}

impl Prerender {
    pub fn new(config: Arc<PrerenderConfig>, renderer: Arc<dyn Renderer>) -> Self {
        Self { config, renderer }
    }

    pub fn config(&self) -> &PrerenderConfig {
        &self.config
    }

    pub fn renderer(&self) -> &Arc<dyn Renderer> {
        &self.renderer
    }

    /// Classify, render and relay.
    ///
    /// `Ok(None)` means the request is not for us. Panics anywhere in the
    /// pipeline come back as [`PrerenderError::Panicked`].
    pub async fn intercept(&self, request: RequestInfo) -> PrerenderResult<Option<Response>> {
        AssertUnwindSafe(self.intercept_inner(request))
            .catch_unwind()
            .await
            .map_err(|panic| PrerenderError::Panicked(panic_message(panic)))
    }

    async fn intercept_inner(&self, request: RequestInfo) -> Option<Response> {
        if !should_prerender(&request, &self.config) {
            return None;
        }

        let target = navigation_url(&request.url, self.config.strip_escaped_fragment());
        info!(
            url = %request.url,
            user_agent = request.user_agent.as_deref().unwrap_or(""),
            "prerendering request"
        );

        let result = render(self.renderer.as_ref(), &target, self.config.timeouts()).await;
        Some(relay::into_response(result))
    }
}

/// Per-request entry point. Returns the snapshot or defers to `next`.
pub async fn prerender_middleware(
    State(prerender): State<Arc<Prerender>>,
    request: Request,
    next: Next,
) -> Response {
    // The renderer navigating back into this application.
    if request.headers().contains_key(RENDERER_MARKER_HEADER) {
        debug!(uri = %request.uri(), "request from renderer; passing through");
        return next.run(request).await;
    }

    let info = match request_info(request.uri(), request.headers(), prerender.config()) {
        Ok(info) => info,
        Err(e) => {
            warn!(uri = %request.uri(), error = %e, "cannot classify request; continuing");
            return next.run(request).await;
        }
    };

    match prerender.intercept(info).await {
        Ok(Some(response)) => response,
        Ok(None) => next.run(request).await,
        Err(e) => {
            warn!(uri = %request.uri(), error = %e, "prerender failed; continuing");
            next.run(request).await
        }
    }
}

/// Rebuild the absolute URL and pull out the headers the classifier needs.
///
/// A configured `public_base_url` always supplies scheme and host, whatever
/// the request line or headers say. Without it the URL comes from an
/// absolute-form request URI, then the `Host` header. Forwarding headers
/// are consulted only when `trust_forwarded_headers` is on.
pub fn request_info(
    uri: &axum::http::Uri,
    headers: &HeaderMap,
    config: &PrerenderConfig,
) -> PrerenderResult<RequestInfo> {
    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");

    let raw = if let Some(base) = config.public_base_url() {
        format!("{}{path_and_query}", base.origin().ascii_serialization())
    } else if let (Some(scheme), Some(authority)) = (uri.scheme_str(), uri.authority()) {
        format!("{scheme}://{authority}{path_and_query}")
    } else {
        let forwarded = |name: &'static str| {
            config
                .trust_forwarded_headers()
                .then(|| first_value(headers, name))
                .flatten()
        };
        let scheme = forwarded("x-forwarded-proto").unwrap_or("http");
        let host = forwarded("x-forwarded-host")
            .or_else(|| first_value(headers, HOST.as_str()))
            .ok_or_else(|| PrerenderError::InvalidUrl {
                url: uri.to_string(),
                reason: "no Host header".into(),
            })?;
        format!("{scheme}://{host}{path_and_query}")
    };

    let url = Url::parse(&raw).map_err(|e| PrerenderError::InvalidUrl {
        url: raw.clone(),
        reason: e.to_string(),
    })?;

    Ok(RequestInfo {
        url,
        user_agent: header_str(headers, USER_AGENT.as_str()).map(str::to_string),
        referer: header_str(headers, REFERER.as_str()).map(str::to_string),
    })
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn first_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    header_str(headers, name)
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
