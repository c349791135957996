//! Core data types shared by the renderer, relay, and middleware.

use std::time::Duration;

use axum::http::StatusCode;

/// Outcome of a single render attempt.
///
/// Owned by whoever requested the render until it is relayed onto the
/// outbound response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderResult {
    /// Status code to relay (200 on success, 400 on failure).
    pub status: StatusCode,
    /// Response headers in order. Keys are not unique.
    pub headers: Vec<(String, String)>,
    /// Rendered markup, empty on failure.
    pub body: String,
}

impl RenderResult {
    /// A successful snapshot carrying the rendered document.
    pub fn ok(body: String) -> Self {
        Self {
            status: StatusCode::OK,
            headers: vec![(
                "Content-Type".to_string(),
                "text/html; charset=utf-8".to_string(),
            )],
            body,
        }
    }

    /// The fixed failure snapshot: 400, no headers, empty body.
    pub fn failed() -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// All errors that can occur while configuring or running the prerender pipeline.
#[derive(thiserror::Error, Debug)]
pub enum PrerenderError {
    #[error("invalid {list} pattern '{pattern}': {source}")]
    InvalidPattern {
        list: &'static str,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Chromium not found (set PRERENDER_CHROMIUM_PATH or browser.executable)")]
    BrowserNotFound,

    #[error("invalid browser config: {0}")]
    BrowserConfig(String),

    #[error("failed to start render session: {0}")]
    SessionStart(String),

    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("navigation to {url} timed out after {timeout:?}")]
    NavigationTimeout { url: String, timeout: Duration },

    #[error("page source not available within {0:?}")]
    ScriptTimeout(Duration),

    #[error("failed to read page source: {0}")]
    PageSource(String),

    #[error("prerender task panicked: {0}")]
    Panicked(String),
}

pub type PrerenderResult<T> = Result<T, PrerenderError>;
