//! Renderer abstraction for headless-browser snapshots.
//!
//! Defines the `Renderer` and `RenderSession` traits that abstract over
//! the browser engine (currently Chromium via chromiumoxide), and the
//! [`render`] driver that turns one URL into one [`RenderResult`].

pub mod chromium;

use std::time::Instant;

use async_trait::async_trait;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::RenderTimeouts;
use crate::tables::ESCAPED_FRAGMENT;
use crate::types::{PrerenderError, PrerenderResult, RenderResult};

/// A browser engine that hands out isolated render sessions.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Open a fresh session configured with `timeouts`.
    async fn open_session(
        &self,
        timeouts: &RenderTimeouts,
    ) -> PrerenderResult<Box<dyn RenderSession>>;
    /// Number of sessions opened and not yet closed.
    fn active_sessions(&self) -> usize;
}

/// One browser session. Never shared across requests.
#[async_trait]
pub trait RenderSession: Send {
    /// Navigate to an absolute URL and wait for the load to finish.
    async fn navigate(&mut self, url: &str) -> PrerenderResult<()>;
    /// Serialized markup of the current document.
    async fn page_source(&mut self) -> PrerenderResult<String>;
    /// Close the session and terminate its browser process.
    async fn close(self: Box<Self>) -> PrerenderResult<()>;
}

/// Render `url` in a new session.
///
/// Never fails: any error becomes [`RenderResult::failed`]. The session is
/// closed before returning on every path.
pub async fn render(renderer: &dyn Renderer, url: &Url, timeouts: &RenderTimeouts) -> RenderResult {
    let start = Instant::now();

    let mut session = match timeout(timeouts.page_load, renderer.open_session(timeouts)).await {
        Ok(Ok(session)) => session,
        Ok(Err(e)) => {
            warn!(url = %url, error = %e, "render session failed to start");
            return RenderResult::failed();
        }
        Err(_) => {
            warn!(url = %url, timeout = ?timeouts.page_load, "render session start timed out");
            return RenderResult::failed();
        }
    };

    let outcome = snapshot(session.as_mut(), url, timeouts).await;

    if let Err(e) = session.close().await {
        warn!(url = %url, error = %e, "failed to close render session");
    }

    let elapsed_ms = start.elapsed().as_millis() as u64;
    match outcome {
        Ok(html) => {
            info!(url = %url, elapsed_ms, bytes = html.len(), "rendered snapshot");
            RenderResult::ok(html)
        }
        Err(e) => {
            warn!(url = %url, elapsed_ms, error = %e, "render failed");
            RenderResult::failed()
        }
    }
}

async fn snapshot(
    session: &mut dyn RenderSession,
    url: &Url,
    timeouts: &RenderTimeouts,
) -> PrerenderResult<String> {
    timeout(timeouts.page_load, session.navigate(url.as_str()))
        .await
        .map_err(|_| PrerenderError::NavigationTimeout {
            url: url.to_string(),
            timeout: timeouts.page_load,
        })??;

    if !timeouts.settle.is_zero() {
        debug!(url = %url, settle = ?timeouts.settle, "waiting for client-side rendering");
        sleep(timeouts.settle).await;
    }

    timeout(timeouts.script, session.page_source())
        .await
        .map_err(|_| PrerenderError::ScriptTimeout(timeouts.script))?
}

/// URL handed to the browser for a classified request.
pub fn navigation_url(url: &Url, strip_escaped_fragment: bool) -> Url {
    if strip_escaped_fragment {
        strip_query_key(url, ESCAPED_FRAGMENT)
    } else {
        url.clone()
    }
}

/// Remove every `key` pair from the query, dropping the `?` when nothing is left.
pub fn strip_query_key(url: &Url, key: &str) -> Url {
    if !url.query_pairs().any(|(k, _)| k == key) {
        return url.clone();
    }

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != key)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut stripped = url.clone();
    if kept.is_empty() {
        stripped.set_query(None);
    } else {
        stripped.query_pairs_mut().clear().extend_pairs(kept);
    }
    stripped
}

/// A no-op renderer used when Chromium is unavailable.
///
/// Classification still runs; every classified request receives the
/// failure snapshot.
pub struct NoopRenderer;

#[async_trait]
impl Renderer for NoopRenderer {
    async fn open_session(
        &self,
        _timeouts: &RenderTimeouts,
    ) -> PrerenderResult<Box<dyn RenderSession>> {
        Err(PrerenderError::BrowserNotFound)
    }

    fn active_sessions(&self) -> usize {
        0
    }
}
