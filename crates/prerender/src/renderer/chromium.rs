//! Chromium-based renderer using chromiumoxide.
//!
//! Every session launches its own headless Chromium process with a
//! throwaway profile directory. Nothing is pooled: closing the session
//! terminates the process and removes the profile.
//!
//! Requests the page sends to the origin being rendered carry
//! [`RENDERER_MARKER_HEADER`] and `Cache-Control: no-cache`. Cross-origin
//! requests go out unchanged, so third-party APIs never see non-safelisted
//! headers and no extra CORS preflight is triggered.

use super::{RenderSession, Renderer};
use crate::config::{PrerenderConfig, RenderTimeouts};
use crate::types::{PrerenderError, PrerenderResult};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::fetch::{
    ContinueRequestParams, EnableParams, EventRequestPaused, HeaderEntry, RequestPattern,
};
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::{Origin, Url};

/// Header the renderer adds to its own requests so the middleware can
/// recognise them and let them through.
pub const RENDERER_MARKER_HEADER: &str = "X-Prerender";

/// Find the Chromium binary path.
pub fn find_chromium(explicit: Option<&Path>) -> Option<PathBuf> {
    // 1. configured executable
    if let Some(path) = explicit {
        if path.exists() {
            return Some(path.to_path_buf());
        }
        warn!(path = %path.display(), "configured Chromium executable does not exist");
    }

    // 2. PRERENDER_CHROMIUM_PATH env
    if let Ok(p) = std::env::var("PRERENDER_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 3. System PATH
    for name in [
        "chromium",
        "chromium-browser",
        "google-chrome",
        "google-chrome-stable",
    ] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 4. Common macOS location
    if cfg!(target_os = "macos") {
        let common =
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Launches one headless Chromium per render session.
pub struct ChromiumRenderer {
    executable: PathBuf,
    proxy_server: Option<String>,
    no_sandbox: bool,
    active_count: Arc<AtomicUsize>,
}

impl ChromiumRenderer {
    /// Resolve the browser binary. No process is started until a session opens.
    pub fn new(config: &PrerenderConfig) -> PrerenderResult<Self> {
        let executable = find_chromium(config.browser().executable.as_deref())
            .ok_or(PrerenderError::BrowserNotFound)?;
        Ok(Self::with_executable(executable, config))
    }

    fn with_executable(executable: PathBuf, config: &PrerenderConfig) -> Self {
        Self {
            executable,
            proxy_server: config.proxy().map(|p| p.server_arg()),
            no_sandbox: config.browser().no_sandbox,
            active_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    fn browser_config(
        &self,
        profile: &Path,
        timeouts: &RenderTimeouts,
    ) -> PrerenderResult<BrowserConfig> {
        let mut builder = BrowserConfig::builder()
            .chrome_executable(&self.executable)
            .user_data_dir(profile)
            .request_timeout(timeouts.implicit_wait)
            .launch_timeout(timeouts.page_load)
            .args(self.launch_args());

        if self.no_sandbox {
            builder = builder.no_sandbox();
        }

        builder.build().map_err(PrerenderError::BrowserConfig)
    }

    /// Extra command-line switches for every launch.
    fn launch_args(&self) -> Vec<String> {
        let mut args: Vec<String> = [
            "--headless=new",
            "--disable-gpu",
            "--disable-dev-shm-usage",
            "--disable-extensions",
            "--disable-background-networking",
            "--no-first-run",
        ]
        .into_iter()
        .map(String::from)
        .collect();

        if let Some(proxy) = &self.proxy_server {
            args.push(format!("--proxy-server={proxy}"));
        }
        args
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn open_session(
        &self,
        timeouts: &RenderTimeouts,
    ) -> PrerenderResult<Box<dyn RenderSession>> {
        let profile = tempfile::Builder::new()
            .prefix("prerender-profile-")
            .tempdir()?;
        let config = self.browser_config(profile.path(), timeouts)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| PrerenderError::SessionStart(format!("failed to launch Chromium: {e}")))?;

        // Spawn the handler task
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        self.active_count.fetch_add(1, Ordering::Relaxed);
        let mut session = ChromiumSession {
            browser,
            page: None,
            handler_task,
            interceptor: None,
            _profile: profile,
            active_count: Arc::clone(&self.active_count),
            released: false,
        };

        if let Err(e) = session.open_page().await {
            if let Err(close_err) = Box::new(session).close().await {
                warn!(error = %close_err, "failed to close half-open render session");
            }
            return Err(e);
        }

        debug!(executable = %self.executable.display(), "render session opened");
        Ok(Box::new(session))
    }

    fn active_sessions(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }
}

/// A single Chromium process with one page.
pub struct ChromiumSession {
    browser: Browser,
    page: Option<Page>,
    handler_task: JoinHandle<()>,
    /// Continues paused requests, marking same-origin ones.
    interceptor: Option<JoinHandle<()>>,
    _profile: TempDir,
    active_count: Arc<AtomicUsize>,
    released: bool,
}

impl ChromiumSession {
    async fn open_page(&mut self) -> PrerenderResult<()> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| PrerenderError::SessionStart(format!("failed to create page: {e}")))?;

        self.page = Some(page);
        Ok(())
    }

    /// Pause every request and continue it, adding the marker headers only
    /// when it targets `origin`.
    async fn intercept_requests(&mut self, origin: Origin) -> PrerenderResult<()> {
        let page = self.page()?.clone();

        let mut paused = page
            .event_listener::<EventRequestPaused>()
            .await
            .map_err(|e| PrerenderError::SessionStart(format!("failed to listen for requests: {e}")))?;
        page.execute(
            EnableParams::builder()
                .pattern(RequestPattern::builder().url_pattern("*").build())
                .build(),
        )
        .await
        .map_err(|e| PrerenderError::SessionStart(format!("failed to enable interception: {e}")))?;

        self.interceptor = Some(tokio::spawn(async move {
            while let Some(event) = paused.next().await {
                let mut params = ContinueRequestParams::new(event.request_id.clone());
                params.headers =
                    marked_headers(&event.request.url, event.request.headers.inner(), &origin);
                if let Err(e) = page.execute(params).await {
                    debug!(url = %event.request.url, error = %e, "failed to continue request");
                }
            }
        }));
        Ok(())
    }

    fn page(&self) -> PrerenderResult<&Page> {
        self.page
            .as_ref()
            .ok_or_else(|| PrerenderError::SessionStart("page not open".into()))
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.handler_task.abort();
            if let Some(interceptor) = self.interceptor.take() {
                interceptor.abort();
            }
            self.active_count.fetch_sub(1, Ordering::Relaxed);
        }
    }
}

#[async_trait]
impl RenderSession for ChromiumSession {
    async fn navigate(&mut self, url: &str) -> PrerenderResult<()> {
        let target = Url::parse(url).map_err(|e| PrerenderError::Navigation {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        if self.interceptor.is_none() {
            self.intercept_requests(target.origin()).await?;
        }

        self.page()?
            .goto(url)
            .await
            .map_err(|e| PrerenderError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    async fn page_source(&mut self) -> PrerenderResult<String> {
        self.page()?
            .content()
            .await
            .map_err(|e| PrerenderError::PageSource(e.to_string()))
    }

    async fn close(self: Box<Self>) -> PrerenderResult<()> {
        let mut this = self;

        if let Some(page) = this.page.take() {
            if let Err(e) = page.close().await {
                debug!(error = %e, "page close failed");
            }
        }

        let result = match this.browser.close().await {
            Ok(_) => this.browser.wait().await.map(|_| ()).map_err(PrerenderError::Io),
            Err(e) => {
                warn!(error = %e, "browser close failed; killing process");
                match this.browser.kill().await {
                    Some(Err(e)) => Err(PrerenderError::Io(e)),
                    _ => Ok(()),
                }
            }
        };

        this.release();
        result
    }
}

/// Header overrides for a paused request: the page's own headers plus the
/// marker pair when the request targets `origin`, otherwise `None` so the
/// request continues untouched.
fn marked_headers(
    request_url: &str,
    headers: &serde_json::Value,
    origin: &Origin,
) -> Option<Vec<HeaderEntry>> {
    let same_origin = Url::parse(request_url)
        .map(|url| url.origin() == *origin)
        .unwrap_or(false);
    if !same_origin {
        return None;
    }

    let mut entries: Vec<HeaderEntry> = headers
        .as_object()
        .into_iter()
        .flatten()
        .filter(|(name, _)| {
            !name.eq_ignore_ascii_case("cache-control")
                && !name.eq_ignore_ascii_case(RENDERER_MARKER_HEADER)
        })
        .filter_map(|(name, value)| value.as_str().map(|v| HeaderEntry::new(name.clone(), v)))
        .collect();
    entries.push(HeaderEntry::new("Cache-Control", "no-cache"));
    entries.push(HeaderEntry::new(RENDERER_MARKER_HEADER, "1"));
    Some(entries)
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        // The child process is spawned with kill-on-drop, so dropping
        // `browser` terminates it.
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::render;
    use std::time::Duration;
    use url::Url;

    #[test]
    fn missing_explicit_executable_falls_through() {
        let found = find_chromium(Some(Path::new("/nonexistent/chrome")));
        assert_ne!(found.as_deref(), Some(Path::new("/nonexistent/chrome")));
    }

    fn header<'a>(entries: &'a [HeaderEntry], name: &str) -> Option<&'a str> {
        entries
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(name))
            .map(|e| e.value.as_str())
    }

    #[test]
    fn proxy_and_sandbox_settings_reach_the_launch() {
        let config = PrerenderConfig::from_toml(
            r#"
            [proxy]
            url = "proxy.internal"
            port = 3128

            [browser]
            no_sandbox = false
            "#,
        )
        .unwrap();
        let renderer = ChromiumRenderer::with_executable(PathBuf::from("/usr/bin/chromium"), &config);

        let args = renderer.launch_args();
        assert!(args.contains(&"--proxy-server=proxy.internal:3128".to_string()));
        assert!(args.contains(&"--headless=new".to_string()));
        assert!(!renderer.no_sandbox);

        let profile = tempfile::tempdir().unwrap();
        let browser = renderer
            .browser_config(profile.path(), &RenderTimeouts::default())
            .unwrap();
        assert_eq!(browser.user_data_dir.as_deref(), Some(profile.path()));
    }

    #[test]
    fn default_launch_runs_without_sandbox_or_proxy() {
        let renderer = ChromiumRenderer::with_executable(
            PathBuf::from("/usr/bin/chromium"),
            &PrerenderConfig::default(),
        );
        assert!(renderer.no_sandbox);
        assert!(!renderer
            .launch_args()
            .iter()
            .any(|arg| arg.starts_with("--proxy-server")));
    }

    #[test]
    fn same_origin_requests_get_marker_headers() {
        let origin = Url::parse("https://shop.example/products/42").unwrap().origin();
        let page_headers = serde_json::json!({
            "Accept": "text/html",
            "cache-control": "max-age=0",
        });

        let entries =
            marked_headers("https://shop.example/app.js", &page_headers, &origin).unwrap();
        assert_eq!(header(&entries, RENDERER_MARKER_HEADER), Some("1"));
        assert_eq!(header(&entries, "Cache-Control"), Some("no-cache"));
        assert_eq!(header(&entries, "Accept"), Some("text/html"));
        assert_eq!(
            entries
                .iter()
                .filter(|e| e.name.eq_ignore_ascii_case("cache-control"))
                .count(),
            1
        );
    }

    #[test]
    fn cross_origin_requests_are_left_alone() {
        let origin = Url::parse("https://shop.example/").unwrap().origin();
        let page_headers = serde_json::json!({ "Accept": "application/json" });

        assert!(marked_headers("https://api.thirdparty.example/v1", &page_headers, &origin).is_none());
        assert!(marked_headers("http://shop.example/", &page_headers, &origin).is_none());
        assert!(marked_headers("https://shop.example:8443/", &page_headers, &origin).is_none());
        assert!(marked_headers("data:text/plain,hi", &page_headers, &origin).is_none());
    }

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn test_chromium_render_data_url() {
        let renderer =
            ChromiumRenderer::new(&PrerenderConfig::default()).expect("failed to find Chromium");
        let timeouts = RenderTimeouts::uniform(Duration::from_secs(30), Duration::ZERO);

        let url = Url::parse("data:text/html,<h1>Hello</h1><script>document.body.append('World')</script>")
            .unwrap();
        let result = render(&renderer, &url, &timeouts).await;

        assert_eq!(result.status.as_u16(), 200);
        assert!(result.body.contains("<h1>Hello</h1>"));
        assert!(result.body.contains("World"));
        assert_eq!(renderer.active_sessions(), 0);
    }
}
