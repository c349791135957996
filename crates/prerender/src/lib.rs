//! Prerender: serve headless-browser snapshots to search-engine crawlers.
//!
//! Requests are classified in-process; only crawler traffic (or requests
//! carrying `_escaped_fragment_`) is routed through a fresh headless
//! Chromium session and answered with the rendered markup.

pub mod classifier;
pub mod config;
pub mod middleware;
pub mod relay;
pub mod renderer;
pub mod tables;
pub mod types;

pub use classifier::{should_prerender, RequestInfo};
pub use config::{PrerenderConfig, PrerenderSettings, ProxyConfig, RenderTimeouts};
pub use middleware::{prerender_middleware, Prerender};
pub use renderer::chromium::{ChromiumRenderer, RENDERER_MARKER_HEADER};
pub use renderer::{render, NoopRenderer, RenderSession, Renderer};
pub use types::*;
