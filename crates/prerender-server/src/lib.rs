//! Prerender server: hosts a static single-page application with
//! crawler prerendering in front.

pub mod config;
pub mod logging;
pub mod server;

pub use config::{load_config, resolve_config_path};
pub use server::{build_renderer, router, AppState};
