//! Configuration file resolution and loading.

use std::path::PathBuf;

use anyhow::{Context, Result};
use prerender::PrerenderConfig;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "PRERENDER_CONFIG";

/// Resolve the config file path.
///
/// An explicit path is returned even if it does not exist, so that loading
/// reports it. Discovered paths are only returned when present.
pub fn resolve_config_path(explicit: Option<&str>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(PathBuf::from(path));
    }

    if let Ok(env_path) = std::env::var(CONFIG_ENV) {
        return Some(PathBuf::from(env_path));
    }

    let cwd_config = PathBuf::from("prerender.toml");
    if cwd_config.exists() {
        return Some(cwd_config);
    }

    resolve_default_config_path().filter(|p| p.exists())
}

fn resolve_default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("prerender").join("prerender.toml"))
}

/// Load the resolved config, or defaults when no file is found.
pub fn load_config(explicit: Option<&str>) -> Result<(PrerenderConfig, Option<PathBuf>)> {
    match resolve_config_path(explicit) {
        Some(path) => {
            let config = PrerenderConfig::load(&path)
                .with_context(|| format!("failed to load config {}", path.display()))?;
            Ok((config, Some(path)))
        }
        None => Ok((PrerenderConfig::default(), None)),
    }
}
