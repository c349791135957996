//! Prerender configuration: on-disk settings and their compiled, immutable form.
//!
//! Settings are loaded once at process start. Every regular expression is
//! compiled here so that a malformed pattern fails the load instead of a
//! request.

use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;
use url::Url;

use crate::tables;
use crate::types::{PrerenderError, PrerenderResult};

/// Default bound for page load, implicit waits and scripts.
pub const DEFAULT_PAGE_LOAD_SECS: u64 = 60;

/// Default delay between navigation and page-source extraction.
pub const DEFAULT_SETTLE_MS: u64 = 3000;

/// Settings as written in `prerender.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PrerenderSettings {
    pub blacklist: Vec<String>,
    pub whitelist: Vec<String>,
    pub extensions_to_ignore: Vec<String>,
    pub crawler_user_agents: Vec<String>,
    pub proxy: Option<ProxyConfig>,
    pub timeouts: TimeoutSettings,
    /// Drop `_escaped_fragment_` from the URL handed to the browser.
    pub strip_escaped_fragment: bool,
    /// Scheme and authority used to rebuild absolute request URLs. When set,
    /// the browser only ever visits this origin.
    pub public_base_url: Option<String>,
    /// Take scheme and host from `X-Forwarded-Proto`/`X-Forwarded-Host`.
    /// Enable only behind a proxy that overwrites them.
    pub trust_forwarded_headers: bool,
    pub browser: BrowserSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimeoutSettings {
    pub page_load_secs: u64,
    pub settle_ms: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            page_load_secs: DEFAULT_PAGE_LOAD_SECS,
            settle_ms: DEFAULT_SETTLE_MS,
        }
    }
}

/// Headless browser launch options.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BrowserSettings {
    /// Explicit Chromium binary. Discovered automatically when absent.
    pub executable: Option<PathBuf>,
    pub no_sandbox: bool,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            executable: None,
            no_sandbox: true,
        }
    }
}

/// Outbound proxy the browser routes through.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProxyConfig {
    pub url: String,
    pub port: u16,
}

impl ProxyConfig {
    /// `host:port` form for `--proxy-server`.
    pub fn server_arg(&self) -> String {
        format!("{}:{}", self.url.trim(), self.port)
    }
}

/// Timeouts applied to every render session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTimeouts {
    pub page_load: Duration,
    pub implicit_wait: Duration,
    pub script: Duration,
    /// Settle delay after navigation, for deferred client-side rendering.
    pub settle: Duration,
}

impl RenderTimeouts {
    /// Page load, implicit wait and script timeouts all share one bound.
    pub fn uniform(bound: Duration, settle: Duration) -> Self {
        Self {
            page_load: bound,
            implicit_wait: bound,
            script: bound,
            settle,
        }
    }
}

impl Default for RenderTimeouts {
    fn default() -> Self {
        Self::uniform(
            Duration::from_secs(DEFAULT_PAGE_LOAD_SECS),
            Duration::from_millis(DEFAULT_SETTLE_MS),
        )
    }
}

impl From<&TimeoutSettings> for RenderTimeouts {
    fn from(s: &TimeoutSettings) -> Self {
        Self::uniform(
            Duration::from_secs(s.page_load_secs),
            Duration::from_millis(s.settle_ms),
        )
    }
}

/// Compiled, read-only configuration for the process lifetime.
#[derive(Debug, Clone)]
pub struct PrerenderConfig {
    pub(crate) blacklist: Vec<Regex>,
    pub(crate) whitelist: Vec<Regex>,
    pub(crate) extensions_to_ignore: Vec<String>,
    pub(crate) crawler_user_agents: Vec<String>,
    proxy: Option<ProxyConfig>,
    timeouts: RenderTimeouts,
    strip_escaped_fragment: bool,
    public_base_url: Option<Url>,
    trust_forwarded_headers: bool,
    browser: BrowserSettings,
}

impl Default for PrerenderConfig {
    fn default() -> Self {
        Self {
            blacklist: Vec::new(),
            whitelist: Vec::new(),
            extensions_to_ignore: tables::extensions_to_ignore(&[]),
            crawler_user_agents: tables::crawler_user_agents(&[]),
            proxy: None,
            timeouts: RenderTimeouts::default(),
            strip_escaped_fragment: false,
            public_base_url: None,
            trust_forwarded_headers: false,
            browser: BrowserSettings::default(),
        }
    }
}

impl PrerenderConfig {
    /// Read and compile a TOML settings file.
    pub fn load(path: &Path) -> PrerenderResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> PrerenderResult<Self> {
        let settings: PrerenderSettings = toml::from_str(raw)?;
        Self::from_settings(settings)
    }

    /// Compile settings, failing on the first malformed pattern or URL.
    pub fn from_settings(settings: PrerenderSettings) -> PrerenderResult<Self> {
        let blacklist = compile_patterns("blacklist", &settings.blacklist)?;
        let whitelist = compile_patterns("whitelist", &settings.whitelist)?;

        let public_base_url = settings
            .public_base_url
            .as_deref()
            .map(|raw| {
                Url::parse(raw).map_err(|e| PrerenderError::InvalidUrl {
                    url: raw.to_string(),
                    reason: e.to_string(),
                })
            })
            .transpose()?;

        let proxy = settings.proxy.filter(|p| !p.url.trim().is_empty());

        Ok(Self {
            blacklist,
            whitelist,
            extensions_to_ignore: tables::extensions_to_ignore(&settings.extensions_to_ignore),
            crawler_user_agents: tables::crawler_user_agents(&settings.crawler_user_agents),
            proxy,
            timeouts: RenderTimeouts::from(&settings.timeouts),
            strip_escaped_fragment: settings.strip_escaped_fragment,
            public_base_url,
            trust_forwarded_headers: settings.trust_forwarded_headers,
            browser: settings.browser,
        })
    }

    pub fn proxy(&self) -> Option<&ProxyConfig> {
        self.proxy.as_ref()
    }

    pub fn timeouts(&self) -> &RenderTimeouts {
        &self.timeouts
    }

    pub fn strip_escaped_fragment(&self) -> bool {
        self.strip_escaped_fragment
    }

    pub fn public_base_url(&self) -> Option<&Url> {
        self.public_base_url.as_ref()
    }

    pub fn trust_forwarded_headers(&self) -> bool {
        self.trust_forwarded_headers
    }

    pub fn browser(&self) -> &BrowserSettings {
        &self.browser
    }

    pub fn blacklist_len(&self) -> usize {
        self.blacklist.len()
    }

    pub fn whitelist_len(&self) -> usize {
        self.whitelist.len()
    }

    pub fn crawler_user_agents(&self) -> &[String] {
        &self.crawler_user_agents
    }

    pub fn extensions_to_ignore(&self) -> &[String] {
        &self.extensions_to_ignore
    }
}

fn compile_patterns(list: &'static str, patterns: &[String]) -> PrerenderResult<Vec<Regex>> {
    patterns
        .iter()
        .map(|pattern| {
            Regex::new(pattern).map_err(|source| PrerenderError::InvalidPattern {
                list,
                pattern: pattern.clone(),
                source,
            })
        })
        .collect()
}
