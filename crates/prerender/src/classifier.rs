//! Decides whether a request should receive a prerendered snapshot.
//!
//! Classification is pure: no I/O, no caching, no hidden state. Rules are
//! applied in a fixed order and the first one that matches wins.

use percent_encoding::percent_decode_str;
use url::Url;

use crate::config::PrerenderConfig;
use crate::tables::ESCAPED_FRAGMENT;

/// The parts of an inbound request the classifier looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestInfo {
    /// Absolute request URL, including the query string.
    pub url: Url,
    pub user_agent: Option<String>,
    pub referer: Option<String>,
}

impl RequestInfo {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            user_agent: None,
            referer: None,
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self
    }
}

/// Returns `true` when the request should be served a prerendered page.
pub fn should_prerender(request: &RequestInfo, config: &PrerenderConfig) -> bool {
    if is_blacklisted(request, config) {
        return false;
    }

    if !config.whitelist.is_empty() && !is_whitelisted(&request.url, config) {
        return false;
    }

    // The explicit signal overrides user-agent filtering.
    if has_escaped_fragment(&request.url) {
        return true;
    }

    let user_agent = match request.user_agent.as_deref().map(str::trim) {
        Some(ua) if !ua.is_empty() => ua,
        _ => return false,
    };

    if !is_crawler(user_agent, config) {
        return false;
    }

    !is_static_resource(&request.url, config)
}

/// Any blacklist pattern matching the URL or a non-blank referrer.
pub fn is_blacklisted(request: &RequestInfo, config: &PrerenderConfig) -> bool {
    let referer = request
        .referer
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty());

    config.blacklist.iter().any(|pattern| {
        pattern.is_match(request.url.as_str()) || referer.is_some_and(|r| pattern.is_match(r))
    })
}

pub fn is_whitelisted(url: &Url, config: &PrerenderConfig) -> bool {
    config
        .whitelist
        .iter()
        .any(|pattern| pattern.is_match(url.as_str()))
}

/// `_escaped_fragment_` present as a query key, whatever its value.
pub fn has_escaped_fragment(url: &Url) -> bool {
    url.query_pairs().any(|(key, _)| key == ESCAPED_FRAGMENT)
}

/// Case-insensitive substring match against the crawler table.
pub fn is_crawler(user_agent: &str, config: &PrerenderConfig) -> bool {
    let user_agent = user_agent.to_lowercase();
    config
        .crawler_user_agents
        .iter()
        .any(|agent| user_agent.contains(agent.as_str()))
}

/// Case-insensitive substring match of the decoded URL path against the
/// ignored extensions.
pub fn is_static_resource(url: &Url, config: &PrerenderConfig) -> bool {
    let path = percent_decode_str(url.path())
        .decode_utf8_lossy()
        .to_lowercase();
    config
        .extensions_to_ignore
        .iter()
        .any(|ext| path.contains(ext.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PrerenderSettings;

    const GOOGLEBOT: &str = "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)";
    const BROWSER: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 Chrome/120.0 Safari/537.36";

    fn request(url: &str) -> RequestInfo {
        RequestInfo::new(Url::parse(url).unwrap())
    }

    fn config_with(settings: PrerenderSettings) -> PrerenderConfig {
        PrerenderConfig::from_settings(settings).unwrap()
    }

    #[test]
    fn crawler_gets_prerendered_page() {
        let config = PrerenderConfig::default();
        let req = request("https://example.com/products").with_user_agent(GOOGLEBOT);
        assert!(should_prerender(&req, &config));
    }

    #[test]
    fn regular_browser_is_left_alone() {
        let config = PrerenderConfig::default();
        let req = request("https://example.com/products").with_user_agent(BROWSER);
        assert!(!should_prerender(&req, &config));
    }

    #[test]
    fn user_agent_match_ignores_case() {
        let config = PrerenderConfig::default();
        for ua in ["GOOGLEBOT", "mozilla (compatible; bingBot/2.0)", "w3c_validator/1.3", "discordbot"] {
            let req = request("https://example.com/").with_user_agent(ua);
            assert!(should_prerender(&req, &config), "{ua} should match");
        }
    }

    #[test]
    fn missing_or_blank_user_agent_is_not_prerendered() {
        let config = PrerenderConfig::default();
        assert!(!should_prerender(&request("https://example.com/"), &config));
        let blank = request("https://example.com/").with_user_agent("   ");
        assert!(!should_prerender(&blank, &config));
    }

    #[test]
    fn escaped_fragment_overrides_user_agent() {
        let config = PrerenderConfig::default();
        let no_ua = request("https://example.com/products?_escaped_fragment_=");
        assert!(should_prerender(&no_ua, &config));

        let curl = request("https://example.com/products?_escaped_fragment_=").with_user_agent("curl/7.0");
        assert!(should_prerender(&curl, &config));

        let valued = request("https://example.com/?a=1&_escaped_fragment_=/about").with_user_agent(BROWSER);
        assert!(should_prerender(&valued, &config));

        let bare_key = request("https://example.com/?_escaped_fragment_");
        assert!(should_prerender(&bare_key, &config));
    }

    #[test]
    fn escaped_fragment_must_be_a_key() {
        let config = PrerenderConfig::default();
        let req = request("https://example.com/?q=_escaped_fragment_").with_user_agent(BROWSER);
        assert!(!should_prerender(&req, &config));
    }

    #[test]
    fn blacklist_beats_everything() {
        let config = config_with(PrerenderSettings {
            blacklist: vec!["/admin".into()],
            ..Default::default()
        });
        let req = request("https://example.com/admin/users?_escaped_fragment_=").with_user_agent(GOOGLEBOT);
        assert!(!should_prerender(&req, &config));
    }

    #[test]
    fn blacklisted_referer_blocks_prerender() {
        let config = config_with(PrerenderSettings {
            blacklist: vec![r"^https?://spam\.example".into()],
            ..Default::default()
        });
        let req = request("https://example.com/products")
            .with_user_agent(GOOGLEBOT)
            .with_referer("https://spam.example/landing");
        assert!(!should_prerender(&req, &config));

        let clean = request("https://example.com/products")
            .with_user_agent(GOOGLEBOT)
            .with_referer("https://search.example/");
        assert!(should_prerender(&clean, &config));
    }

    #[test]
    fn blank_referer_is_ignored() {
        let config = config_with(PrerenderSettings {
            blacklist: vec!["^$".into()],
            ..Default::default()
        });
        let req = request("https://example.com/").with_user_agent(GOOGLEBOT).with_referer("");
        assert!(should_prerender(&req, &config));
    }

    #[test]
    fn whitelist_restricts_when_configured() {
        let config = config_with(PrerenderSettings {
            whitelist: vec![r"^https://example\.com/products".into()],
            ..Default::default()
        });
        let listed = request("https://example.com/products/42").with_user_agent(GOOGLEBOT);
        assert!(should_prerender(&listed, &config));

        let unlisted = request("https://example.com/blog?_escaped_fragment_=").with_user_agent(GOOGLEBOT);
        assert!(!should_prerender(&unlisted, &config));
    }

    #[test]
    fn empty_whitelist_imposes_no_restriction() {
        let config = config_with(PrerenderSettings {
            whitelist: Vec::new(),
            ..Default::default()
        });
        let req = request("https://example.com/anything").with_user_agent(GOOGLEBOT);
        assert!(should_prerender(&req, &config));
    }

    #[test]
    fn static_resources_are_skipped_for_crawlers() {
        let config = PrerenderConfig::default();
        for url in [
            "https://example.com/style.css",
            "https://example.com/static/app.js?ver=2",
            "https://example.com/IMAGES/LOGO.PNG",
            "https://example.com/files/report.pdf",
        ] {
            let req = request(url).with_user_agent(GOOGLEBOT);
            assert!(!should_prerender(&req, &config), "{url} should be skipped");
        }
    }

    #[test]
    fn encoded_extensions_are_still_static() {
        let config = PrerenderConfig::default();
        for url in [
            "https://example.com/app%2Ejs",
            "https://example.com/styles/site%2ecss?v=1",
            "https://example.com/img/logo.%50NG",
        ] {
            let req = request(url).with_user_agent(GOOGLEBOT);
            assert!(!should_prerender(&req, &config), "{url} should be skipped");
        }
    }

    #[test]
    fn extension_in_host_does_not_count() {
        let config = PrerenderConfig::default();
        let req = request("https://docs.jsfiddle.net/").with_user_agent(GOOGLEBOT);
        assert!(should_prerender(&req, &config));
    }

    #[test]
    fn configured_extras_extend_tables() {
        let config = config_with(PrerenderSettings {
            extensions_to_ignore: vec![".svg".into()],
            crawler_user_agents: vec!["AcmeBot".into()],
            ..Default::default()
        });
        let acme = request("https://example.com/").with_user_agent("acmebot/1.0");
        assert!(should_prerender(&acme, &config));

        let svg = request("https://example.com/logo.svg").with_user_agent("acmebot/1.0");
        assert!(!should_prerender(&svg, &config));

        let google = request("https://example.com/").with_user_agent(GOOGLEBOT);
        assert!(should_prerender(&google, &config));
    }

    #[test]
    fn classification_is_repeatable() {
        let config = PrerenderConfig::default();
        let req = request("https://example.com/page").with_user_agent(GOOGLEBOT);
        let first = should_prerender(&req, &config);
        for _ in 0..10 {
            assert_eq!(should_prerender(&req, &config), first);
        }
    }
}
