//! Built-in crawler user-agent and ignored-extension tables.
//!
//! Configuration may extend these lists but never replace them.

/// Query-string key that explicitly asks for a prerendered page.
pub const ESCAPED_FRAGMENT: &str = "_escaped_fragment_";

/// User-agent substrings identifying search engines and link-preview bots.
pub const CRAWLER_USER_AGENTS: &[&str] = &[
    "googlebot",
    "yahoo",
    "bingbot",
    "yandex",
    "baiduspider",
    "facebookexternalhit",
    "twitterbot",
    "rogerbot",
    "linkedinbot",
    "embedly",
    "quora link preview",
    "showyoubot",
    "outbrain",
    "pinterest/0.",
    "developers.google.com/+/web/snippet",
    "slackbot",
    "vkShare",
    "W3C_Validator",
    "redditbot",
    "Applebot",
    "WhatsApp",
    "flipboard",
    "tumblr",
    "bitlybot",
    "SkypeUriPreview",
    "nuzzel",
    "Discordbot",
    "Google Page Speed",
    "x-bufferbot",
];

/// Resource extensions that are never prerendered.
pub const EXTENSIONS_TO_IGNORE: &[&str] = &[
    ".js", ".css", ".less", ".png", ".jpg", ".jpeg", ".gif", ".pdf", ".doc", ".txt", ".zip",
    ".mp3", ".rar", ".exe", ".wmv", ".doc", ".avi", ".ppt", ".mpg", ".mpeg", ".tif", ".wav",
    ".mov", ".psd", ".ai", ".xls", ".mp4", ".m4a", ".swf", ".dat", ".dmg", ".iso", ".flv",
    ".m4v", ".torrent",
];

/// Built-in crawler agents followed by `extra`, lower-cased.
pub fn crawler_user_agents(extra: &[String]) -> Vec<String> {
    merge(CRAWLER_USER_AGENTS, extra)
}

/// Built-in ignored extensions followed by `extra`, lower-cased.
pub fn extensions_to_ignore(extra: &[String]) -> Vec<String> {
    merge(EXTENSIONS_TO_IGNORE, extra)
}

fn merge(builtin: &[&str], extra: &[String]) -> Vec<String> {
    builtin
        .iter()
        .copied()
        .chain(extra.iter().map(String::as_str))
        .map(str::trim)
        // an empty needle would match every request
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extras_extend_builtin_lists() {
        let agents = crawler_user_agents(&["MyBot".to_string()]);
        assert_eq!(agents.len(), CRAWLER_USER_AGENTS.len() + 1);
        assert_eq!(agents.last().map(String::as_str), Some("mybot"));
        assert!(agents.iter().any(|a| a == "googlebot"));
    }

    #[test]
    fn tables_are_lower_cased() {
        let agents = crawler_user_agents(&[]);
        assert!(agents.iter().any(|a| a == "w3c_validator"));
        assert!(agents.iter().all(|a| *a == a.to_lowercase()));
    }

    #[test]
    fn blank_extras_are_dropped() {
        let exts = extensions_to_ignore(&["".to_string(), "  ".to_string(), ".SVG".to_string()]);
        assert_eq!(exts.len(), EXTENSIONS_TO_IGNORE.len() + 1);
        assert!(exts.contains(&".svg".to_string()));
    }
}
