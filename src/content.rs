//! Site-agnostic content model shared by every extractor and the summariser.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

lazy_static! {
    static ref REDDIT_POST_URL: Regex =
        Regex::new(r"reddit\.com/r/[^/]+/comments/[^/]+").expect("valid reddit url pattern");
    static ref HN_ITEM_URL: Regex =
        Regex::new(r"news\.ycombinator\.com/item\?id=\d+").expect("valid hn url pattern");
}

/// Sites with a dedicated extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Site {
    Reddit,
    YouTube,
    HackerNews,
}

impl Site {
    pub const ALL: [Site; 3] = [Site::Reddit, Site::YouTube, Site::HackerNews];

    /// Display name, also stored in `ContentData::site`.
    pub fn name(self) -> &'static str {
        match self {
            Site::Reddit => "Reddit",
            Site::YouTube => "YouTube",
            Site::HackerNews => "HackerNews",
        }
    }

    /// Lowercase key used in action names (`extract.<key>`).
    pub fn key(self) -> &'static str {
        match self {
            Site::Reddit => "reddit",
            Site::YouTube => "youtube",
            Site::HackerNews => "hackernews",
        }
    }

    /// Domain the tab URL must contain.
    pub fn domain(self) -> &'static str {
        match self {
            Site::Reddit => "reddit.com",
            Site::YouTube => "youtube.com",
            Site::HackerNews => "news.ycombinator.com",
        }
    }

    /// Name of the page script that registers this site's extractor.
    pub fn script_filename(self) -> &'static str {
        match self {
            Site::Reddit => "reddit-content.js",
            Site::YouTube => "youtube-content.js",
            Site::HackerNews => "hacker-news-content.js",
        }
    }

    pub fn from_key(key: &str) -> Option<Site> {
        let key = key.to_ascii_lowercase();
        Site::ALL.into_iter().find(|site| site.key() == key)
    }

    pub fn from_script(filename: &str) -> Option<Site> {
        Site::ALL
            .into_iter()
            .find(|site| site.script_filename() == filename)
    }

    /// Detect the site from a page URL by domain.
    pub fn detect(url: &str) -> Option<Site> {
        Site::ALL.into_iter().find(|site| url.contains(site.domain()))
    }

    /// Whether the URL is a page this site's extractor can read
    /// (a post, a video, an item).
    pub fn is_valid_page(self, url: &str) -> bool {
        match self {
            Site::Reddit => REDDIT_POST_URL.is_match(url),
            Site::YouTube => url.contains("youtube.com/watch"),
            Site::HackerNews => HN_ITEM_URL.is_match(url),
        }
    }

    /// User-facing message for a URL on the right domain but the wrong page.
    pub fn invalid_page_message(self) -> &'static str {
        match self {
            Site::Reddit => {
                "Please navigate to a Reddit post page to use this feature. \
                 (e.g. https://www.reddit.com/r/AskReddit/comments/xxx/xxx/)"
            }
            Site::YouTube => "Please navigate to a YouTube video page to use this feature.",
            Site::HackerNews => {
                "Please navigate to a Hacker News item page (e.g., /item?id=...) to use this feature."
            }
        }
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single comment in the unified model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentComment {
    pub author: String,
    pub content: String,
    pub score: Option<String>,
}

/// The post and comments of one page, normalised across sites.
///
/// Built fresh for every extraction; comments keep page order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentData {
    pub site: String,
    pub url: String,
    pub title: Option<String>,
    pub content: Option<String>,
    pub author: Option<String>,
    pub score: Option<String>,
    pub comments: Vec<ContentComment>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_site_by_domain() {
        assert_eq!(
            Site::detect("https://www.reddit.com/r/rust/"),
            Some(Site::Reddit)
        );
        assert_eq!(
            Site::detect("https://www.youtube.com/watch?v=abc"),
            Some(Site::YouTube)
        );
        assert_eq!(
            Site::detect("https://news.ycombinator.com/news"),
            Some(Site::HackerNews)
        );
        assert_eq!(Site::detect("https://example.com"), None);
    }

    #[test]
    fn test_page_shape_predicates() {
        assert!(Site::Reddit.is_valid_page("https://www.reddit.com/r/rust/comments/abc123/title/"));
        assert!(!Site::Reddit.is_valid_page("https://www.reddit.com/r/rust/"));
        assert!(Site::YouTube.is_valid_page("https://www.youtube.com/watch?v=abc"));
        assert!(!Site::YouTube.is_valid_page("https://www.youtube.com/feed/trending"));
        assert!(Site::HackerNews.is_valid_page("https://news.ycombinator.com/item?id=42"));
        assert!(!Site::HackerNews.is_valid_page("https://news.ycombinator.com/newest"));
    }

    #[test]
    fn test_key_and_script_lookup() {
        assert_eq!(Site::from_key("HackerNews"), Some(Site::HackerNews));
        assert_eq!(Site::from_key("myspace"), None);
        assert_eq!(Site::from_script("youtube-content.js"), Some(Site::YouTube));
        assert_eq!(Site::from_script("content.js"), None);
    }
}
