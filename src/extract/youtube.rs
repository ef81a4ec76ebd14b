//! YouTube watch pages.

use super::{element_text, first_text, selector, ExtractError, RawData};
use crate::content::{ContentComment, ContentData, Site};
use lazy_static::lazy_static;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::debug;

lazy_static! {
    static ref TITLE: Selector = selector("h1.ytd-watch-metadata yt-formatted-string");
    static ref CHANNEL: Selector = selector("ytd-channel-name a");
    static ref LIKES: Selector = selector(
        "ytd-watch-metadata ytd-menu-renderer segmented-like-dislike-button-view-model like-button-view-model"
    );
    static ref THREAD: Selector = selector("ytd-comment-thread-renderer");
    static ref COMMENT_AUTHOR: Selector = selector("#header-author #author-text");
    static ref COMMENT_CONTENT: Selector = selector("#expander #content");
    static ref COMMENT_LIKES: Selector =
        selector("ytd-comment-engagement-bar #toolbar #vote-count-middle");
    static ref COMMENT_TIME: Selector = selector("#header-author .published-time-text");
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YouTubeComment {
    pub author: String,
    pub content: String,
    pub likes: Option<String>,
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YouTubeVideo {
    pub title: Option<String>,
    pub url: Option<String>,
    pub author: Option<String>,
    pub likes: Option<String>,
    #[serde(default)]
    pub comments: Vec<YouTubeComment>,
}

impl YouTubeVideo {
    pub fn into_content(self, url: &str) -> ContentData {
        ContentData {
            site: Site::YouTube.name().to_string(),
            url: url.to_string(),
            title: self.title,
            // Videos have no text body.
            content: Some(String::new()),
            author: self.author,
            score: self.likes.as_deref().map(like_count),
            comments: self
                .comments
                .into_iter()
                .filter(|comment| !comment.author.is_empty() && !comment.content.is_empty())
                .map(|comment| ContentComment {
                    score: comment.likes.as_deref().map(like_count),
                    author: comment.author,
                    content: comment.content,
                })
                .collect(),
        }
    }
}

/// Extract the video details and the loaded comment threads.
pub fn extract(document: &Html, url: &str) -> Result<RawData, ExtractError> {
    let root = document.root_element();
    let title = first_text(root, &TITLE).ok_or(ExtractError::MissingElement("the video title"))?;

    let mut comments = Vec::new();
    for (index, thread) in document.select(&THREAD).enumerate() {
        match read_comment(thread) {
            Some(comment) => comments.push(comment),
            None => debug!(index, reason = "missing author or content", "skipping youtube comment"),
        }
    }
    debug!(count = comments.len(), "extracted youtube comments");

    Ok(RawData::YouTube(YouTubeVideo {
        title: Some(title),
        url: Some(url.to_string()),
        author: first_text(root, &CHANNEL).map(strip_handle),
        likes: first_text(root, &LIKES),
        comments,
    }))
}

fn read_comment(thread: ElementRef<'_>) -> Option<YouTubeComment> {
    let author = first_text(thread, &COMMENT_AUTHOR).map(strip_handle)?;
    let content = first_text(thread, &COMMENT_CONTENT)?;
    Some(YouTubeComment {
        author,
        content,
        likes: first_text(thread, &COMMENT_LIKES),
        timestamp: first_text(thread, &COMMENT_TIME),
    })
}

fn strip_handle(name: String) -> String {
    name.strip_prefix('@').map(str::to_string).unwrap_or(name)
}

/// Normalise a displayed like count: `"1.2K"` becomes `"1200"`,
/// `"3M"` becomes `"3000000"`, `"1,234"` becomes `"1234"`.
/// Text that is not a count is returned unchanged.
pub fn like_count(raw: &str) -> String {
    let compact: String = raw.trim().chars().filter(|c| *c != ',').collect();
    let (number, multiplier) = match compact.chars().last() {
        Some('K') | Some('k') => (&compact[..compact.len() - 1], 1_000.0),
        Some('M') | Some('m') => (&compact[..compact.len() - 1], 1_000_000.0),
        _ => (compact.as_str(), 1.0),
    };
    match number.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => format!("{}", (value * multiplier).round() as i64),
        _ => raw.trim().to_string(),
    }
}

/// Number of comment threads started by `username`, case-insensitive.
pub fn highlight(document: &Html, username: &str) -> usize {
    let wanted = username.to_lowercase();
    document
        .select(&THREAD)
        .filter(|thread| {
            thread
                .select(&COMMENT_AUTHOR)
                .next()
                .map(|author| strip_handle(element_text(author)).to_lowercase() == wanted)
                .unwrap_or(false)
        })
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://www.youtube.com/watch?v=abc";

    fn thread(author: &str, content: &str, likes: &str) -> String {
        format!(
            r#"<ytd-comment-thread-renderer>
                <div id="header-author"><a id="author-text"> {author} </a><span class="published-time-text">2 days ago</span></div>
                <div id="expander"><div id="content">{content}</div></div>
                <ytd-comment-engagement-bar><div id="toolbar"><span id="vote-count-middle">{likes}</span></div></ytd-comment-engagement-bar>
            </ytd-comment-thread-renderer>"#
        )
    }

    fn page(threads: &str) -> Html {
        Html::parse_document(&format!(
            r#"<html><body>
            <ytd-watch-metadata>
              <h1 class="ytd-watch-metadata"><yt-formatted-string>Rust in 100 seconds</yt-formatted-string></h1>
              <ytd-channel-name><a href="/@fireship">@Fireship</a></ytd-channel-name>
              <ytd-menu-renderer><segmented-like-dislike-button-view-model><like-button-view-model>1.2K</like-button-view-model></segmented-like-dislike-button-view-model></ytd-menu-renderer>
            </ytd-watch-metadata>
            <ytd-comments>{threads}</ytd-comments>
            </body></html>"#
        ))
    }

    fn extract_video(document: &Html) -> YouTubeVideo {
        match extract(document, URL).unwrap() {
            RawData::YouTube(video) => video,
            other => panic!("unexpected raw data: {other:?}"),
        }
    }

    #[test]
    fn test_extract_video_metadata() {
        let video = extract_video(&page(""));
        assert_eq!(video.title.as_deref(), Some("Rust in 100 seconds"));
        assert_eq!(video.author.as_deref(), Some("Fireship"));
        assert_eq!(video.likes.as_deref(), Some("1.2K"));
    }

    #[test]
    fn test_comments_missing_fields_are_skipped() {
        let threads = [
            thread("@alice", "Loved it", "15K"),
            thread("", "orphan", "1"),
            thread("@bob", "", "2"),
        ]
        .concat();
        let video = extract_video(&page(&threads));
        assert_eq!(video.comments.len(), 1);
        let comment = &video.comments[0];
        assert_eq!(comment.author, "alice");
        assert_eq!(comment.timestamp.as_deref(), Some("2 days ago"));
    }

    #[test]
    fn test_conversion_parses_like_counts() {
        let video = extract_video(&page(&thread("@alice", "Loved it", "15K")));
        let data = video.into_content(URL);
        assert_eq!(data.site, "YouTube");
        assert_eq!(data.score.as_deref(), Some("1200"));
        assert_eq!(data.content.as_deref(), Some(""));
        assert_eq!(data.comments[0].score.as_deref(), Some("15000"));
    }

    #[test]
    fn test_missing_title_is_an_error() {
        let document = Html::parse_document("<html><body></body></html>");
        assert!(extract(&document, URL).is_err());
    }

    #[test]
    fn test_like_count_formats() {
        assert_eq!(like_count("1.2K"), "1200");
        assert_eq!(like_count("3M"), "3000000");
        assert_eq!(like_count("1,234"), "1234");
        assert_eq!(like_count("42"), "42");
        assert_eq!(like_count("Like"), "Like");
    }

    #[test]
    fn test_highlight_matches_without_handle_prefix() {
        let threads = [thread("@Alice", "a", "1"), thread("@bob", "b", "1")].concat();
        assert_eq!(highlight(&page(&threads), "alice"), 1);
    }
}
