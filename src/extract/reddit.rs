//! Reddit post pages (`shreddit-post` / `shreddit-comment` markup).

use super::{element_text, selector, ExtractError, RawData};
use crate::content::{ContentComment, ContentData, Site};
use lazy_static::lazy_static;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Comments by this account are moderation boilerplate.
pub const BOT_AUTHOR: &str = "AutoModerator";
const DELETED_AUTHOR: &str = "[deleted]";

pub const MEDIA_PLACEHOLDER: &str = "<hint: author post a media, no text>";
pub const NO_CONTENT_PLACEHOLDER: &str = "<no content>";

lazy_static! {
    static ref POST: Selector = selector("shreddit-post");
    static ref TEXT_BODY: Selector = selector(r#"[slot="text-body"] p"#);
    static ref MEDIA: Selector = selector(r#"[slot="post-media-container"]"#);
    static ref TOP_COMMENTS: Selector =
        selector(r#"shreddit-comment[depth="0"], shreddit-comment[depth="1"]"#);
    static ref ALL_COMMENTS: Selector = selector("shreddit-comment");
    static ref PARAGRAPH: Selector = selector("p");
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedditComment {
    pub author: String,
    pub content: String,
    pub score: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedditPost {
    pub title: Option<String>,
    pub url: Option<String>,
    pub content: String,
    pub author: Option<String>,
    pub score: Option<String>,
    #[serde(default)]
    pub comments: Vec<RedditComment>,
}

impl RedditPost {
    pub fn into_content(self, url: &str) -> ContentData {
        ContentData {
            site: Site::Reddit.name().to_string(),
            url: url.to_string(),
            title: self.title,
            content: Some(self.content),
            author: self.author,
            score: self.score,
            comments: self
                .comments
                .into_iter()
                .filter(|comment| is_kept_author(&comment.author) && comment.score >= 0)
                .map(|comment| ContentComment {
                    author: comment.author,
                    content: comment.content,
                    score: Some(comment.score.to_string()),
                })
                .collect(),
        }
    }
}

/// Extract the post and its top-level and first-reply comments.
pub fn extract(document: &Html, url: &str) -> Result<RawData, ExtractError> {
    let post = document
        .select(&POST)
        .next()
        .ok_or(ExtractError::MissingElement("the Reddit post"))?;

    let mut comments = Vec::new();
    for (index, element) in document.select(&TOP_COMMENTS).enumerate() {
        match read_comment(element) {
            Ok(comment) => comments.push(comment),
            Err(reason) => debug!(index, reason, "skipping reddit comment"),
        }
    }
    debug!(count = comments.len(), "extracted reddit comments");

    Ok(RawData::Reddit(RedditPost {
        title: attr(post, "post-title"),
        url: Some(url.to_string()),
        content: post_content(post),
        author: attr(post, "author"),
        score: attr(post, "score"),
        comments,
    }))
}

/// Text body paragraphs, else a media hint, else a no-content marker.
fn post_content(post: ElementRef<'_>) -> String {
    let paragraphs: Vec<String> = post.select(&TEXT_BODY).map(element_text).collect();
    if !paragraphs.is_empty() {
        paragraphs.join("\n\n")
    } else if post.select(&MEDIA).next().is_some() {
        MEDIA_PLACEHOLDER.to_string()
    } else {
        NO_CONTENT_PLACEHOLDER.to_string()
    }
}

fn read_comment(element: ElementRef<'_>) -> Result<RedditComment, &'static str> {
    let author = attr(element, "author").ok_or("missing author")?;
    if !is_kept_author(&author) {
        return Err("deleted or bot author");
    }
    let body = element
        .children()
        .filter_map(ElementRef::wrap)
        .find(|child| child.value().attr("slot") == Some("comment"))
        .ok_or("missing comment element")?;

    let score = match element.value().attr("score") {
        Some(raw) if !raw.is_empty() => parse_int(raw).ok_or("score is not a number")?,
        _ => 0,
    };
    if score < 0 {
        return Err("negative score");
    }

    let content = body
        .select(&PARAGRAPH)
        .map(element_text)
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");

    Ok(RedditComment {
        author,
        content,
        score,
    })
}

fn is_kept_author(author: &str) -> bool {
    !author.is_empty() && author != BOT_AUTHOR && author != DELETED_AUTHOR
}

fn attr(element: ElementRef<'_>, name: &str) -> Option<String> {
    element
        .value()
        .attr(name)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Leading-integer parse: optional sign then digits, trailing text ignored.
/// `None` when no digits lead the string.
pub fn parse_int(raw: &str) -> Option<i64> {
    let trimmed = raw.trim_start();
    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    // Only overflow can fail here; very large scores saturate.
    let value: i64 = digits[..end].parse().unwrap_or(i64::MAX);
    Some(if negative { -value } else { value })
}

/// Number of comments (any depth) written by `username`, case-insensitive.
pub fn highlight(document: &Html, username: &str) -> usize {
    let wanted = username.to_lowercase();
    document
        .select(&ALL_COMMENTS)
        .filter(|comment| {
            comment
                .value()
                .attr("author")
                .is_some_and(|author| author.to_lowercase() == wanted)
        })
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://www.reddit.com/r/rust/comments/abc/title/";

    fn page(post_body: &str, comments: &str) -> Html {
        Html::parse_document(&format!(
            r#"<html><body>
            <shreddit-post post-title="Why Rust?" author="ferris" score="321">{post_body}</shreddit-post>
            <div id="comment-tree">{comments}</div>
            </body></html>"#
        ))
    }

    fn comment(author: &str, score: &str, depth: u8, text: &str) -> String {
        format!(
            r#"<shreddit-comment author="{author}" score="{score}" depth="{depth}"><div slot="comment"><p>{text}</p></div></shreddit-comment>"#
        )
    }

    fn extract_post(document: &Html) -> RedditPost {
        match extract(document, URL).unwrap() {
            RawData::Reddit(post) => post,
            other => panic!("unexpected raw data: {other:?}"),
        }
    }

    #[test]
    fn test_extract_post_fields_and_text_body() {
        let document = page(
            r#"<div slot="text-body"><p>First paragraph.</p><p>Second.</p></div>"#,
            "",
        );
        let post = extract_post(&document);
        assert_eq!(post.title.as_deref(), Some("Why Rust?"));
        assert_eq!(post.author.as_deref(), Some("ferris"));
        assert_eq!(post.score.as_deref(), Some("321"));
        assert_eq!(post.content, "First paragraph.\n\nSecond.");
    }

    #[test]
    fn test_media_and_empty_placeholders() {
        let media = page(r#"<div slot="post-media-container"><img src="x.png"></div>"#, "");
        assert_eq!(extract_post(&media).content, MEDIA_PLACEHOLDER);

        let empty = page("", "");
        assert_eq!(extract_post(&empty).content, NO_CONTENT_PLACEHOLDER);
    }

    #[test]
    fn test_missing_post_is_an_error() {
        let document = Html::parse_document("<html><body><p>nothing</p></body></html>");
        assert!(matches!(
            extract(&document, URL),
            Err(ExtractError::MissingElement(_))
        ));
    }

    #[test]
    fn test_automoderator_comment_excluded() {
        let comments = [
            comment("AutoModerator", "1", 0, "Please follow the rules"),
            comment("alice", "10", 0, "Great post"),
        ]
        .concat();
        let post = extract_post(&page("", &comments));
        assert_eq!(post.comments.len(), 1);
        assert_eq!(post.comments[0].author, "alice");
    }

    #[test]
    fn test_oversized_score_kept() {
        let comments = comment("whale", "123456789012345678901234", 0, "big");
        let post = extract_post(&page("", &comments));
        assert_eq!(post.comments.len(), 1);
        assert_eq!(post.comments[0].score, i64::MAX);
    }

    #[test]
    fn test_invalid_or_negative_scores_excluded() {
        let comments = [
            comment("nan", "abc", 0, "not a number"),
            comment("neg", "-4", 0, "downvoted"),
            comment("ok", "7", 1, "kept"),
            comment("lenient", "12pts", 0, "prefix parse"),
        ]
        .concat();
        let post = extract_post(&page("", &comments));
        let authors: Vec<_> = post.comments.iter().map(|c| c.author.as_str()).collect();
        assert_eq!(authors, ["ok", "lenient"]);
        assert_eq!(post.comments[1].score, 12);
    }

    #[test]
    fn test_only_top_two_depths_and_required_fields() {
        let comments = [
            comment("deep", "3", 2, "too deep"),
            r#"<shreddit-comment score="3" depth="0"><div slot="comment"><p>anon</p></div></shreddit-comment>"#.to_string(),
            r#"<shreddit-comment author="nobody" score="3" depth="0"><p>no slot</p></shreddit-comment>"#.to_string(),
            comment("[deleted]", "3", 0, "gone"),
            comment("bob", "", 1, "no score"),
        ]
        .concat();
        let post = extract_post(&page("", &comments));
        assert_eq!(post.comments.len(), 1);
        assert_eq!(post.comments[0].author, "bob");
        assert_eq!(post.comments[0].score, 0);
    }

    #[test]
    fn test_conversion_filters_bot_entries() {
        let post = RedditPost {
            title: Some("t".into()),
            url: None,
            content: "c".into(),
            author: None,
            score: None,
            comments: vec![
                RedditComment {
                    author: BOT_AUTHOR.into(),
                    content: "rules".into(),
                    score: 1,
                },
                RedditComment {
                    author: "carol".into(),
                    content: "hi".into(),
                    score: 5,
                },
            ],
        };
        let data = post.into_content(URL);
        assert_eq!(data.site, "Reddit");
        assert_eq!(data.comments.len(), 1);
        assert_eq!(data.comments[0].score.as_deref(), Some("5"));
    }

    #[test]
    fn test_parse_int_matches_lenient_rules() {
        assert_eq!(parse_int("42"), Some(42));
        assert_eq!(parse_int(" -3"), Some(-3));
        assert_eq!(parse_int("12abc"), Some(12));
        assert_eq!(parse_int("abc"), None);
        assert_eq!(parse_int("-"), None);
        assert_eq!(parse_int("99999999999999999999"), Some(i64::MAX));
        assert_eq!(parse_int("-99999999999999999999"), Some(-i64::MAX));
    }

    #[test]
    fn test_highlight_counts_case_insensitive() {
        let comments = [
            comment("Alice", "1", 0, "a"),
            comment("alice", "1", 3, "b"),
            comment("bob", "1", 0, "c"),
        ]
        .concat();
        let document = page("", &comments);
        assert_eq!(highlight(&document, "ALICE"), 2);
        assert_eq!(highlight(&document, "zed"), 0);
    }
}
