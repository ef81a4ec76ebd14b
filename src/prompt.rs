//! Prompt formatting: page content and language preference in, the text
//! sent to the model out.

use crate::content::ContentData;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Most comments ever placed in a prompt.
pub const MAX_COMMENTS: usize = 1000;

/// Replaced by the language instruction wherever it appears in a template.
pub const LANGUAGE_PLACEHOLDER: &str = "${languageInstruction}";

pub const NO_COMMENTS: &str = "No comments";

pub const DEFAULT_COMMAND: &str = "/summarize";

/// Supported response languages: code and label.
pub const LANGUAGES: [(&str, &str); 8] = [
    ("en", "English"),
    ("zh-CN", "简体中文 (Simplified Chinese)"),
    ("zh-TW", "繁體中文 (Traditional Chinese)"),
    ("ja", "日本語 (Japanese)"),
    ("ko", "한국어 (Korean)"),
    ("vi", "Tiếng Việt (Vietnamese)"),
    ("ru", "Русский (Russian)"),
    ("es", "Español (Spanish)"),
];

pub const SYSTEM_PROMPT: &str = "You are a helpful assistant that give insight of page's content and comments.
I'm too busy to read the original post and comments.
But I want to know whether this post and comments have any information or perspectives helpful to me,
such as person's painpoint, desires, or valuable opinions, or from person with unique background.
I trust you to provide a clear and concise insight of the post and its top votes comments.";

const DEFAULT_TEMPLATE: &str = r#"<INSTRUCTION>
Analyze the provided web page content (e.g., a Reddit post) and its top-liked comments to extract key insights. Follow these steps:

1. **Comprehensive Reading**: Read the entire post and all comments thoroughly before summarizing.
2. **Opinion Grouping**: Identify and group similar comments into **5–8 distinct opinions**, prioritizing:
   - Top-voted comments.
   - Unique perspectives (e.g., expert opinions, personal experiences).
   - Comments where authors explicitly mention their background or their stories.
3. **Structured Output**: Present the analysis in the following markdown format:

## Main Point of the Post
A **1–2 sentence summary** of the post's core message, question, or debate.

## Key Grouped Opinions from Comments
Synthesize the most significant comments into **5–8 logically ordered groups**. For each group:
- **Label**: Briefly name the opinion (e.g., "Support for X," "Criticism of Y").
- **Upvotes**: Note approximate upvotes (e.g., 👍 500+).
- **Authors & Backgrounds**: List usernames and **include their self-described backgrounds or stories if any**.
- **Summary**: Paraphrase the shared viewpoint concisely.
- **Key Quote**: Extract **1–2 short, impactful phrases** (not full sentences) that capture the essence.

## Overall Sentiment & Conclusion
- Summarize the **general tone** (e.g., supportive, divisive, humorous). Highlight conflicting viewpoints if applicable.
- Provide **your own insights** on the post's impact or unresolved questions.

<LANGUAGE_REQUIREMENT>
${languageInstruction}
</LANGUAGE_REQUIREMENT>

<ADDITIONAL GUIDELINES>
- **Background Emphasis**: If an author mentions their profession or experience, **include it in the group label**.
- **Bias Avoidance**: Represent all sides fairly, even minority opinions.
- **Quoting**: Never quote full sentences, only **keywords or short phrases**.
- **Upvote Threshold**: Ignore comments with negligible upvotes unless they offer unique value.
</ADDITIONAL GUIDELINES>
</INSTRUCTION>
"#;

/// A stored prompt template, invoked by its slash command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prompt {
    pub id: String,
    pub command: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Prompt {
    pub fn new(command: impl Into<String>, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: format!("prompt-{}", now.timestamp_millis()),
            command: command.into(),
            content: content.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// The built-in `/summarize` prompt used when none are stored.
    pub fn default_summarize() -> Self {
        Self {
            id: "default-summarize".to_string(),
            ..Self::new(DEFAULT_COMMAND, DEFAULT_TEMPLATE)
        }
    }
}

/// Instruction sentence telling the model which language to answer in.
/// Unknown codes get the English instruction.
pub fn language_instruction(language: &str) -> &'static str {
    match language {
        "zh-CN" => "使用简体中文回答, 但引用的原文应该使用原文的语言.",
        "zh-TW" => "使用繁體中文回答, 但引用的原文應該使用原文的語言.",
        "ja" => "回答は日本語で行うこと。ただし、引用文については原文の言語表記を維持すること.",
        "ko" => "한국어로 답변하되, 인용문은 원문의 언어를 그대로 유지하세요.",
        "vi" => "Trả lời bằng tiếng Việt, nhưng giữ nguyên ngôn ngữ gốc của các đoạn trích dẫn.",
        "ru" => "Отвечай на русском языке, но цитаты оставляй на языке оригинала.",
        "es" => "Responde en español, pero mantén las citas en su idioma original.",
        _ => "Respond in English.",
    }
}

pub fn is_supported_language(code: &str) -> bool {
    LANGUAGES.iter().any(|(known, _)| *known == code)
}

pub fn system_prompt(language: &str) -> String {
    format!("{SYSTEM_PROMPT}\n\n{}", language_instruction(language))
}

/// Build the user message: the instruction template (the custom one when
/// given, the built-in one otherwise) followed by the page context.
pub fn format_prompt(data: &ContentData, language: &str, template: Option<&str>) -> String {
    let template = template
        .filter(|t| !t.trim().is_empty())
        .unwrap_or(DEFAULT_TEMPLATE);
    let instructions = template.replace(LANGUAGE_PLACEHOLDER, language_instruction(language));

    format!(
        "{instructions}\n<page_context>\n# Site:\n{site}\n\n# Page TITLE:\n{title}\n\n# CONTENT:\n{content}\n\n# TOP COMMENTS (Up to {MAX_COMMENTS}):\n{comments}\n</page_context>\n",
        site = non_blank(Some(&data.site)).unwrap_or("No site name"),
        title = non_blank(data.title.as_deref()).unwrap_or("No title"),
        content = non_blank(data.content.as_deref()).unwrap_or("No content"),
        comments = format_comments(data),
    )
}

fn format_comments(data: &ContentData) -> String {
    let rendered: Vec<String> = data
        .comments
        .iter()
        .filter(|c| !c.content.trim().is_empty())
        .take(MAX_COMMENTS)
        .map(|c| {
            let author = non_blank(Some(&c.author)).unwrap_or("unknown");
            let header = match non_blank(c.score.as_deref()) {
                Some(score) => format!("## [Author: {author}, 👍: {score}]"),
                None => format!("## [Author: {author}]"),
            };
            format!("{header}\n{}\n", c.content.trim())
        })
        .collect();

    if rendered.is_empty() {
        NO_COMMENTS.to_string()
    } else {
        rendered.join("\n")
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
