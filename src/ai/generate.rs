use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::warn;

use crate::error::AppError;
use crate::proxy::{CompletionRequest, GenerationOptions, ModelClient, TokenUsage};

const SYSTEM_PROMPT: &str = "You are an expert prompt engineer. Turn the user's short task \
description into a clear, production-ready prompt that another AI can use directly.

Every generated prompt must:
1. Define the role the AI should take when the task needs expertise.
2. State the goal and the expected deliverable.
3. Specify format, length and tone constraints.
4. Use descriptive placeholders in curly braces, such as {insert_company_name} or \
{upload_dataset_name}, for any detail the user did not supply. Never invent data.
5. Be coherent and ready to use even with placeholders present.

Respond with a single JSON object and nothing else (no markdown, no code fences) with these keys:
- \"title\": a short, specific title for the prompt
- \"prompt\": the full prompt, 800-1500 characters, spanning several paragraphs
- \"tags\": an array of 8-12 concise keywords";

const MAX_TITLE_CHARS: usize = 100;
const MAX_TAGS: usize = 12;

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "for", "to", "and", "or", "is", "are", "be", "been", "of", "in", "on", "at",
    "by", "as", "it",
];

static TITLE_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?im)^\W*title\s*:\s*["']?([^"\n]+)"#).unwrap());
static CONTENT_LABEL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?im)^\W*(?:content|prompt)\s*:").unwrap());
static TAGS_LABEL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?im)^\W*tags\s*:\s*\[?([^\]\n]*)").unwrap());

/// A prompt produced by the model, ready to be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedPrompt {
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
}

pub fn build_request(task: &str, context: Option<&str>) -> CompletionRequest {
    let mut user = format!("Task: {}", task);
    if let Some(context) = context {
        user.push_str("\nContext: ");
        user.push_str(context);
    }
    user.push_str("\n\nReturn ONLY valid JSON:");

    CompletionRequest::new(
        SYSTEM_PROMPT,
        user,
        GenerationOptions {
            temperature: 0.3,
            top_p: 0.7,
            max_tokens: 800,
            repeat_penalty: Some(1.1),
        },
    )
}

/// Asks the model for a prompt and coerces whatever comes back into one.
pub async fn generate_prompt(
    client: &dyn ModelClient,
    task: &str,
    context: Option<&str>,
) -> Result<(GeneratedPrompt, TokenUsage), AppError> {
    let completion = client.complete(&build_request(task, context)).await?;
    let generated = parse_generated(&completion.content, task, context);
    Ok((generated, completion.usage))
}

/// Best-effort parse of a generation reply.
///
/// Tries, in order: the JSON object between the first `{` and the last `}`,
/// labeled `title:` / `content:` / `tags:` lines, and finally a templated
/// prompt built from the task itself. Never fails.
pub fn parse_generated(raw: &str, task: &str, context: Option<&str>) -> GeneratedPrompt {
    let raw = raw.trim();

    if let Some(parsed) = json_object(raw).map(|obj| from_json(&obj, task, context)) {
        return parsed;
    }
    if let Some(parsed) = from_labels(raw, task) {
        return parsed;
    }

    warn!("Model reply had no usable structure, using templated prompt");
    GeneratedPrompt {
        title: fallback_title(task),
        content: templated_prompt(task, context),
        tags: keyword_tags(task),
    }
}

fn json_object(raw: &str) -> Option<serde_json::Map<String, Value>> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&raw[start..=end]) {
        Ok(Value::Object(obj)) => Some(obj),
        Ok(_) => None,
        Err(e) => {
            warn!("Failed to parse generated prompt JSON: {}", e);
            None
        }
    }
}

fn from_json(obj: &serde_json::Map<String, Value>, task: &str, context: Option<&str>) -> GeneratedPrompt {
    let title = match obj.get("title").and_then(Value::as_str).map(str::trim) {
        Some(title) if !title.is_empty() => truncate_chars(title, MAX_TITLE_CHARS),
        _ => fallback_title(task),
    };

    let body = ["prompt", "content"]
        .iter()
        .filter_map(|key| obj.get(*key).and_then(Value::as_str))
        .find(|text| !text.trim().is_empty());
    let content = match body {
        Some(text) => unescape(text).trim().to_string(),
        None => templated_prompt(task, context),
    };

    let tags = match obj.get("tags") {
        Some(Value::Array(items)) => clean_tags(items.iter().map(|item| match item {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })),
        Some(Value::String(s)) => clean_tags(s.split(',').map(str::to_string)),
        _ => Vec::new(),
    };
    let tags = if tags.is_empty() { keyword_tags(&title) } else { tags };

    GeneratedPrompt { title, content, tags }
}

fn from_labels(raw: &str, task: &str) -> Option<GeneratedPrompt> {
    let content_label = CONTENT_LABEL.find(raw)?;
    let rest = &raw[content_label.end()..];
    let body = match TAGS_LABEL.find(rest) {
        Some(tags) => &rest[..tags.start()],
        None => rest,
    };
    let content = body.trim().trim_matches(is_quote).trim();
    if content.is_empty() {
        return None;
    }

    let title = TITLE_LABEL
        .captures(raw)
        .map(|caps| caps[1].trim().trim_end_matches(is_quote).trim().to_string())
        .filter(|title| !title.is_empty())
        .map(|title| truncate_chars(&title, MAX_TITLE_CHARS))
        .unwrap_or_else(|| fallback_title(task));

    let tags = TAGS_LABEL
        .captures(rest)
        .map(|caps| clean_tags(caps[1].split(',').map(|t| t.trim().trim_matches(is_quote).to_string())))
        .unwrap_or_default();
    let tags = if tags.is_empty() { keyword_tags(task) } else { tags };

    Some(GeneratedPrompt {
        title,
        content: content.to_string(),
        tags,
    })
}

fn is_quote(c: char) -> bool {
    c == '"' || c == '\''
}

/// Undoes escape sequences models sometimes leave in JSON string values.
fn unescape(text: &str) -> String {
    text.replace("\\n", "\n")
        .replace("\\t", "\t")
        .replace("\\/", "/")
        .replace("\\\"", "\"")
}

fn clean_tags<I: IntoIterator<Item = String>>(tags: I) -> Vec<String> {
    tags.into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .take(MAX_TAGS)
        .collect()
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

fn fallback_title(task: &str) -> String {
    format!("Professional Prompt: {}", truncate_chars(task, 50))
}

/// Up to three keywords longer than three characters, skipping stop words.
pub fn keyword_tags(text: &str) -> Vec<String> {
    let tags: Vec<String> = text
        .to_lowercase()
        .split_whitespace()
        .filter(|w| w.chars().count() > 3 && !STOP_WORDS.contains(w))
        .take(3)
        .map(str::to_string)
        .collect();

    if tags.is_empty() {
        vec!["prompt".into(), "generated".into(), "professional".into()]
    } else {
        tags
    }
}

fn infer_role(task: &str) -> &'static str {
    let task = task.to_lowercase();
    let has = |needle: &str| task.contains(needle);
    if has("email") {
        "email marketing specialist"
    } else if has("blog") || has("write") {
        "professional content writer"
    } else if has("code") || has("develop") {
        "senior software engineer"
    } else if has("data") || has("analyz") {
        "data analyst"
    } else if has("business") || has("strateg") {
        "business strategist"
    } else if has("creat") || has("design") {
        "creative director"
    } else {
        "expert professional in your field"
    }
}

fn infer_constraints(task: &str) -> &'static str {
    let task = task.to_lowercase();
    if task.contains("email") {
        "Max length: 500 characters. Tone: professional and persuasive."
    } else if task.contains("blog") {
        "Max length: 2000 words. Format: well-structured with headers. Tone: engaging and informative."
    } else if task.contains("code") {
        "Use best practices. Include comments. Ensure code is production-ready."
    } else {
        "Tone: professional and clear. Be concise and actionable."
    }
}

/// Prompt used when the model reply cannot be parsed at all.
pub fn templated_prompt(task: &str, context: Option<&str>) -> String {
    let context = context
        .filter(|c| !c.trim().is_empty())
        .map(|c| format!("\n\nContext: {}", c))
        .unwrap_or_default();

    format!(
        "You are a {role}.

Goal: {goal}

Your task:
{task}{context}

Your response should include:
1. A clear understanding of the objective
2. Structured, step-by-step approach
3. Actionable recommendations or deliverables
4. Examples where relevant

Format: Professional, clear, and concise.
{constraints}",
        role = infer_role(task),
        goal = truncate_chars(task, 100),
        task = task,
        context = context,
        constraints = infer_constraints(task),
    )
}
