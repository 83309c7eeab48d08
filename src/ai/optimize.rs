use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::AppError;
use crate::proxy::{CompletionRequest, GenerationOptions, ModelClient, TokenUsage};

const SYSTEM_PROMPT: &str = "Your job is to REWRITE and IMPROVE the prompt you are given. \
Do not execute it or answer it.

For example, given \"Write a blog post about AI\" you must not write the post. Instead return \
an improved prompt such as: \"You are a technology journalist with 10+ years of experience. \
Write a 1500-2000 word blog post about the impact of AI on business for {target_audience}, \
structured as introduction, three key trends, real-world examples and outlook...\"

Apply the three to five most relevant of these strategies:
- Define an expert role or persona.
- Name the target audience.
- Break the task into clear sections or steps.
- Set precise constraints: length, tone, format.
- Spell out the deliverable format.
- Add examples or context for what success looks like.
- Replace customizable details with {descriptive_placeholders}.

Reply in exactly this plain-text format, without JSON or code fences:

OPTIMIZED PROMPT:
<the rewritten prompt as natural paragraphs, 2-3x more detailed than the input>

KEY IMPROVEMENTS:
- <improvement and why it matters>
- <improvement and why it matters>
- <improvement and why it matters>";

const MIN_NOTE_CHARS: usize = 5;

const DEFAULT_NOTES: [&str; 3] = [
    "Added specific context and role definition",
    "Improved clarity with structured format",
    "Enhanced specificity for better AI understanding",
];

static OPTIMIZED_HEADER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)OPTIMIZED\s+PROMPT\s*:").unwrap());
static IMPROVEMENTS_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:KEY\s+IMPROVEMENTS|📝[^\n]*?IMPROVEMENTS)[^\n]*").unwrap());
static NUMBERED_ITEM: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[ \t]*\d+\.[ \t]+(.+)$").unwrap());
static DASHED_ITEM: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[ \t]*-[ \t]+(.+)$").unwrap());
static LIST_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?:\d+\.|-)\s*").unwrap());
static SECTION_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)IMPROVEMENTS|📝").unwrap());

#[derive(Debug, Clone, PartialEq)]
pub struct OptimizedPrompt {
    pub improved_prompt: String,
    pub improvements: Vec<String>,
}

pub fn build_request(content: &str) -> CompletionRequest {
    CompletionRequest::new(
        SYSTEM_PROMPT,
        format!("Optimize this prompt:\n\n{}", content),
        GenerationOptions {
            temperature: 0.5,
            top_p: 0.8,
            max_tokens: 500,
            repeat_penalty: None,
        },
    )
}

pub async fn optimize_prompt(
    client: &dyn ModelClient,
    content: &str,
) -> Result<(OptimizedPrompt, TokenUsage), AppError> {
    let completion = client.complete(&build_request(content)).await?;
    Ok((parse_optimized(&completion.content), completion.usage))
}

/// Splits an optimization reply into the rewritten prompt and its notes.
///
/// When no `OPTIMIZED PROMPT:` header is present the whole reply is the
/// prompt. Notes fall back to three generic ones when none can be found.
pub fn parse_optimized(raw: &str) -> OptimizedPrompt {
    let improved_prompt = optimized_section(raw).unwrap_or_else(|| raw.trim().to_string());

    let mut improvements = improvements_section(raw).map(list_items).unwrap_or_default();
    if improvements.is_empty() {
        improvements = scan_for_notes(raw);
    }
    if improvements.is_empty() {
        improvements = DEFAULT_NOTES.iter().map(|note| note.to_string()).collect();
    }

    OptimizedPrompt {
        improved_prompt,
        improvements,
    }
}

fn optimized_section(raw: &str) -> Option<String> {
    let header = OPTIMIZED_HEADER.find(raw)?;
    let rest = &raw[header.end()..];
    let body = match IMPROVEMENTS_HEADER.find(rest) {
        Some(next) => &rest[..next.start()],
        None => rest,
    };
    let body = body.trim().trim_end_matches(|c: char| c == '#' || c == '*').trim();
    (!body.is_empty()).then(|| body.to_string())
}

fn improvements_section(raw: &str) -> Option<&str> {
    let header = IMPROVEMENTS_HEADER.find(raw)?;
    Some(&raw[header.end()..])
}

/// Numbered items win over dashed ones.
fn list_items(section: &str) -> Vec<String> {
    let numbered = capture_notes(&NUMBERED_ITEM, section);
    if !numbered.is_empty() {
        return numbered;
    }
    capture_notes(&DASHED_ITEM, section)
}

fn capture_notes(pattern: &Regex, text: &str) -> Vec<String> {
    pattern
        .captures_iter(text)
        .map(|caps| caps[1].trim().to_string())
        .filter(|note| note.chars().count() > MIN_NOTE_CHARS)
        .collect()
}

/// Line-by-line pass for replies whose notes header is not the expected one.
fn scan_for_notes(raw: &str) -> Vec<String> {
    let mut notes = Vec::new();
    let mut in_section = false;

    for line in raw.lines() {
        if SECTION_MARKER.is_match(line) {
            in_section = true;
            continue;
        }
        if !in_section {
            continue;
        }
        let line = line.trim();
        if !LIST_MARKER.is_match(line) || line.chars().count() <= MIN_NOTE_CHARS {
            continue;
        }
        let note = LIST_MARKER.replace(line, "").trim().to_string();
        if note.chars().count() > MIN_NOTE_CHARS {
            notes.push(note);
        }
    }
    notes
}
