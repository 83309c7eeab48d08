use chrono::NaiveDate;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::db::{NewPrompt, PromptSource};
use crate::error::AppError;

/// Prompt fields as clients send them, for create, update and import.
/// Unknown fields (ids, owners, timestamps from an export) are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PromptInput {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default, deserialize_with = "deserialize_tags")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
}

impl PromptInput {
    /// Requires a non-blank title and content.
    pub fn into_new_prompt(self) -> Option<NewPrompt> {
        let title = non_blank(self.title)?;
        let content = non_blank(self.content)?;
        let source = self
            .source
            .as_deref()
            .and_then(|s| s.parse::<PromptSource>().ok())
            .unwrap_or(PromptSource::User);

        Some(NewPrompt {
            title,
            content,
            category: non_blank(self.category),
            tags: self.tags,
            source,
            summary: non_blank(self.summary),
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Splits and trims tags, dropping blanks.
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tags.into_iter()
        .map(|t| t.as_ref().trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Accepts `["a", "b"]`, `"a, b"` or `null`.
fn deserialize_tags<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::String(s)) => normalize_tags(s.split(',')),
        Some(Value::Array(items)) => normalize_tags(items.into_iter().map(|item| match item {
            Value::String(s) => s,
            other => other.to_string(),
        })),
        Some(other) => return Err(serde::de::Error::custom(format!("invalid tags: {}", other))),
    })
}

/// Validates an import payload. The whole batch is rejected before any
/// insert when the payload is not an array or an item is unusable.
pub fn parse_import(prompts: Option<&Value>) -> Result<Vec<NewPrompt>, AppError> {
    let items = match prompts {
        Some(Value::Array(items)) => items,
        _ => return Err(AppError::validation("Invalid import data")),
    };

    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            serde_json::from_value::<PromptInput>(item.clone())
                .ok()
                .and_then(PromptInput::into_new_prompt)
                .ok_or_else(|| {
                    AppError::validation(format!("Prompt #{} needs a title and content", index + 1))
                })
        })
        .collect()
}

pub fn export_filename(date: NaiveDate) -> String {
    format!("prompts-backup-{}.json", date.format("%Y-%m-%d"))
}
