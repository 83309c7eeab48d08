use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    #[serde(rename = "isPaid")]
    pub is_paid: bool,
    pub usage_tokens: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(email: String, name: Option<String>, password_hash: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            email,
            name,
            password_hash,
            is_paid: false,
            usage_tokens: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Accounts created through OAuth carry no password hash.
    pub fn is_oauth_only(&self) -> bool {
        self.password_hash.is_none()
    }
}

/// Who wrote a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PromptSource {
    User,
    Ai,
}

impl PromptSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptSource::User => "USER",
            PromptSource::Ai => "AI",
        }
    }
}

impl fmt::Display for PromptSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PromptSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "USER" => Ok(PromptSource::User),
            "AI" => Ok(PromptSource::Ai),
            other => Err(format!("unknown prompt source: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Prompt {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub content: String,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub source: String,
    pub summary: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields a caller supplies when creating or updating a prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPrompt {
    pub title: String,
    pub content: String,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub source: PromptSource,
    pub summary: Option<String>,
}

impl NewPrompt {
    pub fn authored(title: String, content: String, category: Option<String>, tags: Vec<String>) -> Self {
        Self {
            title,
            content,
            category,
            tags,
            source: PromptSource::User,
            summary: None,
        }
    }
}

/// A prompt plus the tokens spent running or optimizing it.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PromptWithUsage {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub prompt: Prompt,
    #[serde(rename = "totalTokensUsed")]
    pub total_tokens_used: i64,
}

/// One AI invocation's token spend. Never mutated after insert.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UsageRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub prompt_id: Option<Uuid>,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_tokens: i64,
    pub created_at: DateTime<Utc>,
}

/// Aggregate over the usage rows of one window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromRow)]
pub struct UsageTotals {
    pub total_tokens: i64,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub request_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PromptVersion {
    pub id: Uuid,
    pub prompt_id: Uuid,
    pub content: String,
    pub version: i32,
    pub created_at: DateTime<Utc>,
}
