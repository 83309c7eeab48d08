//! Database module for the prompt manager
//!
//! Connection pooling, the idempotent schema, and the data access layer
//! for users, prompts, usage rows and prompt versions.

pub mod models;
pub mod operations;

pub use models::{NewPrompt, Prompt, PromptSource, PromptVersion, PromptWithUsage, UsageRecord, UsageTotals, User};
pub use operations::{DbOperations, DbPoolStatus, PromptSort};
