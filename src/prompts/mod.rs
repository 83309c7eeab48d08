//! Prompt CRUD, bulk import and JSON export
//!
//! Every query is scoped by the caller's user id, so a prompt owned by
//! someone else is indistinguishable from one that does not exist.

pub mod handlers;
pub mod transfer;

pub use transfer::{normalize_tags, parse_import, PromptInput};
