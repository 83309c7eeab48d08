//! AI passthrough endpoints
//!
//! Each operation builds a request for the configured [`ModelClient`](crate::proxy::ModelClient),
//! then massages the free-text reply into something storable. Parsing never
//! fails; unusable replies are replaced by templated content.

pub mod generate;
pub mod handlers;
pub mod optimize;
pub mod run;

pub use generate::{parse_generated, GeneratedPrompt};
pub use optimize::{parse_optimized, OptimizedPrompt};
