//! Authentication module for the prompt manager
//!
//! Password and OAuth sign-in, JWT issuance, and the bearer-token
//! extractor that guards every user-scoped route.

pub mod handlers;
mod extractor;
mod oauth;
mod password;
mod service;

pub use extractor::{bearer_token, AuthenticatedUser};
pub use oauth::{OAuthClient, OAuthProfile};
pub use password::{hash_password, hash_password_blocking, verify_password, verify_password_blocking};
pub use service::{normalize_email, validate_registration, AuthService, Claims};
