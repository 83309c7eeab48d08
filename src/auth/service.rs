use crate::auth::oauth::OAuthClient;
use crate::auth::password::{hash_password_blocking, verify_password_blocking};
use crate::config::Settings;
use crate::db::operations::DbOperations;
use crate::db::models::User;
use crate::error::{AppError, AuthError, DatabaseError};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, decode, Header, EncodingKey, DecodingKey, Validation, Algorithm};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,  // User ID
    pub email: String,
    pub exp: i64,     // Expiration time
    pub iat: i64,     // Issued at
}

impl Claims {
    pub fn user_id(&self) -> Result<Uuid, AppError> {
        Uuid::parse_str(&self.sub).map_err(|_| AppError::AuthError(AuthError::InvalidToken))
    }
}

/// Signed `state` parameter for the OAuth round trip.
#[derive(Debug, Serialize, Deserialize)]
struct OAuthState {
    nonce: String,
    purpose: String,
    exp: i64,
}

const OAUTH_STATE_PURPOSE: &str = "oauth-state";

/// Trims and lowercases an email and rejects obviously malformed input.
pub fn normalize_email(email: &str) -> Result<String, AppError> {
    let email = email.trim().to_lowercase();
    if email.is_empty() {
        return Err(AppError::validation("Email and password are required"));
    }
    if !email.contains('@') {
        return Err(AppError::validation("Email address is invalid"));
    }
    Ok(email)
}

/// Field checks for a registration, before any database access.
pub fn validate_registration(email: &str, password: &str, min_password_length: usize) -> Result<String, AppError> {
    if email.trim().is_empty() || password.is_empty() {
        return Err(AppError::validation("Email and password are required"));
    }
    if password.chars().count() < min_password_length {
        return Err(AppError::validation(format!(
            "Password must be at least {} characters",
            min_password_length
        )));
    }
    normalize_email(email)
}

pub struct AuthService {
    db: DbOperations,
    jwt_secret: String,
    token_expiry_hours: i64,
    min_password_length: usize,
    oauth: Option<OAuthClient>,
}

impl AuthService {
    pub fn new(db: DbOperations, jwt_secret: String, token_expiry_hours: i64) -> Self {
        Self {
            db,
            jwt_secret,
            token_expiry_hours,
            min_password_length: 6,
            oauth: None,
        }
    }

    pub fn from_settings(db: DbOperations, settings: &Settings) -> Self {
        Self {
            db,
            jwt_secret: settings.auth.jwt_secret.clone(),
            token_expiry_hours: settings.auth.token_expiry_hours,
            min_password_length: settings.auth.min_password_length,
            oauth: settings.oauth.clone().map(OAuthClient::new),
        }
    }

    pub async fn register(&self, email: &str, password: &str, name: Option<&str>) -> Result<(User, String), AppError> {
        let email = validate_registration(email, password, self.min_password_length)?;

        if self.db.get_user_by_email(&email).await?.is_some() {
            return Err(AppError::DatabaseError(DatabaseError::Duplicate));
        }

        let password_hash = hash_password_blocking(password).await?;
        let user = User::new(email, name.map(str::to_string), Some(password_hash));
        let user = self.db.create_user(&user).await?;
        info!("Registered user {}", user.id);

        let token = self.generate_token(&user)?;
        Ok((user, token))
    }

    pub async fn authenticate(&self, email: &str, password: &str) -> Result<(User, String), AppError> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(AppError::validation("Email and password are required"));
        }
        let email = normalize_email(email)?;

        let user = self.db.get_user_by_email(&email).await?
            .ok_or(AuthError::InvalidCredentials)?;

        if user.is_oauth_only() {
            return Err(AuthError::OAuthOnlyAccount.into());
        }
        let stored_hash = user.password_hash.as_deref().unwrap_or_default();

        if !verify_password_blocking(password, stored_hash).await? {
            warn!("Failed password attempt for user {}", user.id);
            return Err(AuthError::InvalidCredentials.into());
        }

        let token = self.generate_token(&user)?;
        Ok((user, token))
    }

    pub fn oauth(&self) -> Result<&OAuthClient, AppError> {
        self.oauth.as_ref().ok_or_else(|| AuthError::OAuthNotConfigured.into())
    }

    /// Exchanges an authorization code and finds or creates the account by email.
    pub async fn authenticate_oauth(&self, code: &str, state: &str) -> Result<(User, String), AppError> {
        let oauth = self.oauth()?;
        self.verify_oauth_state(state)?;

        let access_token = oauth.exchange_code(code).await?;
        let profile = oauth.fetch_profile(&access_token).await?;
        let email = normalize_email(&profile.email)?;

        let user = match self.db.get_user_by_email(&email).await? {
            Some(user) => user,
            None => {
                let new_user = User::new(email, profile.name, None);
                let user = self.db.create_user(&new_user).await?;
                info!("Created user {} from {} sign-in", user.id, oauth.provider());
                user
            }
        };

        let token = self.generate_token(&user)?;
        Ok((user, token))
    }

    pub fn issue_oauth_state(&self) -> Result<String, AppError> {
        let state = OAuthState {
            nonce: Uuid::new_v4().to_string(),
            purpose: OAUTH_STATE_PURPOSE.to_string(),
            exp: (Utc::now() + Duration::minutes(10)).timestamp(),
        };
        Ok(encode(
            &Header::default(),
            &state,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )?)
    }

    fn verify_oauth_state(&self, state: &str) -> Result<(), AppError> {
        let decoded = decode::<OAuthState>(
            state,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .map_err(|_| AuthError::OAuthFailed("invalid state parameter".into()))?;

        if decoded.claims.purpose != OAUTH_STATE_PURPOSE {
            return Err(AuthError::OAuthFailed("invalid state parameter".into()).into());
        }
        Ok(())
    }

    pub fn validate_token(&self, token: &str) -> Result<Claims, AppError> {
        let claims = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )?;

        Ok(claims.claims)
    }

    pub fn generate_token(&self, user: &User) -> Result<String, AppError> {
        let now = Utc::now();
        let exp = (now + Duration::hours(self.token_expiry_hours)).timestamp();
        let claims = Claims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            exp,
            iat: now.timestamp(),
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )?;

        Ok(token)
    }

    /// Loads the account a token belongs to. A deleted account is unauthorized.
    pub async fn current_user(&self, claims: &Claims) -> Result<User, AppError> {
        self.db
            .get_user_by_id(claims.user_id()?)
            .await?
            .ok_or_else(|| AuthError::InvalidToken.into())
    }
}
