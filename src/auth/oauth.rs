use serde::Deserialize;
use tracing::{debug, error};
use url::Url;

use crate::config::OAuthConfig;
use crate::error::{AppError, AuthError};

/// Profile fields read from the provider's userinfo endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthProfile {
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Authorization-code flow against a single configured provider.
pub struct OAuthClient {
    config: OAuthConfig,
    http: reqwest::Client,
}

impl OAuthClient {
    pub fn new(config: OAuthConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    pub fn provider(&self) -> &str {
        &self.config.provider
    }

    /// URL of the provider's consent screen.
    pub fn authorize_url(&self, state: &str) -> Result<String, AppError> {
        let scope = if self.config.scopes.is_empty() {
            "openid email profile".to_string()
        } else {
            self.config.scopes.join(" ")
        };
        let url = Url::parse_with_params(
            &self.config.authorize_url,
            &[
                ("response_type", "code"),
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_url.as_str()),
                ("scope", scope.as_str()),
                ("state", state),
            ],
        )
        .map_err(|e| AppError::ConfigError(format!("Invalid oauth.authorize_url: {}", e)))?;

        Ok(url.to_string())
    }

    pub async fn exchange_code(&self, code: &str) -> Result<String, AppError> {
        let res = self
            .http
            .post(&self.config.token_url)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.config.redirect_url.as_str()),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AuthError::OAuthFailed(e.to_string()))?;

        if !res.status().is_success() {
            error!("{} token exchange returned {}", self.config.provider, res.status());
            return Err(AuthError::OAuthFailed(format!("token endpoint returned {}", res.status())).into());
        }

        let token: TokenResponse = res
            .json()
            .await
            .map_err(|_| AuthError::OAuthFailed("Invalid token response".into()))?;

        Ok(token.access_token)
    }

    pub async fn fetch_profile(&self, access_token: &str) -> Result<OAuthProfile, AppError> {
        let res = self
            .http
            .get(&self.config.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AuthError::OAuthFailed(e.to_string()))?;

        if !res.status().is_success() {
            return Err(AuthError::OAuthFailed(format!("userinfo endpoint returned {}", res.status())).into());
        }

        let profile: OAuthProfile = res
            .json()
            .await
            .map_err(|_| AuthError::OAuthFailed("Invalid userinfo response".into()))?;
        debug!("Fetched {} profile for {}", self.config.provider, profile.email);

        Ok(profile)
    }
}
