//! IAM token exchange for Yandex Cloud.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

const IAM_TOKEN_URL: &str = "https://iam.api.cloud.yandex.net/iam/v1/tokens";

/// Source of short-lived bearer tokens for the completion API.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn bearer_token(&self) -> Result<String, AuthError>;
}

/// Exchanges the OAuth token for an IAM token on every call. No caching.
pub struct IamTokenProvider {
    oauth_token: String,
    endpoint: String,
    http: reqwest::Client,
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    #[serde(rename = "yandexPassportOauthToken")]
    oauth_token: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(rename = "iamToken")]
    iam_token: String,
}

impl IamTokenProvider {
    pub fn new(oauth_token: String) -> Self {
        Self::with_endpoint(oauth_token, IAM_TOKEN_URL)
    }

    pub fn with_endpoint(oauth_token: String, endpoint: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            oauth_token,
            endpoint: endpoint.into(),
            http,
        }
    }
}

#[async_trait]
impl CredentialProvider for IamTokenProvider {
    async fn bearer_token(&self) -> Result<String, AuthError> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(&TokenRequest {
                oauth_token: &self.oauth_token,
            })
            .send()
            .await
            .map_err(|e| AuthError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Status(format!("{status}: {body}")));
        }

        let parsed: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Parse(e.to_string()))?;

        debug!("IAM token obtained ({} chars)", parsed.iam_token.len());
        Ok(parsed.iam_token)
    }
}

#[derive(Debug)]
pub enum AuthError {
    Http(String),
    Status(String),
    Parse(String),
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::Http(e) => write!(f, "IAM HTTP error: {e}"),
            AuthError::Status(e) => write!(f, "IAM exchange rejected: {e}"),
            AuthError::Parse(e) => write!(f, "IAM parse error: {e}"),
        }
    }
}

impl std::error::Error for AuthError {}
