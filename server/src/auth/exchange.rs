//! Authorization-code exchange against the provider's token endpoint.

use alloc::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret as _, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;
use tracing::debug;
use url::Url;

/// Token endpoint response. Only `id_token` is required downstream.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    pub id_token: String,
    #[serde(default)]
    pub token_type: String,
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    grant_type: &'static str,
    client_id: &'a str,
    client_secret: &'a str,
    code: &'a str,
    redirect_uri: &'a str,
}

#[derive(Debug, ThisError)]
pub enum ExchangeError {
    #[error("token request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("token endpoint answered {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("token response is not decodable: {source}")]
    Decode {
        #[source]
        source: serde_json::Error,
        body: String,
    },
}

impl ExchangeError {
    /// Raw payload received from the provider, if any.
    pub fn payload(&self) -> Option<&str> {
        match *self {
            Self::Transport(_) => None,
            Self::Status { ref body, .. } | Self::Decode { ref body, .. } => Some(body),
        }
    }
}

/// Trades a one-time authorization code for tokens.
#[async_trait]
pub trait TokenExchange: Send + Sync {
    async fn exchange(&self, code: &str) -> Result<TokenResponse, ExchangeError>;
}

/// Posts `{grant_type, client_id, client_secret, code, redirect_uri}` as JSON
/// to `/oauth/token`.
pub struct HttpTokenExchange {
    http: reqwest::Client,
    token_url: Url,
    client_id: String,
    client_secret: Arc<SecretString>,
    redirect_uri: Url,
}

impl HttpTokenExchange {
    pub const fn new(
        http: reqwest::Client,
        token_url: Url,
        client_id: String,
        client_secret: Arc<SecretString>,
        redirect_uri: Url,
    ) -> Self {
        Self {
            http,
            token_url,
            client_id,
            client_secret,
            redirect_uri,
        }
    }
}

#[async_trait]
impl TokenExchange for HttpTokenExchange {
    async fn exchange(&self, code: &str) -> Result<TokenResponse, ExchangeError> {
        let request = TokenRequest {
            grant_type: "authorization_code",
            client_id: &self.client_id,
            client_secret: self.client_secret.expose_secret(),
            code,
            redirect_uri: self.redirect_uri.as_str(),
        };
        let response = self
            .http
            .post(self.token_url.clone())
            .json(&request)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if status != StatusCode::OK {
            return Err(ExchangeError::Status { status, body });
        }
        let tokens: TokenResponse = serde_json::from_str(&body)
            .map_err(|source| ExchangeError::Decode { source, body })?;
        debug!(token_type = %tokens.token_type, expires_in = ?tokens.expires_in, "authorization code exchanged");
        Ok(tokens)
    }
}
