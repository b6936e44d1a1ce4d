// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cli-guard project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Identity provider client
//!
//! The guard only needs two things from the provider: a URL to send the
//! approver's browser to, and a way to turn the returned authorization code
//! into an [`Identity`]. [`OAuthProvider`] does this with the standard
//! authorization code grant followed by a userinfo request.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use super::session::Identity;
use crate::config::ProviderConfig;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Identity provider configuration error: {reason}")]
    Configuration { reason: String },

    #[error("Identity provider unreachable: {reason}")]
    Transport { reason: String },

    #[error("Identity provider did not answer within {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Identity provider rejected the request: {error}")]
    Rejected { error: String },

    #[error("Identity provider returned an unexpected response: {reason}")]
    InvalidResponse { reason: String },
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Where to send the approver, carrying `state` back to the callback
    fn authorization_url(&self, state: &str) -> Result<Url, ProviderError>;

    /// Exchange an authorization code for the approver's identity
    async fn exchange_code(&self, code: &str) -> Result<Identity, ProviderError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    scope: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// OAuth 2.0 / OpenID Connect provider reached over HTTP
pub struct OAuthProvider {
    config: ProviderConfig,
    http: reqwest::Client,
    timeout: Duration,
}

impl OAuthProvider {
    /// Build a provider client, every exchange bounded by `timeout`
    pub fn new(config: ProviderConfig, timeout: Duration) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Configuration {
                reason: e.to_string(),
            })?;
        Ok(Self {
            config,
            http,
            timeout,
        })
    }

    async fn rejected(response: reqwest::Response) -> ProviderError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<ErrorResponse>(&body) {
            Ok(err) => ProviderError::Rejected {
                error: match err.error_description {
                    Some(description) => format!("{} ({})", err.error, description),
                    None => err.error,
                },
            },
            Err(_) => ProviderError::Rejected {
                error: format!("HTTP {}", status.as_u16()),
            },
        }
    }

    async fn request_token(&self, code: &str) -> Result<TokenResponse, ProviderError> {
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];
        let body = serde_urlencoded::to_string(form).map_err(|e| ProviderError::Configuration {
            reason: e.to_string(),
        })?;

        let response = self
            .http
            .post(&self.config.token_url)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(ACCEPT, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| ProviderError::Transport {
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(Self::rejected(response).await);
        }
        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| ProviderError::InvalidResponse {
                reason: e.to_string(),
            })
    }

    async fn fetch_identity(&self, token: TokenResponse) -> Result<Identity, ProviderError> {
        let response = self
            .http
            .get(&self.config.userinfo_url)
            .bearer_auth(&token.access_token)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| ProviderError::Transport {
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(Self::rejected(response).await);
        }
        let mut claims = response
            .json::<BTreeMap<String, serde_json::Value>>()
            .await
            .map_err(|e| ProviderError::InvalidResponse {
                reason: e.to_string(),
            })?;

        let principal = match claims.remove("sub") {
            Some(serde_json::Value::String(sub)) if !sub.is_empty() => sub,
            _ => {
                return Err(ProviderError::InvalidResponse {
                    reason: "userinfo response has no subject".to_string(),
                })
            }
        };
        let scope = token.scope.unwrap_or_else(|| self.config.scope.clone());

        let mut identity = Identity::new(principal).with_scopes(scope.split_whitespace());
        identity.attributes = claims;
        Ok(identity)
    }
}

#[async_trait]
impl IdentityProvider for OAuthProvider {
    fn authorization_url(&self, state: &str) -> Result<Url, ProviderError> {
        let mut url =
            Url::parse(&self.config.authorize_url).map_err(|e| ProviderError::Configuration {
                reason: format!("authorize_url: {}", e),
            })?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("scope", &self.config.scope)
            .append_pair("state", state);
        Ok(url)
    }

    async fn exchange_code(&self, code: &str) -> Result<Identity, ProviderError> {
        debug!("Exchanging authorization code with {}", self.config.token_url);
        let exchange = async {
            let token = self.request_token(code).await?;
            self.fetch_identity(token).await
        };
        match tokio::time::timeout(self.timeout, exchange).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Authorization code exchange timed out");
                Err(ProviderError::Timeout {
                    seconds: self.timeout.as_secs(),
                })
            }
        }
    }
}
