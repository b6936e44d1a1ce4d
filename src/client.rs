// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cli-guard project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Command-line side of the guard protocol
//!
//! [`GuardClient`] creates a session, then polls it until a terminal status
//! is reached or a local timeout elapses. Server errors and transport
//! failures are retried with backoff: a poll that fails is never taken as a
//! denial.
//!
//! ```no_run
//! use std::time::Duration;
//! use cli_guard::client::{GuardClient, WaitOutcome};
//!
//! # async fn example() -> Result<(), cli_guard::client::ClientError> {
//! let client = GuardClient::new("http://127.0.0.1:8080")?;
//! let created = client.request(Some("rotate keys"), Some("vault rotate"), None).await?;
//! println!("Open {}", created.authorization_url);
//!
//! match client.wait(&created.view.id, Duration::from_secs(300)).await? {
//!     WaitOutcome::Decided(view) => println!("{}", view.message),
//!     WaitOutcome::TimedOut => println!("no decision yet"),
//! }
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use log::{debug, warn};
use reqwest::header::{ACCEPT, RETRY_AFTER};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::time::{self, Instant};
use url::Url;

use crate::guard::{CreatedSession, NewSessionRequest, SessionView};

/// Shortest pause between two polls, whatever the server advertises
const MIN_POLL_DELAY: Duration = Duration::from_millis(100);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("Guard session '{id}' not found")]
    SessionNotFound { id: String },

    #[error("Invalid guard server URL: {reason}")]
    InvalidUrl { reason: String },

    #[error("Guard server unreachable: {reason}")]
    Transport { reason: String },

    /// 5xx answer; `retry_after` comes from the `Retry-After` header
    #[error("Guard server unavailable (HTTP {status})")]
    Unavailable {
        status: u16,
        retry_after: Option<u64>,
    },

    #[error("Guard server rejected the request (HTTP {status}): {error}")]
    Rejected { status: u16, error: String },

    #[error("Unexpected guard server response: {reason}")]
    InvalidResponse { reason: String },
}

impl ClientError {
    /// Whether polling should continue after this error
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ClientError::Transport { .. } | ClientError::Unavailable { .. }
        )
    }
}

/// Result of [`GuardClient::wait`]
#[derive(Debug, Clone, PartialEq)]
pub enum WaitOutcome {
    /// The session reached a terminal status
    Decided(SessionView),
    /// The local timeout elapsed first; the session may still be pending
    TimedOut,
}

pub struct GuardClient {
    base: Url,
    http: reqwest::Client,
    poll_interval: Duration,
    max_backoff: Duration,
}

impl GuardClient {
    /// Client for the guard server at `base_url`
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let base = Url::parse(base_url).map_err(|e| ClientError::InvalidUrl {
            reason: e.to_string(),
        })?;
        if base.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl {
                reason: format!("{} cannot carry a path", base_url),
            });
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ClientError::Transport {
                reason: e.to_string(),
            })?;
        Ok(Self {
            base,
            http,
            poll_interval: Duration::from_secs(2),
            max_backoff: Duration::from_secs(30),
        })
    }

    /// Delay between polls when the server sends no `Retry-After`
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Upper bound of the backoff applied after transient failures
    pub fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff;
        self
    }

    fn url(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl {
                reason: self.base.to_string(),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Ask for approval
    pub async fn request(
        &self,
        reason: Option<&str>,
        command: Option<&str>,
        ttl_seconds: Option<i64>,
    ) -> Result<CreatedSession, ClientError> {
        let body = NewSessionRequest {
            reason: reason.map(str::to_string),
            command: command.map(str::to_string),
            ttl_seconds,
        };
        let response = self
            .http
            .post(self.url(&["cli", "sessions"])?)
            .header(ACCEPT, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        let (created, _) = decode::<CreatedSession>(response, None).await?;
        debug!("Guard session {} created", created.view.id);
        Ok(created)
    }

    /// Current view of a session
    pub async fn status(&self, id: &str) -> Result<SessionView, ClientError> {
        self.fetch_status(id).await.map(|(view, _)| view)
    }

    /// Withdraw a request; returns the state the session ended in
    pub async fn cancel(&self, id: &str) -> Result<SessionView, ClientError> {
        let response = self
            .http
            .post(self.url(&["cli", "sessions", id, "cancel"])?)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(transport)?;
        decode::<SessionView>(response, Some(id))
            .await
            .map(|(view, _)| view)
    }

    async fn fetch_status(&self, id: &str) -> Result<(SessionView, Option<u64>), ClientError> {
        let response = self
            .http
            .get(self.url(&["cli", "sessions", id])?)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(transport)?;
        decode::<SessionView>(response, Some(id)).await
    }

    /// Poll until the session is decided or `timeout` elapses
    ///
    /// Honours `Retry-After`. Transient failures back off exponentially up to
    /// the configured maximum. Only an unknown session or a rejected request
    /// end the wait with an error.
    pub async fn wait(&self, id: &str, timeout: Duration) -> Result<WaitOutcome, ClientError> {
        let deadline = Instant::now() + timeout;
        let mut backoff = self.poll_interval;

        loop {
            let delay = match self.fetch_status(id).await {
                Ok((view, _)) if view.status.is_terminal() => {
                    return Ok(WaitOutcome::Decided(view));
                }
                Ok((_, retry_after)) => {
                    backoff = self.poll_interval;
                    retry_after.map_or(self.poll_interval, Duration::from_secs)
                }
                Err(err) if err.is_transient() => {
                    warn!("Polling {} failed, retrying: {}", id, err);
                    let delay = match &err {
                        ClientError::Unavailable {
                            retry_after: Some(seconds),
                            ..
                        } => Duration::from_secs(*seconds),
                        _ => backoff,
                    };
                    backoff = (backoff * 2).min(self.max_backoff);
                    delay
                }
                Err(err) => return Err(err),
            };

            let now = Instant::now();
            if now >= deadline {
                return Ok(WaitOutcome::TimedOut);
            }
            time::sleep(delay.max(MIN_POLL_DELAY).min(deadline - now)).await;
        }
    }
}

fn transport(err: reqwest::Error) -> ClientError {
    ClientError::Transport {
        reason: err.to_string(),
    }
}

fn retry_after(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}

/// Decode a success body, or turn the status into a [`ClientError`]
async fn decode<T: DeserializeOwned>(
    response: Response,
    id: Option<&str>,
) -> Result<(T, Option<u64>), ClientError> {
    let status = response.status();
    let retry_after = retry_after(&response);

    if status.is_success() {
        let body = response
            .json::<T>()
            .await
            .map_err(|e| ClientError::InvalidResponse {
                reason: e.to_string(),
            })?;
        return Ok((body, retry_after));
    }

    if status.is_server_error() {
        return Err(ClientError::Unavailable {
            status: status.as_u16(),
            retry_after,
        });
    }

    let error = response
        .json::<serde_json::Value>()
        .await
        .ok()
        .and_then(|body| body.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown").to_string());

    match (status, id) {
        (StatusCode::NOT_FOUND, Some(id)) => Err(ClientError::SessionNotFound { id: id.to_string() }),
        _ => Err(ClientError::Rejected {
            status: status.as_u16(),
            error,
        }),
    }
}
