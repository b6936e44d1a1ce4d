// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cli-guard project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Guard session lifecycle configuration
//!
//! Timing parameters for guard sessions and the secret used to sign
//! correlation tokens.

use base64::Engine;
use rocket::{
    request::{FromRequest, Outcome},
    Request, State,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::Config;

/// Upper bound for session lifetimes and retention: one year
pub const MAX_LIFETIME_SECONDS: i64 = 31_536_000;

/// Upper bound for the sweeper period, the poll interval and the exchange timeout
pub const MAX_INTERVAL_SECONDS: u64 = 86_400;

/// Lifecycle settings for guard sessions
///
/// # Example
///
/// ```
/// use cli_guard::config::GuardConfig;
///
/// let guard = GuardConfig::default();
/// assert_eq!(guard.session_ttl().num_seconds(), 300);
/// assert!(guard.session_ttl_seconds <= guard.max_session_ttl_seconds);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Lifetime of a session when the requester does not ask for one
    #[serde(default = "default_session_ttl")]
    pub session_ttl_seconds: i64,

    /// Upper bound for a requested lifetime
    #[serde(default = "default_max_session_ttl")]
    pub max_session_ttl_seconds: i64,

    /// How long decided or expired sessions are kept before the sweeper deletes them
    #[serde(default = "default_retention")]
    pub retention_seconds: i64,

    /// Period of the sweeper
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,

    /// Poll rate advertised to command-line clients through `Retry-After`
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,

    /// Upper bound for the authorization code exchange
    #[serde(default = "default_exchange_timeout")]
    pub exchange_timeout_seconds: u64,

    /// Base64 encoded HMAC key for correlation tokens (at least 32 bytes)
    ///
    /// A random key is generated when the configuration file is first created.
    /// Rotating it invalidates every browser flow in progress.
    #[serde(default = "default_state_secret")]
    pub state_secret: String,
}

fn default_session_ttl() -> i64 {
    300
}

fn default_max_session_ttl() -> i64 {
    3600
}

fn default_retention() -> i64 {
    86400
}

fn default_sweep_interval() -> u64 {
    30
}

fn default_poll_interval() -> u64 {
    2
}

fn default_exchange_timeout() -> u64 {
    10
}

fn default_state_secret() -> String {
    base64::engine::general_purpose::STANDARD.encode(rand::random::<[u8; 32]>())
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            session_ttl_seconds: default_session_ttl(),
            max_session_ttl_seconds: default_max_session_ttl(),
            retention_seconds: default_retention(),
            sweep_interval_seconds: default_sweep_interval(),
            poll_interval_seconds: default_poll_interval(),
            exchange_timeout_seconds: default_exchange_timeout(),
            state_secret: default_state_secret(),
        }
    }
}

/// Seconds as a duration, clamped to `0..=MAX_LIFETIME_SECONDS`
fn lifetime(seconds: i64) -> chrono::Duration {
    chrono::Duration::seconds(seconds.clamp(0, MAX_LIFETIME_SECONDS))
}

impl GuardConfig {
    pub fn session_ttl(&self) -> chrono::Duration {
        lifetime(self.session_ttl_seconds.min(self.max_session_ttl_seconds))
    }

    pub fn max_session_ttl(&self) -> chrono::Duration {
        lifetime(self.max_session_ttl_seconds)
    }

    /// Lifetime granted for a requested `ttl_seconds`, capped by the maximum
    pub fn requested_ttl(&self, seconds: i64) -> chrono::Duration {
        lifetime(seconds.min(self.max_session_ttl_seconds))
    }

    pub fn retention(&self) -> chrono::Duration {
        lifetime(self.retention_seconds)
    }

    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_seconds.min(MAX_INTERVAL_SECONDS))
    }

    pub fn exchange_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.exchange_timeout_seconds.min(MAX_INTERVAL_SECONDS))
    }
}

/// Request guard for accessing the GuardConfig from the managed `Config`
#[rocket::async_trait]
impl<'r> FromRequest<'r> for GuardConfig {
    type Error = &'static str;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match request.guard::<&State<Arc<Config>>>().await {
            Outcome::Success(config) => Outcome::Success(config.guard.clone()),
            Outcome::Error((status, _)) => Outcome::Error((status, "Missing guard config")),
            Outcome::Forward(status) => Outcome::Forward(status),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_durations_are_bounded() {
        let guard = GuardConfig {
            max_session_ttl_seconds: i64::MAX,
            retention_seconds: i64::MAX,
            sweep_interval_seconds: u64::MAX,
            ..GuardConfig::default()
        };
        let year = chrono::Duration::seconds(MAX_LIFETIME_SECONDS);
        assert_eq!(guard.retention(), year);
        assert_eq!(guard.max_session_ttl(), year);
        assert_eq!(guard.requested_ttl(i64::MAX), year);
        assert_eq!(
            guard.sweep_interval(),
            std::time::Duration::from_secs(MAX_INTERVAL_SECONDS)
        );
    }

    #[test]
    fn test_requested_ttl_is_capped_by_maximum() {
        let guard = GuardConfig::default();
        assert_eq!(guard.requested_ttl(60), chrono::Duration::seconds(60));
        assert_eq!(guard.requested_ttl(i64::MAX), guard.max_session_ttl());
    }
}
