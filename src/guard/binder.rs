// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cli-guard project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Correlation token binding
//!
//! The correlation token is the OAuth `state` value that ties an identity
//! provider callback to the guard session which started the browser flow.
//! It is a compact HS256 JWT whose claims carry the session id, a random
//! token id (`jti`) and the session deadline as `exp`, so integrity and
//! expiry are checked without a lookup. Single use is enforced by the store:
//! [`StateBinder::consume`] claims the `jti` through
//! [`SessionStore::consume_correlation`], which succeeds only once.

use base64::Engine;
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::error::{GuardError, StoreError};
use super::session::GuardSession;
use super::store::SessionStore;

/// Audience of every correlation token
pub const CORRELATION_AUDIENCE: &str = "cli-guard-callback";

/// Issuer of every correlation token
pub const CORRELATION_ISSUER: &str = "cli-guard";

/// Claims embedded in a correlation token
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CorrelationClaims {
    /// Guard session id
    pub sid: String,
    /// Random token id, recorded on the session
    pub jti: String,
    pub iat: i64,
    /// Session deadline
    pub exp: i64,
    pub aud: String,
    pub iss: String,
}

/// A freshly issued token and the id the session must record
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub correlation_id: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BinderError {
    #[error("Correlation token could not be signed: {reason}")]
    Signing { reason: String },

    #[error("Correlation token has expired")]
    Expired,

    #[error("Correlation token rejected: {reason}")]
    Rejected { reason: String },
}

impl From<BinderError> for GuardError {
    fn from(_: BinderError) -> Self {
        GuardError::InvalidCorrelationToken
    }
}

/// Issues and validates correlation tokens
#[derive(Clone)]
pub struct StateBinder {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl StateBinder {
    /// Create a binder from a raw HMAC secret
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        }
    }

    /// Create a binder from a base64 encoded secret, as stored in the configuration
    pub fn from_base64(secret: &str) -> anyhow::Result<Self> {
        let raw = base64::engine::general_purpose::STANDARD.decode(secret)?;
        if raw.len() < 32 {
            anyhow::bail!("State secret must be at least 32 bytes, got {}", raw.len());
        }
        Ok(Self::new(&raw))
    }

    /// Issue a token for `session_id`, valid until `expires_at`
    pub fn issue(
        &self,
        session_id: &str,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<IssuedToken, BinderError> {
        let jti = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .encode(rand::random::<[u8; 16]>());
        let claims = CorrelationClaims {
            sid: session_id.to_string(),
            jti: jti.clone(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
            aud: CORRELATION_AUDIENCE.to_string(),
            iss: CORRELATION_ISSUER.to_string(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| BinderError::Signing {
                reason: e.to_string(),
            })?;
        Ok(IssuedToken {
            token,
            correlation_id: jti,
        })
    }

    /// Check signature, audience, issuer and expiry without consuming
    pub fn verify(&self, token: &str) -> Result<CorrelationClaims, BinderError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[CORRELATION_AUDIENCE]);
        validation.set_issuer(&[CORRELATION_ISSUER]);
        validation.set_required_spec_claims(&["exp", "aud", "iss"]);
        validation.leeway = 0;

        decode::<CorrelationClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => BinderError::Expired,
                _ => BinderError::Rejected {
                    reason: e.to_string(),
                },
            })
    }

    /// Validate `token` and mark it used
    ///
    /// Returns the session it is bound to. A second call with the same raw
    /// token fails with `InvalidCorrelationToken`. Nothing about the session's
    /// status is changed here.
    pub async fn consume(
        &self,
        store: &dyn SessionStore,
        token: &str,
    ) -> Result<GuardSession, GuardError> {
        let claims = self.verify(token).map_err(|e| {
            debug!("Correlation token verification failed: {}", e);
            GuardError::from(e)
        })?;

        match store.consume_correlation(&claims.sid, &claims.jti).await {
            Ok(session) => Ok(session),
            Err(StoreError::Unavailable { reason }) => Err(GuardError::StoreUnavailable { reason }),
            Err(err) => {
                debug!("Correlation token for {} rejected: {}", claims.sid, err);
                Err(GuardError::InvalidCorrelationToken)
            }
        }
    }
}
