// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cli-guard project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use thiserror::Error;

/// Failures reported by a [`SessionStore`](super::store::SessionStore) backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Session '{id}' not found")]
    NotFound { id: String },

    #[error("Session '{id}' already exists")]
    Duplicate { id: String },

    /// The stored version moved on, or the session is already terminal
    #[error("Session '{id}' was modified concurrently or is already decided")]
    Conflict { id: String },

    #[error("Session '{id}' is past its deadline")]
    Expired { id: String },

    #[error("Correlation token for session '{id}' was already used or does not match")]
    CorrelationRejected { id: String },

    #[error("Session store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Stored session '{id}' could not be decoded: {reason}")]
    Corrupted { id: String, reason: String },
}

/// Error kinds crossing the guard session API
///
/// Store and provider failures are folded into these variants at the
/// component boundary; raw transport errors never leak past it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GuardError {
    /// Forged, replayed or expired `state` value. No session was touched.
    #[error("Invalid correlation token")]
    InvalidCorrelationToken,

    /// The code exchange failed; the session is moved to `denied`.
    #[error("Identity provider failure: {reason}")]
    IdentityProviderFailure { reason: String },

    #[error("Guard session '{id}' not found")]
    SessionNotFound { id: String },

    /// Lost the compare-and-swap race; re-read the session.
    #[error("Guard session '{id}' was decided concurrently")]
    TransitionConflict { id: String },

    #[error("Guard session '{id}' has expired")]
    SessionExpired { id: String },

    /// Transient backend failure. Callers should retry.
    #[error("Session store unavailable: {reason}")]
    StoreUnavailable { reason: String },

    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// Token signing or provider configuration failed while creating a session
    #[error("Internal guard error: {reason}")]
    Internal { reason: String },
}

impl From<StoreError> for GuardError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { id } => GuardError::SessionNotFound { id },
            StoreError::Conflict { id } => GuardError::TransitionConflict { id },
            StoreError::Expired { id } => GuardError::SessionExpired { id },
            StoreError::CorrelationRejected { .. } => GuardError::InvalidCorrelationToken,
            StoreError::Duplicate { id } => GuardError::InvalidRequest {
                reason: format!("session '{}' already exists", id),
            },
            StoreError::Unavailable { reason } => GuardError::StoreUnavailable { reason },
            StoreError::Corrupted { id, reason } => GuardError::StoreUnavailable {
                reason: format!("session '{}' unreadable: {}", id, reason),
            },
        }
    }
}
