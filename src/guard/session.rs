// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cli-guard project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Guard session data model
//!
//! A [`GuardSession`] is one authorization request raised by a command-line
//! client and decided by a human through the identity provider. Sessions start
//! `pending` and reach exactly one terminal status. Every status change goes
//! through [`GuardSession::apply`], which enforces the compare-and-swap rules
//! shared by all store backends.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::error::StoreError;

/// Lifecycle status of a guard session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Waiting for a decision
    Pending,
    /// The identity provider authenticated the approver
    Approved,
    /// The provider refused, or the exchange failed
    Denied,
    /// The command-line client withdrew the request
    Cancelled,
    /// The deadline passed before any decision
    Expired,
}

impl SessionStatus {
    /// Whether this status can never change again
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::Pending)
    }

    /// Short human readable line for command-line output
    pub fn message(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "request pending",
            SessionStatus::Approved => "request approved",
            SessionStatus::Denied => "request denied",
            SessionStatus::Cancelled => "request cancelled",
            SessionStatus::Expired => "request expired",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Approved => "approved",
            SessionStatus::Denied => "denied",
            SessionStatus::Cancelled => "cancelled",
            SessionStatus::Expired => "expired",
        };
        f.write_str(label)
    }
}

/// Authenticated principal returned by the identity provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    /// Stable identifier of the approver (`sub` claim)
    pub principal: String,

    /// Scopes granted during the exchange
    #[serde(default)]
    pub scopes: Vec<String>,

    /// Extra profile attributes (name, email, ...)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl Identity {
    pub fn new(principal: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
            scopes: Vec::new(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }
}

/// A requested move from `pending` into a terminal status
///
/// Only the constructors below exist, so a transition can never target
/// `pending` and approval always carries an identity.
#[derive(Debug, Clone)]
pub struct Transition {
    status: SessionStatus,
    identity: Option<Identity>,
    reason: Option<String>,
    at: DateTime<Utc>,
}

impl Transition {
    pub fn approve(identity: Identity, at: DateTime<Utc>) -> Self {
        Self {
            status: SessionStatus::Approved,
            identity: Some(identity),
            reason: None,
            at,
        }
    }

    pub fn deny(reason: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            status: SessionStatus::Denied,
            identity: None,
            reason: Some(reason.into()),
            at,
        }
    }

    pub fn cancel(at: DateTime<Utc>) -> Self {
        Self {
            status: SessionStatus::Cancelled,
            identity: None,
            reason: None,
            at,
        }
    }

    pub fn expire(at: DateTime<Utc>) -> Self {
        Self {
            status: SessionStatus::Expired,
            identity: None,
            reason: None,
            at,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn at(&self) -> DateTime<Utc> {
        self.at
    }
}

/// Stored state of a single guard session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardSession {
    /// Opaque identifier used by the CLI for polling and cancellation
    pub id: String,

    /// Identifier of the correlation token issued for this session
    ///
    /// The token itself travels through the browser as the OAuth `state`
    /// parameter; only its `jti` is kept here.
    pub correlation_id: String,

    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    /// Fixed at creation, never extended
    pub expires_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
    pub identity: Option<Identity>,

    /// Why the session was denied. Kept for operators, never sent to the CLI.
    pub denial_reason: Option<String>,

    /// Free text supplied by the requester
    pub reason: Option<String>,
    /// Command the requester wants to run
    pub command: Option<String>,

    /// Incremented on every accepted transition
    pub version: u64,
}

impl GuardSession {
    /// Build a fresh `pending` session
    pub fn new(
        id: impl Into<String>,
        correlation_id: impl Into<String>,
        created_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            id: id.into(),
            correlation_id: correlation_id.into(),
            status: SessionStatus::Pending,
            created_at,
            expires_at: created_at + ttl,
            decided_at: None,
            identity: None,
            denial_reason: None,
            reason: None,
            command: None,
            version: 0,
        }
    }

    /// Whether the deadline has passed at `now`
    pub fn is_past_deadline(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Status as observed at `now`
    ///
    /// A `pending` session past its deadline reads as `expired` even if nobody
    /// persisted that yet. Terminal statuses are returned as stored.
    pub fn effective_status(&self, now: DateTime<Utc>) -> SessionStatus {
        if self.status == SessionStatus::Pending && self.is_past_deadline(now) {
            SessionStatus::Expired
        } else {
            self.status
        }
    }

    /// Instant after which the session may be deleted
    pub fn reclaimable_after(&self, retention: Duration) -> DateTime<Utc> {
        let anchor = match self.decided_at {
            Some(decided) if decided > self.expires_at => decided,
            _ => self.expires_at,
        };
        anchor + retention
    }

    /// Apply a transition with compare-and-swap semantics
    ///
    /// Succeeds only when `version == expected_version` and the session is
    /// still `pending`. Approval, denial and cancellation are refused once the
    /// deadline has passed; only expiry is accepted then.
    pub fn apply(&mut self, expected_version: u64, transition: Transition) -> Result<(), StoreError> {
        if self.status.is_terminal() || self.version != expected_version {
            return Err(StoreError::Conflict {
                id: self.id.clone(),
            });
        }
        if transition.status != SessionStatus::Expired && self.is_past_deadline(transition.at) {
            return Err(StoreError::Expired {
                id: self.id.clone(),
            });
        }

        self.status = transition.status;
        self.decided_at = Some(transition.at);
        self.identity = transition.identity;
        self.denial_reason = transition.reason;
        self.version += 1;
        Ok(())
    }
}

/// What the command-line client gets to see about a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionView {
    pub id: String,
    pub status: SessionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<Identity>,
    pub message: String,
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,
}

impl SessionView {
    /// Project a stored session as seen at `now`
    pub fn observe(session: &GuardSession, now: DateTime<Utc>) -> Self {
        let status = session.effective_status(now);
        let decided_at = match (status, session.decided_at) {
            (SessionStatus::Expired, None) => Some(session.expires_at),
            (_, decided) => decided,
        };
        Self {
            id: session.id.clone(),
            status,
            identity: if status == SessionStatus::Approved {
                session.identity.clone()
            } else {
                None
            },
            message: status.message().to_string(),
            expires_at: session.expires_at,
            decided_at,
        }
    }
}
