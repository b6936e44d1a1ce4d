// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cli-guard project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Guard session operations
//!
//! [`GuardService`] ties the store, the correlation token binder and the
//! identity provider together. It exposes the three entry points used by the
//! web layer:
//!
//! - [`GuardService::create`] allocates a pending session for a command-line
//!   client and returns the URL the approver must open
//! - [`GuardService::handle_callback`] processes the identity provider redirect
//! - [`GuardService::status`] and [`GuardService::cancel`] serve the polling
//!   command-line client
//!
//! Every mutation is a compare-and-swap on the version read just before, and a
//! lost race is always resolved by re-reading the session rather than retrying.

use std::sync::Arc;

use chrono::Utc;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::binder::StateBinder;
use super::error::{GuardError, StoreError};
use super::provider::IdentityProvider;
use super::session::{GuardSession, SessionStatus, SessionView, Transition};
use super::store::SessionStore;
use crate::config::GuardConfig;

/// Body of a session creation request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewSessionRequest {
    /// Why the command-line user wants approval
    #[serde(default)]
    pub reason: Option<String>,
    /// Command awaiting approval, shown to the approver
    #[serde(default)]
    pub command: Option<String>,
    /// Requested lifetime, capped by `max_session_ttl_seconds`
    #[serde(default)]
    pub ttl_seconds: Option<i64>,
}

/// Answer to a creation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedSession {
    #[serde(flatten)]
    pub view: SessionView,
    /// Identity provider URL to open in the approver's browser
    pub authorization_url: String,
    pub poll_interval_seconds: u64,
}

/// Query parameters of the identity provider redirect
#[derive(Debug, Clone, Default)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Result of a callback whose correlation token was valid
#[derive(Debug, Clone)]
pub enum CallbackOutcome {
    /// This callback moved the session to `approved`
    Approved(GuardSession),
    /// This callback moved the session to `denied`
    Denied(GuardSession),
    /// The session had already reached a terminal state
    NoLongerActive(GuardSession),
}

impl CallbackOutcome {
    pub fn session(&self) -> &GuardSession {
        match self {
            CallbackOutcome::Approved(session)
            | CallbackOutcome::Denied(session)
            | CallbackOutcome::NoLongerActive(session) => session,
        }
    }
}

pub struct GuardService {
    store: Arc<dyn SessionStore>,
    binder: StateBinder,
    provider: Arc<dyn IdentityProvider>,
    config: GuardConfig,
}

impl GuardService {
    pub fn new(
        store: Arc<dyn SessionStore>,
        binder: StateBinder,
        provider: Arc<dyn IdentityProvider>,
        config: GuardConfig,
    ) -> Self {
        Self {
            store,
            binder,
            provider,
            config,
        }
    }

    pub fn store(&self) -> Arc<dyn SessionStore> {
        Arc::clone(&self.store)
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Create a `pending` session and bind a fresh correlation token to it
    pub async fn create(&self, request: NewSessionRequest) -> Result<CreatedSession, GuardError> {
        let ttl = match request.ttl_seconds {
            Some(seconds) if seconds <= 0 => {
                return Err(GuardError::InvalidRequest {
                    reason: "ttl_seconds must be greater than zero".to_string(),
                })
            }
            Some(seconds) => self.config.requested_ttl(seconds),
            None => self.config.session_ttl(),
        };

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let issued = self
            .binder
            .issue(&id, now, now + ttl)
            .map_err(|e| GuardError::Internal {
                reason: e.to_string(),
            })?;
        let authorization_url =
            self.provider
                .authorization_url(&issued.token)
                .map_err(|e| GuardError::Internal {
                    reason: e.to_string(),
                })?;

        let mut session = GuardSession::new(id, issued.correlation_id, now, ttl);
        session.reason = request.reason;
        session.command = request.command;
        self.store.insert(session.clone()).await?;

        info!(
            "Guard session {} created, expires at {}",
            session.id, session.expires_at
        );
        Ok(CreatedSession {
            view: SessionView::observe(&session, now),
            authorization_url: authorization_url.to_string(),
            poll_interval_seconds: self.config.poll_interval_seconds,
        })
    }

    /// Current status of a session as the command-line client sees it
    ///
    /// A pending session past its deadline is reported `expired`; persisting
    /// that is attempted once and its failure does not change the answer.
    pub async fn status(&self, id: &str) -> Result<SessionView, GuardError> {
        let session = self.store.get(id).await?;
        let now = Utc::now();
        let session = if session.status == SessionStatus::Pending && session.is_past_deadline(now)
        {
            self.settle_expiry(session).await?
        } else {
            session
        };
        Ok(SessionView::observe(&session, now))
    }

    /// Withdraw a pending request
    ///
    /// When the session already reached a terminal state, that state is
    /// returned instead of an error.
    pub async fn cancel(&self, id: &str) -> Result<SessionView, GuardError> {
        let session = self.store.get(id).await?;
        let now = Utc::now();

        if session.status.is_terminal() {
            debug!("Cancel of {} yields to {}", id, session.status);
            return Ok(SessionView::observe(&session, now));
        }
        if session.is_past_deadline(now) {
            let settled = self.settle_expiry(session).await?;
            return Ok(SessionView::observe(&settled, now));
        }

        match self
            .store
            .transition(id, session.version, Transition::cancel(now))
            .await
        {
            Ok(cancelled) => {
                info!("Guard session {} cancelled", id);
                Ok(SessionView::observe(&cancelled, now))
            }
            Err(StoreError::Conflict { .. }) => {
                let current = self.store.get(id).await?;
                debug!("Cancel of {} lost the race to {}", id, current.status);
                Ok(SessionView::observe(&current, now))
            }
            Err(StoreError::Expired { .. }) => {
                let settled = self.settle_expiry(session).await?;
                Ok(SessionView::observe(&settled, now))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Process the identity provider redirect
    ///
    /// An invalid, replayed or expired `state` is rejected before any session
    /// is touched. Otherwise the bound session receives at most one transition:
    /// `approved` when the code exchange yields an identity, `denied` for any
    /// provider error. No lock is held while the exchange is in flight, so the
    /// command-line client can still cancel meanwhile.
    pub async fn handle_callback(
        &self,
        params: CallbackParams,
    ) -> Result<CallbackOutcome, GuardError> {
        let state = params
            .state
            .as_deref()
            .ok_or(GuardError::InvalidCorrelationToken)?;
        let session = self.binder.consume(self.store.as_ref(), state).await?;
        debug!("Callback bound to guard session {}", session.id);

        if session.status.is_terminal() {
            return Ok(CallbackOutcome::NoLongerActive(session));
        }
        if session.is_past_deadline(Utc::now()) {
            let settled = self.settle_expiry(session).await?;
            return Ok(CallbackOutcome::NoLongerActive(settled));
        }

        let transition = match (&params.error, &params.code) {
            (Some(error), _) => {
                let reason = match &params.error_description {
                    Some(description) => format!("{}: {}", error, description),
                    None => error.clone(),
                };
                info!("Identity provider refused session {}: {}", session.id, reason);
                Transition::deny(reason, Utc::now())
            }
            (None, Some(code)) => match self.provider.exchange_code(code).await {
                Ok(identity) => Transition::approve(identity, Utc::now()),
                Err(err) => {
                    let failure = GuardError::IdentityProviderFailure {
                        reason: err.to_string(),
                    };
                    warn!("Session {}: {}", session.id, failure);
                    Transition::deny(failure.to_string(), Utc::now())
                }
            },
            (None, None) => {
                let failure = GuardError::IdentityProviderFailure {
                    reason: "callback carried neither code nor error".to_string(),
                };
                warn!("Session {}: {}", session.id, failure);
                Transition::deny(failure.to_string(), Utc::now())
            }
        };

        match self
            .store
            .transition(&session.id, session.version, transition)
            .await
        {
            Ok(decided) if decided.status == SessionStatus::Approved => {
                info!("Guard session {} approved", decided.id);
                Ok(CallbackOutcome::Approved(decided))
            }
            Ok(decided) => {
                info!("Guard session {} denied", decided.id);
                Ok(CallbackOutcome::Denied(decided))
            }
            Err(StoreError::Conflict { .. }) => {
                let current = self.store.get(&session.id).await?;
                debug!(
                    "Callback for {} arrived after the session became {}",
                    current.id, current.status
                );
                Ok(CallbackOutcome::NoLongerActive(current))
            }
            Err(StoreError::Expired { .. }) => {
                let settled = self.settle_expiry(session).await?;
                Ok(CallbackOutcome::NoLongerActive(settled))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Persist `expired` for a pending session past its deadline
    ///
    /// A concurrent terminal transition wins over this one; the session is
    /// re-read and returned as stored. A store write failure keeps the read
    /// copy, which still observes as `expired`.
    async fn settle_expiry(&self, session: GuardSession) -> Result<GuardSession, GuardError> {
        match self
            .store
            .transition(
                &session.id,
                session.version,
                Transition::expire(session.expires_at),
            )
            .await
        {
            Ok(expired) => {
                debug!("Guard session {} expired", expired.id);
                Ok(expired)
            }
            Err(StoreError::Conflict { .. }) => Ok(self.store.get(&session.id).await?),
            Err(StoreError::Unavailable { reason }) => {
                warn!(
                    "Could not persist expiry of session {}: {}",
                    session.id, reason
                );
                Ok(session)
            }
            Err(err) => Err(err.into()),
        }
    }
}
