// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cli-guard project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! JSON responses of the command-line endpoints

use log::{debug, warn};
use rocket::http::Status;
use rocket::response::{self, Responder, Response};
use rocket::serde::json::Json;
use rocket::Request;
use serde::Serialize;
use serde_json::json;

use crate::guard::{GuardError, SessionStatus};

/// JSON body with a status code and an optional `Retry-After` hint
#[derive(Debug)]
pub struct ApiResponse {
    status: Status,
    body: serde_json::Value,
    retry_after: Option<u64>,
}

impl ApiResponse {
    /// Serialize `body`; `Retry-After` is added while `status` is pending
    pub fn with_session<T: Serialize>(
        code: Status,
        body: &T,
        status: SessionStatus,
        poll_interval_seconds: u64,
    ) -> Self {
        match serde_json::to_value(body) {
            Ok(body) => Self {
                status: code,
                body,
                retry_after: (status == SessionStatus::Pending).then_some(poll_interval_seconds),
            },
            Err(e) => {
                warn!("Failed to serialize session response: {}", e);
                Self::error(Status::InternalServerError, "internal_error")
            }
        }
    }

    pub fn error(status: Status, error: &str) -> Self {
        Self {
            status,
            body: json!({ "error": error }),
            retry_after: None,
        }
    }

    /// Map a guard error onto its wire form
    ///
    /// Internal failure modes are never spelled out; `503` carries
    /// `Retry-After` so command-line clients keep polling.
    pub fn from_guard_error(err: &GuardError, poll_interval_seconds: u64) -> Self {
        debug!("Command-line request failed: {}", err);
        match err {
            GuardError::SessionNotFound { .. } => Self::error(Status::NotFound, "session_not_found"),
            GuardError::StoreUnavailable { .. } => Self {
                retry_after: Some(poll_interval_seconds),
                ..Self::error(Status::ServiceUnavailable, "store_unavailable")
            },
            GuardError::InvalidRequest { reason } => Self {
                body: json!({ "error": "invalid_request", "error_description": reason }),
                ..Self::error(Status::BadRequest, "invalid_request")
            },
            GuardError::InvalidCorrelationToken => {
                Self::error(Status::BadRequest, "invalid_correlation_token")
            }
            GuardError::TransitionConflict { .. }
            | GuardError::SessionExpired { .. }
            | GuardError::IdentityProviderFailure { .. }
            | GuardError::Internal { .. } => {
                Self::error(Status::InternalServerError, "internal_error")
            }
        }
    }
}

impl<'r> Responder<'r, 'static> for ApiResponse {
    fn respond_to(self, request: &'r Request<'_>) -> response::Result<'static> {
        let mut builder = Response::build_from(Json(self.body).respond_to(request)?);
        builder.status(self.status);
        if let Some(seconds) = self.retry_after {
            builder.raw_header("Retry-After", seconds.to_string());
        }
        builder.ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_mapping() {
        let response = ApiResponse::from_guard_error(
            &GuardError::StoreUnavailable {
                reason: "connection refused".to_string(),
            },
            2,
        );
        assert_eq!(response.status, Status::ServiceUnavailable);
        assert_eq!(response.retry_after, Some(2));
        assert_eq!(response.body, json!({ "error": "store_unavailable" }));

        let response = ApiResponse::from_guard_error(
            &GuardError::SessionNotFound {
                id: "s1".to_string(),
            },
            2,
        );
        assert_eq!(response.status, Status::NotFound);
        assert_eq!(response.body, json!({ "error": "session_not_found" }));
    }

    #[test]
    fn test_race_outcomes_are_never_reported_as_conflict() {
        for err in [
            GuardError::TransitionConflict {
                id: "s1".to_string(),
            },
            GuardError::SessionExpired {
                id: "s1".to_string(),
            },
        ] {
            let response = ApiResponse::from_guard_error(&err, 2);
            assert_eq!(response.status, Status::InternalServerError);
            assert_eq!(response.body, json!({ "error": "internal_error" }));
            assert!(response.retry_after.is_none());
        }
    }
}
