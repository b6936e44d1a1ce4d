// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cli-guard project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Endpoints used by the command-line client
//!
//! All three return the session view JSON. A pending view carries
//! `Retry-After` with the configured poll interval.

use std::sync::Arc;

use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{get, post, State};

use super::response::ApiResponse;
use crate::config::GuardConfig;
use crate::guard::{GuardService, NewSessionRequest};

/// Create a guard session
///
/// # URL
///
/// `POST /cli/sessions`
///
/// # Request Body
///
/// `{ "reason"?: string, "command"?: string, "ttl_seconds"?: integer }`
///
/// # Returns
///
/// `201` with the session view plus `authorization_url` and
/// `poll_interval_seconds`
#[post("/cli/sessions", format = "json", data = "<request>")]
pub async fn create_session(
    request: Json<NewSessionRequest>,
    service: &State<Arc<GuardService>>,
    guard_config: GuardConfig,
) -> ApiResponse {
    match service.create(request.into_inner()).await {
        Ok(created) => ApiResponse::with_session(
            Status::Created,
            &created,
            created.view.status,
            guard_config.poll_interval_seconds,
        ),
        Err(err) => ApiResponse::from_guard_error(&err, guard_config.poll_interval_seconds),
    }
}

/// Poll a guard session
#[get("/cli/sessions/<id>")]
pub async fn session_status(
    id: &str,
    service: &State<Arc<GuardService>>,
    guard_config: GuardConfig,
) -> ApiResponse {
    match service.status(id).await {
        Ok(view) => ApiResponse::with_session(
            Status::Ok,
            &view,
            view.status,
            guard_config.poll_interval_seconds,
        ),
        Err(err) => ApiResponse::from_guard_error(&err, guard_config.poll_interval_seconds),
    }
}

/// Cancel a guard session
///
/// Answers `200` with whatever terminal state the session ends in, which is
/// not necessarily `cancelled` when another outcome won first.
#[post("/cli/sessions/<id>/cancel")]
pub async fn cancel_session(
    id: &str,
    service: &State<Arc<GuardService>>,
    guard_config: GuardConfig,
) -> ApiResponse {
    match service.cancel(id).await {
        Ok(view) => ApiResponse::with_session(
            Status::Ok,
            &view,
            view.status,
            guard_config.poll_interval_seconds,
        ),
        Err(err) => ApiResponse::from_guard_error(&err, guard_config.poll_interval_seconds),
    }
}
