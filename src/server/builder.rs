// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cli-guard project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Rocket server builder and configuration
//!
//! This module provides functions to build and configure the Rocket server
//! instance with all routes, catchers and managed state.

use std::sync::Arc;

use base64::Engine;
use log::{debug, warn};
use rocket::data::{Limits, ToByteUnit};
use rocket::figment::Figment;
use rocket::http::Status;
use rocket::{catch, catchers, routes, Build, Request, Rocket};

use super::callback::{authorization_callback, logout};
use super::cli::{cancel_session, create_session, session_status};
use super::response::ApiResponse;
use crate::config::Config;
use crate::guard::GuardService;

/// Rocket configuration derived from the `server` section
///
/// When no `secret_key` is configured a random one is generated, so approver
/// cookies are lost on restart.
pub fn server_figment(config: &Config) -> Figment {
    let secret_key = match &config.server.secret_key {
        Some(key) => key.clone(),
        None => {
            warn!("No server.secret_key configured, using a random cookie key");
            base64::engine::general_purpose::STANDARD.encode(rand::random::<[u8; 32]>())
        }
    };

    rocket::Config::figment()
        .merge(("ident", config.server.name.clone()))
        .merge(("limits", Limits::new().limit("json", 64.kibibytes())))
        .merge(("address", config.server.address.clone()))
        .merge(("port", config.server.port))
        .merge(("log_level", config.server.log_level.clone()))
        .merge(("secret_key", secret_key))
}

/// Build a configured Rocket server instance
///
/// ### Parameters
///
/// * `figment` - The Rocket configuration figment containing server settings
/// * `config` - The application configuration, managed for request guards
/// * `service` - The guard service shared by every route
///
/// ### Example
///
/// ```no_run
/// use std::sync::Arc;
/// use cli_guard::config::Config;
/// use cli_guard::guard::{GuardService, MemorySessionStore, OAuthProvider, StateBinder};
/// use cli_guard::server::{build_rocket, server_figment};
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Arc::new(Config::default());
/// let provider = OAuthProvider::new(config.provider.clone(), config.guard.exchange_timeout())?;
/// let service = GuardService::new(
///     Arc::new(MemorySessionStore::new()),
///     StateBinder::from_base64(&config.guard.state_secret)?,
///     Arc::new(provider),
///     config.guard.clone(),
/// );
/// let rocket = build_rocket(server_figment(&config), config, Arc::new(service));
/// rocket.launch().await?;
/// # Ok(())
/// # }
/// ```
pub fn build_rocket(
    figment: Figment,
    config: Arc<Config>,
    service: Arc<GuardService>,
) -> Rocket<Build> {
    debug!("Mounting guard routes");
    rocket::custom(figment)
        .mount(
            "/",
            routes![
                authorization_callback,
                logout,
                create_session,
                session_status,
                cancel_session,
            ],
        )
        .register("/", catchers![bad_request, not_found, unprocessable])
        .manage(service)
        .manage(config)
}

#[catch(400)]
fn bad_request(_: &Request<'_>) -> ApiResponse {
    ApiResponse::error(Status::BadRequest, "invalid_request")
}

#[catch(404)]
fn not_found(_: &Request<'_>) -> ApiResponse {
    ApiResponse::error(Status::NotFound, "not_found")
}

#[catch(422)]
fn unprocessable(_: &Request<'_>) -> ApiResponse {
    ApiResponse::error(Status::UnprocessableEntity, "invalid_request")
}
