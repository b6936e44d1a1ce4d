// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cli-guard project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Browser-facing endpoints: the identity provider callback and logout

use std::sync::Arc;

use log::{debug, warn};
use rocket::http::{Cookie, CookieJar, SameSite, Status};
use rocket::response::content::RawHtml;
use rocket::time::Duration;
use rocket::{delete, get, State};

use super::pages::CallbackPage;
use crate::guard::{CallbackOutcome, CallbackParams, GuardError, GuardService};

/// Name of the private cookie holding the approving principal
pub const PRINCIPAL_COOKIE: &str = "guard_principal";

/// Identity provider redirect target
///
/// # URL
///
/// `GET /authorizations/callback?code=...&state=...`
/// or `GET /authorizations/callback?error=...&error_description=...&state=...`
///
/// # Returns
///
/// An HTML page: `200` once the session is approved or denied, `400` for an
/// invalid, expired or replayed `state`, `409` when the session was already
/// decided. The command-line client learns the outcome by polling only.
#[get("/authorizations/callback?<code>&<state>&<error>&<error_description>")]
pub async fn authorization_callback(
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
    service: &State<Arc<GuardService>>,
    cookies: &CookieJar<'_>,
) -> (Status, RawHtml<String>) {
    let params = CallbackParams {
        code,
        state,
        error,
        error_description,
    };

    let page = match service.handle_callback(params).await {
        Ok(CallbackOutcome::Approved(session)) => {
            if let Some(identity) = &session.identity {
                let mut cookie = Cookie::new(PRINCIPAL_COOKIE, identity.principal.clone());
                cookie.set_http_only(true);
                cookie.set_path("/");
                cookie.set_same_site(SameSite::Lax);
                cookie.set_max_age(Duration::hours(1));
                cookies.add_private(cookie);
            }
            CallbackPage::approved(&session)
        }
        Ok(CallbackOutcome::Denied(session)) => CallbackPage::denied(&session),
        Ok(CallbackOutcome::NoLongerActive(session)) => {
            CallbackPage::no_longer_active(Some(&session))
        }
        Err(GuardError::InvalidCorrelationToken) => CallbackPage::invalid_link(),
        Err(GuardError::SessionNotFound { id }) => {
            debug!("Callback for session {} which no longer exists", id);
            CallbackPage::no_longer_active(None)
        }
        Err(GuardError::StoreUnavailable { reason }) => {
            warn!("Callback could not reach the session store: {}", reason);
            CallbackPage::unavailable()
        }
        Err(err) => {
            warn!("Callback failed: {}", err);
            CallbackPage::internal()
        }
    };

    (page.status, page.render())
}

/// Forget the approver authenticated in this browser
///
/// Guard sessions are not affected.
#[delete("/logout")]
pub fn logout(cookies: &CookieJar<'_>) -> Status {
    if cookies.get_private(PRINCIPAL_COOKIE).is_some() {
        debug!("Removing approver cookie");
    }
    cookies.remove_private(PRINCIPAL_COOKIE);
    Status::NoContent
}
