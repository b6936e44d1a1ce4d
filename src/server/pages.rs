// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cli-guard project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! HTML pages shown to the approver's browser after the identity provider
//! redirect

use std::sync::OnceLock;

use handlebars::Handlebars;
use log::error;
use rocket::http::Status;
use rocket::response::content::RawHtml;
use serde::Serialize;
use serde_json::json;

use crate::guard::GuardSession;

#[derive(Debug, Clone, Serialize)]
struct Detail {
    label: &'static str,
    value: String,
}

/// A rendered-on-demand confirmation or error page
#[derive(Debug, Clone)]
pub struct CallbackPage {
    pub status: Status,
    kind: &'static str,
    title: &'static str,
    message: String,
    details: Vec<Detail>,
}

impl CallbackPage {
    fn new(status: Status, kind: &'static str, title: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            kind,
            title,
            message: message.into(),
            details: Vec::new(),
        }
    }

    fn describing(mut self, session: &GuardSession) -> Self {
        if let Some(command) = &session.command {
            self.details.push(Detail {
                label: "Command",
                value: command.clone(),
            });
        }
        if let Some(reason) = &session.reason {
            self.details.push(Detail {
                label: "Reason",
                value: reason.clone(),
            });
        }
        self.details.push(Detail {
            label: "Request",
            value: session.id.clone(),
        });
        self
    }

    pub fn approved(session: &GuardSession) -> Self {
        let mut page = Self::new(
            Status::Ok,
            "approved",
            "Request approved",
            "The command-line request has been approved.",
        )
        .describing(session);
        if let Some(identity) = &session.identity {
            page.details.push(Detail {
                label: "Approved by",
                value: identity.principal.clone(),
            });
        }
        page
    }

    /// The denial reason stays server side
    pub fn denied(session: &GuardSession) -> Self {
        Self::new(
            Status::Ok,
            "denied",
            "Request denied",
            "The command-line request has been denied.",
        )
        .describing(session)
    }

    pub fn no_longer_active(session: Option<&GuardSession>) -> Self {
        let page = Self::new(
            Status::Conflict,
            "inactive",
            "This request is no longer active",
            match session {
                Some(session) => format!(
                    "It was already {} before this approval arrived.",
                    session.status
                ),
                None => "It has already been decided or has expired.".to_string(),
            },
        );
        match session {
            Some(session) => page.describing(session),
            None => page,
        }
    }

    pub fn invalid_link() -> Self {
        Self::new(
            Status::BadRequest,
            "invalid",
            "Invalid authorization link",
            "This link is not valid, has expired or was already used.",
        )
    }

    pub fn unavailable() -> Self {
        Self::new(
            Status::ServiceUnavailable,
            "unavailable",
            "Service temporarily unavailable",
            "The decision could not be recorded and this link cannot be used again. \
             Start a new request from the command line.",
        )
    }

    pub fn internal() -> Self {
        Self::new(
            Status::InternalServerError,
            "unavailable",
            "Something went wrong",
            "The request could not be processed.",
        )
    }

    pub fn render(&self) -> RawHtml<String> {
        let data = json!({
            "kind": self.kind,
            "title": self.title,
            "message": self.message,
            "details": self.details,
        });

        let rendered = templates().and_then(|handlebars| {
            handlebars
                .render(CALLBACK_TEMPLATE, &data)
                .map_err(|e| e.to_string())
        });

        match rendered {
            Ok(html) => RawHtml(html),
            Err(e) => {
                error!("Failed to render callback page: {}", e);
                RawHtml(format!("<h1>{}</h1><p>{}</p>", self.title, self.message))
            }
        }
    }
}

const CALLBACK_TEMPLATE: &str = "callback";

static TEMPLATES: OnceLock<Result<Handlebars<'static>, String>> = OnceLock::new();

/// Registry compiled on first use and shared by every request
fn templates() -> Result<&'static Handlebars<'static>, String> {
    TEMPLATES
        .get_or_init(|| {
            let mut handlebars = Handlebars::new();
            handlebars
                .register_template_string(
                    CALLBACK_TEMPLATE,
                    include_str!("../../resources/pages/callback.hbs"),
                )
                .map_err(|e| e.to_string())?;
            Ok(handlebars)
        })
        .as_ref()
        .map_err(Clone::clone)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::{Identity, SessionStatus, Transition};
    use chrono::{Duration, Utc};

    #[test]
    fn test_approved_page_shows_request_and_principal() {
        let now = Utc::now();
        let mut session = GuardSession::new("s-42", "c", now, Duration::minutes(5));
        session.command = Some("kubectl delete ns prod".to_string());
        session
            .apply(0, Transition::approve(Identity::new("alice"), now))
            .unwrap();

        let page = CallbackPage::approved(&session);
        assert_eq!(page.status, Status::Ok);
        let html = page.render().0;
        assert!(html.contains("Request approved"));
        assert!(html.contains("kubectl delete ns prod"));
        assert!(html.contains("alice"));
        assert!(html.contains("s-42"));
    }

    #[test]
    fn test_denied_page_hides_reason() {
        let now = Utc::now();
        let mut session = GuardSession::new("s-43", "c", now, Duration::minutes(5));
        session
            .apply(0, Transition::deny("invalid_grant: token endpoint said no", now))
            .unwrap();
        assert_eq!(session.status, SessionStatus::Denied);

        let html = CallbackPage::denied(&session).render().0;
        assert!(html.contains("Request denied"));
        assert!(!html.contains("invalid_grant"));
    }

    #[test]
    fn test_values_are_html_escaped() {
        let now = Utc::now();
        let mut session = GuardSession::new("s-44", "c", now, Duration::minutes(5));
        session.reason = Some("<script>alert(1)</script>".to_string());
        let html = CallbackPage::no_longer_active(Some(&session)).render().0;
        assert!(!html.contains("<script>alert(1)</script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn test_unavailable_page_does_not_suggest_reloading() {
        let page = CallbackPage::unavailable();
        assert_eq!(page.status, Status::ServiceUnavailable);
        let html = page.render().0;
        assert!(!html.contains("Reload"));
        assert!(html.contains("Start a new request"));
    }

    #[test]
    fn test_template_registry_is_shared() {
        let first = templates().unwrap();
        let second = templates().unwrap();
        assert!(std::ptr::eq(first, second));
    }
}
