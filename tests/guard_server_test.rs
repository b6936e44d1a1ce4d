// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cli-guard project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! End-to-end tests of the HTTP surface, with the identity provider mocked
//! by wiremock and Rocket driven through its local client.

use std::sync::{Arc, Once};

use cli_guard::config::{Config, ProviderConfig};
use cli_guard::daemon::build_service;
use cli_guard::guard::{MemorySessionStore, SessionStore};
use cli_guard::server::{build_rocket, server_figment, PRINCIPAL_COOKIE};
use rocket::config::LogLevel;
use rocket::http::{ContentType, Status};
use rocket::local::asynchronous::{Client, LocalResponse};
use serde_json::{json, Value};
use url::Url;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

static INIT: Once = Once::new();

fn init_test_logging() {
    INIT.call_once(|| {
        let _ = env_logger::builder()
            .is_test(true)
            .filter_level(log::LevelFilter::Debug)
            .try_init();
    });
}

/// Identity provider accepting the code "good" and rejecting anything else
async fn mock_provider() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("code=good"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "at-alice",
            "token_type": "Bearer",
            "scope": "openid guard:approve"
        })))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/userinfo"))
        .and(header("authorization", "Bearer at-alice"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sub": "alice",
            "email": "alice@example.org"
        })))
        .mount(&server)
        .await;
    server
}

struct Harness {
    client: Client,
    store: Arc<MemorySessionStore>,
    _provider: MockServer,
}

async fn harness() -> Harness {
    init_test_logging();
    let provider = mock_provider().await;

    let mut config = Config::default();
    config.provider = ProviderConfig {
        authorize_url: format!("{}/authorize", provider.uri()),
        token_url: format!("{}/token", provider.uri()),
        userinfo_url: format!("{}/userinfo", provider.uri()),
        client_id: "cli-guard".to_string(),
        client_secret: "secret".to_string(),
        redirect_uri: "http://localhost/authorizations/callback".to_string(),
        scope: "openid".to_string(),
    };
    let config = Arc::new(config);

    let store = Arc::new(MemorySessionStore::new());
    let service = build_service(&config, store.clone() as Arc<dyn SessionStore>).unwrap();
    let figment = server_figment(&config).merge(("log_level", LogLevel::Off));
    let rocket = build_rocket(figment, config, Arc::new(service));

    Harness {
        client: Client::tracked(rocket).await.unwrap(),
        store,
        _provider: provider,
    }
}

async fn json_body(response: LocalResponse<'_>) -> Value {
    let body = response.into_string().await.unwrap_or_default();
    serde_json::from_str(&body).unwrap()
}

/// Create a session, returning its id and the correlation token
async fn create(client: &Client, body: Value) -> (String, String) {
    let response = client
        .post("/cli/sessions")
        .header(ContentType::JSON)
        .body(body.to_string())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Created);
    assert_eq!(response.headers().get_one("Retry-After"), Some("2"));

    let created = json_body(response).await;
    assert_eq!(created["status"], "pending");
    assert_eq!(created["message"], "request pending");
    assert_eq!(created["poll_interval_seconds"], 2);

    let url = Url::parse(created["authorization_url"].as_str().unwrap()).unwrap();
    let state = url
        .query_pairs()
        .find(|(key, _)| key == "state")
        .map(|(_, value)| value.into_owned())
        .unwrap();
    (created["id"].as_str().unwrap().to_string(), state)
}

#[rocket::async_test]
async fn test_approval_flow() {
    let h = harness().await;
    let (id, state) = create(&h.client, json!({"command": "terraform apply"})).await;

    let response = h.client.get(format!("/cli/sessions/{}", id)).dispatch().await;
    assert_eq!(response.status(), Status::Ok);
    assert_eq!(response.headers().get_one("Retry-After"), Some("2"));
    assert_eq!(json_body(response).await["status"], "pending");

    let response = h
        .client
        .get(format!("/authorizations/callback?code=good&state={}", state))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    assert!(response.cookies().get_private(PRINCIPAL_COOKIE).is_some());
    let html = response.into_string().await.unwrap();
    assert!(html.contains("Request approved"));
    assert!(html.contains("terraform apply"));

    let response = h.client.get(format!("/cli/sessions/{}", id)).dispatch().await;
    assert_eq!(response.status(), Status::Ok);
    assert!(response.headers().get_one("Retry-After").is_none());
    let view = json_body(response).await;
    assert_eq!(view["status"], "approved");
    assert_eq!(view["message"], "request approved");
    assert_eq!(view["identity"]["principal"], "alice");
    assert!(view["decided_at"].is_string());

    // replay of the same state is refused and changes nothing
    let response = h
        .client
        .get(format!("/authorizations/callback?code=good&state={}", state))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::BadRequest);

    // cancel yields to the approval that already won
    let response = h
        .client
        .post(format!("/cli/sessions/{}/cancel", id))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    assert_eq!(json_body(response).await["status"], "approved");
}

#[rocket::async_test]
async fn test_cancel_then_late_callback() {
    let h = harness().await;
    let (id, state) = create(&h.client, json!({})).await;

    let response = h
        .client
        .post(format!("/cli/sessions/{}/cancel", id))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    assert_eq!(json_body(response).await["status"], "cancelled");

    let response = h
        .client
        .get(format!("/authorizations/callback?code=good&state={}", state))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Conflict);
    assert!(response
        .into_string()
        .await
        .unwrap()
        .contains("no longer active"));

    let stored = h.store.get(&id).await.unwrap();
    assert_eq!(stored.status.to_string(), "cancelled");
    assert!(stored.identity.is_none());
}

#[rocket::async_test]
async fn test_failed_exchange_denies_without_leaking_reason() {
    let h = harness().await;
    let (id, state) = create(&h.client, json!({})).await;

    let response = h
        .client
        .get(format!("/authorizations/callback?code=stale&state={}", state))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    assert!(response.cookies().get_private(PRINCIPAL_COOKIE).is_none());
    let html = response.into_string().await.unwrap();
    assert!(html.contains("Request denied"));
    assert!(!html.contains("invalid_grant"));

    let response = h.client.get(format!("/cli/sessions/{}", id)).dispatch().await;
    let body = response.into_string().await.unwrap();
    assert!(body.contains("\"denied\""));
    assert!(!body.contains("invalid_grant"));

    let stored = h.store.get(&id).await.unwrap();
    assert!(stored.denial_reason.unwrap().contains("invalid_grant"));
}

#[rocket::async_test]
async fn test_provider_error_redirect_denies() {
    let h = harness().await;
    let (id, state) = create(&h.client, json!({})).await;

    let response = h
        .client
        .get(format!(
            "/authorizations/callback?error=access_denied&error_description=declined&state={}",
            state
        ))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);

    let response = h.client.get(format!("/cli/sessions/{}", id)).dispatch().await;
    assert_eq!(json_body(response).await["status"], "denied");
}

#[rocket::async_test]
async fn test_forged_or_missing_state_is_rejected() {
    let h = harness().await;
    let (id, _) = create(&h.client, json!({})).await;

    for uri in [
        "/authorizations/callback?code=good&state=eyJhbGciOiJIUzI1NiJ9.e30.forged".to_string(),
        "/authorizations/callback?code=good".to_string(),
    ] {
        let response = h.client.get(uri).dispatch().await;
        assert_eq!(response.status(), Status::BadRequest);
        assert!(response
            .into_string()
            .await
            .unwrap()
            .contains("Invalid authorization link"));
    }

    let stored = h.store.get(&id).await.unwrap();
    assert_eq!(stored.version, 0);
}

#[rocket::async_test]
async fn test_short_ttl_reads_expired() {
    let h = harness().await;
    let (id, state) = create(&h.client, json!({"ttl_seconds": 1})).await;

    tokio::time::sleep(std::time::Duration::from_secs(2)).await;

    let response = h.client.get(format!("/cli/sessions/{}", id)).dispatch().await;
    assert_eq!(response.status(), Status::Ok);
    let view = json_body(response).await;
    assert_eq!(view["status"], "expired");
    assert_eq!(view["message"], "request expired");

    // the correlation token expired with the session
    let response = h
        .client
        .get(format!("/authorizations/callback?code=good&state={}", state))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::BadRequest);
}

#[rocket::async_test]
async fn test_error_bodies() {
    let h = harness().await;

    let response = h.client.get("/cli/sessions/unknown").dispatch().await;
    assert_eq!(response.status(), Status::NotFound);
    assert_eq!(
        json_body(response).await,
        json!({"error": "session_not_found"})
    );

    let response = h.client.post("/cli/sessions/unknown/cancel").dispatch().await;
    assert_eq!(response.status(), Status::NotFound);

    let response = h
        .client
        .post("/cli/sessions")
        .header(ContentType::JSON)
        .body(json!({"ttl_seconds": 0}).to_string())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::BadRequest);
    assert_eq!(json_body(response).await["error"], "invalid_request");
}

#[rocket::async_test]
async fn test_logout_clears_principal_cookie() {
    let h = harness().await;
    let (_, state) = create(&h.client, json!({})).await;

    let response = h
        .client
        .get(format!("/authorizations/callback?code=good&state={}", state))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    assert!(h.client.cookies().get_private(PRINCIPAL_COOKIE).is_some());

    let response = h.client.delete("/logout").dispatch().await;
    assert_eq!(response.status(), Status::NoContent);
    assert!(h.client.cookies().get_private(PRINCIPAL_COOKIE).is_none());
}
