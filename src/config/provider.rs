// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cli-guard project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration for the OAuth2 / OpenID Connect identity provider
//! that authenticates approvers.

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub authorize_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    pub client_id: String,
    pub client_secret: String,
    /// Must point at this server's `/authorizations/callback`
    pub redirect_uri: String,
    pub scope: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            authorize_url: "https://localhost:8443/authorize".to_string(),
            token_url: "https://localhost:8443/token".to_string(),
            userinfo_url: "https://localhost:8443/userinfo".to_string(),
            client_id: "CliGuard".to_string(),
            client_secret: String::new(),
            redirect_uri: "http://127.0.0.1:8080/authorizations/callback".to_string(),
            scope: "openid profile email".to_string(),
        }
    }
}
