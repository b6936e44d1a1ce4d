// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cli-guard project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! HTTP server configuration
//!
//! This module defines the network settings of the web server exposing the
//! authorization callback and the command-line endpoints.

use serde::{Deserialize, Serialize};

/// Configuration for the guard web server.
///
/// ### Cookies
///
/// The approving principal is kept in a private (encrypted) cookie after a
/// successful callback. `secret_key` is the key Rocket uses for that; when it
/// is absent a random key is generated at startup and approver cookies do not
/// survive a restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The TCP port the server will listen on.
    ///
    /// Valid range is 1-65534. Default value is 8080.
    #[serde(default = "default_port")]
    pub port: u16,

    /// The network address the server will bind to.
    ///
    /// Can be an IPv4/IPv6 address or a hostname. Default is "127.0.0.1".
    #[serde(default = "default_address")]
    pub address: String,

    /// The server name reported in HTTP headers and logs.
    #[serde(default = "default_name")]
    pub name: String,

    /// Base64 encoded key for Rocket private cookies (32 or 64 bytes)
    #[serde(default)]
    pub secret_key: Option<String>,

    /// Rocket log level: "off", "critical", "normal" or "debug"
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_port() -> u16 {
    8080
}

/// Loopback only. Use "0.0.0.0" to accept remote connections.
fn default_address() -> String {
    "127.0.0.1".to_string()
}

fn default_name() -> String {
    format!("CliGuard/{}", env!("CARGO_PKG_VERSION"))
}

fn default_log_level() -> String {
    "critical".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            address: default_address(),
            name: default_name(),
            secret_key: None,
            log_level: default_log_level(),
        }
    }
}
