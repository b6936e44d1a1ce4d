// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cli-guard project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration utilities
//!
//! This module provides utility functions for working with configuration
//! settings, including validation and schema management.

use anyhow::{Context, Result};
use base64::Engine;
use log::debug;
use url::Url;

use super::guard::{MAX_INTERVAL_SECONDS, MAX_LIFETIME_SECONDS};
use super::Config;

/// Output the embedded JSON schema to the console.
///
/// Called when the `--show-config-schema` flag is provided on the command line.
///
/// # Example
///
/// ```bash
/// ./cli_guard --show-config-schema > config_schema.json
/// ```
pub fn output_config_schema() -> Result<()> {
    let schema_str = include_str!("../../resources/config.schema.json");

    let schema: serde_json::Value =
        serde_json::from_str(schema_str).context("Failed to parse JSON schema")?;

    let formatted_schema =
        serde_json::to_string_pretty(&schema).context("Failed to format JSON schema")?;

    println!("{}", formatted_schema);

    Ok(())
}

/// Check if a string is a valid IP address
///
/// Validates that a string represents a valid IPv4 or IPv6 address,
/// or is one of the special values like "localhost" or "0.0.0.0".
pub fn is_valid_ip_address(addr: &str) -> bool {
    if addr.parse::<std::net::IpAddr>().is_ok() {
        return true;
    }

    matches!(addr, "localhost" | "::" | "::0" | "0.0.0.0")
}

fn decoded_len(value: &str, what: &str) -> Result<usize> {
    let raw = base64::engine::general_purpose::STANDARD
        .decode(value)
        .with_context(|| format!("{} is not valid base64", what))?;
    Ok(raw.len())
}

/// Validates the configuration against rules the JSON schema cannot express.
///
/// # Validation Rules
///
/// - **Port Range**: the server port is within 1-65534
/// - **IP Address Format**: a warning only, hostnames are allowed
/// - **Secrets**: `guard.state_secret` decodes from base64 to at least 32
///   bytes, `server.secret_key` to exactly 32 or 64 bytes
/// - **Lifetimes**: `0 < session_ttl <= max_session_ttl`, lifetimes and
///   retention at most one year, intervals between one second and one day
/// - **Provider URLs**: every provider endpoint parses as an absolute URL
pub fn validate_specific_rules(config: &Config) -> Result<()> {
    debug!("Performing additional validation checks");

    if config.server.port < 1 || config.server.port > 65534 {
        anyhow::bail!("Invalid port number: {}", config.server.port);
    }

    if !is_valid_ip_address(&config.server.address) {
        debug!(
            "Potentially invalid address format: {}",
            config.server.address
        );
    }

    if decoded_len(&config.guard.state_secret, "guard.state_secret")? < 32 {
        anyhow::bail!("guard.state_secret must decode to at least 32 bytes");
    }

    if let Some(secret_key) = &config.server.secret_key {
        let len = decoded_len(secret_key, "server.secret_key")?;
        if len != 32 && len != 64 {
            anyhow::bail!("server.secret_key must decode to 32 or 64 bytes, got {}", len);
        }
    }

    let guard = &config.guard;
    if guard.session_ttl_seconds <= 0 {
        anyhow::bail!("guard.session_ttl_seconds must be positive");
    }
    if guard.session_ttl_seconds > guard.max_session_ttl_seconds {
        anyhow::bail!(
            "guard.session_ttl_seconds ({}) exceeds guard.max_session_ttl_seconds ({})",
            guard.session_ttl_seconds,
            guard.max_session_ttl_seconds
        );
    }
    if guard.max_session_ttl_seconds > MAX_LIFETIME_SECONDS {
        anyhow::bail!(
            "guard.max_session_ttl_seconds must not exceed {}",
            MAX_LIFETIME_SECONDS
        );
    }
    if !(0..=MAX_LIFETIME_SECONDS).contains(&guard.retention_seconds) {
        anyhow::bail!(
            "guard.retention_seconds must be between 0 and {}",
            MAX_LIFETIME_SECONDS
        );
    }
    for (name, value) in [
        ("guard.sweep_interval_seconds", guard.sweep_interval_seconds),
        ("guard.poll_interval_seconds", guard.poll_interval_seconds),
        ("guard.exchange_timeout_seconds", guard.exchange_timeout_seconds),
    ] {
        if value == 0 || value > MAX_INTERVAL_SECONDS {
            anyhow::bail!("{} must be between 1 and {}", name, MAX_INTERVAL_SECONDS);
        }
    }

    let provider = &config.provider;
    for (name, value) in [
        ("provider.authorize_url", &provider.authorize_url),
        ("provider.token_url", &provider.token_url),
        ("provider.userinfo_url", &provider.userinfo_url),
        ("provider.redirect_uri", &provider.redirect_uri),
    ] {
        Url::parse(value).with_context(|| format!("{} is not a valid URL: {}", name, value))?;
    }

    Ok(())
}
