// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cli-guard project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Out-of-band authorization guard for command-line tools
//!
//! A command-line client asks for permission to run a sensitive action, a
//! human approves or denies it in a browser through an OAuth2 / OpenID Connect
//! identity provider, and the client polls until a decision is reached, the
//! request is cancelled or it expires.
//!
//! - [`guard`]: session state machine, store, correlation tokens, sweeper
//! - [`server`]: Rocket HTTP endpoints
//! - [`client`]: polling client used by command-line tools
//! - [`config`]: YAML configuration
//! - [`daemon`]: task supervisor

pub mod client;
pub mod config;
pub mod daemon;
pub mod guard;
pub mod server;
