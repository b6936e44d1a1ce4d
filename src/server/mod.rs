// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cli-guard project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! HTTP surface of the guard
//!
//! | Method | Path | Caller |
//! |---|---|---|
//! | `GET` | `/authorizations/callback` | approver's browser, redirected by the identity provider |
//! | `DELETE` | `/logout` | approver's browser |
//! | `POST` | `/cli/sessions` | command-line client |
//! | `GET` | `/cli/sessions/<id>` | command-line client |
//! | `POST` | `/cli/sessions/<id>/cancel` | command-line client |

pub mod builder;
pub mod callback;
pub mod cli;
pub mod pages;
pub mod response;

pub use builder::{build_rocket, server_figment};
pub use callback::PRINCIPAL_COOKIE;
