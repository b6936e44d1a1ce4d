// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cli-guard project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Guard session state machine and its coordination protocol
//!
//! Two independent actors converge on one [`GuardSession`]: the command-line
//! client, which polls and may cancel, and the approver's browser, which comes
//! back from the identity provider with a code and the correlation token. Both
//! paths, and the [`SessionSweeper`], mutate sessions only through
//! [`SessionStore::transition`], so whichever terminal transition the store
//! accepts first is the outcome.

pub mod binder;
pub mod error;
pub mod provider;
pub mod service;
pub mod session;
pub mod store;
pub mod sweeper;

pub use binder::StateBinder;
pub use error::{GuardError, StoreError};
pub use provider::{IdentityProvider, OAuthProvider, ProviderError};
pub use service::{CallbackOutcome, CallbackParams, CreatedSession, GuardService, NewSessionRequest};
pub use session::{GuardSession, Identity, SessionStatus, SessionView, Transition};
pub use store::{MemorySessionStore, RedisSessionStore, SessionStore};
pub use sweeper::{SessionSweeper, SweepReport};
