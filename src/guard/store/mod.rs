// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cli-guard project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Keyed storage for guard sessions
//!
//! [`SessionStore::transition`] is the single mutual-exclusion point of the
//! whole guard: the callback path, the CLI cancel path and the sweeper all go
//! through it, and exactly one of any set of racing calls with the same
//! `expected_version` succeeds. Backends must implement it as one atomic
//! conditional update, never as read-then-write.
//!
//! Two backends are provided:
//!
//! - [`MemorySessionStore`]: per-session mutexes inside the process
//! - [`RedisSessionStore`]: durable, compare-and-swap through a Lua script

mod memory;
mod redis_store;

pub use self::memory::MemorySessionStore;
pub use self::redis_store::RedisSessionStore;

use async_trait::async_trait;

use super::error::StoreError;
use super::session::{GuardSession, Transition};

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Store a new session. Fails with `Duplicate` if the id is taken.
    async fn insert(&self, session: GuardSession) -> Result<(), StoreError>;

    async fn get(&self, id: &str) -> Result<GuardSession, StoreError>;

    /// Atomically apply `transition` if the stored version equals
    /// `expected_version` and the session is still `pending`.
    async fn transition(
        &self,
        id: &str,
        expected_version: u64,
        transition: Transition,
    ) -> Result<GuardSession, StoreError>;

    /// Mark the correlation token `correlation_id` of session `id` as used.
    ///
    /// Succeeds once per session; every later call, or a call with a token id
    /// that was never issued for this session, fails with
    /// `CorrelationRejected`.
    async fn consume_correlation(
        &self,
        id: &str,
        correlation_id: &str,
    ) -> Result<GuardSession, StoreError>;

    /// Snapshot of every stored session, used by the sweeper
    async fn list(&self) -> Result<Vec<GuardSession>, StoreError>;

    /// Delete a session. Returns whether it existed.
    async fn remove(&self, id: &str) -> Result<bool, StoreError>;
}
