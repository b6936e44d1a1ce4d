// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cli-guard project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use log::debug;

use super::SessionStore;
use crate::guard::error::StoreError;
use crate::guard::session::{GuardSession, Transition};

struct Entry {
    session: GuardSession,
    correlation_consumed: bool,
}

/// In-process session store
///
/// The outer `RwLock` only guards the index; each session sits behind its own
/// mutex so unrelated sessions never contend. No lock is held across an await.
#[derive(Clone, Default)]
pub struct MemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, Arc<Mutex<Entry>>>>>,
}

fn poisoned() -> StoreError {
    StoreError::Unavailable {
        reason: "session store lock poisoned".to_string(),
    }
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, id: &str) -> Result<Arc<Mutex<Entry>>, StoreError> {
        let sessions = self.sessions.read().map_err(|_| poisoned())?;
        sessions
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })
    }

    /// Number of sessions currently held
    pub fn len(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn insert(&self, session: GuardSession) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().map_err(|_| poisoned())?;
        if sessions.contains_key(&session.id) {
            return Err(StoreError::Duplicate { id: session.id });
        }
        debug!("Storing guard session {}", session.id);
        sessions.insert(
            session.id.clone(),
            Arc::new(Mutex::new(Entry {
                session,
                correlation_consumed: false,
            })),
        );
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<GuardSession, StoreError> {
        let entry = self.entry(id)?;
        let guard = entry.lock().map_err(|_| poisoned())?;
        Ok(guard.session.clone())
    }

    async fn transition(
        &self,
        id: &str,
        expected_version: u64,
        transition: Transition,
    ) -> Result<GuardSession, StoreError> {
        let entry = self.entry(id)?;
        let mut guard = entry.lock().map_err(|_| poisoned())?;
        guard.session.apply(expected_version, transition)?;
        Ok(guard.session.clone())
    }

    async fn consume_correlation(
        &self,
        id: &str,
        correlation_id: &str,
    ) -> Result<GuardSession, StoreError> {
        let entry = self.entry(id)?;
        let mut guard = entry.lock().map_err(|_| poisoned())?;
        if guard.correlation_consumed || guard.session.correlation_id != correlation_id {
            return Err(StoreError::CorrelationRejected { id: id.to_string() });
        }
        guard.correlation_consumed = true;
        Ok(guard.session.clone())
    }

    async fn list(&self) -> Result<Vec<GuardSession>, StoreError> {
        let entries: Vec<Arc<Mutex<Entry>>> = {
            let sessions = self.sessions.read().map_err(|_| poisoned())?;
            sessions.values().cloned().collect()
        };
        entries
            .iter()
            .map(|entry| {
                entry
                    .lock()
                    .map(|guard| guard.session.clone())
                    .map_err(|_| poisoned())
            })
            .collect()
    }

    async fn remove(&self, id: &str) -> Result<bool, StoreError> {
        let mut sessions = self.sessions.write().map_err(|_| poisoned())?;
        Ok(sessions.remove(id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::session::{Identity, SessionStatus};
    use chrono::{Duration, Utc};

    fn session(id: &str) -> GuardSession {
        GuardSession::new(id, format!("corr-{}", id), Utc::now(), Duration::minutes(5))
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicates() {
        let store = MemorySessionStore::new();
        store.insert(session("a")).await.unwrap();
        let err = store.insert(session("a")).await.unwrap_err();
        assert_eq!(err, StoreError::Duplicate { id: "a".into() });
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_get_unknown_is_not_found() {
        let store = MemorySessionStore::new();
        assert_eq!(
            store.get("missing").await.unwrap_err(),
            StoreError::NotFound {
                id: "missing".into()
            }
        );
    }

    #[tokio::test]
    async fn test_transition_increments_version() {
        let store = MemorySessionStore::new();
        store.insert(session("a")).await.unwrap();

        let decided = store
            .transition("a", 0, Transition::cancel(Utc::now()))
            .await
            .unwrap();
        assert_eq!(decided.status, SessionStatus::Cancelled);
        assert_eq!(decided.version, 1);
        assert_eq!(store.get("a").await.unwrap(), decided);
    }

    #[tokio::test]
    async fn test_correlation_consumed_once() {
        let store = MemorySessionStore::new();
        store.insert(session("a")).await.unwrap();

        store.consume_correlation("a", "corr-a").await.unwrap();
        assert!(matches!(
            store.consume_correlation("a", "corr-a").await,
            Err(StoreError::CorrelationRejected { .. })
        ));
    }

    #[tokio::test]
    async fn test_correlation_of_other_session_rejected() {
        let store = MemorySessionStore::new();
        store.insert(session("a")).await.unwrap();
        store.insert(session("b")).await.unwrap();

        assert!(matches!(
            store.consume_correlation("a", "corr-b").await,
            Err(StoreError::CorrelationRejected { .. })
        ));
        // The legitimate token is still usable afterwards
        store.consume_correlation("a", "corr-a").await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_transitions_have_one_winner() {
        for round in 0..50 {
            let store = MemorySessionStore::new();
            let id = format!("race-{}", round);
            store.insert(session(&id)).await.unwrap();

            let approve = {
                let store = store.clone();
                let id = id.clone();
                tokio::spawn(async move {
                    store
                        .transition(&id, 0, Transition::approve(Identity::new("alice"), Utc::now()))
                        .await
                })
            };
            let cancel = {
                let store = store.clone();
                let id = id.clone();
                tokio::spawn(async move {
                    store
                        .transition(&id, 0, Transition::cancel(Utc::now()))
                        .await
                })
            };

            let results = [approve.await.unwrap(), cancel.await.unwrap()];
            let winners: Vec<&GuardSession> =
                results.iter().filter_map(|r| r.as_ref().ok()).collect();
            assert_eq!(winners.len(), 1);
            assert!(results
                .iter()
                .any(|r| matches!(r, Err(StoreError::Conflict { .. }))));

            let stored = store.get(&id).await.unwrap();
            assert_eq!(stored.status, winners[0].status);
            assert_eq!(stored.version, 1);
        }
    }

    #[tokio::test]
    async fn test_remove_and_list() {
        let store = MemorySessionStore::new();
        store.insert(session("a")).await.unwrap();
        store.insert(session("b")).await.unwrap();
        assert_eq!(store.list().await.unwrap().len(), 2);

        assert!(store.remove("a").await.unwrap());
        assert!(!store.remove("a").await.unwrap());
        let ids: Vec<String> = store.list().await.unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["b".to_string()]);
    }
}
