// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cli-guard project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Session lifecycle sweeper
//!
//! Periodically persists `expired` for pending sessions past their deadline
//! and deletes sessions whose retention window has elapsed. Readers never
//! depend on it: expiry is also derived at read time.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use tokio::time::{self, Instant};

use super::error::StoreError;
use super::session::{SessionStatus, Transition};
use super::store::SessionStore;

/// Granularity at which a sleeping sweeper notices shutdown
const SHUTDOWN_POLL: Duration = Duration::from_secs(1);

/// Counters of one sweep pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Pending sessions moved to `expired`
    pub expired: usize,
    /// Sessions deleted after their retention window
    pub reaped: usize,
}

pub struct SessionSweeper {
    store: Arc<dyn SessionStore>,
    retention: chrono::Duration,
}

impl SessionSweeper {
    pub fn new(store: Arc<dyn SessionStore>, retention: chrono::Duration) -> Self {
        Self { store, retention }
    }

    /// Run one pass as of `now`
    ///
    /// Expiry goes through the same compare-and-swap as every other
    /// transition; a session decided concurrently is left to the next pass.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, StoreError> {
        let mut report = SweepReport::default();

        for session in self.store.list().await? {
            let session = if session.status == SessionStatus::Pending
                && session.is_past_deadline(now)
            {
                match self
                    .store
                    .transition(
                        &session.id,
                        session.version,
                        Transition::expire(session.expires_at),
                    )
                    .await
                {
                    Ok(expired) => {
                        report.expired += 1;
                        expired
                    }
                    Err(StoreError::Conflict { .. }) | Err(StoreError::NotFound { .. }) => {
                        debug!("Session {} changed during sweep", session.id);
                        continue;
                    }
                    Err(err) => return Err(err),
                }
            } else {
                session
            };

            if session.status.is_terminal() && session.reclaimable_after(self.retention) <= now {
                if self.store.remove(&session.id).await? {
                    report.reaped += 1;
                }
            }
        }

        Ok(report)
    }

    /// Sweep every `interval` until `running` is cleared
    pub async fn run(self, interval: Duration, running: Arc<AtomicBool>) -> anyhow::Result<()> {
        info!("Session sweeper started, period {:?}", interval);

        while running.load(Ordering::SeqCst) {
            match self.sweep(Utc::now()).await {
                Ok(report) if report != SweepReport::default() => info!(
                    "Sweep pass: {} expired, {} reaped",
                    report.expired, report.reaped
                ),
                Ok(_) => debug!("Sweep pass: nothing to do"),
                Err(err) => warn!("Sweep pass failed: {}", err),
            }

            let next = Instant::now() + interval;
            while running.load(Ordering::SeqCst) {
                let now = Instant::now();
                if now >= next {
                    break;
                }
                time::sleep(SHUTDOWN_POLL.min(next - now)).await;
            }
        }

        info!("Session sweeper stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::session::{GuardSession, Identity};
    use crate::guard::store::MemorySessionStore;
    use chrono::Duration as ChronoDuration;

    async fn insert(store: &MemorySessionStore, id: &str, created: DateTime<Utc>, ttl_mins: i64) {
        store
            .insert(GuardSession::new(
                id,
                format!("corr-{}", id),
                created,
                ChronoDuration::minutes(ttl_mins),
            ))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_sweep_expires_only_overdue_pending_sessions() {
        let store = MemorySessionStore::new();
        let now = Utc::now();
        insert(&store, "overdue", now - ChronoDuration::minutes(10), 5).await;
        insert(&store, "fresh", now, 5).await;

        let sweeper = SessionSweeper::new(Arc::new(store.clone()), ChronoDuration::hours(1));
        let report = sweeper.sweep(now).await.unwrap();

        assert_eq!(report, SweepReport { expired: 1, reaped: 0 });
        let overdue = store.get("overdue").await.unwrap();
        assert_eq!(overdue.status, SessionStatus::Expired);
        assert_eq!(overdue.decided_at, Some(overdue.expires_at));
        assert_eq!(store.get("fresh").await.unwrap().status, SessionStatus::Pending);
    }

    #[tokio::test]
    async fn test_sweep_reaps_after_retention() {
        let store = MemorySessionStore::new();
        let now = Utc::now();
        insert(&store, "ancient", now - ChronoDuration::hours(3), 5).await;
        insert(&store, "recent", now - ChronoDuration::minutes(2), 5).await;
        store
            .transition(
                "recent",
                0,
                Transition::approve(Identity::new("alice"), now - ChronoDuration::minutes(1)),
            )
            .await
            .unwrap();

        let sweeper = SessionSweeper::new(Arc::new(store.clone()), ChronoDuration::hours(1));
        let report = sweeper.sweep(now).await.unwrap();

        // "ancient" is expired and reaped in the same pass
        assert_eq!(report, SweepReport { expired: 1, reaped: 1 });
        assert!(matches!(
            store.get("ancient").await,
            Err(StoreError::NotFound { .. })
        ));
        assert_eq!(store.get("recent").await.unwrap().status, SessionStatus::Approved);
    }

    #[tokio::test]
    async fn test_sweep_does_not_touch_terminal_status() {
        let store = MemorySessionStore::new();
        let now = Utc::now();
        insert(&store, "cancelled", now - ChronoDuration::minutes(10), 5).await;
        store
            .transition("cancelled", 0, Transition::cancel(now - ChronoDuration::minutes(8)))
            .await
            .unwrap();

        let sweeper = SessionSweeper::new(Arc::new(store.clone()), ChronoDuration::hours(1));
        assert_eq!(sweeper.sweep(now).await.unwrap(), SweepReport::default());
        assert_eq!(
            store.get("cancelled").await.unwrap().status,
            SessionStatus::Cancelled
        );
    }

    #[tokio::test]
    async fn test_run_stops_when_flag_cleared() {
        let store = MemorySessionStore::new();
        insert(&store, "overdue", Utc::now() - ChronoDuration::minutes(10), 5).await;
        let running = Arc::new(AtomicBool::new(true));

        let sweeper = SessionSweeper::new(Arc::new(store.clone()), ChronoDuration::hours(1));
        let task = tokio::spawn(sweeper.run(Duration::from_secs(60), running.clone()));

        tokio::time::sleep(Duration::from_millis(200)).await;
        running.store(false, Ordering::SeqCst);

        let finished = tokio::time::timeout(Duration::from_secs(3), task).await;
        assert!(finished.is_ok(), "sweeper did not stop");
        assert_eq!(store.get("overdue").await.unwrap().status, SessionStatus::Expired);
    }
}
