// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cli-guard project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Daemon Management Module
//!
//! This module runs the long-lived services of the guard:
//!
//! - the Rocket web server (callback and command-line endpoints)
//! - the session lifecycle sweeper
//!
//! Each service runs as an independent Tokio task. The daemon tracks the task
//! handles and a shared `running` flag that every task watches for a graceful
//! shutdown.
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use cli_guard::{config::Config, daemon::launch_daemon::Daemon};
//!
//! async fn example() -> anyhow::Result<()> {
//!     let config = Arc::new(Config::from_file("config.yaml")?);
//!
//!     let mut daemon = Daemon::new();
//!     daemon.launch(config).await?;
//!
//!     // Later, trigger a graceful shutdown
//!     daemon.shutdown();
//!     daemon.join().await?;
//!     Ok(())
//! }
//! ```

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use tokio::task::JoinHandle;
use tokio::time;

use crate::config::{Config, StoreBackend, StoreConfig};
use crate::guard::{
    GuardService, MemorySessionStore, OAuthProvider, RedisSessionStore, SessionStore,
    SessionSweeper, StateBinder,
};
use crate::server::{build_rocket, server_figment};

/// Coordinates the background services of the guard
///
/// # Fields
///
/// * `tasks` - Handles of the spawned tasks, awaited by [`Daemon::join`]
/// * `running` - Flag shared with every task; cleared by [`Daemon::shutdown`]
pub struct Daemon {
    tasks: Vec<JoinHandle<Result<()>>>,
    running: Arc<AtomicBool>,
}

impl Default for Daemon {
    fn default() -> Self {
        Self::new()
    }
}

/// Open the session store selected in the configuration
pub async fn open_store(config: &StoreConfig) -> Result<Arc<dyn SessionStore>> {
    match config.backend {
        StoreBackend::Memory => {
            info!("Using in-memory session store");
            Ok(Arc::new(MemorySessionStore::new()))
        }
        StoreBackend::Redis => {
            info!("Using Redis session store with prefix '{}'", config.key_prefix);
            let store = RedisSessionStore::connect(config.redis_url.clone(), config.key_prefix.clone())
                .await
                .context("Failed to connect to the Redis session store")?;
            Ok(Arc::new(store))
        }
    }
}

/// Assemble the guard service from configuration and an opened store
pub fn build_service(config: &Config, store: Arc<dyn SessionStore>) -> Result<GuardService> {
    let binder = StateBinder::from_base64(&config.guard.state_secret)
        .context("Invalid guard.state_secret")?;
    let provider = OAuthProvider::new(config.provider.clone(), config.guard.exchange_timeout())
        .context("Failed to create the identity provider client")?;
    Ok(GuardService::new(
        store,
        binder,
        Arc::new(provider),
        config.guard.clone(),
    ))
}

impl Daemon {
    /// Create a new daemon with no task and the running flag set
    pub fn new() -> Self {
        Daemon {
            tasks: Vec::new(),
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Open the store and start the web server and the sweeper
    ///
    /// # Errors
    ///
    /// Fails when the store cannot be reached, the guard secrets are invalid
    /// or Rocket refuses its configuration.
    pub async fn launch(&mut self, config: Arc<Config>) -> Result<()> {
        let store = open_store(&config.store).await?;
        let service = Arc::new(build_service(&config, Arc::clone(&store))?);

        self.start_web_server(Arc::clone(&config), service).await?;
        self.start_sweeper(&config, store);
        Ok(())
    }

    /// Start the Rocket web server
    ///
    /// The server stops when the running flag is cleared.
    async fn start_web_server(
        &mut self,
        config: Arc<Config>,
        service: Arc<GuardService>,
    ) -> Result<()> {
        info!(
            "Starting web server on {}:{}",
            config.server.address, config.server.port
        );

        let figment = server_figment(&config);
        let ignited = build_rocket(figment, config, service)
            .ignite()
            .await
            .context("Failed to configure the web server")?;
        let shutdown = ignited.shutdown();

        let running = self.running.clone();
        self.tasks.push(tokio::spawn(async move {
            while running.load(Ordering::SeqCst) {
                time::sleep(Duration::from_secs(1)).await;
            }
            debug!("Notifying web server shutdown");
            shutdown.notify();
            Ok(())
        }));

        self.tasks.push(tokio::spawn(async move {
            ignited.launch().await?;
            Ok(())
        }));
        Ok(())
    }

    /// Start the session sweeper
    fn start_sweeper(&mut self, config: &Config, store: Arc<dyn SessionStore>) {
        let sweeper = SessionSweeper::new(store, config.guard.retention());
        let interval = config.guard.sweep_interval();
        let running = self.running.clone();
        self.tasks
            .push(tokio::spawn(async move { sweeper.run(interval, running).await }));
    }

    /// Signal every task to stop
    ///
    /// Does not wait; call [`Daemon::join`] afterwards.
    pub fn shutdown(&self) {
        info!("Shutting down daemon tasks");
        self.running.store(false, Ordering::SeqCst);
    }

    /// Wait for all tasks to complete
    ///
    /// A task failing or not finishing within five seconds is logged, the
    /// others are still awaited.
    pub async fn join(self) -> Result<()> {
        for task in self.tasks {
            match time::timeout(Duration::from_secs(5), task).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => error!("Task failed: {:#}", e),
                Ok(Err(e)) => error!("Task panicked: {}", e),
                Err(_) => warn!("Task did not complete within timeout period, may be hung"),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_is_default() {
        let store = open_store(&StoreConfig::default()).await.unwrap();
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_build_service_rejects_short_state_secret() {
        let mut config = Config::default();
        config.guard.state_secret = "c2hvcnQ=".to_string();
        let store = open_store(&config.store).await.unwrap();
        assert!(build_service(&config, store).is_err());
    }

    #[tokio::test]
    async fn test_launch_and_shutdown() {
        let mut config = Config::default();
        config.server.port = 0;
        config.server.log_level = "off".to_string();

        let mut daemon = Daemon::new();
        daemon.launch(Arc::new(config)).await.unwrap();
        time::sleep(Duration::from_millis(200)).await;

        daemon.shutdown();
        let joined = time::timeout(Duration::from_secs(15), daemon.join()).await;
        assert!(joined.is_ok());
    }
}
