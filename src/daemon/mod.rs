// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cli-guard project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Daemon Module
//!
//! Starts, supervises and stops the background services of the guard: the
//! web server and the session sweeper.
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use cli_guard::{config::Config, daemon::Daemon};
//!
//! async fn run() -> anyhow::Result<()> {
//!     let config = Arc::new(Config::from_file("config.yaml")?);
//!
//!     let mut daemon = Daemon::new();
//!     daemon.launch(config).await?;
//!
//!     // Wait for shutdown signal (e.g., Ctrl+C)
//!     tokio::signal::ctrl_c().await?;
//!
//!     daemon.shutdown();
//!     daemon.join().await?;
//!     Ok(())
//! }
//! ```

pub mod launch_daemon;

pub use launch_daemon::{build_service, open_store, Daemon};
