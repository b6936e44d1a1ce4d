// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cli-guard project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

// Main entry point for the command-line authorization guard

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use tokio::signal;

use cli_guard::client::{GuardClient, WaitOutcome};
use cli_guard::config::{self, Config, StoreBackend};
use cli_guard::daemon::Daemon;
use cli_guard::guard::SessionStatus;

/// Out-of-band authorization guard for command-line tools
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Web server port
    #[arg(short = 'p')]
    web_port: Option<u16>,

    /// Web server address
    #[arg(short)]
    web_address: Option<String>,

    /// Session store backend (memory or redis)
    #[arg(long, value_parser = parse_backend)]
    store: Option<StoreBackend>,

    /// Redis connection URL for the redis store
    #[arg(long)]
    redis_url: Option<String>,

    /// Path to configuration file (YAML format)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to a configuration to validate and exit
    #[arg(long)]
    validate_config: Option<PathBuf>,

    /// Output the configuration schema as JSON and exit
    #[arg(long)]
    show_config_schema: bool,

    /// Enable verbose logging (debug level)
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Disable all logging output
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the guard server (default)
    Serve,

    /// Ask for approval and wait for the decision
    Request {
        /// Guard server URL
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        server: String,

        /// Why approval is needed
        #[arg(long)]
        reason: Option<String>,

        /// Command awaiting approval
        #[arg(long)]
        command: Option<String>,

        /// Requested session lifetime in seconds
        #[arg(long)]
        ttl: Option<i64>,

        /// Local wait limit in seconds
        #[arg(long, default_value_t = 300)]
        timeout: u64,
    },

    /// Wait for the decision on an existing request
    Wait {
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        server: String,

        id: String,

        #[arg(long, default_value_t = 300)]
        timeout: u64,
    },

    /// Withdraw a pending request
    Cancel {
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        server: String,

        id: String,
    },
}

fn parse_backend(value: &str) -> Result<StoreBackend, String> {
    match value {
        "memory" => Ok(StoreBackend::Memory),
        "redis" => Ok(StoreBackend::Redis),
        other => Err(format!("unknown store backend '{}'", other)),
    }
}

#[rocket::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logger with appropriate level based on verbose and quiet flags
    let log_level = if args.quiet {
        log::LevelFilter::Off
    } else if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if args.show_config_schema {
        return config::output_config_schema();
    }

    if let Some(validate_path) = args.validate_config {
        if !validate_path.exists() {
            anyhow::bail!(
                "Configuration file does not exist: {}",
                validate_path.display()
            );
        }

        Config::from_file(&validate_path)
            .map_err(|err| anyhow::anyhow!("Configuration validation failed: {:#}", err))?;
        println!("Configuration file is valid: {}", validate_path.display());
        return Ok(());
    }

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let config_path = args
                .config
                .clone()
                .unwrap_or_else(|| PathBuf::from("config.yaml"));
            let mut config = Config::from_file(&config_path)?;
            config.apply_args(args.web_port, args.web_address, args.store, args.redis_url);
            serve(config).await
        }
        Command::Request {
            server,
            reason,
            command,
            ttl,
            timeout,
        } => {
            let client = GuardClient::new(&server)?;
            let created = client
                .request(reason.as_deref(), command.as_deref(), ttl)
                .await
                .context("Failed to create a guard session")?;
            println!("Request {} created.", created.view.id);
            println!("Approve it at: {}", created.authorization_url);
            wait_for(&client, &created.view.id, timeout).await
        }
        Command::Wait {
            server,
            id,
            timeout,
        } => {
            let client = GuardClient::new(&server)?;
            wait_for(&client, &id, timeout).await
        }
        Command::Cancel { server, id } => {
            let client = GuardClient::new(&server)?;
            let view = client.cancel(&id).await?;
            println!("{}", view.message);
            Ok(())
        }
    }
}

async fn serve(config: Config) -> Result<()> {
    info!("Starting in daemon mode");
    let mut daemon = Daemon::new();
    daemon.launch(Arc::new(config)).await?;

    match signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal, terminating daemon"),
        Err(err) => log::error!("Error waiting for shutdown signal: {}", err),
    }
    daemon.shutdown();
    daemon.join().await
}

/// Exits with status 0 only on approval
async fn wait_for(client: &GuardClient, id: &str, timeout: u64) -> Result<()> {
    match client.wait(id, Duration::from_secs(timeout)).await? {
        WaitOutcome::Decided(view) => {
            println!("{}", view.message);
            if let Some(identity) = &view.identity {
                println!("Approved by {}", identity.principal);
            }
            if view.status != SessionStatus::Approved {
                std::process::exit(1);
            }
            Ok(())
        }
        WaitOutcome::TimedOut => {
            println!("No decision after {}s", timeout);
            std::process::exit(2);
        }
    }
}
