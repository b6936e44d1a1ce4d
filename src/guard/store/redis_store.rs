// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cli-guard project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Redis-backed session store
//!
//! Layout, with `<p>` the configured key prefix:
//!
//! - `<p>:session:<id>`: hash with `version` and `data` (session JSON)
//! - `<p>:sessions`: set of every stored id, scanned by the sweeper
//! - `<p>:consumed:<id>`: present once the correlation token was used
//!
//! Transitions are checked in Rust against a fresh read, then written with a
//! Lua script that only replaces the hash when `version` still holds the
//! expected value. Redis runs scripts atomically, so two racing writers can
//! never both succeed.

use ::redis::aio::MultiplexedConnection;
use ::redis::{Client, RedisError, Script};
use async_trait::async_trait;
use log::{debug, info, warn};

use super::SessionStore;
use crate::guard::error::StoreError;
use crate::guard::session::{GuardSession, Transition};

const INSERT_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
  return 0
end
redis.call('HSET', KEYS[1], 'version', ARGV[1], 'data', ARGV[2])
redis.call('SADD', KEYS[2], ARGV[3])
return 1
"#;

const COMPARE_AND_SWAP_SCRIPT: &str = r#"
local current = redis.call('HGET', KEYS[1], 'version')
if not current then
  return -1
end
if current ~= ARGV[1] then
  return 0
end
redis.call('HSET', KEYS[1], 'version', ARGV[2], 'data', ARGV[3])
return 1
"#;

fn unavailable(err: RedisError) -> StoreError {
    warn!("Redis session store error: {}", err);
    StoreError::Unavailable {
        reason: err.to_string(),
    }
}

pub struct RedisSessionStore {
    connection: MultiplexedConnection,
    key_prefix: String,
    insert_script: Script,
    cas_script: Script,
}

impl RedisSessionStore {
    /// Connect to Redis and verify the connection
    ///
    /// # Arguments
    /// * `url` - Redis connection URL (e.g., "redis://127.0.0.1:6379")
    /// * `key_prefix` - Prefix for every key written by this store
    pub async fn connect(
        url: impl Into<String>,
        key_prefix: impl Into<String>,
    ) -> Result<Self, StoreError> {
        let url = url.into();
        let client = Client::open(url.clone()).map_err(unavailable)?;
        let mut connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(unavailable)?;

        let pong: String = ::redis::cmd("PING")
            .query_async(&mut connection)
            .await
            .map_err(unavailable)?;
        info!("Connected to Redis session store at {} ({})", url, pong);

        Ok(Self {
            connection,
            key_prefix: key_prefix.into(),
            insert_script: Script::new(INSERT_SCRIPT),
            cas_script: Script::new(COMPARE_AND_SWAP_SCRIPT),
        })
    }

    fn session_key(&self, id: &str) -> String {
        format!("{}:session:{}", self.key_prefix, id)
    }

    fn index_key(&self) -> String {
        format!("{}:sessions", self.key_prefix)
    }

    fn consumed_key(&self, id: &str) -> String {
        format!("{}:consumed:{}", self.key_prefix, id)
    }

    fn encode(session: &GuardSession) -> Result<String, StoreError> {
        serde_json::to_string(session).map_err(|e| StoreError::Corrupted {
            id: session.id.clone(),
            reason: e.to_string(),
        })
    }

    fn decode(id: &str, data: &str) -> Result<GuardSession, StoreError> {
        serde_json::from_str(data).map_err(|e| StoreError::Corrupted {
            id: id.to_string(),
            reason: e.to_string(),
        })
    }

    /// Read the stored session, `None` if the key does not exist
    async fn load(&self, id: &str) -> Result<Option<GuardSession>, StoreError> {
        let mut con = self.connection.clone();
        let data: Option<String> = ::redis::cmd("HGET")
            .arg(self.session_key(id))
            .arg("data")
            .query_async(&mut con)
            .await
            .map_err(unavailable)?;
        data.map(|data| Self::decode(id, &data)).transpose()
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn insert(&self, session: GuardSession) -> Result<(), StoreError> {
        let data = Self::encode(&session)?;
        let mut con = self.connection.clone();
        let created: i64 = self
            .insert_script
            .key(self.session_key(&session.id))
            .key(self.index_key())
            .arg(session.version)
            .arg(data)
            .arg(&session.id)
            .invoke_async(&mut con)
            .await
            .map_err(unavailable)?;

        if created == 0 {
            return Err(StoreError::Duplicate { id: session.id });
        }
        debug!("Stored guard session {} in Redis", session.id);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<GuardSession, StoreError> {
        self.load(id)
            .await?
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })
    }

    async fn transition(
        &self,
        id: &str,
        expected_version: u64,
        transition: Transition,
    ) -> Result<GuardSession, StoreError> {
        let mut session = self.get(id).await?;
        session.apply(expected_version, transition)?;
        let data = Self::encode(&session)?;

        let mut con = self.connection.clone();
        let outcome: i64 = self
            .cas_script
            .key(self.session_key(id))
            .arg(expected_version)
            .arg(session.version)
            .arg(data)
            .invoke_async(&mut con)
            .await
            .map_err(unavailable)?;

        match outcome {
            1 => Ok(session),
            -1 => Err(StoreError::NotFound { id: id.to_string() }),
            _ => Err(StoreError::Conflict { id: id.to_string() }),
        }
    }

    async fn consume_correlation(
        &self,
        id: &str,
        correlation_id: &str,
    ) -> Result<GuardSession, StoreError> {
        let session = self.get(id).await?;
        if session.correlation_id != correlation_id {
            return Err(StoreError::CorrelationRejected { id: id.to_string() });
        }

        let mut con = self.connection.clone();
        let claimed: Option<String> = ::redis::cmd("SET")
            .arg(self.consumed_key(id))
            .arg(correlation_id)
            .arg("NX")
            .query_async(&mut con)
            .await
            .map_err(unavailable)?;

        match claimed {
            Some(_) => Ok(session),
            None => Err(StoreError::CorrelationRejected { id: id.to_string() }),
        }
    }

    async fn list(&self) -> Result<Vec<GuardSession>, StoreError> {
        let mut con = self.connection.clone();
        let ids: Vec<String> = ::redis::cmd("SMEMBERS")
            .arg(self.index_key())
            .query_async(&mut con)
            .await
            .map_err(unavailable)?;

        let mut sessions = Vec::with_capacity(ids.len());
        for id in ids {
            match self.load(&id).await {
                Ok(Some(session)) => sessions.push(session),
                Ok(None) => {
                    // Hash vanished without going through remove()
                    let _: i64 = ::redis::cmd("SREM")
                        .arg(self.index_key())
                        .arg(&id)
                        .query_async(&mut con)
                        .await
                        .map_err(unavailable)?;
                }
                Err(StoreError::Corrupted { id, reason }) => {
                    warn!("Skipping unreadable guard session {}: {}", id, reason);
                }
                Err(err) => return Err(err),
            }
        }
        Ok(sessions)
    }

    async fn remove(&self, id: &str) -> Result<bool, StoreError> {
        let mut con = self.connection.clone();
        let deleted: i64 = ::redis::cmd("DEL")
            .arg(self.session_key(id))
            .arg(self.consumed_key(id))
            .query_async(&mut con)
            .await
            .map_err(unavailable)?;
        let _: i64 = ::redis::cmd("SREM")
            .arg(self.index_key())
            .arg(id)
            .query_async(&mut con)
            .await
            .map_err(unavailable)?;
        Ok(deleted > 0)
    }
}
