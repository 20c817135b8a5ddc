//! Store adapter: typed wrappers over an opaque key-value store.
//!
//! The store holds JSON blobs per key plus a set primitive for the player
//! roster and a prefix scan for cleanup tooling. `RedisStore` is the
//! production backend; `MemoryStore` backs the tests.

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;

use homegame_table::TableEngine;

use crate::models::{GameMeta, PlayerRecord};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(#[from] redis::RedisError),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Minimal key-value interface the server needs: atomic get/set of opaque
/// strings, a set per key, and a glob scan.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    async fn del(&self, keys: &[String]) -> Result<(), StoreError>;
    async fn sadd(&self, key: &str, member: &str) -> Result<(), StoreError>;
    async fn srem(&self, key: &str, member: &str) -> Result<(), StoreError>;
    async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError>;
    async fn scan(&self, pattern: &str) -> Result<Vec<String>, StoreError>;
}

// ============================================================================
// REDIS BACKEND
// ============================================================================

pub struct RedisStore {
    conn: redis::aio::ConnectionManager,
}

impl RedisStore {
    /// Connect to Redis. Failure here is fatal for the process: the caller
    /// is expected to bail out of startup.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = redis::aio::ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        Ok(conn.get(key).await?)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(key, value).await?;
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<(), StoreError> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(keys).await?;
        Ok(())
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.sadd::<_, _, ()>(key, member).await?;
        Ok(())
    }

    async fn srem(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.srem::<_, _, ()>(key, member).await?;
        Ok(())
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        Ok(conn.smembers(key).await?)
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        let mut iter = conn.scan_match::<_, String>(pattern).await?;
        let mut keys = Vec::new();
        while let Some(key) = iter.next_item().await {
            keys.push(key);
        }
        Ok(keys)
    }
}

// ============================================================================
// IN-MEMORY BACKEND (tests)
// ============================================================================

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    values: HashMap<String, String>,
    sets: HashMap<String, BTreeSet<String>>,
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.inner.lock().unwrap().values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.inner
            .lock()
            .unwrap()
            .values
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        for key in keys {
            inner.values.remove(key);
            inner.sets.remove(key);
        }
        Ok(())
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<(), StoreError> {
        self.inner
            .lock()
            .unwrap()
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn srem(&self, key: &str, member: &str) -> Result<(), StoreError> {
        if let Some(set) = self.inner.lock().unwrap().sets.get_mut(key) {
            set.remove(member);
        }
        Ok(())
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .sets
            .get(key)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        // Only prefix globs ("game:*") are needed.
        let prefix = pattern.trim_end_matches('*');
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .values
            .keys()
            .chain(inner.sets.keys())
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

// ============================================================================
// TYPED GAME STORE
// ============================================================================

fn game_key(code: &str) -> String {
    format!("game:{code}")
}

fn players_key(code: &str) -> String {
    format!("game:{code}:players")
}

fn player_key(code: &str, player_id: &str) -> String {
    format!("game:{code}:player:{player_id}")
}

fn engine_key(code: &str) -> String {
    format!("game:{code}:engine")
}

fn activity_key(code: &str) -> String {
    format!("game:{code}:last_activity")
}

/// Typed accessors for the per-game keys.
pub struct GameStore {
    store: Box<dyn Store>,
}

impl GameStore {
    pub fn new(store: Box<dyn Store>) -> Self {
        Self { store }
    }

    async fn load_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        match self.store.get(key).await? {
            None => Ok(None),
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(value) => Ok(Some(value)),
                Err(err) => {
                    // Blob corruption is unrecoverable; dump it and die.
                    tracing::error!(key, blob = %raw, error = %err, "corrupt blob in store");
                    panic!("corrupt blob for key {key}: {err}");
                }
            },
        }
    }

    async fn store_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let raw = serde_json::to_string(value)?;
        self.store.set(key, &raw).await
    }

    pub async fn load_game(&self, code: &str) -> Result<Option<GameMeta>, StoreError> {
        self.load_json(&game_key(code)).await
    }

    pub async fn store_game(&self, code: &str, meta: &GameMeta) -> Result<(), StoreError> {
        self.store_json(&game_key(code), meta).await
    }

    pub async fn load_player(
        &self,
        code: &str,
        player_id: &str,
    ) -> Result<Option<PlayerRecord>, StoreError> {
        self.load_json(&player_key(code, player_id)).await
    }

    pub async fn store_player(&self, code: &str, record: &PlayerRecord) -> Result<(), StoreError> {
        self.store_json(&player_key(code, &record.id), record).await?;
        self.store.sadd(&players_key(code), &record.id).await
    }

    pub async fn load_all_players(&self, code: &str) -> Result<Vec<PlayerRecord>, StoreError> {
        let ids = self.store.smembers(&players_key(code)).await?;
        let mut players = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = self.load_player(code, &id).await? {
                players.push(record);
            }
        }
        // Set iteration order is backend-defined; keep the roster stable.
        players.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(players)
    }

    pub async fn remove_player(&self, code: &str, player_id: &str) -> Result<(), StoreError> {
        self.store
            .del(&[player_key(code, player_id)])
            .await?;
        self.store.srem(&players_key(code), player_id).await
    }

    pub async fn load_engine(&self, code: &str) -> Result<Option<TableEngine>, StoreError> {
        self.load_json(&engine_key(code)).await
    }

    pub async fn store_engine(&self, code: &str, engine: &TableEngine) -> Result<(), StoreError> {
        self.store_json(&engine_key(code), engine).await
    }

    /// Update the last-activity timestamp (unix seconds, stored as text).
    pub async fn touch_activity(&self, code: &str, now: f64) -> Result<(), StoreError> {
        self.store.set(&activity_key(code), &now.to_string()).await
    }

    pub async fn last_activity(&self, code: &str) -> Result<Option<f64>, StoreError> {
        Ok(self
            .store
            .get(&activity_key(code))
            .await?
            .and_then(|raw| raw.parse().ok()))
    }

    /// All game codes present in the store (cleanup data contract).
    pub async fn list_codes(&self) -> Result<Vec<String>, StoreError> {
        let keys = self.store.scan("game:*").await?;
        let mut codes: BTreeSet<String> = BTreeSet::new();
        for key in keys {
            // Keys look like game:ABCD12, game:ABCD12:players, ...
            if let Some(code) = key.split(':').nth(1) {
                if !code.is_empty() {
                    codes.insert(code.to_string());
                }
            }
        }
        Ok(codes.into_iter().collect())
    }

    pub async fn delete_game(&self, code: &str) -> Result<(), StoreError> {
        let player_ids = self.store.smembers(&players_key(code)).await?;
        let mut keys = vec![
            game_key(code),
            players_key(code),
            engine_key(code),
            activity_key(code),
        ];
        for id in player_ids {
            keys.push(player_key(code, &id));
        }
        self.store.del(&keys).await
    }
}
