// src/services/result_store.rs
use crate::errors::EditorError;
use crate::models::{ResultStats, StoredResult};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use redis::{AsyncCommands, Client, Pipeline};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use uuid::Uuid;

pub const DEFAULT_RECENT_KEYS: usize = 10;

#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn put(&self, request_id: Uuid, result: StoredResult) -> Result<(), EditorError>;

    async fn get(&self, request_id: &Uuid) -> Result<Option<StoredResult>, EditorError>;

    /// Total stored count and the `recent` newest keys, newest last.
    async fn stats(&self, recent: usize) -> Result<ResultStats, EditorError>;
}

/// When entries leave an [`InMemoryResultStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvictionPolicy {
    /// Keep everything for the life of the process.
    #[default]
    Unbounded,
    /// Drop the oldest entries beyond this count.
    MaxEntries(usize),
    /// Drop entries older than this.
    MaxAge(Duration),
}

#[derive(Default)]
struct Entries {
    by_id: HashMap<Uuid, StoredResult>,
    order: VecDeque<Uuid>,
}

impl Entries {
    fn evict(&mut self, policy: EvictionPolicy) {
        match policy {
            EvictionPolicy::Unbounded => {}
            EvictionPolicy::MaxEntries(max) => {
                while self.order.len() > max {
                    if let Some(oldest) = self.order.pop_front() {
                        self.by_id.remove(&oldest);
                    }
                }
            }
            EvictionPolicy::MaxAge(age) => {
                let cutoff = Utc::now() - age;
                while let Some(oldest) = self.order.front().copied() {
                    match self.by_id.get(&oldest) {
                        Some(entry) if entry.stored_at >= cutoff => break,
                        _ => {
                            self.order.pop_front();
                            self.by_id.remove(&oldest);
                        }
                    }
                }
            }
        }
    }
}

pub struct InMemoryResultStore {
    policy: EvictionPolicy,
    entries: Mutex<Entries>,
}

impl InMemoryResultStore {
    pub fn new(policy: EvictionPolicy) -> Self {
        Self {
            policy,
            entries: Mutex::new(Entries::default()),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Entries>, EditorError> {
        self.entries
            .lock()
            .map_err(|_| EditorError::Io("Result store lock poisoned".to_string()))
    }
}

impl Default for InMemoryResultStore {
    fn default() -> Self {
        Self::new(EvictionPolicy::default())
    }
}

#[async_trait]
impl ResultStore for InMemoryResultStore {
    async fn put(&self, request_id: Uuid, result: StoredResult) -> Result<(), EditorError> {
        let mut entries = self.lock()?;
        if entries.by_id.insert(request_id, result).is_some() {
            entries.order.retain(|id| *id != request_id);
        }
        entries.order.push_back(request_id);
        entries.evict(self.policy);
        Ok(())
    }

    async fn get(&self, request_id: &Uuid) -> Result<Option<StoredResult>, EditorError> {
        let mut entries = self.lock()?;
        entries.evict(self.policy);
        Ok(entries.by_id.get(request_id).cloned())
    }

    async fn stats(&self, recent: usize) -> Result<ResultStats, EditorError> {
        let mut entries = self.lock()?;
        entries.evict(self.policy);
        let skip = entries.order.len().saturating_sub(recent);
        Ok(ResultStats {
            total_processed: entries.by_id.len(),
            recent_requests: entries.order.iter().skip(skip).copied().collect(),
        })
    }
}

const RESULT_INDEX_KEY: &str = "results:index";

/// Redis-backed store. Every bundle carries a TTL, so eviction is age-based.
///
/// `results:index` is a sorted set of request ids scored by expiry time (unix
/// seconds). Members whose bundle has expired are pruned before every count,
/// so `stats` only reports results that `get` can still return.
pub struct RedisResultStore {
    client: Client,
    ttl_secs: u64,
}

impl RedisResultStore {
    pub async fn new(redis_url: &str, ttl_secs: u64) -> Result<Self, EditorError> {
        let client = Client::open(redis_url).map_err(|e| EditorError::Io(e.to_string()))?;

        // Test connection
        let mut conn = client
            .get_async_connection()
            .await
            .map_err(|e| EditorError::Io(e.to_string()))?;

        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map_err(|e| EditorError::Io(e.to_string()))?;

        Ok(Self { client, ttl_secs })
    }

    async fn connection(&self) -> Result<redis::aio::Connection, EditorError> {
        self.client
            .get_async_connection()
            .await
            .map_err(|e| EditorError::Io(format!("Redis connection failed: {}", e)))
    }
}

fn result_key(request_id: &Uuid) -> String {
    format!("result:{}", request_id)
}

fn expires_at(now: DateTime<Utc>, ttl_secs: u64) -> i64 {
    now.timestamp()
        .saturating_add(i64::try_from(ttl_secs).unwrap_or(i64::MAX))
}

/// Stores the bundle, indexes it under its expiry, and prunes expired ids.
fn put_pipeline(request_id: &Uuid, value: &str, ttl_secs: u64, now: DateTime<Utc>) -> Pipeline {
    let mut pipe = redis::pipe();
    pipe.atomic()
        .set_ex(result_key(request_id), value, ttl_secs as usize)
        .ignore()
        .zadd(RESULT_INDEX_KEY, request_id.to_string(), expires_at(now, ttl_secs))
        .ignore()
        .zrembyscore(RESULT_INDEX_KEY, "-inf", now.timestamp())
        .ignore();
    pipe
}

/// Prunes expired ids, then reads the live count and the `recent` newest ids
/// (newest first). Requires `recent > 0`.
fn stats_pipeline(recent: usize, now: DateTime<Utc>) -> Pipeline {
    let mut pipe = redis::pipe();
    pipe.atomic()
        .zrembyscore(RESULT_INDEX_KEY, "-inf", now.timestamp())
        .ignore()
        .zcard(RESULT_INDEX_KEY)
        .zrevrange(RESULT_INDEX_KEY, 0, recent as isize - 1);
    pipe
}

/// Index members come back newest first; stats report them newest last.
fn recent_ids(newest_first: &[String]) -> Vec<Uuid> {
    newest_first
        .iter()
        .rev()
        .filter_map(|id| Uuid::parse_str(id).ok())
        .collect()
}

#[async_trait]
impl ResultStore for RedisResultStore {
    async fn put(&self, request_id: Uuid, result: StoredResult) -> Result<(), EditorError> {
        let mut conn = self.connection().await?;
        let value = serde_json::to_string(&result)?;

        put_pipeline(&request_id, &value, self.ttl_secs, Utc::now())
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| EditorError::Io(e.to_string()))
    }

    async fn get(&self, request_id: &Uuid) -> Result<Option<StoredResult>, EditorError> {
        let mut conn = self.connection().await?;
        let value: Option<String> = conn
            .get(result_key(request_id))
            .await
            .map_err(|e| EditorError::Io(e.to_string()))?;

        value
            .map(|v| serde_json::from_str(&v).map_err(EditorError::from))
            .transpose()
    }

    async fn stats(&self, recent: usize) -> Result<ResultStats, EditorError> {
        let mut conn = self.connection().await?;
        let now = Utc::now();

        if recent == 0 {
            let (total,): (usize,) = redis::pipe()
                .atomic()
                .zrembyscore(RESULT_INDEX_KEY, "-inf", now.timestamp())
                .ignore()
                .zcard(RESULT_INDEX_KEY)
                .query_async(&mut conn)
                .await
                .map_err(|e| EditorError::Io(e.to_string()))?;
            return Ok(ResultStats {
                total_processed: total,
                recent_requests: Vec::new(),
            });
        }

        let (total, newest_first): (usize, Vec<String>) = stats_pipeline(recent, now)
            .query_async(&mut conn)
            .await
            .map_err(|e| EditorError::Io(e.to_string()))?;

        Ok(ResultStats {
            total_processed: total,
            recent_requests: recent_ids(&newest_first),
        })
    }
}
