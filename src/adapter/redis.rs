//! Redis adapter.
//!
//! Every entity is one JSON string under `authors:{id}` or `posts:{id}`.
//! Conditional writes (`SET NX`, `SET XX`, `DEL`) make each mutation a single
//! round trip. Posts are stored without derived fields; listing looks up the
//! referenced authors and formats timestamps in the local time zone.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Config, Connection, Pool, PoolConfig, Runtime, Timeouts};
use redis::{AsyncCommands, RedisError};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::core::config::RedisConfig;
use crate::core::error::{StorageError, StorageResult};
use crate::core::model::{Author, Post, PostRecord};
use crate::core::seed::{parse_authors, parse_posts};
use crate::core::storage::{AUTHORS, POSTS, Storage, deadline};

const BACKEND: &str = "Redis";

fn key(collection: &str, id: i64) -> String {
    format!("{}:{}", collection, id)
}

fn pattern(collection: &str) -> String {
    format!("{}:*", collection)
}

fn redis_error(err: RedisError) -> StorageError {
    if err.is_io_error()
        || err.is_connection_refusal()
        || err.is_connection_dropped()
        || err.is_timeout()
    {
        StorageError::unavailable(BACKEND, err)
    } else {
        StorageError::backend(BACKEND, err)
    }
}

fn encode<T: Serialize>(value: &T) -> StorageResult<String> {
    serde_json::to_string(value).map_err(|e| StorageError::backend(BACKEND, e))
}

fn decode<T: DeserializeOwned>(key: &str, raw: &str) -> StorageResult<T> {
    serde_json::from_str(raw)
        .map_err(|e| StorageError::backend(BACKEND, format!("corrupt value at {}: {}", key, e)))
}

/// Posts ordered by id, named from `names`; absent authors get the dangling name
fn enrich_all(records: Vec<PostRecord>, names: &HashMap<i64, String>) -> Vec<Post> {
    let mut posts: Vec<Post> = records
        .into_iter()
        .map(|record| {
            let mut post = Post::from(record);
            post.enrich(names.get(&post.author_id).map(String::as_str));
            post
        })
        .collect();
    posts.sort_by_key(|p| p.id);
    posts
}

fn build_pool(url: &str, pool_size: usize, timeout: Duration) -> StorageResult<Pool> {
    let mut pool_config = PoolConfig::new(pool_size);
    let mut timeouts = Timeouts::default();
    timeouts.wait = Some(timeout);
    timeouts.create = Some(timeout);
    timeouts.recycle = Some(timeout);
    pool_config.timeouts = timeouts;

    let mut config = Config::from_url(url);
    config.pool = Some(pool_config);

    config
        .create_pool(Some(Runtime::Tokio1))
        .map_err(|e| StorageError::unavailable(BACKEND, e))
}

// ============================================================================
// RedisStore
// ============================================================================

pub struct RedisStore {
    pool: Pool,
    timeout: Duration,
}

impl RedisStore {
    pub async fn connect(config: &RedisConfig, timeout: Duration) -> StorageResult<Self> {
        let store = Self::connect_url(&config.url(), config.pool_size, timeout).await?;
        info!(
            "Loaded storage: {} ({}, db {})",
            store.describe(),
            config.addr,
            config.db
        );
        Ok(store)
    }

    async fn connect_url(url: &str, pool_size: usize, timeout: Duration) -> StorageResult<Self> {
        let pool = build_pool(url, pool_size, timeout)?;
        let store = Self { pool, timeout };

        deadline(BACKEND, timeout, async {
            let mut conn = store.conn().await?;
            let _: String = redis::cmd("PING")
                .query_async(&mut conn)
                .await
                .map_err(redis_error)?;
            Ok(())
        })
        .await?;

        Ok(store)
    }

    async fn conn(&self) -> StorageResult<Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| StorageError::unavailable(BACKEND, e))
    }

    /// Raw values of every key in `collection`
    async fn scan_values(&self, collection: &str) -> StorageResult<Vec<(String, String)>> {
        let mut conn = self.conn().await?;

        let mut keys: Vec<String> = Vec::new();
        {
            let mut iter = conn
                .scan_match::<_, String>(pattern(collection))
                .await
                .map_err(redis_error)?;
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
        }
        debug!("Scanned {} keys in {}", keys.len(), collection);

        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let values: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&keys)
            .query_async(&mut conn)
            .await
            .map_err(redis_error)?;

        // A key deleted between SCAN and MGET comes back as nil
        Ok(keys
            .into_iter()
            .zip(values)
            .filter_map(|(key, value)| value.map(|v| (key, v)))
            .collect())
    }

    /// `SET key value NX`; false when the key already exists
    async fn set_new(&self, key: &str, value: String) -> StorageResult<bool> {
        let mut conn = self.conn().await?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .query_async(&mut conn)
            .await
            .map_err(redis_error)?;
        Ok(reply.is_some())
    }

    /// `SET key value XX`; false when the key does not exist
    async fn set_existing(&self, key: &str, value: String) -> StorageResult<bool> {
        let mut conn = self.conn().await?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("XX")
            .query_async(&mut conn)
            .await
            .map_err(redis_error)?;
        Ok(reply.is_some())
    }

    /// `DEL key`; false when nothing was removed
    async fn remove(&self, key: &str) -> StorageResult<bool> {
        let mut conn = self.conn().await?;
        let removed: i64 = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(redis_error)?;
        Ok(removed > 0)
    }

    /// Names of the given authors; missing or unreadable entries are left out.
    /// A failed lookup leaves every name out.
    async fn author_names(&self, ids: &BTreeSet<i64>) -> HashMap<i64, String> {
        if ids.is_empty() {
            return HashMap::new();
        }

        match deadline(BACKEND, self.timeout, self.fetch_author_names(ids)).await {
            Ok(names) => names,
            Err(e) => {
                warn!("Author lookup failed, names left empty: {}", e);
                HashMap::new()
            }
        }
    }

    async fn fetch_author_names(&self, ids: &BTreeSet<i64>) -> StorageResult<HashMap<i64, String>> {
        let keys: Vec<String> = ids.iter().map(|id| key(AUTHORS, *id)).collect();
        let mut conn = self.conn().await?;
        let values: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&keys)
            .query_async(&mut conn)
            .await
            .map_err(redis_error)?;

        let mut names = HashMap::with_capacity(ids.len());
        for (id, raw) in ids.iter().zip(values) {
            let Some(raw) = raw else { continue };
            match serde_json::from_str::<Author>(&raw) {
                Ok(author) => {
                    names.insert(*id, author.name);
                }
                Err(e) => warn!("Unreadable author {}: {}", id, e),
            }
        }
        Ok(names)
    }

    /// Write every `(key, value)` pair in one atomic pipeline
    async fn set_all(&self, entries: Vec<(String, String)>) -> StorageResult<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        for (key, value) in entries {
            pipe.cmd("SET").arg(key).arg(value).ignore();
        }

        let mut conn = self.conn().await?;
        let () = pipe.query_async(&mut conn).await.map_err(redis_error)?;
        Ok(())
    }
}

#[async_trait]
impl Storage for RedisStore {
    fn describe(&self) -> &'static str {
        BACKEND
    }

    async fn authors(&self) -> StorageResult<Vec<Author>> {
        deadline(BACKEND, self.timeout, async {
            let mut authors = self
                .scan_values(AUTHORS)
                .await?
                .iter()
                .map(|(key, raw)| decode::<Author>(key, raw))
                .collect::<StorageResult<Vec<_>>>()?;
            authors.sort_by_key(|a| a.id);
            Ok(authors)
        })
        .await
    }

    async fn add_author(&self, author: Author) -> StorageResult<i64> {
        let value = encode(&author)?;
        deadline(BACKEND, self.timeout, async {
            if !self.set_new(&key(AUTHORS, author.id), value).await? {
                return Err(StorageError::AlreadyExists {
                    collection: AUTHORS,
                    id: author.id,
                });
            }
            Ok(author.id)
        })
        .await
    }

    async fn update_author(&self, author: Author) -> StorageResult<i64> {
        let value = encode(&author)?;
        deadline(BACKEND, self.timeout, async {
            if !self.set_existing(&key(AUTHORS, author.id), value).await? {
                return Err(StorageError::NotFound {
                    collection: AUTHORS,
                    id: author.id,
                });
            }
            Ok(author.id)
        })
        .await
    }

    async fn delete_author(&self, author: Author) -> StorageResult<i64> {
        deadline(BACKEND, self.timeout, async {
            if !self.remove(&key(AUTHORS, author.id)).await? {
                return Err(StorageError::NotFound {
                    collection: AUTHORS,
                    id: author.id,
                });
            }
            Ok(author.id)
        })
        .await
    }

    async fn load_authors(&self, source: &[u8]) -> StorageResult<()> {
        let entries = parse_authors(source)?
            .iter()
            .map(|a| -> StorageResult<(String, String)> {
                Ok((key(AUTHORS, a.id), encode(a)?))
            })
            .collect::<StorageResult<Vec<_>>>()?;
        let count = entries.len();

        deadline(BACKEND, self.timeout, self.set_all(entries)).await?;

        info!("Loaded {} authors into {}", count, self.describe());
        Ok(())
    }

    async fn posts(&self) -> StorageResult<Vec<Post>> {
        let records = deadline(BACKEND, self.timeout, async {
            self.scan_values(POSTS)
                .await?
                .iter()
                .map(|(key, raw)| decode::<PostRecord>(key, raw))
                .collect::<StorageResult<Vec<_>>>()
        })
        .await?;

        let author_ids: BTreeSet<i64> = records.iter().map(|r| r.author_id).collect();
        let names = self.author_names(&author_ids).await;
        Ok(enrich_all(records, &names))
    }

    async fn add_post(&self, post: Post) -> StorageResult<i64> {
        let value = encode(&post.record())?;
        deadline(BACKEND, self.timeout, async {
            if !self.set_new(&key(POSTS, post.id), value).await? {
                return Err(StorageError::AlreadyExists {
                    collection: POSTS,
                    id: post.id,
                });
            }
            Ok(post.id)
        })
        .await
    }

    async fn update_post(&self, post: Post) -> StorageResult<i64> {
        let value = encode(&post.record())?;
        deadline(BACKEND, self.timeout, async {
            if !self.set_existing(&key(POSTS, post.id), value).await? {
                return Err(StorageError::NotFound {
                    collection: POSTS,
                    id: post.id,
                });
            }
            Ok(post.id)
        })
        .await
    }

    async fn delete_post(&self, post: Post) -> StorageResult<i64> {
        deadline(BACKEND, self.timeout, async {
            if !self.remove(&key(POSTS, post.id)).await? {
                return Err(StorageError::NotFound {
                    collection: POSTS,
                    id: post.id,
                });
            }
            Ok(post.id)
        })
        .await
    }

    async fn load_posts(&self, source: &[u8]) -> StorageResult<()> {
        let entries = parse_posts(source)?
            .iter()
            .map(|p| -> StorageResult<(String, String)> {
                Ok((key(POSTS, p.id), encode(&p.record())?))
            })
            .collect::<StorageResult<Vec<_>>>()?;
        let count = entries.len();

        deadline(BACKEND, self.timeout, self.set_all(entries)).await?;

        info!("Loaded {} posts into {}", count, self.describe());
        Ok(())
    }

    async fn close(&self) {
        self.pool.close();
    }
}
