//! PostgreSQL adapter.
//!
//! All mutation logic lives in the routines of `sql/schema.sql`. The adapter
//! sends the entity as jsonb, reads back the `{id, code, err}` envelope and
//! turns a failure code into a [`StorageError`]. Reads go through the
//! `*_func_view` routines, which already join the author name and format the
//! timestamps; rows are mapped positionally.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::types::Json;
use tracing::{debug, info};

use crate::core::config::PostgresConfig;
use crate::core::error::{StorageError, StorageResult};
use crate::core::model::{Author, Post, PostRecord, local_zone_name};
use crate::core::seed::{parse_authors, parse_posts};
use crate::core::storage::{AUTHORS, POSTS, Storage, deadline};

const BACKEND: &str = "PostgreSQL";

/// Tables and routines, applied when `bootstrap` is enabled
pub const SCHEMA: &str = include_str!("../../sql/schema.sql");

type PostRow = (i64, i64, String, String, String, i64, String, i64, String);

// ============================================================================
// Routine envelope
// ============================================================================

/// Answer of every mutation routine
#[derive(Debug, Default, Deserialize)]
struct SqlResponse {
    #[serde(default)]
    id: i64,
    #[serde(default)]
    code: String,
    #[serde(default)]
    err: String,
}

impl SqlResponse {
    /// Affected id, or the failure the routine reported for `collection`/`id`
    fn into_id(self, collection: &'static str, id: i64, author_id: i64) -> StorageResult<i64> {
        match self.code.as_str() {
            "" if self.err.is_empty() => Ok(self.id),
            "already_exists" => Err(StorageError::AlreadyExists { collection, id }),
            "not_found" => Err(StorageError::NotFound { collection, id }),
            "referenced_missing" => Err(StorageError::ReferencedEntityMissing { author_id }),
            _ => Err(StorageError::backend(BACKEND, self.err)),
        }
    }
}

fn db_error(err: sqlx::Error) -> StorageError {
    match err {
        e @ (sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed) => StorageError::unavailable(BACKEND, e),
        e => StorageError::backend(BACKEND, e),
    }
}

// ============================================================================
// PostgresStore
// ============================================================================

pub struct PostgresStore {
    pool: PgPool,
    timeout: Duration,
}

impl PostgresStore {
    pub async fn connect(config: &PostgresConfig, timeout: Duration) -> StorageResult<Self> {
        let timezone = config.timezone.clone().unwrap_or_else(local_zone_name);
        let options: PgConnectOptions = config.url.parse().map_err(db_error)?;
        let options = options.options([("TimeZone", timezone.as_str())]);

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(timeout)
            .connect_with(options)
            .await
            .map_err(db_error)?;

        let store = Self { pool, timeout };
        if config.bootstrap {
            store.bootstrap().await?;
        }

        info!("Loaded storage: {} (timezone {})", store.describe(), timezone);
        Ok(store)
    }

    /// Create tables and (re)install the routines
    pub async fn bootstrap(&self) -> StorageResult<()> {
        info!("Applying PostgreSQL schema");
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Invoke a mutation routine with `request` encoded as jsonb
    async fn call<T>(&self, routine: &'static str, request: &T) -> StorageResult<SqlResponse>
    where
        T: Serialize + Sync,
    {
        debug!("Calling routine {}", routine);
        let sql = format!("SELECT {}($1)", routine);

        deadline(BACKEND, self.timeout, async {
            let Json(response) = sqlx::query_scalar::<_, Json<SqlResponse>>(&sql)
                .bind(Json(request))
                .fetch_one(&self.pool)
                .await
                .map_err(db_error)?;
            Ok(response)
        })
        .await
    }
}

#[async_trait]
impl Storage for PostgresStore {
    fn describe(&self) -> &'static str {
        BACKEND
    }

    async fn authors(&self) -> StorageResult<Vec<Author>> {
        deadline(BACKEND, self.timeout, async {
            let rows: Vec<(i64, String)> =
                sqlx::query_as("SELECT * FROM authors_func_view('{}')")
                    .fetch_all(&self.pool)
                    .await
                    .map_err(db_error)?;

            Ok(rows
                .into_iter()
                .map(|(id, name)| Author { id, name })
                .collect())
        })
        .await
    }

    async fn add_author(&self, author: Author) -> StorageResult<i64> {
        self.call("authors_func_insert", &author)
            .await?
            .into_id(AUTHORS, author.id, 0)
    }

    async fn update_author(&self, author: Author) -> StorageResult<i64> {
        self.call("authors_func_update", &author)
            .await?
            .into_id(AUTHORS, author.id, 0)
    }

    async fn delete_author(&self, author: Author) -> StorageResult<i64> {
        self.call("authors_func_delete", &author)
            .await?
            .into_id(AUTHORS, author.id, 0)
    }

    async fn load_authors(&self, source: &[u8]) -> StorageResult<()> {
        // One row per id: ON CONFLICT cannot touch the same row twice
        let authors: BTreeMap<i64, Author> = parse_authors(source)?
            .into_iter()
            .map(|a| (a.id, a))
            .collect();
        let batch: Vec<&Author> = authors.values().collect();

        let count = self
            .call("authors_func_load", &batch)
            .await?
            .into_id(AUTHORS, 0, 0)?;

        info!("Loaded {} authors into {}", count, self.describe());
        Ok(())
    }

    async fn posts(&self) -> StorageResult<Vec<Post>> {
        deadline(BACKEND, self.timeout, async {
            let rows: Vec<PostRow> = sqlx::query_as("SELECT * FROM posts_func_view('{}')")
                .fetch_all(&self.pool)
                .await
                .map_err(db_error)?;

            Ok(rows
                .into_iter()
                .map(
                    |(
                        id,
                        author_id,
                        author_name,
                        title,
                        content,
                        created_at,
                        created_at_txt,
                        published_at,
                        published_at_txt,
                    )| Post {
                        id,
                        author_id,
                        author_name,
                        title,
                        content,
                        created_at,
                        created_at_txt,
                        published_at,
                        published_at_txt,
                    },
                )
                .collect())
        })
        .await
    }

    async fn add_post(&self, post: Post) -> StorageResult<i64> {
        self.call("posts_func_insert", &post.record())
            .await?
            .into_id(POSTS, post.id, post.author_id)
    }

    async fn update_post(&self, post: Post) -> StorageResult<i64> {
        self.call("posts_func_update", &post.record())
            .await?
            .into_id(POSTS, post.id, post.author_id)
    }

    async fn delete_post(&self, post: Post) -> StorageResult<i64> {
        self.call("posts_func_delete", &post.record())
            .await?
            .into_id(POSTS, post.id, post.author_id)
    }

    async fn load_posts(&self, source: &[u8]) -> StorageResult<()> {
        let posts: BTreeMap<i64, PostRecord> = parse_posts(source)?
            .into_iter()
            .map(|p| (p.id, p.record()))
            .collect();
        let batch: Vec<&PostRecord> = posts.values().collect();

        let count = self
            .call("posts_func_load", &batch)
            .await?
            .into_id(POSTS, 0, 0)?;

        info!("Loaded {} posts into {}", count, self.describe());
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
