//! MongoDB adapter.
//!
//! Authors and posts are plain documents keyed by `_id`. Posts never store
//! the author name; reads join it in with an aggregation pipeline. Inserts
//! and updates do not check that the referenced author exists.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{self, Document, doc};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection, Database};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::config::MongoConfig;
use crate::core::error::{StorageError, StorageResult};
use crate::core::model::{
    Author, DANGLING_AUTHOR_NAME, MAX_TIMESTAMP_MILLIS, MIN_TIMESTAMP_MILLIS, Post, PostRecord,
    local_zone_name,
};
use crate::core::seed::{parse_authors, parse_posts};
use crate::core::storage::{AUTHORS, POSTS, Storage, deadline};

const BACKEND: &str = "MongoDB";

/// `$dateToString` spelling of `YYYY-MM-DD HH:MM:SS.mmm`
const MONGO_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S.%L";

const DUPLICATE_KEY: i32 = 11000;

// ============================================================================
// Documents
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AuthorDoc {
    #[serde(rename = "_id")]
    id: i64,
    #[serde(default)]
    name: String,
}

impl From<Author> for AuthorDoc {
    fn from(author: Author) -> Self {
        Self {
            id: author.id,
            name: author.name,
        }
    }
}

impl From<AuthorDoc> for Author {
    fn from(doc: AuthorDoc) -> Self {
        Self {
            id: doc.id,
            name: doc.name,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PostDoc {
    #[serde(rename = "_id")]
    id: i64,
    author_id: i64,
    title: String,
    content: String,
    created_at: i64,
    published_at: i64,
}

impl From<PostRecord> for PostDoc {
    fn from(record: PostRecord) -> Self {
        Self {
            id: record.id,
            author_id: record.author_id,
            title: record.title,
            content: record.content,
            created_at: record.created_at,
            published_at: record.published_at,
        }
    }
}

/// One output document of the posts pipeline
#[derive(Debug, Deserialize)]
struct PostView {
    #[serde(rename = "_id")]
    id: i64,
    #[serde(default)]
    author_id: i64,
    #[serde(default)]
    author_name: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    created_at: i64,
    #[serde(default)]
    created_at_txt: String,
    #[serde(default)]
    published_at: i64,
    #[serde(default)]
    published_at_txt: String,
}

impl From<PostView> for Post {
    fn from(view: PostView) -> Self {
        Self {
            id: view.id,
            author_id: view.author_id,
            author_name: view.author_name,
            title: view.title,
            content: view.content,
            created_at: view.created_at,
            created_at_txt: view.created_at_txt,
            published_at: view.published_at,
            published_at_txt: view.published_at_txt,
        }
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Formatted `field`, or "" when it is missing or outside the formattable range
fn millis_txt(field: &str, timezone: &str) -> Document {
    doc! {
        "$cond": {
            "if": {
                "$and": [
                    { "$gte": [field, MIN_TIMESTAMP_MILLIS] },
                    { "$lte": [field, MAX_TIMESTAMP_MILLIS] },
                ]
            },
            "then": {
                "$dateToString": {
                    "format": MONGO_TIMESTAMP_FORMAT,
                    "date": { "$toDate": field },
                    "timezone": timezone,
                }
            },
            "else": "",
        }
    }
}

/// Left-join posts to authors and project the derived fields
fn posts_pipeline(timezone: &str) -> Vec<Document> {
    vec![
        doc! {
            "$lookup": {
                "from": AUTHORS,
                "localField": "author_id",
                "foreignField": "_id",
                "as": "author",
            }
        },
        doc! {
            "$unwind": {
                "path": "$author",
                "preserveNullAndEmptyArrays": true,
            }
        },
        doc! {
            "$project": {
                "_id": 1,
                "author_id": 1,
                "author_name": { "$ifNull": ["$author.name", DANGLING_AUTHOR_NAME] },
                "title": 1,
                "content": 1,
                "created_at": 1,
                "created_at_txt": millis_txt("$created_at", timezone),
                "published_at": 1,
                "published_at_txt": millis_txt("$published_at", timezone),
            }
        },
        doc! { "$sort": { "_id": 1 } },
    ]
}

// ============================================================================
// Errors
// ============================================================================

fn mongo_error(err: mongodb::error::Error) -> StorageError {
    match err.kind.as_ref() {
        ErrorKind::Io(_)
        | ErrorKind::ServerSelection { .. }
        | ErrorKind::ConnectionPoolCleared { .. }
        | ErrorKind::DnsResolve { .. } => StorageError::unavailable(BACKEND, err),
        _ => StorageError::backend(BACKEND, err),
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(e)) if e.code == DUPLICATE_KEY
    )
}

// ============================================================================
// MongoStore
// ============================================================================

pub struct MongoStore {
    client: Client,
    db: Database,
    timezone: String,
    timeout: Duration,
}

impl MongoStore {
    pub async fn connect(config: &MongoConfig, timeout: Duration) -> StorageResult<Self> {
        let mut options = ClientOptions::parse(&config.uri)
            .await
            .map_err(mongo_error)?;
        options.connect_timeout = Some(timeout);
        options.server_selection_timeout = Some(timeout);

        let client = Client::with_options(options).map_err(mongo_error)?;
        let db = client.database(&config.database);

        deadline(BACKEND, timeout, async {
            db.run_command(doc! { "ping": 1 })
                .await
                .map_err(mongo_error)
        })
        .await?;

        let timezone = config.timezone.clone().unwrap_or_else(local_zone_name);

        let store = Self {
            client,
            db,
            timezone,
            timeout,
        };
        info!(
            "Loaded storage: {} (database {}, timezone {})",
            store.describe(),
            config.database,
            store.timezone
        );
        Ok(store)
    }

    fn authors_collection(&self) -> Collection<AuthorDoc> {
        self.db.collection(AUTHORS)
    }

    fn posts_collection(&self) -> Collection<PostDoc> {
        self.db.collection(POSTS)
    }

    /// Drop every document, then insert `docs`
    async fn replace_all<T>(&self, collection: Collection<T>, docs: Vec<T>) -> StorageResult<()>
    where
        T: Serialize + Send + Sync,
    {
        deadline(BACKEND, self.timeout, async {
            collection.delete_many(doc! {}).await.map_err(mongo_error)?;
            if !docs.is_empty() {
                collection.insert_many(docs).await.map_err(mongo_error)?;
            }
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl Storage for MongoStore {
    fn describe(&self) -> &'static str {
        BACKEND
    }

    async fn authors(&self) -> StorageResult<Vec<Author>> {
        deadline(BACKEND, self.timeout, async {
            let cursor = self
                .authors_collection()
                .find(doc! {})
                .sort(doc! { "_id": 1 })
                .await
                .map_err(mongo_error)?;
            let docs: Vec<AuthorDoc> = cursor.try_collect().await.map_err(mongo_error)?;
            Ok(docs.into_iter().map(Author::from).collect())
        })
        .await
    }

    async fn add_author(&self, author: Author) -> StorageResult<i64> {
        let id = author.id;
        deadline(BACKEND, self.timeout, async {
            match self.authors_collection().insert_one(AuthorDoc::from(author)).await {
                Ok(_) => Ok(id),
                Err(e) if is_duplicate_key(&e) => Err(StorageError::AlreadyExists {
                    collection: AUTHORS,
                    id,
                }),
                Err(e) => Err(mongo_error(e)),
            }
        })
        .await
    }

    async fn update_author(&self, author: Author) -> StorageResult<i64> {
        deadline(BACKEND, self.timeout, async {
            let result = self
                .authors_collection()
                .update_one(
                    doc! { "_id": author.id },
                    doc! { "$set": { "name": author.name.as_str() } },
                )
                .await
                .map_err(mongo_error)?;

            if result.matched_count == 0 {
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
            let result = self
                .authors_collection()
                .delete_one(doc! { "_id": author.id })
                .await
                .map_err(mongo_error)?;

            if result.deleted_count == 0 {
                return Err(StorageError::NotFound {
                    collection: AUTHORS,
                    id: author.id,
                });
            }
            Ok(author.id)
        })
        .await
    }

    /// Clears the collection, then inserts the batch
    async fn load_authors(&self, source: &[u8]) -> StorageResult<()> {
        let docs: BTreeMap<i64, AuthorDoc> = parse_authors(source)?
            .into_iter()
            .map(|a| (a.id, AuthorDoc::from(a)))
            .collect();
        let count = docs.len();

        self.replace_all(self.authors_collection(), docs.into_values().collect())
            .await?;

        info!("Loaded {} authors into {}", count, self.describe());
        Ok(())
    }

    async fn posts(&self) -> StorageResult<Vec<Post>> {
        deadline(BACKEND, self.timeout, async {
            let cursor = self
                .posts_collection()
                .aggregate(posts_pipeline(&self.timezone))
                .await
                .map_err(mongo_error)?;
            let docs: Vec<Document> = cursor.try_collect().await.map_err(mongo_error)?;

            docs.into_iter()
                .map(|doc| {
                    bson::from_document::<PostView>(doc)
                        .map(Post::from)
                        .map_err(|e| StorageError::backend(BACKEND, e))
                })
                .collect()
        })
        .await
    }

    async fn add_post(&self, post: Post) -> StorageResult<i64> {
        let id = post.id;
        deadline(BACKEND, self.timeout, async {
            match self
                .posts_collection()
                .insert_one(PostDoc::from(post.record()))
                .await
            {
                Ok(_) => Ok(id),
                Err(e) if is_duplicate_key(&e) => Err(StorageError::AlreadyExists {
                    collection: POSTS,
                    id,
                }),
                Err(e) => Err(mongo_error(e)),
            }
        })
        .await
    }

    async fn update_post(&self, post: Post) -> StorageResult<i64> {
        deadline(BACKEND, self.timeout, async {
            let result = self
                .posts_collection()
                .update_one(
                    doc! { "_id": post.id },
                    doc! {
                        "$set": {
                            "author_id": post.author_id,
                            "title": post.title.as_str(),
                            "content": post.content.as_str(),
                            "created_at": post.created_at,
                            "published_at": post.published_at,
                        }
                    },
                )
                .await
                .map_err(mongo_error)?;

            if result.matched_count == 0 {
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
            let result = self
                .posts_collection()
                .delete_one(doc! { "_id": post.id })
                .await
                .map_err(mongo_error)?;

            if result.deleted_count == 0 {
                return Err(StorageError::NotFound {
                    collection: POSTS,
                    id: post.id,
                });
            }
            Ok(post.id)
        })
        .await
    }

    /// Clears the collection, then inserts the batch
    async fn load_posts(&self, source: &[u8]) -> StorageResult<()> {
        let docs: BTreeMap<i64, PostDoc> = parse_posts(source)?
            .into_iter()
            .map(|p| (p.id, PostDoc::from(p.record())))
            .collect();
        let count = docs.len();

        self.replace_all(self.posts_collection(), docs.into_values().collect())
            .await?;

        info!("Loaded {} posts into {}", count, self.describe());
        Ok(())
    }

    async fn close(&self) {
        self.client.clone().shutdown().await;
    }
}
