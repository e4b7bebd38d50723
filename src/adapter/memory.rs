use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::info;

use crate::core::error::{StorageError, StorageResult};
use crate::core::model::{Author, Post, PostRecord};
use crate::core::seed::{parse_authors, parse_posts};
use crate::core::storage::{AUTHORS, POSTS, Storage};

#[derive(Default)]
struct Tables {
    authors: BTreeMap<i64, Author>,
    posts: BTreeMap<i64, PostRecord>,
}

/// In-process store, the reference behaviour for every other adapter.
///
/// One lock covers both maps so the author check and the post write of
/// `add_post`/`update_post` see the same state. Listings are ordered by id.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let store = Self::default();
        info!("Loaded storage: {}", store.describe());
        store
    }
}

#[async_trait]
impl Storage for MemoryStore {
    fn describe(&self) -> &'static str {
        "MemDB"
    }

    async fn authors(&self) -> StorageResult<Vec<Author>> {
        let tables = self.tables.read();
        Ok(tables.authors.values().cloned().collect())
    }

    async fn add_author(&self, author: Author) -> StorageResult<i64> {
        let mut tables = self.tables.write();
        match tables.authors.entry(author.id) {
            Entry::Occupied(_) => Err(StorageError::AlreadyExists {
                collection: AUTHORS,
                id: author.id,
            }),
            Entry::Vacant(slot) => Ok(slot.insert(author).id),
        }
    }

    async fn update_author(&self, author: Author) -> StorageResult<i64> {
        let mut tables = self.tables.write();
        match tables.authors.get_mut(&author.id) {
            Some(existing) => {
                *existing = author;
                Ok(existing.id)
            }
            None => Err(StorageError::NotFound {
                collection: AUTHORS,
                id: author.id,
            }),
        }
    }

    async fn delete_author(&self, author: Author) -> StorageResult<i64> {
        let mut tables = self.tables.write();
        tables
            .authors
            .remove(&author.id)
            .map(|removed| removed.id)
            .ok_or(StorageError::NotFound {
                collection: AUTHORS,
                id: author.id,
            })
    }

    async fn load_authors(&self, source: &[u8]) -> StorageResult<()> {
        let authors = parse_authors(source)?;
        let count = authors.len();

        let mut tables = self.tables.write();
        for author in authors {
            tables.authors.insert(author.id, author);
        }

        info!("Loaded {} authors into {}", count, self.describe());
        Ok(())
    }

    async fn posts(&self) -> StorageResult<Vec<Post>> {
        let tables = self.tables.read();
        let posts = tables
            .posts
            .values()
            .map(|record| {
                let author = tables.authors.get(&record.author_id);
                let mut post = Post::from(record.clone());
                post.enrich(author.map(|a| a.name.as_str()));
                post
            })
            .collect();
        Ok(posts)
    }

    async fn add_post(&self, post: Post) -> StorageResult<i64> {
        let mut tables = self.tables.write();
        if tables.posts.contains_key(&post.id) {
            return Err(StorageError::AlreadyExists {
                collection: POSTS,
                id: post.id,
            });
        }
        if !tables.authors.contains_key(&post.author_id) {
            return Err(StorageError::ReferencedEntityMissing {
                author_id: post.author_id,
            });
        }

        tables.posts.insert(post.id, post.record());
        Ok(post.id)
    }

    async fn update_post(&self, post: Post) -> StorageResult<i64> {
        let mut tables = self.tables.write();
        if !tables.posts.contains_key(&post.id) {
            return Err(StorageError::NotFound {
                collection: POSTS,
                id: post.id,
            });
        }
        if !tables.authors.contains_key(&post.author_id) {
            return Err(StorageError::ReferencedEntityMissing {
                author_id: post.author_id,
            });
        }

        tables.posts.insert(post.id, post.record());
        Ok(post.id)
    }

    async fn delete_post(&self, post: Post) -> StorageResult<i64> {
        let mut tables = self.tables.write();
        tables
            .posts
            .remove(&post.id)
            .map(|removed| removed.id)
            .ok_or(StorageError::NotFound {
                collection: POSTS,
                id: post.id,
            })
    }

    async fn load_posts(&self, source: &[u8]) -> StorageResult<()> {
        let posts = parse_posts(source)?;
        let count = posts.len();

        let mut tables = self.tables.write();
        for post in posts {
            tables.posts.insert(post.id, post.record());
        }

        info!("Loaded {} posts into {}", count, self.describe());
        Ok(())
    }

    async fn close(&self) {}
}
