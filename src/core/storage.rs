use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::core::error::{StorageError, StorageResult};
use crate::core::model::{Author, Post};

pub const AUTHORS: &str = "authors";
pub const POSTS: &str = "posts";

/// Contract every storage backend fulfils.
///
/// Calls may arrive concurrently from any number of request tasks. Mutations
/// are keyed on `id` alone; `delete_*` ignores every other field of its input.
#[async_trait]
pub trait Storage: Send + Sync + 'static {
    /// Fixed backend name for diagnostics
    fn describe(&self) -> &'static str;

    async fn authors(&self) -> StorageResult<Vec<Author>>;

    /// Fails with `AlreadyExists` when the id is taken
    async fn add_author(&self, author: Author) -> StorageResult<i64>;

    /// Fails with `NotFound` when the id is absent
    async fn update_author(&self, author: Author) -> StorageResult<i64>;

    /// Fails with `NotFound` when the id is absent. Posts referencing the
    /// author are left in place.
    async fn delete_author(&self, author: Author) -> StorageResult<i64>;

    /// Apply a JSON array of authors using the adapter's replace policy
    async fn load_authors(&self, source: &[u8]) -> StorageResult<()>;

    /// All posts with `author_name` and the `*_txt` fields freshly computed
    async fn posts(&self) -> StorageResult<Vec<Post>>;

    /// Fails with `AlreadyExists` when the id is taken. Backends that check
    /// references fail with `ReferencedEntityMissing` for an unknown author.
    async fn add_post(&self, post: Post) -> StorageResult<i64>;

    /// Full replace. Fails with `NotFound` when the id is absent; reference
    /// checks as for [`Storage::add_post`].
    async fn update_post(&self, post: Post) -> StorageResult<i64>;

    async fn delete_post(&self, post: Post) -> StorageResult<i64>;

    /// Apply a JSON array of posts using the adapter's replace policy
    async fn load_posts(&self, source: &[u8]) -> StorageResult<()>;

    /// Release backend resources. Called once at shutdown.
    async fn close(&self);
}

/// Run one backend round trip, failing with `BackendUnavailable` once
/// `timeout` elapses.
pub async fn deadline<T, F>(backend: &'static str, timeout: Duration, fut: F) -> StorageResult<T>
where
    F: Future<Output = StorageResult<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(StorageError::unavailable(
            backend,
            format!("no response within {}ms", timeout.as_millis()),
        )),
    }
}
