//! Behaviour every adapter must share, run against a live store.
//!
//! The store must start empty. Capabilities that differ per backend are
//! described by a [`Profile`].

use crate::core::error::ErrorKind;
use crate::core::model::{Author, DANGLING_AUTHOR_NAME, Post, format_millis};
use crate::core::storage::Storage;

const SEED_AUTHORS: &[u8] = include_bytes!("../../seed/authors.json");
const SEED_POSTS: &[u8] = include_bytes!("../../seed/posts.json");

#[derive(Debug, Clone, Copy)]
pub struct Profile {
    /// Adding or updating a post checks the author exists
    pub enforces_references: bool,
}

impl Profile {
    pub const REFERENCE: Profile = Profile {
        enforces_references: true,
    };
}

pub async fn run(store: &dyn Storage, profile: Profile) {
    assert!(store.authors().await.unwrap().is_empty(), "store must start empty");
    assert!(store.posts().await.unwrap().is_empty(), "store must start empty");

    authors(store).await;
    posts(store, profile).await;
    dangling_reference(store).await;
    bulk_load_is_idempotent(store).await;
}

async fn sorted_authors(store: &dyn Storage) -> Vec<Author> {
    let mut authors = store.authors().await.unwrap();
    authors.sort_by_key(|a| a.id);
    authors
}

async fn sorted_posts(store: &dyn Storage) -> Vec<Post> {
    let mut posts = store.posts().await.unwrap();
    posts.sort_by_key(|p| p.id);
    posts
}

async fn post_by_id(store: &dyn Storage, id: i64) -> Post {
    let matching: Vec<_> = store
        .posts()
        .await
        .unwrap()
        .into_iter()
        .filter(|p| p.id == id)
        .collect();
    assert_eq!(matching.len(), 1, "expected exactly one post {}", id);
    matching.into_iter().next().unwrap()
}

/// `*_txt` fields follow this process's local time zone on every adapter
fn assert_timestamp_text(text: &str, millis: i64) {
    assert_eq!(text, format_millis(millis), "text of {}", millis);
}

async fn authors(store: &dyn Storage) {
    assert_eq!(store.add_author(Author::new(1, "Ada")).await.unwrap(), 1);
    assert_eq!(sorted_authors(store).await, vec![Author::new(1, "Ada")]);

    let err = store
        .add_author(Author::new(1, "Impostor"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    assert_eq!(sorted_authors(store).await, vec![Author::new(1, "Ada")]);

    let err = store
        .update_author(Author::new(404, "Nobody"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let err = store.delete_author(Author::new(404, "")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(sorted_authors(store).await, vec![Author::new(1, "Ada")]);

    store.add_author(Author::new(2, "Alan")).await.unwrap();
    assert_eq!(
        store
            .update_author(Author::new(2, "Alan Turing"))
            .await
            .unwrap(),
        2
    );
    assert_eq!(
        sorted_authors(store).await,
        vec![Author::new(1, "Ada"), Author::new(2, "Alan Turing")]
    );
}

async fn posts(store: &dyn Storage, profile: Profile) {
    let post = Post::new(100, 1)
        .title("T")
        .content("C")
        .created_at(0)
        .published_at(0);
    assert_eq!(store.add_post(post.clone()).await.unwrap(), 100);

    let listed = post_by_id(store, 100).await;
    assert_eq!(listed.author_id, 1);
    assert_eq!(listed.author_name, "Ada");
    assert_eq!(listed.title, "T");
    assert_eq!(listed.content, "C");
    assert_timestamp_text(&listed.created_at_txt, 0);
    assert_timestamp_text(&listed.published_at_txt, 0);

    let err = store
        .add_post(Post::new(100, 2).title("dup"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    assert_eq!(post_by_id(store, 100).await.title, "T");

    let err = store.update_post(Post::new(404, 1)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let err = store.delete_post(Post::new(404, 1)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(sorted_posts(store).await.len(), 1);

    if profile.enforces_references {
        let err = store.add_post(Post::new(101, 999)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ReferencedEntityMissing);

        let err = store
            .update_post(Post::new(100, 999).title("moved"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ReferencedEntityMissing);

        assert_eq!(sorted_posts(store).await.len(), 1);
        assert_eq!(post_by_id(store, 100).await.title, "T");
    }

    let published = 1_700_000_000_123;
    store.add_post(Post::new(102, 1).title("draft")).await.unwrap();
    store
        .update_post(Post::new(102, 2).title("final").published_at(published))
        .await
        .unwrap();

    let updated = post_by_id(store, 102).await;
    assert_eq!(updated.author_name, "Alan Turing");
    assert_eq!(updated.title, "final");
    assert_timestamp_text(&updated.published_at_txt, published);

    assert_eq!(store.delete_post(Post::new(102, 0)).await.unwrap(), 102);
    let err = store.delete_post(Post::new(102, 0)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    out_of_range_timestamps(store).await;
}

/// Unformattable timestamps are stored and listed with empty text
async fn out_of_range_timestamps(store: &dyn Storage) {
    let post = Post::new(103, 1).created_at(i64::MAX).published_at(i64::MIN);
    store.add_post(post).await.unwrap();

    let listed = post_by_id(store, 103).await;
    assert_eq!(listed.created_at, i64::MAX);
    assert_eq!(listed.created_at_txt, "");
    assert_eq!(listed.published_at, i64::MIN);
    assert_eq!(listed.published_at_txt, "");
    assert_eq!(post_by_id(store, 100).await.created_at_txt, format_millis(0));

    assert_eq!(store.delete_post(Post::new(103, 0)).await.unwrap(), 103);
}

async fn dangling_reference(store: &dyn Storage) {
    assert_eq!(store.delete_author(Author::new(1, "")).await.unwrap(), 1);

    let orphan = post_by_id(store, 100).await;
    assert_eq!(orphan.author_id, 1);
    assert_eq!(orphan.author_name, DANGLING_AUTHOR_NAME);
}

async fn bulk_load_is_idempotent(store: &dyn Storage) {
    store.load_authors(SEED_AUTHORS).await.unwrap();
    store.load_posts(SEED_POSTS).await.unwrap();
    let authors_once = sorted_authors(store).await;
    let posts_once = sorted_posts(store).await;

    store.load_authors(SEED_AUTHORS).await.unwrap();
    store.load_posts(SEED_POSTS).await.unwrap();
    assert_eq!(sorted_authors(store).await, authors_once);
    assert_eq!(sorted_posts(store).await, posts_once);

    let seeded = post_by_id(store, 1).await;
    assert_eq!(seeded.author_name, "Ada Lovelace");
}
