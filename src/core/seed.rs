//! Bulk loading of seed data.
//!
//! Seed files are JSON arrays of authors or posts. Parsing is shared; how a
//! parsed batch replaces existing records is up to each adapter.

use std::borrow::Cow;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use rust_embed::RustEmbed;
use tracing::info;

use crate::core::config::SeedConfig;
use crate::core::error::StorageResult;
use crate::core::model::{Author, Post};
use crate::core::storage::Storage;

#[derive(RustEmbed)]
#[folder = "seed/"]
struct EmbeddedSeed;

pub const AUTHORS_FILE: &str = "authors.json";
pub const POSTS_FILE: &str = "posts.json";

pub fn parse_authors(source: &[u8]) -> StorageResult<Vec<Author>> {
    Ok(serde_json::from_slice(source)?)
}

/// Derived fields in the source are ignored.
pub fn parse_posts(source: &[u8]) -> StorageResult<Vec<Post>> {
    Ok(serde_json::from_slice(source)?)
}

// ============================================================================
// Seed Source
// ============================================================================

/// Where a batch of seed data comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeedSource {
    /// File compiled into the binary from `seed/`
    Embedded(&'static str),
    File(PathBuf),
}

impl SeedSource {
    fn or_embedded(path: Option<&PathBuf>, name: &'static str) -> Self {
        match path {
            Some(path) => SeedSource::File(path.clone()),
            None => SeedSource::Embedded(name),
        }
    }

    pub async fn read(&self) -> Result<Cow<'static, [u8]>> {
        match self {
            SeedSource::Embedded(name) => EmbeddedSeed::get(name)
                .map(|file| file.data)
                .ok_or_else(|| anyhow!("No embedded seed file named '{}'", name)),
            SeedSource::File(path) => {
                let data = tokio::fs::read(path)
                    .await
                    .with_context(|| format!("Failed to read seed file '{}'", path.display()))?;
                Ok(Cow::Owned(data))
            }
        }
    }
}

impl std::fmt::Display for SeedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SeedSource::Embedded(name) => write!(f, "embedded:{}", name),
            SeedSource::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Load authors, then posts, into `storage`.
pub async fn run(storage: &dyn Storage, config: &SeedConfig) -> Result<()> {
    let authors = SeedSource::or_embedded(config.authors.as_ref(), AUTHORS_FILE);
    let posts = SeedSource::or_embedded(config.posts.as_ref(), POSTS_FILE);

    info!("Seeding {} from {}", storage.describe(), authors);
    let data = authors.read().await?;
    storage
        .load_authors(&data)
        .await
        .with_context(|| format!("Failed to load authors from {}", authors))?;

    info!("Seeding {} from {}", storage.describe(), posts);
    let data = posts.read().await?;
    storage
        .load_posts(&data)
        .await
        .with_context(|| format!("Failed to load posts from {}", posts))?;

    Ok(())
}
