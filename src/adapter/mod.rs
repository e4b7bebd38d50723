//! Storage adapters.
//!
//! | backend  | reference check | dangling author | bulk load            |
//! |----------|-----------------|-----------------|----------------------|
//! | memory   | yes             | ""              | upsert by id         |
//! | postgres | yes (routine)   | "" (view)       | upsert by id         |
//! | mongo    | no              | "" (pipeline)   | clear, then insert   |
//! | redis    | no              | "" (lookup)     | upsert by id         |

pub mod memory;
pub mod mongo;
pub mod postgres;
pub mod redis;

#[cfg(test)]
pub(crate) mod contract;

use std::sync::Arc;

use tracing::info;

use crate::core::config::{Backend, StorageConfig};
use crate::core::error::StorageResult;
use crate::core::storage::Storage;

pub use memory::MemoryStore;
pub use mongo::MongoStore;
pub use postgres::PostgresStore;
pub use self::redis::RedisStore;

/// Build the adapter selected by `config.backend`.
pub async fn connect(config: &StorageConfig) -> StorageResult<Arc<dyn Storage>> {
    info!("Connecting storage backend: {:?}", config.backend);

    let storage: Arc<dyn Storage> = match config.backend {
        Backend::Memory => Arc::new(MemoryStore::new()),
        Backend::Postgres => Arc::new(PostgresStore::connect(&config.postgres, config.timeout()).await?),
        Backend::Mongo => Arc::new(MongoStore::connect(&config.mongo, config.timeout()).await?),
        Backend::Redis => Arc::new(RedisStore::connect(&config.redis, config.timeout()).await?),
    };

    Ok(storage)
}
