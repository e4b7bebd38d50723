// Convenience re-exports: use newsdesk::prelude::*;
pub use crate::adapter::{MemoryStore, MongoStore, PostgresStore, RedisStore, connect};

pub use crate::core::{Author, ErrorKind, Post, Storage, StorageError, StorageResult};
