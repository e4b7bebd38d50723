pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod seed;
pub mod storage;

pub use config::{Backend, ConfigStore, Configurable, StorageConfig};
pub use error::{ErrorKind, StorageError, StorageResult};
pub use model::{Author, Post, PostRecord, format_millis};
pub use storage::Storage;
