//! Storage layer: versioned record codec, schema migrations, and the local
//! key-value cache that owns the authoritative copy of every record.

mod error;
pub use error::StoreError;

pub mod cache;
pub mod codec;
pub mod file;
pub mod kv;
pub mod migrate;

pub use cache::LocalCacheStore;
pub use codec::{Codec, RawRecord};
pub use file::FileStore;
pub use kv::{KeyValueStore, MemoryStore};
pub use migrate::{MigrationRegistry, MigrationStep};
