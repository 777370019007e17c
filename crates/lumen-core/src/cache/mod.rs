//! Two-tier result cache.
//!
//! A bounded in-process LRU tier sits in front of an optional durable
//! [`BlobStore`]. Concurrent misses on one key share a single durable read.
//! Durable-tier failures are logged and absorbed; callers only ever see a
//! hit or a miss.

mod key;
mod shape_cache;
pub mod store;

pub use key::{blob_path, hash_key, key_from_blob_path, lemmatize, normalize_key};
pub use shape_cache::{CacheStats, ShapeCache};
pub use store::BlobStore;
