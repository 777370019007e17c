//! Durable blob-store backends for the result cache.

mod fs;
mod memory;
mod sqlite;
mod traits;

pub use fs::FsBlobStore;
pub use memory::MemoryBlobStore;
pub use sqlite::SqliteBlobStore;
pub use traits::BlobStore;
