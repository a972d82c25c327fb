//! Generic cache-aside layer over a local keyed record store.
//!
//! This module is agnostic of the restaurant domain:
//! - Stores whole records as JSON under an integer key per collection
//! - Serves a collection or a single record from the store when present
//! - Fetches from the network and populates the store on a miss

mod layer;
mod storage;
mod traits;

pub use layer::CacheLayer;
pub use storage::{CacheStorage, CachedEntity, MemoryStorage, SqliteStorage};
pub use traits::{CacheResult, CacheSource, Cacheable};
