//! Cache layer that orchestrates cache-aside lookups with network fetching.

use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::storage::CacheStorage;
use super::traits::{CacheResult, Cacheable};
use crate::error::StoreError;

/// Cache layer that manages caching logic and network fetching.
///
/// Cached records never go stale: once a key is present it is served from
/// the store until something overwrites it.
pub struct CacheLayer<S: CacheStorage> {
  storage: Arc<S>,
}

impl<S: CacheStorage> CacheLayer<S> {
  /// Create a new cache layer with the given storage backend.
  pub fn new(storage: S) -> Self {
    Self::from_shared(Arc::new(storage))
  }

  /// Create a cache layer over a store that is shared with other components.
  pub fn from_shared(storage: Arc<S>) -> Self {
    Self { storage }
  }

  /// The underlying store.
  pub fn storage(&self) -> &Arc<S> {
    &self.storage
  }

  /// Fetch a whole collection with a cache-first strategy.
  ///
  /// 1. Read the collection - if it has any records, return them
  /// 2. If empty, fetch from network (failures propagate unchanged)
  /// 3. Write each fetched record under its own key
  ///
  /// Population is best-effort per record: a failed write is logged and the
  /// remaining records are still written.
  pub async fn fetch_all<T, E, F, Fut>(&self, fetcher: F) -> Result<CacheResult<Vec<T>>, E>
  where
    T: Cacheable,
    E: From<StoreError>,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Vec<T>, E>>,
  {
    let cached = self.storage.get_all::<T>()?;
    if !cached.is_empty() {
      debug!(
        collection = T::entity_type(),
        count = cached.len(),
        "Serving collection from cache"
      );
      return Ok(CacheResult::from_cache(cached, None));
    }

    let data = fetcher().await?;
    info!(
      collection = T::entity_type(),
      count = data.len(),
      "Populating collection from network"
    );

    for entity in &data {
      if let Err(e) = self.storage.store_entity(entity.cache_key(), entity) {
        warn!(
          collection = T::entity_type(),
          key = entity.cache_key(),
          error = %e,
          "Failed to cache record"
        );
      }
    }

    Ok(CacheResult::from_network(data))
  }

  /// Fetch a single record with caching.
  ///
  /// On a miss the fetched record is written under `key`, which may differ
  /// from the record's own key if the caller normalized it.
  pub async fn fetch_one<T, E, F, Fut>(&self, key: i64, fetcher: F) -> Result<CacheResult<T>, E>
  where
    T: Cacheable,
    E: From<StoreError>,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
  {
    if let Some(cached) = self.storage.get_entity::<T>(key)? {
      debug!(collection = T::entity_type(), key, "Cache hit");
      return Ok(CacheResult::from_cache(cached.entity, cached.cached_at));
    }

    debug!(collection = T::entity_type(), key, "Cache miss");
    let data = fetcher().await?;
    self.storage.store_entity(key, &data)?;
    Ok(CacheResult::from_network(data))
  }
}

impl<S: CacheStorage> Clone for CacheLayer<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
    }
  }
}
