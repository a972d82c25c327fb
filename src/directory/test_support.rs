//! Shared fixtures for directory tests.

use serde_json::{json, Value};

use crate::api::ApiClient;
use crate::cache::{CacheStorage, Cacheable, CachedEntity, MemoryStorage};
use crate::config::ApiConfig;
use crate::error::StoreError;
use wiremock::MockServer;

use super::types::Restaurant;

pub fn api_for(server: &MockServer) -> ApiClient {
  ApiClient::new(&ApiConfig {
    base_url: server.uri(),
    timeout_secs: 5,
  })
  .unwrap()
}

pub fn restaurant(id: i64, cuisine: &str, neighborhood: &str) -> Restaurant {
  serde_json::from_value(json!({
    "id": id,
    "name": format!("Restaurant {}", id),
    "cuisine_type": cuisine,
    "neighborhood": neighborhood,
    "photograph": id.to_string(),
    "latlng": { "lat": 40.7, "lng": -73.9 }
  }))
  .unwrap()
}

pub fn restaurant_with_reviews(id: i64, reviews: Value) -> Restaurant {
  let mut restaurant = restaurant(id, "Pizza", "Brooklyn");
  restaurant.reviews = Some(serde_json::from_value(reviews).unwrap());
  restaurant
}

pub fn stored(storage: &MemoryStorage, id: i64) -> Restaurant {
  storage
    .get_entity::<Restaurant>(id)
    .unwrap()
    .expect("restaurant should be cached")
    .entity
}

/// Memory store that can be told to fail collection reads or all writes.
#[derive(Default)]
pub struct FaultyStorage {
  pub inner: MemoryStorage,
  pub fail_get_all: bool,
  pub fail_writes: bool,
}

impl CacheStorage for FaultyStorage {
  fn get_entity<T: Cacheable>(&self, key: i64) -> Result<Option<CachedEntity<T>>, StoreError> {
    self.inner.get_entity(key)
  }

  fn get_all<T: Cacheable>(&self) -> Result<Vec<T>, StoreError> {
    if self.fail_get_all {
      return Err(StoreError::Poisoned);
    }
    self.inner.get_all()
  }

  fn store_entity<T: Cacheable>(&self, key: i64, entity: &T) -> Result<(), StoreError> {
    if self.fail_writes {
      return Err(StoreError::Poisoned);
    }
    self.inner.store_entity(key, entity)
  }
}
