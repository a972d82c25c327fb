//! Caching implementations for directory types.

use crate::cache::Cacheable;

use super::types::Restaurant;

impl Cacheable for Restaurant {
  fn cache_key(&self) -> i64 {
    self.id.0
  }

  fn entity_type() -> &'static str {
    "restaurants"
  }
}
