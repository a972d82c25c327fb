//! Restaurant directory: cache-aside reads and the review sync queue.

mod cache;
mod repository;
mod sync;
mod types;

#[cfg(test)]
mod test_support;

pub use repository::RestaurantDirectory;
pub use sync::{ReviewSync, SyncReport};
pub use types::{format_review_date, Filter, LatLng, Restaurant, RestaurantId, Review};
