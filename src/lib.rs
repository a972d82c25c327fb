//! Offline-first restaurant directory.
//!
//! Restaurants and their reviews are read through a local SQLite cache in
//! front of the restaurant service. Reviews written while offline are kept
//! in the cache as unsynced and pushed by [`directory::ReviewSync`].

pub mod api;
pub mod cache;
pub mod config;
pub mod directory;
pub mod error;
pub mod logging;

pub use directory::{Filter, Restaurant, RestaurantDirectory, RestaurantId, Review};
pub use error::{ApiError, DirectoryError, StoreError};
