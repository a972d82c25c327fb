//! Write-back queue for reviews written while offline.
//!
//! Reviews are appended to the cached restaurant with `synced: Some(false)`.
//! A sweep pushes every such review to the service and flips the flag once
//! the service has acknowledged it. Failed pushes stay unsynced until the
//! next sweep.

use futures::future::join_all;
use std::ops::AddAssign;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::api::{ApiClient, ApiReview};
use crate::cache::CacheStorage;
use crate::error::{ApiError, StoreError};

use super::types::{Restaurant, RestaurantId, Review};

/// Outcome of one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
  /// Reviews acknowledged by the service
  pub pushed: usize,
  /// Reviews whose push failed and remain unsynced
  pub failed: usize,
  /// Restaurants written back to the local store
  pub restaurants_updated: usize,
}

impl AddAssign for SyncReport {
  fn add_assign(&mut self, other: Self) {
    self.pushed += other.pushed;
    self.failed += other.failed;
    self.restaurants_updated += other.restaurants_updated;
  }
}

/// Pushes unsynced reviews from the local store to the service.
pub struct ReviewSync<S: CacheStorage> {
  storage: Arc<S>,
  api: ApiClient,
}

impl<S: CacheStorage> ReviewSync<S> {
  pub fn new(storage: Arc<S>, api: ApiClient) -> Self {
    Self { storage, api }
  }

  /// Send one review to the service. No retry at this level.
  pub async fn push_review(
    &self,
    id: RestaurantId,
    review: &Review,
  ) -> Result<ApiReview, ApiError> {
    self.api.post_review(id, review).await
  }

  /// Push every cached review marked unsynced.
  ///
  /// All pushes are issued concurrently. Flag flips are collected per
  /// restaurant and each restaurant with at least one acknowledged review is
  /// written back once, after all of its pushes have settled. Push failures
  /// are counted in the report, not returned.
  pub async fn sync_unsynced(&self) -> Result<SyncReport, StoreError> {
    let restaurants = self.storage.get_all::<Restaurant>()?;

    let outcomes = join_all(
      restaurants
        .into_iter()
        .filter(|r| r.pending_reviews().next().is_some())
        .map(|r| self.sync_restaurant(r)),
    )
    .await;

    let mut report = SyncReport::default();
    for outcome in outcomes {
      report += outcome;
    }

    if report.pushed + report.failed > 0 {
      info!(
        pushed = report.pushed,
        failed = report.failed,
        restaurants_updated = report.restaurants_updated,
        "Review sync finished"
      );
    } else {
      debug!("No unsynced reviews");
    }

    Ok(report)
  }

  async fn sync_restaurant(&self, mut restaurant: Restaurant) -> SyncReport {
    let id = restaurant.id;
    let mut report = SyncReport::default();

    let Some(reviews) = restaurant.reviews.as_mut() else {
      return report;
    };

    let pending: Vec<(usize, Review)> = reviews
      .iter()
      .enumerate()
      .filter(|(_, review)| review.is_pending())
      .map(|(index, review)| (index, review.clone()))
      .collect();

    let results = join_all(pending.iter().map(|(_, review)| self.push_review(id, review))).await;

    for ((index, review), result) in pending.iter().zip(results) {
      match result {
        Ok(_) => {
          reviews[*index].mark_synced();
          report.pushed += 1;
        }
        Err(e) => {
          debug!(
            restaurant_id = %id,
            reviewer = %review.name,
            error = %e,
            "Review push failed, will retry on next sync"
          );
          report.failed += 1;
        }
      }
    }

    if report.pushed > 0 {
      match self.storage.store_entity(id.0, &restaurant) {
        Ok(()) => report.restaurants_updated = 1,
        Err(e) => warn!(
          restaurant_id = %id,
          error = %e,
          "Failed to persist synced reviews"
        ),
      }
    }

    report
  }
}

impl<S: CacheStorage> Clone for ReviewSync<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      api: self.api.clone(),
    }
  }
}
