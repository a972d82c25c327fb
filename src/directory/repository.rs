//! Cache-aside access to restaurants and their reviews.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::api::ApiClient;
use crate::cache::{CacheLayer, CacheStorage, Cacheable};
use crate::error::DirectoryError;

use super::sync::ReviewSync;
use super::types::{Filter, Restaurant, RestaurantId, Review};

/// Restaurant directory backed by a local store and the remote service.
///
/// Reads are served from the local store when possible; on a miss the
/// service is queried and the store populated. Local review changes go
/// through [`RestaurantDirectory::update_restaurant`], which persists them
/// and runs a sync sweep.
pub struct RestaurantDirectory<S: CacheStorage> {
  cache: CacheLayer<S>,
  api: ApiClient,
  sync: ReviewSync<S>,
}

impl<S: CacheStorage> RestaurantDirectory<S> {
  pub fn new(storage: Arc<S>, api: ApiClient) -> Self {
    Self {
      cache: CacheLayer::from_shared(Arc::clone(&storage)),
      sync: ReviewSync::new(storage, api.clone()),
      api,
    }
  }

  /// The review sync queue sharing this directory's store and client.
  pub fn review_sync(&self) -> &ReviewSync<S> {
    &self.sync
  }

  /// All restaurants, from the store if it has any, otherwise from the
  /// service (populating the store). Network failures are returned as is.
  pub async fn restaurants(&self) -> Result<Vec<Restaurant>, DirectoryError> {
    let result = self
      .cache
      .fetch_all(|| {
        let api = self.api.clone();
        async move { api.fetch_restaurants().await.map_err(DirectoryError::from) }
      })
      .await?;

    debug!(
      count = result.data.len(),
      cached = result.is_cached(),
      "Loaded restaurants"
    );
    Ok(result.data)
  }

  /// A single restaurant. `id` is normalized before any lookup.
  pub async fn restaurant_by_id(&self, id: &str) -> Result<Restaurant, DirectoryError> {
    let id = RestaurantId::parse(id)?;
    self.load_restaurant(id).await
  }

  async fn load_restaurant(&self, id: RestaurantId) -> Result<Restaurant, DirectoryError> {
    let result = self
      .cache
      .fetch_one(id.0, || {
        let api = self.api.clone();
        async move {
          api
            .fetch_restaurant(id)
            .await
            .map_err(|source| DirectoryError::RestaurantNotFound { id, source })
        }
      })
      .await?;

    debug!(
      restaurant_id = %id,
      cached = result.is_cached(),
      cached_at = ?result.cached_at,
      "Loaded restaurant"
    );
    Ok(result.data)
  }

  pub async fn restaurants_by_cuisine(
    &self,
    cuisine: impl Into<Filter>,
  ) -> Result<Vec<Restaurant>, DirectoryError> {
    self
      .restaurants_by_cuisine_and_neighborhood(cuisine, Filter::All)
      .await
  }

  pub async fn restaurants_by_neighborhood(
    &self,
    neighborhood: impl Into<Filter>,
  ) -> Result<Vec<Restaurant>, DirectoryError> {
    self
      .restaurants_by_cuisine_and_neighborhood(Filter::All, neighborhood)
      .await
  }

  /// Restaurants matching both filters; `"all"` disables a filter.
  pub async fn restaurants_by_cuisine_and_neighborhood(
    &self,
    cuisine: impl Into<Filter>,
    neighborhood: impl Into<Filter>,
  ) -> Result<Vec<Restaurant>, DirectoryError> {
    let (cuisine, neighborhood) = (cuisine.into(), neighborhood.into());
    let mut restaurants = self.restaurants().await?;

    // Cuisine first, then neighborhood
    restaurants.retain(|r| cuisine.matches(r.cuisine_type.as_deref()));
    restaurants.retain(|r| neighborhood.matches(r.neighborhood.as_deref()));

    Ok(restaurants)
  }

  /// Distinct neighborhoods in order of first appearance. Records without
  /// one are skipped.
  pub async fn neighborhoods(&self) -> Result<Vec<String>, DirectoryError> {
    let restaurants = self.restaurants().await?;
    Ok(distinct(
      restaurants.iter().filter_map(|r| r.neighborhood.as_deref()),
    ))
  }

  /// Distinct cuisines in order of first appearance.
  pub async fn cuisines(&self) -> Result<Vec<String>, DirectoryError> {
    let restaurants = self.restaurants().await?;
    Ok(distinct(
      restaurants.iter().filter_map(|r| r.cuisine_type.as_deref()),
    ))
  }

  /// Reviews of one restaurant.
  ///
  /// A review list already attached to the cached restaurant (even an empty
  /// one) is returned as is. Otherwise the reviews are fetched, converted to
  /// their display shape, attached to the restaurant and persisted. A
  /// restaurant that is not cached yet is read through first.
  pub async fn reviews_by_id(&self, id: &str) -> Result<Vec<Review>, DirectoryError> {
    let id = RestaurantId::parse(id)?;
    self.load_reviews(id).await
  }

  async fn load_reviews(&self, id: RestaurantId) -> Result<Vec<Review>, DirectoryError> {
    let mut restaurant = match self.cache.storage().get_entity::<Restaurant>(id.0)? {
      Some(cached) => cached.entity,
      None => self.load_restaurant(id).await?,
    };

    if let Some(reviews) = &restaurant.reviews {
      debug!(restaurant_id = %id, count = reviews.len(), "Serving reviews from cache");
      return Ok(reviews.clone());
    }

    let reviews: Vec<Review> = self
      .api
      .fetch_reviews(id)
      .await
      .map_err(|source| DirectoryError::ReviewsUnavailable { id, source })?
      .into_iter()
      .map(Review::from)
      .collect();

    restaurant.reviews = Some(reviews.clone());
    self.cache.storage().store_entity(id.0, &restaurant)?;
    info!(restaurant_id = %id, count = reviews.len(), "Cached reviews");

    Ok(reviews)
  }

  /// Persist a locally modified restaurant, then sweep unsynced reviews.
  ///
  /// Returns `true` once the sweep has run. Push failures inside the sweep
  /// are not errors; `false` means the sweep could not read the store.
  pub async fn update_restaurant(&self, restaurant: Restaurant) -> Result<bool, DirectoryError> {
    self
      .cache
      .storage()
      .store_entity(restaurant.cache_key(), &restaurant)?;

    match self.sync.sync_unsynced().await {
      Ok(_) => Ok(true),
      Err(e) => {
        warn!(error = %e, "Review sync skipped");
        Ok(false)
      }
    }
  }

  /// Append a locally written review to a restaurant and run the sweep.
  ///
  /// Remote reviews are cached first so the new one lands after them. When
  /// they cannot be fetched (offline) the review is still stored, attached to
  /// the cached restaurant, and waits for a later sweep.
  pub async fn add_review(&self, id: &str, review: Review) -> Result<bool, DirectoryError> {
    let id = RestaurantId::parse(id)?;

    match self.load_reviews(id).await {
      Ok(_) => {}
      Err(DirectoryError::ReviewsUnavailable { source, .. }) => {
        warn!(
          restaurant_id = %id,
          error = %source,
          "Reviews unavailable, storing review locally"
        );
      }
      Err(e) => return Err(e),
    }

    let mut restaurant = self.load_restaurant(id).await?;
    restaurant.reviews.get_or_insert_with(Vec::new).push(review);
    self.update_restaurant(restaurant).await
  }
}

impl<S: CacheStorage> Clone for RestaurantDirectory<S> {
  fn clone(&self) -> Self {
    Self {
      cache: self.cache.clone(),
      api: self.api.clone(),
      sync: self.sync.clone(),
    }
  }
}

/// Keep the first occurrence of each value, in input order.
fn distinct<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
  let mut seen = HashSet::new();
  values
    .filter(|v| seen.insert(*v))
    .map(String::from)
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStorage;
  use crate::directory::test_support::{
    api_for, restaurant, restaurant_with_reviews, stored, FaultyStorage,
  };
  use serde_json::json;
  use wiremock::matchers::{method, path, query_param};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  async fn setup(
    server: &MockServer,
    restaurants: &[Restaurant],
  ) -> (Arc<MemoryStorage>, RestaurantDirectory<MemoryStorage>) {
    let storage = Arc::new(MemoryStorage::new());
    for restaurant in restaurants {
      storage.store_entity(restaurant.id.0, restaurant).unwrap();
    }
    let directory = RestaurantDirectory::new(Arc::clone(&storage), api_for(server));
    (storage, directory)
  }

  async fn mock_get(server: &MockServer, route: &str, body: serde_json::Value, times: u64) {
    Mock::given(method("GET"))
      .and(path(route))
      .respond_with(ResponseTemplate::new(200).set_body_json(body))
      .expect(times)
      .mount(server)
      .await;
  }

  fn ids(restaurants: &[Restaurant]) -> Vec<i64> {
    restaurants.iter().map(|r| r.id.0).collect()
  }

  #[tokio::test]
  async fn test_cold_fetch_all_populates_store() {
    let server = MockServer::start().await;
    let seeds = [
      (1, "Italian", "Downtown"),
      (2, "Thai", "Uptown"),
      (3, "Greek", "Midtown"),
    ];
    let records: Vec<_> = seeds
      .into_iter()
      .map(|(id, cuisine, neighborhood)| {
        json!({
          "id": id, "name": format!("R{}", id), "cuisine_type": cuisine,
          "neighborhood": neighborhood, "photograph": id.to_string()
        })
      })
      .collect();
    mock_get(&server, "/restaurants", json!(records), 1).await;
    for record in &records {
      let route = format!("/restaurants/{}", record["id"]);
      mock_get(&server, &route, record.clone(), 0).await;
    }

    let (storage, directory) = setup(&server, &[]).await;

    let all = directory.restaurants().await.unwrap();
    assert_eq!(ids(&all), vec![1, 2, 3]);

    for (restaurant, record) in all.iter().zip(&records) {
      let key = restaurant.id.to_string();
      let cached = serde_json::to_value(stored(&storage, restaurant.id.0)).unwrap();
      assert_eq!(&cached, record);
      assert_eq!(&directory.restaurant_by_id(&key).await.unwrap(), restaurant);
    }
  }

  #[tokio::test]
  async fn test_cold_fetch_all_keeps_embedded_reviews() {
    let server = MockServer::start().await;
    let record = json!({
      "id": 1,
      "name": "X",
      "reviews": [
        { "id": 7, "name": "a", "rating": 4, "comments": "c", "createdAt": 1504095567183i64 }
      ]
    });
    mock_get(&server, "/restaurants", json!([record.clone()]), 1).await;
    mock_get(&server, "/reviews/", json!([]), 0).await;

    let (storage, directory) = setup(&server, &[]).await;
    directory.restaurants().await.unwrap();

    assert_eq!(serde_json::to_value(stored(&storage, 1)).unwrap(), record);
    assert!(directory.neighborhoods().await.unwrap().is_empty());
    assert_eq!(directory.reviews_by_id("1").await.unwrap()[0].name, "a");
  }

  #[tokio::test]
  async fn test_fetch_all_serves_cache() {
    let server = MockServer::start().await;
    mock_get(&server, "/restaurants", json!([]), 0).await;

    let seeded = [restaurant(2, "Thai", "Uptown"), restaurant(1, "Pizza", "Brooklyn")];
    let (_, directory) = setup(&server, &seeded).await;

    let all = directory.restaurants().await.unwrap();
    assert_eq!(ids(&all), vec![1, 2]);
  }

  #[tokio::test]
  async fn test_fetch_all_network_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/restaurants"))
      .respond_with(ResponseTemplate::new(503))
      .mount(&server)
      .await;

    let (storage, directory) = setup(&server, &[]).await;

    let err = directory.restaurants().await.unwrap_err();
    assert!(matches!(err, DirectoryError::Network(_)));
    assert!(storage.get_all::<Restaurant>().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_fetch_by_id_hits_network_once() {
    let server = MockServer::start().await;
    mock_get(
      &server,
      "/restaurants/5",
      json!({ "id": 5, "name": "Five", "cuisine_type": "Mexican", "neighborhood": "Queens" }),
      1,
    )
    .await;

    let (_, directory) = setup(&server, &[]).await;

    let first = directory.restaurant_by_id("5").await.unwrap();
    let second = directory.restaurant_by_id(" 5").await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.cuisine_type.as_deref(), Some("Mexican"));
  }

  #[tokio::test]
  async fn test_fetch_by_id_missing_restaurant() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/restaurants/42"))
      .respond_with(ResponseTemplate::new(404))
      .mount(&server)
      .await;

    let (storage, directory) = setup(&server, &[]).await;

    let err = directory.restaurant_by_id("42").await.unwrap_err();
    assert_eq!(err.to_string(), "Restaurant does not exist");
    assert!(matches!(
      err,
      DirectoryError::RestaurantNotFound { id: RestaurantId(42), .. }
    ));
    assert!(storage.get_entity::<Restaurant>(42).unwrap().is_none());
  }

  #[tokio::test]
  async fn test_invalid_id_fails_before_any_request() {
    let server = MockServer::start().await;
    let (_, directory) = setup(&server, &[]).await;

    let err = directory.restaurant_by_id("abc").await.unwrap_err();
    assert!(matches!(err, DirectoryError::InvalidId(_)));
    let err = directory.reviews_by_id("").await.unwrap_err();
    assert!(matches!(err, DirectoryError::InvalidId(_)));

    assert!(server.received_requests().await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_filters() {
    let server = MockServer::start().await;
    let seeded = [
      restaurant(1, "Asian", "Manhattan"),
      restaurant(2, "Pizza", "Brooklyn"),
      restaurant(3, "Asian", "Brooklyn"),
      restaurant(4, "Pizza", "Manhattan"),
    ];
    let (_, directory) = setup(&server, &seeded).await;

    let asian = directory.restaurants_by_cuisine("Asian").await.unwrap();
    assert_eq!(ids(&asian), vec![1, 3]);

    let all = directory.restaurants_by_cuisine("all").await.unwrap();
    assert_eq!(ids(&all), vec![1, 2, 3, 4]);

    let brooklyn = directory
      .restaurants_by_neighborhood("Brooklyn")
      .await
      .unwrap();
    assert_eq!(ids(&brooklyn), vec![2, 3]);

    let both = directory
      .restaurants_by_cuisine_and_neighborhood("Pizza", "Manhattan")
      .await
      .unwrap();
    assert_eq!(ids(&both), vec![4]);

    let none = directory
      .restaurants_by_cuisine_and_neighborhood("Greek", "all")
      .await
      .unwrap();
    assert!(none.is_empty());

    assert!(server.received_requests().await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_distinct_lists_keep_first_occurrence_order() {
    let server = MockServer::start().await;
    let seeded = [
      restaurant(1, "Pizza", "B"),
      restaurant(2, "Asian", "A"),
      restaurant(3, "Pizza", "B"),
      restaurant(4, "Mexican", "C"),
      restaurant(5, "Asian", "A"),
    ];
    let (_, directory) = setup(&server, &seeded).await;

    assert_eq!(directory.neighborhoods().await.unwrap(), vec!["B", "A", "C"]);
    assert_eq!(
      directory.cuisines().await.unwrap(),
      vec!["Pizza", "Asian", "Mexican"]
    );
  }

  #[tokio::test]
  async fn test_reviews_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/reviews/"))
      .and(query_param("restaurant_id", "1"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!([
        { "id": 1, "restaurant_id": 1, "name": "Steve", "rating": 4,
          "comments": "Good", "createdAt": 1504095567183i64 },
        { "id": 2, "restaurant_id": 1, "name": "Morgan", "rating": 2,
          "comments": "Meh", "createdAt": 1504095567183i64 }
      ])))
      .expect(1)
      .mount(&server)
      .await;

    let (storage, directory) = setup(&server, &[restaurant(1, "Asian", "Manhattan")]).await;

    let first = directory.reviews_by_id("1").await.unwrap();
    assert_eq!(first.len(), 2);
    assert_eq!(first[0].date.as_deref(), Some("August 30, 2017"));
    assert!(first.iter().all(|r| r.synced.is_none()));

    let cached = stored(&storage, 1);
    assert_eq!(cached.reviews.as_ref(), Some(&first));
    assert_eq!(cached.name.as_deref(), Some("Restaurant 1"));

    let second = directory.reviews_by_id("1").await.unwrap();
    assert_eq!(second, first);
  }

  #[tokio::test]
  async fn test_empty_review_list_counts_as_cached() {
    let server = MockServer::start().await;
    mock_get(&server, "/reviews/", json!([]), 0).await;

    let (_, directory) = setup(&server, &[restaurant_with_reviews(7, json!([]))]).await;

    assert!(directory.reviews_by_id("7").await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_reviews_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/reviews/"))
      .respond_with(ResponseTemplate::new(500))
      .mount(&server)
      .await;

    let original = restaurant(3, "Pizza", "Brooklyn");
    let (storage, directory) = setup(&server, &[original.clone()]).await;

    let err = directory.reviews_by_id("3").await.unwrap_err();
    assert_eq!(err.to_string(), "Failed to fetch reviews");
    assert!(matches!(err, DirectoryError::ReviewsUnavailable { .. }));
    assert_eq!(stored(&storage, 3), original);
  }

  #[tokio::test]
  async fn test_reviews_read_through_uncached_restaurant() {
    let server = MockServer::start().await;
    mock_get(
      &server,
      "/restaurants/8",
      json!({ "id": 8, "name": "Eight", "cuisine_type": "Asian", "neighborhood": "Queens" }),
      1,
    )
    .await;
    mock_get(
      &server,
      "/reviews/",
      json!([{ "name": "A", "rating": 5, "comments": "c", "createdAt": 1504095567183i64 }]),
      1,
    )
    .await;

    let (storage, directory) = setup(&server, &[]).await;

    let reviews = directory.reviews_by_id("8").await.unwrap();
    assert_eq!(reviews.len(), 1);

    let cached = stored(&storage, 8);
    assert_eq!(cached.name.as_deref(), Some("Eight"));
    assert_eq!(cached.reviews.map(|r| r.len()), Some(1));
  }

  #[tokio::test]
  async fn test_update_restaurant_persists_and_syncs() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/reviews/"))
      .respond_with(ResponseTemplate::new(201).set_body_json(json!({
        "id": 9, "restaurant_id": 2, "name": "Ann", "rating": 5, "comments": "Great"
      })))
      .expect(1)
      .mount(&server)
      .await;

    let (storage, directory) = setup(&server, &[restaurant_with_reviews(2, json!([]))]).await;

    let mut restaurant = stored(&storage, 2);
    restaurant
      .reviews
      .get_or_insert_with(Vec::new)
      .push(Review::pending("Ann", 5, "Great"));

    assert!(directory.update_restaurant(restaurant).await.unwrap());

    let reviews = stored(&storage, 2).reviews.unwrap();
    assert_eq!(reviews.len(), 1);
    assert_eq!(reviews[0].synced, Some(true));
  }

  #[tokio::test]
  async fn test_update_restaurant_keeps_review_when_offline() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/reviews/"))
      .respond_with(ResponseTemplate::new(502))
      .expect(1)
      .mount(&server)
      .await;

    let (storage, directory) = setup(&server, &[]).await;

    let mut restaurant = restaurant_with_reviews(3, json!([]));
    restaurant
      .reviews
      .get_or_insert_with(Vec::new)
      .push(Review::pending("Bo", 1, "Cold"));

    assert!(directory.update_restaurant(restaurant).await.unwrap());

    let reviews = stored(&storage, 3).reviews.unwrap();
    assert_eq!(reviews[0].synced, Some(false));
  }

  #[tokio::test]
  async fn test_reviews_store_failure_is_store_error() {
    let server = MockServer::start().await;
    mock_get(
      &server,
      "/reviews/",
      json!([{ "name": "A", "rating": 5, "comments": "c" }]),
      1,
    )
    .await;

    let storage = FaultyStorage {
      fail_writes: true,
      ..Default::default()
    };
    storage
      .inner
      .store_entity(3, &restaurant(3, "Pizza", "Brooklyn"))
      .unwrap();
    let directory = RestaurantDirectory::new(Arc::new(storage), api_for(&server));

    let err = directory.reviews_by_id("3").await.unwrap_err();
    assert!(matches!(err, DirectoryError::Store(_)));
    assert_ne!(err.to_string(), "Failed to fetch reviews");
  }

  #[tokio::test]
  async fn test_update_restaurant_reports_unreadable_store() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/reviews/"))
      .respond_with(ResponseTemplate::new(201))
      .expect(0)
      .mount(&server)
      .await;

    let storage = Arc::new(FaultyStorage {
      fail_get_all: true,
      ..Default::default()
    });
    let directory = RestaurantDirectory::new(Arc::clone(&storage), api_for(&server));

    let mut restaurant = restaurant_with_reviews(5, json!([]));
    restaurant
      .reviews
      .get_or_insert_with(Vec::new)
      .push(Review::pending("Cy", 4, "Nice"));

    assert!(!directory.update_restaurant(restaurant).await.unwrap());

    let saved = storage.inner.get_entity::<Restaurant>(5).unwrap().unwrap();
    assert_eq!(saved.entity.pending_reviews().count(), 1);
  }

  #[tokio::test]
  async fn test_add_review_offline_keeps_review_locally() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/reviews/"))
      .respond_with(ResponseTemplate::new(503))
      .expect(1)
      .mount(&server)
      .await;
    Mock::given(method("POST"))
      .and(path("/reviews/"))
      .respond_with(ResponseTemplate::new(503))
      .expect(1)
      .mount(&server)
      .await;

    let (storage, directory) = setup(&server, &[restaurant(4, "Thai", "Queens")]).await;

    let swept = directory
      .add_review(" 4", Review::pending("Di", 3, "Okay"))
      .await
      .unwrap();
    assert!(swept);

    let reviews = stored(&storage, 4).reviews.unwrap();
    assert_eq!(reviews.len(), 1);
    assert_eq!(reviews[0].name, "Di");
    assert!(reviews[0].is_pending());
  }

  #[tokio::test]
  async fn test_add_review_appends_after_remote_reviews() {
    let server = MockServer::start().await;
    mock_get(
      &server,
      "/reviews/",
      json!([{ "name": "Old", "rating": 5, "comments": "c", "createdAt": 1504095567183i64 }]),
      1,
    )
    .await;
    Mock::given(method("POST"))
      .and(path("/reviews/"))
      .respond_with(ResponseTemplate::new(201).set_body_json(json!({
        "id": 2, "name": "New", "rating": 4, "comments": "d"
      })))
      .expect(1)
      .mount(&server)
      .await;

    let (storage, directory) = setup(&server, &[restaurant(6, "Thai", "Queens")]).await;

    assert!(directory
      .add_review("6", Review::pending("New", 4, "d"))
      .await
      .unwrap());

    let reviews = stored(&storage, 6).reviews.unwrap();
    let names: Vec<_> = reviews.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["Old", "New"]);
    assert_eq!(reviews[0].synced, None);
    assert_eq!(reviews[1].synced, Some(true));
  }

  #[test]
  fn test_distinct() {
    let values = ["b", "a", "b", "c", "a"];
    assert_eq!(distinct(values.into_iter()), vec!["b", "a", "c"]);
  }
}
