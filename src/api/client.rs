use reqwest::Url;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use crate::config::ApiConfig;
use crate::directory::{Restaurant, RestaurantId, Review};
use crate::error::ApiError;

use super::types::{ApiReview, ReviewSubmission};

/// HTTP client for the restaurant service
#[derive(Clone)]
pub struct ApiClient {
  http: reqwest::Client,
  base_url: Url,
}

impl ApiClient {
  pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
    // Relative joins need the base to end in a slash
    let mut base = config.base_url.trim().to_string();
    if !base.ends_with('/') {
      base.push('/');
    }
    let base_url = Url::parse(&base)?;

    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .build()?;

    Ok(Self { http, base_url })
  }

  fn url(&self, path: &str) -> Result<Url, ApiError> {
    Ok(self.base_url.join(path)?)
  }

  async fn send_json<T: DeserializeOwned>(
    &self,
    req: reqwest::RequestBuilder,
  ) -> Result<T, ApiError> {
    let response = req.send().await?;
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
      return Err(ApiError::Status { status, body });
    }
    Ok(serde_json::from_str(&body)?)
  }

  /// Get all restaurants
  pub async fn fetch_restaurants(&self) -> Result<Vec<Restaurant>, ApiError> {
    let url = self.url("restaurants")?;
    debug!(%url, "Fetching restaurants");
    self.send_json(self.http.get(url)).await
  }

  /// Get a single restaurant by id
  pub async fn fetch_restaurant(&self, id: RestaurantId) -> Result<Restaurant, ApiError> {
    let url = self.url(&format!("restaurants/{}", id))?;
    debug!(%url, "Fetching restaurant");
    self.send_json(self.http.get(url)).await
  }

  /// Get the reviews of one restaurant
  pub async fn fetch_reviews(&self, id: RestaurantId) -> Result<Vec<ApiReview>, ApiError> {
    let mut url = self.url("reviews/")?;
    url
      .query_pairs_mut()
      .append_pair("restaurant_id", &id.to_string());
    debug!(%url, "Fetching reviews");
    self.send_json(self.http.get(url)).await
  }

  /// Create a review; the service echoes the stored review back
  pub async fn post_review(
    &self,
    id: RestaurantId,
    review: &Review,
  ) -> Result<ApiReview, ApiError> {
    let url = self.url("reviews/")?;
    debug!(%url, restaurant_id = %id, "Posting review");
    let body = ReviewSubmission::new(id, review);
    self.send_json(self.http.post(url).json(&body)).await
  }
}
