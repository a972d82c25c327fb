//! Serde types matching the restaurant service's review endpoints.
//!
//! These are kept apart from the cached record types: the service sends a raw
//! timestamp and the cache keeps a display date plus a sync flag.

use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};

use crate::directory::{format_review_date, RestaurantId, Review};

/// A review as returned by `GET /reviews/` and echoed by `POST /reviews/`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiReview {
  #[serde(default)]
  pub id: Option<i64>,
  pub name: String,
  #[serde(deserialize_with = "deserialize_rating")]
  pub rating: u8,
  #[serde(default)]
  pub comments: String,
  #[serde(rename = "createdAt", default, deserialize_with = "deserialize_timestamp")]
  pub created_at: Option<DateTime<Utc>>,
}

impl From<ApiReview> for Review {
  /// Display shape: the raw timestamp becomes a formatted date and no sync
  /// flag is set.
  fn from(review: ApiReview) -> Self {
    Review {
      name: review.name,
      rating: review.rating,
      comments: review.comments,
      date: review.created_at.map(format_review_date),
      synced: None,
      extra: serde_json::Map::new(),
    }
  }
}

/// Body of `POST /reviews/`.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewSubmission<'a> {
  pub restaurant_id: RestaurantId,
  pub name: &'a str,
  pub rating: u8,
  pub comments: &'a str,
}

impl<'a> ReviewSubmission<'a> {
  pub fn new(restaurant_id: RestaurantId, review: &'a Review) -> Self {
    Self {
      restaurant_id,
      name: &review.name,
      rating: review.rating,
      comments: &review.comments,
    }
  }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
  Number(i64),
  Text(String),
}

/// Ratings arrive as numbers, but form posts get echoed back as strings.
fn deserialize_rating<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
  D: Deserializer<'de>,
{
  match NumberOrText::deserialize(deserializer)? {
    NumberOrText::Number(n) => u8::try_from(n).map_err(de::Error::custom),
    NumberOrText::Text(s) => s.trim().parse().map_err(de::Error::custom),
  }
}

/// `createdAt` is epoch milliseconds on most records, RFC 3339 on some.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
  D: Deserializer<'de>,
{
  match Option::<NumberOrText>::deserialize(deserializer)? {
    None => Ok(None),
    Some(NumberOrText::Number(ms)) => DateTime::from_timestamp_millis(ms)
      .map(Some)
      .ok_or_else(|| de::Error::custom(format!("timestamp out of range: {}", ms))),
    Some(NumberOrText::Text(s)) => DateTime::parse_from_rfc3339(&s)
      .map(|dt| Some(dt.with_timezone(&Utc)))
      .map_err(de::Error::custom),
  }
}
