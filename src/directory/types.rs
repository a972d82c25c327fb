//! Restaurant and review records as they are cached locally.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DirectoryError;

/// Identifier of a restaurant, also its key in the local store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RestaurantId(pub i64);

impl RestaurantId {
  /// Normalize an id that arrived as text (route segment, form field, CLI).
  ///
  /// Surrounding whitespace is ignored; anything else that is not a decimal
  /// integer is rejected.
  pub fn parse(raw: &str) -> Result<Self, DirectoryError> {
    raw
      .trim()
      .parse::<i64>()
      .map(Self)
      .map_err(|_| DirectoryError::InvalidId(raw.to_string()))
  }
}

impl FromStr for RestaurantId {
  type Err = DirectoryError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::parse(s)
  }
}

impl fmt::Display for RestaurantId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
  pub lat: f64,
  pub lng: f64,
}

/// A restaurant record, the unit of caching.
///
/// Fields this crate does not interpret (photograph, address, operating
/// hours, ...) are carried in `extra` and written back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Restaurant {
  pub id: RestaurantId,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub cuisine_type: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub neighborhood: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub latlng: Option<LatLng>,
  /// `None` until reviews have been cached for this restaurant
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub reviews: Option<Vec<Review>>,
  #[serde(flatten)]
  pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Restaurant {
  /// Reviews that still have to be pushed to the remote service.
  pub fn pending_reviews(&self) -> impl Iterator<Item = &Review> {
    self.reviews.iter().flatten().filter(|r| r.is_pending())
  }
}

/// A review nested in a restaurant record.
///
/// Reviews fetched from the service carry a display `date` and no `synced`
/// flag. Reviews written locally start with `synced: Some(false)`. Reviews
/// embedded in a restaurant record keep their remote fields (`id`,
/// `createdAt`, ...) in `extra`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
  pub name: String,
  pub rating: u8,
  pub comments: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub date: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub synced: Option<bool>,
  #[serde(flatten)]
  pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Review {
  /// A review written locally that has not reached the service yet.
  pub fn pending(name: impl Into<String>, rating: u8, comments: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      rating,
      comments: comments.into(),
      date: Some(format_review_date(Utc::now())),
      synced: Some(false),
      extra: serde_json::Map::new(),
    }
  }

  /// Only an explicit `false` marks a review for syncing.
  pub fn is_pending(&self) -> bool {
    self.synced == Some(false)
  }

  pub fn mark_synced(&mut self) {
    self.synced = Some(true);
  }
}

/// Date shown next to a review, e.g. "October 26, 2016".
pub fn format_review_date(at: DateTime<Utc>) -> String {
  at.format("%B %-d, %Y").to_string()
}

/// Equality filter on one restaurant field.
///
/// The literal `"all"` means no filtering on that field. A record missing the
/// field only passes `All`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
  All,
  Only(String),
}

impl Filter {
  pub fn matches(&self, value: Option<&str>) -> bool {
    match self {
      Filter::All => true,
      Filter::Only(wanted) => value == Some(wanted.as_str()),
    }
  }
}

impl From<&str> for Filter {
  fn from(value: &str) -> Self {
    if value == "all" {
      Filter::All
    } else {
      Filter::Only(value.to_string())
    }
  }
}

impl From<String> for Filter {
  fn from(value: String) -> Self {
    Filter::from(value.as_str())
  }
}
