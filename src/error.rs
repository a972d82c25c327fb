//! Error types for the local store, the remote API and the directory operations.

use std::path::PathBuf;

use crate::directory::RestaurantId;

/// Failure of a local store operation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  #[error("failed to open local store at {}: {source}", path.display())]
  Open {
    path: PathBuf,
    #[source]
    source: rusqlite::Error,
  },

  #[error("failed to create store directory {}: {source}", path.display())]
  CreateDir {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("could not determine data directory")]
  NoDataDir,

  #[error("local store query failed: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("failed to encode or decode cached record: {0}")]
  Codec(#[from] serde_json::Error),

  #[error("local store lock poisoned")]
  Poisoned,
}

/// Failure talking to the remote restaurant service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
  #[error("invalid API URL: {0}")]
  Url(#[from] url::ParseError),

  #[error("request failed: {0}")]
  Request(#[from] reqwest::Error),

  #[error("API error ({status}): {body}")]
  Status {
    status: reqwest::StatusCode,
    body: String,
  },

  #[error("failed to parse API response: {0}")]
  Decode(#[from] serde_json::Error),
}

/// Errors returned by the directory operations.
///
/// The display text of `RestaurantNotFound` and `ReviewsUnavailable` is meant
/// to be shown to users as is.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
  #[error("invalid restaurant id: {0:?}")]
  InvalidId(String),

  #[error("Restaurant does not exist")]
  RestaurantNotFound {
    id: RestaurantId,
    #[source]
    source: ApiError,
  },

  #[error("Failed to fetch reviews")]
  ReviewsUnavailable {
    id: RestaurantId,
    #[source]
    source: ApiError,
  },

  #[error(transparent)]
  Network(#[from] ApiError),

  #[error(transparent)]
  Store(#[from] StoreError),
}
