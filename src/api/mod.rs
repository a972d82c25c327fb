//! Remote restaurant service client.

mod client;
mod types;

pub use client::ApiClient;
pub use types::{ApiReview, ReviewSubmission};
