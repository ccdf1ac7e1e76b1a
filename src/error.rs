//! Error types for the favorites store, the fetch path and push delivery.

use thiserror::Error;

/// Errors raised by the local favorites store and the session store.
#[derive(Debug, Error)]
pub enum StoreError {
  /// A favorite for this product already exists
  #[error("product {product_id} is already a favorite")]
  ConstraintViolation { product_id: String },

  /// The database could not be opened or initialized
  #[error("storage unavailable: {0}")]
  StorageUnavailable(String),

  /// A statement or transaction failed against an open database
  #[error("transaction failed: {0}")]
  TransactionFailed(String),
}

impl StoreError {
  pub fn unavailable(message: impl Into<String>) -> Self {
    Self::StorageUnavailable(message.into())
  }

  pub fn transaction(message: impl Into<String>) -> Self {
    Self::TransactionFailed(message.into())
  }
}

/// Errors raised while performing a live fetch.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
  /// Transport-level failure (DNS, connect, timeout, reset)
  #[error("network failure: {0}")]
  NetworkFailure(String),

  /// The request could not be built
  #[error("invalid request: {0}")]
  InvalidRequest(String),
}

impl FetchError {
  pub fn network(message: impl Into<String>) -> Self {
    Self::NetworkFailure(message.into())
  }
}

impl From<reqwest::Error> for FetchError {
  fn from(err: reqwest::Error) -> Self {
    if err.is_builder() {
      Self::InvalidRequest(err.to_string())
    } else {
      Self::network(err.to_string())
    }
  }
}

/// Errors surfaced by the remote story API client.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error(transparent)]
  Fetch(#[from] FetchError),

  /// The API answered with a non-success status
  #[error("API error ({status}): {message}")]
  Api { status: u16, message: String },

  #[error("JSON error: {0}")]
  Json(#[from] serde_json::Error),

  /// No token available for an authenticated endpoint
  #[error("not logged in")]
  Unauthenticated,
}

impl ApiError {
  pub fn api(status: u16, message: impl Into<String>) -> Self {
    Self::Api {
      status,
      message: message.into(),
    }
  }
}

/// Errors raised while decoding push messages.
#[derive(Debug, Error)]
pub enum PushError {
  #[error("malformed push payload: {0}")]
  MalformedPushPayload(#[from] serde_json::Error),
}
