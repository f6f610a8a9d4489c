//! Failure values produced by fetchers.

use serde::Serialize;
use serde_json::Value;

/// Message attached to every non-success HTTP response.
pub const STATUS_ERROR_MESSAGE: &str = "An error occurred while fetching the data.";

/// Why a fetch for an endpoint did not produce data.
///
/// This is the value stored in a resource's `is_error` field, so it must stay
/// cheap to clone and serializable for display.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FetchError {
  /// The server answered with a non-success status. `info` holds the parsed
  /// response body (`null` when the body was not JSON).
  #[error("{message} (status {status})")]
  Status {
    status: u16,
    message: String,
    info: Value,
  },
  /// The request never produced a response (DNS, connect, timeout, bad URL).
  #[error("transport error: {message}")]
  Transport { message: String },
  /// A success response whose body could not be decoded.
  #[error("failed to decode response body: {message}")]
  Decode { message: String },
  /// Failure raised by a custom fetcher.
  #[error("{message}")]
  Custom { message: String },
}

impl FetchError {
  /// Build a status failure with the standard message.
  pub fn status(status: u16, info: Value) -> Self {
    Self::Status {
      status,
      message: STATUS_ERROR_MESSAGE.to_string(),
      info,
    }
  }

  /// Build a failure from any displayable message, for custom fetchers.
  pub fn custom(message: impl Into<String>) -> Self {
    Self::Custom {
      message: message.into(),
    }
  }

  /// HTTP status code, when the failure came from a response.
  pub fn status_code(&self) -> Option<u16> {
    match self {
      Self::Status { status, .. } => Some(*status),
      _ => None,
    }
  }

  /// Parsed error body, when the failure came from a response.
  pub fn info(&self) -> Option<&Value> {
    match self {
      Self::Status { info, .. } => Some(info),
      _ => None,
    }
  }
}

impl From<reqwest::Error> for FetchError {
  fn from(e: reqwest::Error) -> Self {
    let message = e.to_string();
    if e.is_decode() {
      Self::Decode { message }
    } else {
      Self::Transport { message }
    }
  }
}
