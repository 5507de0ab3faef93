//! The failure value a protected call raises when the downstream service
//! rejects it for rate-limit reasons.

use std::time::Duration;

use chrono::{DateTime, Utc};
#[cfg(feature = "reqwest")]
use tracing::warn;

use crate::hint::RetryHint;

/// HTTP status used by the downstream service for rate-limit rejections.
pub const RATE_LIMIT_STATUS: u16 = 429;

/// A downstream rate-limit rejection, with or without a retry hint.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Rate limited: {message}")]
pub struct RateLimitSignal {
  message: String,
  hint: RetryHint,
}

/// Errors building a [`RateLimitSignal`] from a response.
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
  #[error("Expected status code 429 for a rate-limit signal, but received {status}")]
  UnexpectedStatus { status: u16 },
  #[cfg(feature = "reqwest")]
  #[error("Failed to read rate-limit response body: {0}")]
  Body(#[from] reqwest::Error),
}

impl RateLimitSignal {
  /// A rejection without a retry hint. The gate will propagate it.
  pub fn new(message: impl Into<String>) -> Self {
    Self::with_hint(message, RetryHint::NONE)
  }

  pub fn with_hint(message: impl Into<String>, hint: RetryHint) -> Self {
    Self {
      message: message.into(),
      hint,
    }
  }

  /// A rejection that may be retried at `instant`.
  pub fn retry_at(message: impl Into<String>, instant: DateTime<Utc>) -> Self {
    Self::with_hint(message, RetryHint::at(instant))
  }

  /// A rejection that may be retried after `delay`, counted from now.
  pub fn retry_after(message: impl Into<String>, delay: Duration) -> Self {
    Self::with_hint(message, RetryHint::after(delay))
  }

  /// Build a signal from the parts of a protocol response.
  ///
  /// Fails if `status` is not [`RATE_LIMIT_STATUS`]. The body becomes the
  /// message and `hint_header` goes through [`RetryHint::parse`].
  pub fn from_response(
    status: u16,
    body: impl Into<String>,
    hint_header: Option<&str>,
    on_unparseable: impl FnOnce(String),
  ) -> Result<Self, SignalError> {
    if status != RATE_LIMIT_STATUS {
      return Err(SignalError::UnexpectedStatus { status });
    }

    Ok(Self::with_hint(body, RetryHint::parse(hint_header, on_unparseable)))
  }

  /// Build a signal from a `reqwest` response, reading `Retry-After` and the body.
  #[cfg(feature = "reqwest")]
  pub async fn from_http_response(response: reqwest::Response) -> Result<Self, SignalError> {
    let status = response.status().as_u16();
    if status != RATE_LIMIT_STATUS {
      return Err(SignalError::UnexpectedStatus { status });
    }

    let hint_header = response
      .headers()
      .get(reqwest::header::RETRY_AFTER)
      .and_then(|value| value.to_str().ok())
      .map(str::to_owned);
    let body = response.text().await?;

    Self::from_response(status, body, hint_header.as_deref(), |message| warn!("{}", message))
  }

  pub fn message(&self) -> &str {
    &self.message
  }

  pub fn hint(&self) -> RetryHint {
    self.hint
  }

  /// The instant the downstream service named, if any.
  pub fn retry_instant(&self) -> Option<DateTime<Utc>> {
    self.hint.instant()
  }
}
