use std::{fmt, time::Duration};

use crate::signal::RateLimitSignal;

/// How a protected call failed.
///
/// Inside the protected call, `?` on a [`RateLimitSignal`] yields
/// `CallError::RateLimited`; wrap everything else in `CallError::Failed`.
#[derive(Debug, thiserror::Error)]
pub enum CallError<E> {
  #[error(transparent)]
  RateLimited(RateLimitSignal),
  #[error("{0}")]
  Failed(E),
}

impl<E> From<RateLimitSignal> for CallError<E> {
  fn from(signal: RateLimitSignal) -> Self {
    CallError::RateLimited(signal)
  }
}

/// Why an admission wait was abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
  /// The caller's own token was cancelled.
  Caller,
  /// The gate was shut down.
  Shutdown,
  /// Waiting took longer than the configured `max_wait`.
  Timeout(Duration),
}

impl fmt::Display for CancelReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      CancelReason::Caller => write!(f, "cancelled by caller"),
      CancelReason::Shutdown => write!(f, "gate is shutting down"),
      CancelReason::Timeout(limit) => write!(f, "waited longer than {:?}", limit),
    }
  }
}

/// What crosses the gate boundary back to the caller.
#[derive(Debug, thiserror::Error)]
pub enum GateError<E> {
  /// Rejected without a retry hint; the gate does not guess a cooldown.
  #[error(transparent)]
  RateLimited(RateLimitSignal),
  /// The protected call failed for any other reason, unmodified.
  #[error("{0}")]
  Failed(E),
  /// The admission wait was interrupted; the call never ran.
  #[error("Admission wait aborted: {0}")]
  Cancelled(CancelReason),
}

impl<E> GateError<E> {
  pub fn is_cancelled(&self) -> bool {
    matches!(self, GateError::Cancelled(_))
  }

  pub fn is_rate_limited(&self) -> bool {
    matches!(self, GateError::RateLimited(_))
  }

  /// The caller's own error, if the protected call failed with one.
  pub fn into_failure(self) -> Option<E> {
    match self {
      GateError::Failed(e) => Some(e),
      _ => None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_signal_converts_into_call_error() {
    fn protected() -> Result<(), CallError<std::io::Error>> {
      Err(RateLimitSignal::new("slow down"))?
    }

    assert!(matches!(protected(), Err(CallError::RateLimited(_))));
  }

  #[test]
  fn test_gate_error_display() {
    let cancelled: GateError<String> = GateError::Cancelled(CancelReason::Shutdown);
    assert_eq!(cancelled.to_string(), "Admission wait aborted: gate is shutting down");

    let failed: GateError<String> = GateError::Failed("boom".to_string());
    assert_eq!(failed.to_string(), "boom");

    let limited: GateError<String> = GateError::RateLimited(RateLimitSignal::new("slow down"));
    assert_eq!(limited.to_string(), "Rate limited: slow down");
  }

  #[test]
  fn test_into_failure() {
    let failed: GateError<&str> = GateError::Failed("boom");
    assert_eq!(failed.into_failure(), Some("boom"));

    let cancelled: GateError<&str> = GateError::Cancelled(CancelReason::Caller);
    assert!(cancelled.is_cancelled());
    assert_eq!(cancelled.into_failure(), None);
  }
}
