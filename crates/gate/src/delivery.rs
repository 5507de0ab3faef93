//! Acknowledgement policy for work items that went through the gate.
//!
//! The broker that delivers work lives outside this crate. What it needs from
//! us is a decision per item: acknowledge it, put it back, or leave it alone
//! so it is redelivered later. Plus, for failures, a report to send back to
//! whoever asked.

use serde::{Deserialize, Serialize};

use crate::{error::GateError, signal::RATE_LIMIT_STATUS};

/// Status reported for failures that don't carry their own.
pub const INTERNAL_ERROR_STATUS: u16 = 500;

/// Failures that can describe themselves with an HTTP-like status code.
pub trait FailureStatus {
  fn status(&self) -> u16 {
    INTERNAL_ERROR_STATUS
  }
}

impl FailureStatus for std::io::Error {}
impl FailureStatus for String {}

/// What to do with a delivered work item after `execute` returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
  /// Done with it, successfully or not. Remove it from the queue.
  Ack,
  /// The downstream service failed on its side; put the item back.
  Requeue,
  /// The call never ran (shutdown). Don't acknowledge; let the broker redeliver.
  Leave,
}

impl Disposition {
  pub fn for_outcome<T, E: FailureStatus>(outcome: &Result<T, GateError<E>>) -> Self {
    match outcome {
      Ok(_) => Disposition::Ack,
      Err(GateError::RateLimited(_)) => Disposition::Ack,
      Err(GateError::Failed(e)) if is_server_error(e.status()) => Disposition::Requeue,
      Err(GateError::Failed(_)) => Disposition::Ack,
      Err(GateError::Cancelled(_)) => Disposition::Leave,
    }
  }
}

/// Error sent back to the requester.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReport {
  /// The error code, matching an HTTP status code
  pub code: u16,
  pub message: String,
}

impl FailureReport {
  /// Build a report for a failed `execute`.
  ///
  /// Returns `None` for cancellations: the work never ran, so there is
  /// nothing to report yet.
  pub fn from_error<E: FailureStatus + std::fmt::Display>(error: &GateError<E>) -> Option<Self> {
    match error {
      GateError::RateLimited(signal) => Some(Self {
        code: RATE_LIMIT_STATUS,
        message: signal.message().to_string(),
      }),
      GateError::Failed(e) => Some(Self {
        code: e.status(),
        message: e.to_string(),
      }),
      GateError::Cancelled(_) => None,
    }
  }

  pub fn is_server_error(&self) -> bool {
    is_server_error(self.code)
  }
}

fn is_server_error(code: u16) -> bool {
  (500..600).contains(&code)
}
