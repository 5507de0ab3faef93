//! The rate-limit gate.
//!
//! Every attempt at the protected call goes through one admission slot, and
//! the slot holder waits out the shared cooldown deadline before calling. When
//! the downstream service rejects a call with a retry hint, the deadline moves
//! forward and the attempt is queued again. Rejections without a hint, and all
//! other failures, go straight back to the caller.
//!
//! # Flow
//!
//! ```text
//! execute ──▶ acquire slot ──▶ sleep until deadline ──▶ call()
//!    ▲                                                    │
//!    │        release slot ◀──────────────────────────────┘
//!    │             │
//!    └─ hint ◀─────┤ rate limited
//!                  ├─ no hint ──▶ GateError::RateLimited
//!                  ├─ failure ──▶ GateError::Failed
//!                  └─ success ──▶ Ok
//! ```
//!
//! Waiting (for the slot or for the deadline) can be interrupted by the
//! caller's token, by [`RateLimitGate::shutdown`], or by the configured
//! `max_wait`. A call that has already started is never interrupted.

use std::future::Future;

use chrono::{DateTime, Utc};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
  config::GateConfig,
  deadline::Deadline,
  error::{CallError, CancelReason, GateError},
  signal::RateLimitSignal,
  slot::{AdmissionSlot, SlotGuard},
};

/// Serializes and paces calls to one rate-limited resource.
///
/// Build one per protected resource at startup and share it (`Arc`) with
/// every caller. Waiters are not served in arrival order.
#[derive(Debug)]
pub struct RateLimitGate {
  deadline: Deadline,
  slot: AdmissionSlot,
  shutdown: CancellationToken,
  config: GateConfig,
}

impl Default for RateLimitGate {
  fn default() -> Self {
    Self::new()
  }
}

impl RateLimitGate {
  pub fn new() -> Self {
    Self::with_config(GateConfig::default())
  }

  pub fn with_config(config: GateConfig) -> Self {
    Self {
      deadline: Deadline::now(),
      slot: AdmissionSlot::new(),
      shutdown: CancellationToken::new(),
      config,
    }
  }

  /// Run `call` through the gate.
  ///
  /// Retries for as long as the downstream service rejects the call with a
  /// retry hint. Returns the first success, the first rejection without a
  /// hint, the first other failure, or `Cancelled` if the wait for admission
  /// was interrupted (in which case `call` did not run for that attempt).
  pub async fn execute<T, E, F, Fut>(&self, cancel: &CancellationToken, mut call: F) -> Result<T, GateError<E>>
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CallError<E>>>,
  {
    let interrupted = self.interrupted(cancel);
    tokio::pin!(interrupted);
    let mut attempts = 0u32;

    loop {
      let slot = tokio::select! {
        biased;
        reason = &mut interrupted => {
          debug!(%reason, attempts, "Admission wait interrupted");
          return Err(GateError::Cancelled(reason));
        }
        slot = self.admit() => slot,
      };

      attempts += 1;
      let attempt = slot.attempt();
      let outcome = call().await;
      // Attempts are serialized, retries are not: release before deciding.
      drop(slot);

      match outcome {
        Ok(value) => {
          if attempts > 1 {
            info!(attempts, "Protected call succeeded after rate-limit retries");
          }
          return Ok(value);
        }
        Err(CallError::RateLimited(signal)) => match signal.retry_instant() {
          Some(instant) => {
            self.advance_deadline(instant);
            debug!(attempt, attempts, "Rate limited with retry hint, queuing another attempt");
          }
          None => {
            warn!(
              attempt,
              message = signal.message(),
              "Rate limited without a retry hint, returning to caller"
            );
            return Err(GateError::RateLimited(signal));
          }
        },
        Err(CallError::Failed(e)) => return Err(GateError::Failed(e)),
      }
    }
  }

  /// Take the slot, then sleep until the deadline has passed.
  ///
  /// The deadline is checked again after every sleep, since another rejection
  /// may have moved it while this task slept.
  async fn admit(&self) -> SlotGuard<'_> {
    let slot = self.slot.acquire().await;

    while let Some(wait) = self.deadline.remaining() {
      warn!(
        attempt = slot.attempt(),
        wait_ms = wait.as_millis() as u64,
        deadline = %self.deadline.get(),
        "Rate limit cooldown active, waiting"
      );
      sleep(wait).await;
    }

    slot
  }

  /// Resolves when this `execute` call should stop waiting.
  async fn interrupted(&self, cancel: &CancellationToken) -> CancelReason {
    let timeout = async {
      match self.config.max_wait() {
        Some(limit) => {
          sleep(limit).await;
          CancelReason::Timeout(limit)
        }
        None => std::future::pending().await,
      }
    };

    tokio::select! {
      biased;
      _ = self.shutdown.cancelled() => CancelReason::Shutdown,
      _ = cancel.cancelled() => CancelReason::Caller,
      reason = timeout => reason,
    }
  }

  /// Move the cooldown deadline to `max(current, instant)`.
  ///
  /// Returns the effective deadline afterwards.
  pub fn advance_deadline(&self, instant: DateTime<Utc>) -> DateTime<Utc> {
    let effective = self.deadline.advance(instant);
    info!(hint = %instant, deadline = %effective, "Rate limit registered, next available time updated");
    effective
  }

  /// Apply a rejection's retry hint to the deadline.
  ///
  /// Signals without a hint carry no cooldown information and are ignored.
  pub fn register(&self, signal: &RateLimitSignal) {
    match signal.retry_instant() {
      Some(instant) => {
        self.advance_deadline(instant);
      }
      None => warn!("Tried to register a rate limit signal without a retry hint, ignored"),
    }
  }

  /// The earliest instant at which the protected call may next run.
  pub fn deadline(&self) -> DateTime<Utc> {
    self.deadline.get()
  }

  /// How long a caller admitted now would have to wait.
  pub fn remaining_cooldown(&self) -> Option<std::time::Duration> {
    self.deadline.remaining()
  }

  /// Whether some caller currently holds the admission slot.
  pub fn is_occupied(&self) -> bool {
    self.slot.occupant().is_some()
  }

  pub fn is_shut_down(&self) -> bool {
    self.shutdown.is_cancelled()
  }

  /// Interrupt every caller waiting for admission.
  ///
  /// Waiters return `GateError::Cancelled(CancelReason::Shutdown)` and any
  /// later `execute` fails the same way without running its call. Calling
  /// this more than once has no further effect.
  pub fn shutdown(&self) {
    if self.shutdown.is_cancelled() {
      return;
    }

    if let Some(attempt) = self.slot.occupant() {
      warn!(attempt, "Caller is inside the gate but the application is shutting down, interrupting");
    }
    info!("Rate limit gate shutting down");
    self.shutdown.cancel();
  }
}
