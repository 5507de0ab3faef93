//! Single-occupancy admission slot.
//!
//! The occupant is an attempt id (0 means vacant). Waiters park on a
//! [`Notify`]; every release wakes all of them and whichever wins the
//! compare-exchange goes next. There is no FIFO ordering among waiters.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Notify;
use tracing::trace;

const VACANT: u64 = 0;

#[derive(Debug, Default)]
pub(crate) struct AdmissionSlot {
  occupant: AtomicU64,
  next_attempt: AtomicU64,
  released: Notify,
}

/// Proof of holding the slot. Dropping it releases the slot.
#[derive(Debug)]
pub(crate) struct SlotGuard<'a> {
  slot: &'a AdmissionSlot,
  attempt: u64,
}

impl AdmissionSlot {
  pub fn new() -> Self {
    Self::default()
  }

  /// Wait until the slot is free and take it.
  ///
  /// Cancel by dropping the future; a guard that was already handed out is
  /// released by its own `Drop`.
  pub async fn acquire(&self) -> SlotGuard<'_> {
    let attempt = self.next_attempt.fetch_add(1, Ordering::Relaxed) + 1;

    loop {
      // Register interest before checking, so a release between the check and
      // the await still wakes us.
      let released = self.released.notified();
      tokio::pin!(released);
      released.as_mut().enable();

      if let Some(guard) = self.try_acquire(attempt) {
        return guard;
      }

      trace!(attempt, "Admission slot busy, waiting for release");
      released.await;
    }
  }

  fn try_acquire(&self, attempt: u64) -> Option<SlotGuard<'_>> {
    self
      .occupant
      .compare_exchange(VACANT, attempt, Ordering::AcqRel, Ordering::Acquire)
      .ok()
      .map(|_| {
        trace!(attempt, "Admission slot acquired");
        SlotGuard { slot: self, attempt }
      })
  }

  /// The attempt currently holding the slot, if any.
  pub fn occupant(&self) -> Option<u64> {
    match self.occupant.load(Ordering::Acquire) {
      VACANT => None,
      attempt => Some(attempt),
    }
  }
}

impl SlotGuard<'_> {
  pub fn attempt(&self) -> u64 {
    self.attempt
  }
}

impl Drop for SlotGuard<'_> {
  fn drop(&mut self) {
    self.slot.occupant.store(VACANT, Ordering::Release);
    self.slot.released.notify_waiters();
    trace!(attempt = self.attempt, "Admission slot released");
  }
}
