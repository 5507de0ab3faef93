//! The shared "next available time".
//!
//! Stored as UTC nanoseconds since the Unix epoch in a single atomic, so the
//! hot read path never takes a lock. Writers only ever move it forward.

use std::{
  sync::atomic::{AtomicI64, Ordering},
  time::Duration,
};

use chrono::{DateTime, Utc};

#[derive(Debug)]
pub(crate) struct Deadline {
  nanos: AtomicI64,
}

impl Deadline {
  /// A deadline that has already passed: callers may proceed right away.
  pub fn now() -> Self {
    Self {
      nanos: AtomicI64::new(to_nanos(Utc::now())),
    }
  }

  pub fn get(&self) -> DateTime<Utc> {
    DateTime::from_timestamp_nanos(self.nanos.load(Ordering::Acquire))
  }

  /// Move the deadline to `max(current, proposed)` and return the result.
  ///
  /// A straggler with an older, smaller hint can never roll the deadline back.
  pub fn advance(&self, proposed: DateTime<Utc>) -> DateTime<Utc> {
    let proposed = to_nanos(proposed);
    let previous = self.nanos.fetch_max(proposed, Ordering::AcqRel);
    DateTime::from_timestamp_nanos(previous.max(proposed))
  }

  /// Time left until the deadline, or `None` once it has passed.
  pub fn remaining(&self) -> Option<Duration> {
    (self.get() - Utc::now()).to_std().ok().filter(|wait| !wait.is_zero())
  }
}

/// Instants past the representable range (year 2262) saturate.
fn to_nanos(instant: DateTime<Utc>) -> i64 {
  instant.timestamp_nanos_opt().unwrap_or(if instant.timestamp() < 0 { i64::MIN } else { i64::MAX })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_starts_in_the_past() {
    let deadline = Deadline::now();

    assert!(deadline.get() <= Utc::now());
    assert!(deadline.remaining().is_none());
  }

  #[test]
  fn test_advance_moves_forward() {
    let deadline = Deadline::now();
    let target = Utc::now() + chrono::Duration::seconds(10);

    assert_eq!(deadline.advance(target), target);
    assert_eq!(deadline.get(), target);
    assert!(deadline.remaining().unwrap() > Duration::from_secs(9));
  }

  #[test]
  fn test_advance_never_moves_back() {
    let deadline = Deadline::now();
    let later = Utc::now() + chrono::Duration::seconds(10);
    let earlier = Utc::now() + chrono::Duration::seconds(1);

    deadline.advance(later);
    assert_eq!(deadline.advance(earlier), later);
    assert_eq!(deadline.get(), later);
  }

  #[test]
  fn test_far_future_saturates() {
    let deadline = Deadline::now();

    deadline.advance(DateTime::<Utc>::MAX_UTC);

    assert_eq!(deadline.get(), DateTime::from_timestamp_nanos(i64::MAX));
  }
}
