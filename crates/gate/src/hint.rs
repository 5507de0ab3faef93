//! Retry hints derived from `Retry-After`-style header values.
//!
//! A downstream service may say "retry after" either as an absolute date or as
//! a number of seconds. Both end up as an absolute UTC instant here, so the
//! gate never has to know which form a rejection used.

use std::{fmt, time::Duration};

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::warn;

/// When a rejected call may be tried again.
///
/// Either an absolute UTC instant or nothing. A missing hint means "unknown",
/// not "no cooldown": callers should propagate the failure instead of retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryHint(Option<DateTime<Utc>>);

impl RetryHint {
  /// No hint was given (or it could not be understood).
  pub const NONE: Self = Self(None);

  /// Hint at an absolute point in time.
  pub fn at(instant: DateTime<Utc>) -> Self {
    Self(Some(instant))
  }

  /// Hint relative to now. The delay is fixed to an instant right away.
  pub fn after(delay: Duration) -> Self {
    let instant = chrono::Duration::from_std(delay)
      .ok()
      .and_then(|delay| Utc::now().checked_add_signed(delay))
      .unwrap_or(DateTime::<Utc>::MAX_UTC);
    Self(Some(instant))
  }

  pub fn instant(&self) -> Option<DateTime<Utc>> {
    self.0
  }

  pub fn is_some(&self) -> bool {
    self.0.is_some()
  }

  pub fn is_none(&self) -> bool {
    self.0.is_none()
  }

  /// Derive a hint from a protocol-level header value.
  ///
  /// Fallback chain:
  /// 1. absent → no hint
  /// 2. absolute timestamp (RFC 3339, or RFC 2822 / HTTP-date) → that instant
  /// 3. non-negative integer seconds → now + seconds
  /// 4. anything else → no hint, and `on_unparseable` is called once with a
  ///    message naming the raw value
  pub fn parse(text: Option<&str>, on_unparseable: impl FnOnce(String)) -> Self {
    let Some(raw) = text else {
      return Self::NONE;
    };
    let value = raw.trim();

    if let Some(instant) = parse_timestamp(value) {
      return Self::at(instant);
    }

    if let Ok(seconds) = value.parse::<u64>() {
      return Self::after(Duration::from_secs(seconds));
    }

    on_unparseable(format!(
      "Failed to parse Retry-After value, continuing without a retry hint: {raw}"
    ));
    Self::NONE
  }

  /// Same as [`RetryHint::parse`], reporting unparseable values as warnings.
  pub fn parse_logged(text: Option<&str>) -> Self {
    Self::parse(text, |message| warn!("{}", message))
  }
}

impl From<DateTime<Utc>> for RetryHint {
  fn from(instant: DateTime<Utc>) -> Self {
    Self::at(instant)
  }
}

impl fmt::Display for RetryHint {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.0 {
      Some(instant) => write!(f, "{}", instant.to_rfc3339_opts(SecondsFormat::Millis, true)),
      None => write!(f, "none"),
    }
  }
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(value)
    .or_else(|_| DateTime::parse_from_rfc2822(value))
    .ok()
    .map(|instant| instant.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  fn no_diagnostic(message: String) {
    panic!("unexpected diagnostic: {message}");
  }

  #[test]
  fn test_absent_hint_is_none() {
    assert_eq!(RetryHint::parse(None, no_diagnostic), RetryHint::NONE);
  }

  #[test]
  fn test_parse_rfc3339_future_instant() {
    let expected = Utc::now() + chrono::Duration::minutes(1);
    let text = expected.to_rfc3339_opts(SecondsFormat::AutoSi, true);

    let hint = RetryHint::parse(Some(&text), no_diagnostic);

    assert_eq!(hint.instant(), Some(expected));
  }

  #[test]
  fn test_parse_rfc3339_with_offset_converts_to_utc() {
    let hint = RetryHint::parse(Some("2031-05-01T12:00:00+02:00"), no_diagnostic);

    assert_eq!(hint.instant(), Some(Utc.with_ymd_and_hms(2031, 5, 1, 10, 0, 0).unwrap()));
  }

  #[test]
  fn test_parse_http_date() {
    let hint = RetryHint::parse(Some("Wed, 21 Oct 2037 07:28:00 GMT"), no_diagnostic);

    assert_eq!(hint.instant(), Some(Utc.with_ymd_and_hms(2037, 10, 21, 7, 28, 0).unwrap()));
  }

  #[test]
  fn test_past_timestamp_is_kept() {
    // The gate's max-update makes a past hint a no-op, so the parser keeps it as-is.
    let hint = RetryHint::parse(Some("2001-01-01T00:00:00Z"), no_diagnostic);

    assert_eq!(hint.instant(), Some(Utc.with_ymd_and_hms(2001, 1, 1, 0, 0, 0).unwrap()));
  }

  #[test]
  fn test_parse_delta_seconds() {
    let before = Utc::now();
    let hint = RetryHint::parse(Some("5"), no_diagnostic);
    let after = Utc::now();

    let instant = hint.instant().expect("delta seconds should produce a hint");
    assert!(instant >= before + chrono::Duration::seconds(5));
    assert!(instant <= after + chrono::Duration::seconds(5));
  }

  #[test]
  fn test_parse_trims_whitespace() {
    let before = Utc::now();
    let hint = RetryHint::parse(Some("  30 "), no_diagnostic);

    assert!(hint.instant().unwrap() >= before + chrono::Duration::seconds(30));
  }

  #[test]
  fn test_parse_invalid_reports_once() {
    let mut messages = Vec::new();

    let hint = RetryHint::parse(Some("not-a-time"), |message| messages.push(message));

    assert!(hint.is_none());
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("not-a-time"));
  }

  #[test]
  fn test_negative_seconds_are_unparseable() {
    let mut calls = 0;

    let hint = RetryHint::parse(Some("-5"), |_| calls += 1);

    assert!(hint.is_none());
    assert_eq!(calls, 1);
  }

  #[test]
  fn test_empty_value_is_unparseable() {
    let mut calls = 0;

    let hint = RetryHint::parse(Some(""), |_| calls += 1);

    assert!(hint.is_none());
    assert_eq!(calls, 1);
  }

  #[test]
  fn test_after_saturates_huge_delays() {
    let hint = RetryHint::after(Duration::MAX);

    assert_eq!(hint.instant(), Some(DateTime::<Utc>::MAX_UTC));
  }

  #[test]
  fn test_display() {
    let hint = RetryHint::at(Utc.with_ymd_and_hms(2030, 1, 2, 3, 4, 5).unwrap());

    assert_eq!(hint.to_string(), "2030-01-02T03:04:05.000Z");
    assert_eq!(RetryHint::NONE.to_string(), "none");
  }
}
