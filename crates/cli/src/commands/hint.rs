//! `hare-gate parse-hint`: run a `Retry-After` value through the hint parser.

use anyhow::Result;
use chrono::Utc;
use gate::RetryHint;

pub async fn cmd_parse_hint(value: &str) -> Result<()> {
  let mut diagnostic = None;
  let hint = RetryHint::parse(Some(value), |message| diagnostic = Some(message));

  match hint.instant() {
    Some(instant) => {
      println!("Retry at:  {}", hint);
      let wait = instant - Utc::now();
      if wait > chrono::Duration::zero() {
        println!("Wait:      {:.3}s", wait.num_milliseconds() as f64 / 1000.0);
      } else {
        println!("Wait:      none (already passed)");
      }
    }
    None => {
      println!("No retry hint");
      if let Some(message) = diagnostic {
        println!("{}", message);
      }
    }
  }

  Ok(())
}
