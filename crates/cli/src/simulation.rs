//! In-process stand-in for a rate-limited chat service.
//!
//! It accepts `burst` calls per `period`, answers anything over quota with a
//! 429 whose `Retry-After` follows the configured [`HintStyle`], and can be
//! told to fail every Nth accepted call with a 503.

use std::{
  sync::atomic::{AtomicUsize, Ordering},
  time::Duration,
};

use chrono::{SecondsFormat, Utc};
use gate::{CallError, FailureStatus, RATE_LIMIT_STATUS, RateLimitSignal};
use serde::{Deserialize, Serialize};
use tokio::{sync::Mutex, time::Instant};
use tracing::{debug, warn};

use crate::config::{HintStyle, SimulationConfig};

const SERVICE_UNAVAILABLE: u16 = 503;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
  pub id: usize,
  pub prompt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
  pub id: usize,
  pub reply: String,
}

/// A non-rate-limit failure from the downstream service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Chat service returned {status}: {message}")]
pub struct ServiceError {
  pub status: u16,
  pub message: String,
}

impl FailureStatus for ServiceError {
  fn status(&self) -> u16 {
    self.status
  }
}

struct QuotaWindow {
  started: Instant,
  used: usize,
}

pub struct SimulatedService {
  burst: usize,
  period: Duration,
  latency: Duration,
  hint_style: HintStyle,
  failure_every: usize,
  window: Mutex<QuotaWindow>,
  accepted: AtomicUsize,
  rejected: AtomicUsize,
}

impl SimulatedService {
  pub fn new(config: &SimulationConfig) -> Self {
    Self {
      burst: config.burst.max(1),
      period: Duration::from_millis(config.period_ms),
      latency: Duration::from_millis(config.latency_ms),
      hint_style: config.hint_style,
      failure_every: config.failure_every,
      window: Mutex::new(QuotaWindow {
        started: Instant::now(),
        used: 0,
      }),
      accepted: AtomicUsize::new(0),
      rejected: AtomicUsize::new(0),
    }
  }

  /// Handle one request, the way a protected call sees the service.
  pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, CallError<ServiceError>> {
    tokio::time::sleep(self.latency).await;

    if let Some(remaining) = self.take_quota().await {
      self.rejected.fetch_add(1, Ordering::Relaxed);
      return Err(self.reject(remaining).map_err(CallError::Failed)?.into());
    }

    let accepted = self.accepted.fetch_add(1, Ordering::Relaxed) + 1;
    if self.failure_every > 0 && accepted % self.failure_every == 0 {
      return Err(CallError::Failed(ServiceError {
        status: SERVICE_UNAVAILABLE,
        message: format!("backend overloaded while handling request {}", request.id),
      }));
    }

    debug!(id = request.id, "Chat service accepted request");
    Ok(ChatResponse {
      id: request.id,
      reply: format!("echo: {}", request.prompt),
    })
  }

  pub fn accepted(&self) -> usize {
    self.accepted.load(Ordering::Relaxed)
  }

  pub fn rejected(&self) -> usize {
    self.rejected.load(Ordering::Relaxed)
  }

  /// Count one call against the quota. Returns the time left in the window
  /// when the quota is already spent.
  async fn take_quota(&self) -> Option<Duration> {
    let mut window = self.window.lock().await;
    let now = Instant::now();
    if now.duration_since(window.started) >= self.period {
      window.started = now;
      window.used = 0;
    }

    if window.used < self.burst {
      window.used += 1;
      return None;
    }
    Some((window.started + self.period).saturating_duration_since(now))
  }

  fn reject(&self, remaining: Duration) -> Result<RateLimitSignal, ServiceError> {
    let header = retry_after_header(self.hint_style, remaining);
    RateLimitSignal::from_response(
      RATE_LIMIT_STATUS,
      "Rate limit exceeded",
      header.as_deref(),
      |message| warn!("{}", message),
    )
    .map_err(|e| ServiceError {
      status: 500,
      message: e.to_string(),
    })
  }
}

/// Render `remaining` as a `Retry-After` value in the given style.
pub fn retry_after_header(style: HintStyle, remaining: Duration) -> Option<String> {
  // Whole seconds, rounded up so the hint never undershoots the window.
  let seconds = remaining.as_millis().div_ceil(1000) as u64;
  match style {
    HintStyle::Seconds => Some(seconds.to_string()),
    HintStyle::Date => {
      let at = Utc::now() + chrono::Duration::seconds(seconds as i64 + 1);
      Some(at.format("%a, %d %b %Y %H:%M:%S GMT").to_string())
    }
    HintStyle::Timestamp => {
      let at = Utc::now() + chrono::Duration::from_std(remaining).unwrap_or(chrono::Duration::MAX);
      Some(at.to_rfc3339_opts(SecondsFormat::Millis, true))
    }
    HintStyle::None => None,
  }
}
