//! Cooldown gate for calls to a rate-limited downstream service.
//!
//! One [`RateLimitGate`] guards one resource. Callers hand it their protected
//! call; the gate lets one attempt through at a time, holds everyone back
//! until the cooldown deadline has passed, and pushes that deadline forward
//! whenever the service answers with a [`RateLimitSignal`] carrying a
//! [`RetryHint`].
//!
//! ```ignore
//! let gate = Arc::new(RateLimitGate::new());
//! let reply = gate
//!   .execute(&cancel, || async {
//!     let response = client.post(url).send().await.map_err(|e| CallError::Failed(e.into()))?;
//!     if response.status().as_u16() == RATE_LIMIT_STATUS {
//!       let signal = RateLimitSignal::from_http_response(response).await.map_err(|e| CallError::Failed(e.into()))?;
//!       return Err(signal.into());
//!     }
//!     response.text().await.map_err(|e| CallError::Failed(e.into()))
//!   })
//!   .await?;
//! ```

mod config;
mod deadline;
pub mod delivery;
mod error;
mod gate;
mod hint;
mod signal;
mod slot;

pub use config::GateConfig;
pub use delivery::{Disposition, FailureReport, FailureStatus};
pub use error::{CallError, CancelReason, GateError};
pub use gate::RateLimitGate;
pub use hint::RetryHint;
pub use signal::{RATE_LIMIT_STATUS, RateLimitSignal, SignalError};
