//! Upstream traffic governor
//!
//! Wraps every LLM and embeddings call in three gates:
//! 1. a concurrency semaphore (`max_in_flight`)
//! 2. an RPM/TPM sliding 60-second window, entered with an estimated token
//!    cost and reconciled against actual usage on exit
//! 3. an exponential-backoff retry loop for transient errors
//!
//! The limiter guarantees only the rate bounds and the concurrency cap; it
//! gives no FIFO guarantee across submissions. Cancellation propagates into
//! slot waits, window waits, in-flight calls, and backoff sleeps, and the
//! concurrency slot is released on every exit path.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod caller;
mod error;
mod retry;
mod window;

pub use caller::{CallOutcome, RateLimitedCaller};
pub use error::UpstreamError;
pub use retry::RetryPolicy;
pub use window::{RateWindow, SlotId};
