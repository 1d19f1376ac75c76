//! The rate-limited call wrapper

use kgraph_core::config::{ConcurrencyConfig, RateLimitConfig, RetryConfig};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::UpstreamError;
use crate::retry::RetryPolicy;
use crate::window::RateWindow;

/// The value and reported token usage of one successful upstream call.
#[derive(Debug)]
pub struct CallOutcome<T> {
    /// The call's result.
    pub value: T,
    /// Actual token usage, when the upstream reports it. Used to reconcile
    /// the TPM window entry.
    pub tokens_used: Option<u64>,
}

impl<T> CallOutcome<T> {
    /// An outcome with no usage report.
    pub fn new(value: T) -> Self {
        CallOutcome {
            value,
            tokens_used: None,
        }
    }

    /// An outcome with a usage report.
    pub fn with_tokens(value: T, tokens_used: u64) -> Self {
        CallOutcome {
            value,
            tokens_used: Some(tokens_used),
        }
    }
}

/// Governs all traffic to one upstream API.
///
/// Every call passes three gates in order: the concurrency semaphore, the
/// RPM/TPM window, then execution. Transient failures re-enter all three
/// gates after backoff, so a retrying call cannot starve other submitters.
pub struct RateLimitedCaller {
    name: String,
    semaphore: Arc<Semaphore>,
    window: RateWindow,
    retry: RetryPolicy,
}

impl RateLimitedCaller {
    /// A caller for the upstream `name` with the given policy sections.
    pub fn new(
        name: impl Into<String>,
        concurrency: &ConcurrencyConfig,
        rate: &RateLimitConfig,
        retry: &RetryConfig,
    ) -> Self {
        RateLimitedCaller {
            name: name.into(),
            semaphore: Arc::new(Semaphore::new(concurrency.max_in_flight.max(1))),
            window: RateWindow::from_config(rate),
            retry: retry.into(),
        }
    }

    /// Execute `work` under the limiter.
    ///
    /// `work` is invoked once per attempt; it must be safe to re-invoke after
    /// a transient failure. `estimated_tokens` is charged to the TPM window
    /// on entry and reconciled with [`CallOutcome::tokens_used`] on success.
    pub async fn call<T, F, Fut>(
        &self,
        estimated_tokens: u64,
        cancel: &CancellationToken,
        mut work: F,
    ) -> Result<T, UpstreamError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<CallOutcome<T>, UpstreamError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match self.attempt(estimated_tokens, cancel, &mut work).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.retry.max_retries => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        upstream = %self.name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient upstream error, backing off"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(UpstreamError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                Err(err) => {
                    if err.is_transient() {
                        warn!(
                            upstream = %self.name,
                            retries = self.retry.max_retries,
                            error = %err,
                            "retries exhausted"
                        );
                    }
                    return Err(err);
                }
            }
        }
    }

    async fn attempt<T, F, Fut>(
        &self,
        estimated_tokens: u64,
        cancel: &CancellationToken,
        work: &mut F,
    ) -> Result<T, UpstreamError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<CallOutcome<T>, UpstreamError>>,
    {
        // The permit is dropped on every exit path, including cancellation
        // inside the window wait or the call itself.
        let _permit = tokio::select! {
            _ = cancel.cancelled() => return Err(UpstreamError::Cancelled),
            permit = self.semaphore.acquire() => {
                permit.map_err(|_| UpstreamError::Cancelled)?
            }
        };

        let slot = self.window.acquire(estimated_tokens, cancel).await?;

        let result = tokio::select! {
            _ = cancel.cancelled() => Err(UpstreamError::Cancelled),
            outcome = work() => outcome,
        };

        match result {
            Ok(CallOutcome { value, tokens_used }) => {
                if let Some(actual) = tokens_used {
                    debug!(upstream = %self.name, estimated_tokens, actual, "reconciled token usage");
                    self.window.reconcile(slot, actual);
                }
                Ok(value)
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::Instant;

    fn caller(max_in_flight: usize, rpm: Option<u32>, max_retries: u32) -> RateLimitedCaller {
        RateLimitedCaller::new(
            "test",
            &ConcurrencyConfig { max_in_flight },
            &RateLimitConfig { rpm, tpm: None },
            &RetryConfig {
                max_retries,
                initial_backoff_s: 0.1,
                max_backoff_s: 1.0,
                backoff_multiplier: 2.0,
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_never_exceeds_the_cap() {
        let caller = Arc::new(caller(2, None, 0));
        let cancel = CancellationToken::new();
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let caller = caller.clone();
            let cancel = cancel.clone();
            let current = current.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                caller
                    .call(0, &cancel, || {
                        let current = current.clone();
                        let peak = peak.clone();
                        async move {
                            let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                            peak.fetch_max(now, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            current.fetch_sub(1, Ordering::SeqCst);
                            Ok(CallOutcome::new(()))
                        }
                    })
                    .await
                    .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_are_retried_until_success() {
        let caller = caller(1, None, 3);
        let cancel = CancellationToken::new();
        let attempts = AtomicUsize::new(0);

        let value = caller
            .call(0, &cancel, || {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(UpstreamError::Status(503))
                    } else {
                        Ok(CallOutcome::new(42))
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_errors_are_not_retried() {
        let caller = caller(1, None, 5);
        let cancel = CancellationToken::new();
        let attempts = AtomicUsize::new(0);

        let err = caller
            .call(0, &cancel, || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err::<CallOutcome<()>, _>(UpstreamError::Status(400)) }
            })
            .await
            .unwrap_err();

        assert_eq!(err, UpstreamError::Status(400));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_surface_the_last_error() {
        let caller = caller(1, None, 2);
        let cancel = CancellationToken::new();
        let attempts = AtomicUsize::new(0);

        let err = caller
            .call(0, &cancel, || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err::<CallOutcome<()>, _>(UpstreamError::Timeout) }
            })
            .await
            .unwrap_err();

        assert_eq!(err, UpstreamError::Timeout);
        // max_retries retries after the first attempt
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn rpm_bound_holds_across_retries() {
        let caller = Arc::new(caller(4, Some(2), 0));
        let cancel = CancellationToken::new();
        let start = Instant::now();

        for _ in 0..2 {
            caller
                .call(0, &cancel, || async { Ok(CallOutcome::new(())) })
                .await
                .unwrap();
        }
        assert!(start.elapsed() < Duration::from_secs(1));

        caller
            .call(0, &cancel, || async { Ok(CallOutcome::new(())) })
            .await
            .unwrap();
        assert!(start.elapsed() >= Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_backoff() {
        let caller = Arc::new(caller(1, None, 10));
        let cancel = CancellationToken::new();

        let handle = tokio::spawn({
            let caller = caller.clone();
            let cancel = cancel.clone();
            async move {
                caller
                    .call(0, &cancel, || async {
                        Err::<CallOutcome<()>, _>(UpstreamError::Status(500))
                    })
                    .await
            }
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();
        assert_eq!(handle.await.unwrap(), Err(UpstreamError::Cancelled));
    }
}
