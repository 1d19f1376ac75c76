//! Sliding-window RPM/TPM accounting
//!
//! Each admitted call occupies one request slot and a token amount for 60
//! seconds from admission. Waiters sleep until the oldest entry leaves the
//! window and re-check; admission order among concurrent waiters is
//! unspecified.

use kgraph_core::config::RateLimitConfig;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::UpstreamError;

/// The sliding window length.
const WINDOW: Duration = Duration::from_secs(60);

/// Handle to one admitted window entry, used to reconcile its token cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotId(u64);

#[derive(Debug)]
struct Entry {
    id: u64,
    at: Instant,
    tokens: u64,
}

/// RPM/TPM budget over a sliding 60-second window.
///
/// `None` caps are unlimited. Token estimates larger than the whole TPM cap
/// are clamped to it on entry so the call can still be admitted into an
/// empty window.
#[derive(Debug)]
pub struct RateWindow {
    rpm: Option<u32>,
    tpm: Option<u64>,
    entries: Mutex<VecDeque<Entry>>,
    next_id: AtomicU64,
}

impl RateWindow {
    /// A window with the given caps.
    pub fn new(rpm: Option<u32>, tpm: Option<u64>) -> Self {
        RateWindow {
            rpm,
            tpm,
            entries: Mutex::new(VecDeque::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// A window from the config section.
    pub fn from_config(cfg: &RateLimitConfig) -> Self {
        Self::new(cfg.rpm, cfg.tpm)
    }

    /// Block until one request slot and `estimated_tokens` fit in the
    /// window, then record the entry. Returns the entry's [`SlotId`] for
    /// later reconciliation.
    pub async fn acquire(
        &self,
        estimated_tokens: u64,
        cancel: &CancellationToken,
    ) -> Result<SlotId, UpstreamError> {
        let tokens = match self.tpm {
            Some(cap) => estimated_tokens.min(cap),
            None => estimated_tokens,
        };

        loop {
            let wait = {
                let mut entries = self.entries.lock();
                let now = Instant::now();
                Self::prune(&mut entries, now);

                let requests = entries.len();
                let spent: u64 = entries.iter().map(|e| e.tokens).sum();
                let rpm_ok = self.rpm.map_or(true, |cap| requests < cap as usize);
                let tpm_ok = self.tpm.map_or(true, |cap| spent.saturating_add(tokens) <= cap);

                if rpm_ok && tpm_ok {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    entries.push_back(Entry { id, at: now, tokens });
                    return Ok(SlotId(id));
                }

                entries
                    .front()
                    .map(|e| (e.at + WINDOW).duration_since(now))
                    .unwrap_or(WINDOW)
            };

            tokio::select! {
                _ = cancel.cancelled() => return Err(UpstreamError::Cancelled),
                _ = tokio::time::sleep(wait.max(Duration::from_millis(5))) => {}
            }
        }
    }

    /// Replace the entry's estimated token cost with the actual usage the
    /// upstream reported. A no-op when the entry already left the window.
    pub fn reconcile(&self, slot: SlotId, actual_tokens: u64) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.iter_mut().find(|e| e.id == slot.0) {
            entry.tokens = actual_tokens;
        }
    }

    /// Requests currently counted in the window.
    pub fn in_window(&self) -> usize {
        let mut entries = self.entries.lock();
        Self::prune(&mut entries, Instant::now());
        entries.len()
    }

    fn prune(entries: &mut VecDeque<Entry>, now: Instant) {
        while entries
            .front()
            .is_some_and(|e| now.duration_since(e.at) >= WINDOW)
        {
            entries.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn third_request_waits_out_the_window() {
        let window = RateWindow::new(Some(2), None);
        let cancel = CancellationToken::new();
        let start = Instant::now();

        window.acquire(0, &cancel).await.unwrap();
        window.acquire(0, &cancel).await.unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));

        window.acquire(0, &cancel).await.unwrap();
        assert!(start.elapsed() >= WINDOW);
    }

    #[tokio::test(start_paused = true)]
    async fn token_budget_blocks_until_slots_expire() {
        let window = RateWindow::new(None, Some(100));
        let cancel = CancellationToken::new();
        let start = Instant::now();

        window.acquire(80, &cancel).await.unwrap();
        // 80 + 30 > 100: must wait for the first entry to age out
        window.acquire(30, &cancel).await.unwrap();
        assert!(start.elapsed() >= WINDOW);
    }

    #[tokio::test(start_paused = true)]
    async fn reconcile_frees_budget_immediately() {
        let window = RateWindow::new(None, Some(100));
        let cancel = CancellationToken::new();
        let start = Instant::now();

        let slot = window.acquire(80, &cancel).await.unwrap();
        window.reconcile(slot, 10);

        window.acquire(80, &cancel).await.unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_estimate_is_clamped_to_the_cap() {
        let window = RateWindow::new(None, Some(100));
        let cancel = CancellationToken::new();

        // Would never fit unclamped
        window.acquire(10_000, &cancel).await.unwrap();
        assert_eq!(window.in_window(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_the_wait() {
        let window = std::sync::Arc::new(RateWindow::new(Some(1), None));
        let cancel = CancellationToken::new();
        window.acquire(0, &cancel).await.unwrap();

        let waiter = tokio::spawn({
            let window = window.clone();
            let cancel = cancel.clone();
            async move { window.acquire(0, &cancel).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();
        assert_eq!(waiter.await.unwrap(), Err(UpstreamError::Cancelled));
    }
}
