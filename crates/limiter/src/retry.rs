//! Exponential backoff with jitter

use kgraph_core::config::RetryConfig;
use rand::Rng;
use std::time::Duration;

/// Retry schedule for transient upstream errors.
///
/// The delay before retry `attempt` (0-based) is
/// `min(max_backoff, initial_backoff · multiplier^attempt)` scaled by a
/// uniform jitter factor in [0.5, 1.0].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
    /// First backoff delay.
    pub initial_backoff: Duration,
    /// Backoff ceiling.
    pub max_backoff: Duration,
    /// Per-attempt multiplier.
    pub multiplier: f64,
}

impl RetryPolicy {
    /// Delay to sleep before retrying after `attempt` failures.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.initial_backoff.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = base.min(self.max_backoff.as_secs_f64());
        let jitter = rand::thread_rng().gen_range(0.5..=1.0);
        Duration::from_secs_f64(capped * jitter)
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(cfg: &RetryConfig) -> Self {
        RetryPolicy {
            max_retries: cfg.max_retries,
            initial_backoff: Duration::from_secs_f64(cfg.initial_backoff_s.max(0.0)),
            max_backoff: Duration::from_secs_f64(cfg.max_backoff_s.max(0.0)),
            multiplier: cfg.backoff_multiplier.max(1.0),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        (&RetryConfig::default()).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(8),
            multiplier: 2.0,
        }
    }

    #[test]
    fn delay_grows_and_stays_within_jitter_bounds() {
        let p = policy();
        for attempt in 0..6 {
            let nominal = (1.0f64 * 2.0f64.powi(attempt)).min(8.0);
            for _ in 0..50 {
                let d = p.delay_for(attempt as u32).as_secs_f64();
                assert!(d >= nominal * 0.5 - 1e-9, "attempt {attempt}: {d} too small");
                assert!(d <= nominal + 1e-9, "attempt {attempt}: {d} too large");
            }
        }
    }

    #[test]
    fn delay_is_capped_at_max_backoff() {
        let p = policy();
        let d = p.delay_for(30);
        assert!(d <= Duration::from_secs(8));
    }

    #[test]
    fn multiplier_below_one_is_clamped() {
        let cfg = RetryConfig {
            backoff_multiplier: 0.1,
            ..RetryConfig::default()
        };
        let p = RetryPolicy::from(&cfg);
        assert_eq!(p.multiplier, 1.0);
    }
}
