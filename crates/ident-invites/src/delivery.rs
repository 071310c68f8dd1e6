//! Per-invite delivery bookkeeping: at most one attempt in flight per invite,
//! and an optional backoff between failed attempts.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ident_common::config::{RetryConfig, RetryPolicyKind};
use tokio::time::Instant;

/// When a failed delivery may be tried again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Next tick or bind event.
    Immediate,
    /// `base * 2^(attempts-1)`, capped at `max`.
    ExponentialBackoff { base: Duration, max: Duration },
}

impl RetryPolicy {
    pub fn from_config(cfg: &RetryConfig) -> Self {
        match cfg.policy {
            RetryPolicyKind::Immediate => Self::Immediate,
            RetryPolicyKind::Exponential => Self::ExponentialBackoff {
                base: Duration::from_secs(cfg.base_secs),
                max: Duration::from_secs(cfg.max_secs.max(cfg.base_secs)),
            },
        }
    }

    /// Wait imposed after `attempts` consecutive failed attempts.
    pub fn delay_after(&self, attempts: u32) -> Duration {
        match *self {
            Self::Immediate => Duration::ZERO,
            Self::ExponentialBackoff { base, max } => {
                if attempts == 0 {
                    return Duration::ZERO;
                }
                let factor = 1u32.checked_shl(attempts - 1).unwrap_or(u32::MAX);
                base.checked_mul(factor).map_or(max, |d| d.min(max))
            }
        }
    }
}

#[derive(Debug, Default, Clone)]
struct DeliveryState {
    /// Attempts since the last success. Reset by a successful delivery.
    attempts: u32,
    last_attempt_at: Option<Instant>,
    next_eligible_at: Option<Instant>,
    in_flight: bool,
}

/// Tracks delivery attempts keyed by invite id.
#[derive(Clone)]
pub struct DeliveryTracker {
    policy: RetryPolicy,
    states: Arc<Mutex<HashMap<String, DeliveryState>>>,
}

impl DeliveryTracker {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy, states: Arc::new(Mutex::new(HashMap::new())) }
    }

    /// Claim the right to attempt delivery of `id`.
    ///
    /// `None` when another attempt is in flight or the backoff has not elapsed.
    pub fn begin(&self, id: &str) -> Option<DeliveryGuard> {
        let mut states = self.states.lock().unwrap_or_else(|p| p.into_inner());
        let state = states.entry(id.to_owned()).or_default();
        if state.in_flight {
            return None;
        }
        if state.next_eligible_at.is_some_and(|at| Instant::now() < at) {
            return None;
        }
        state.in_flight = true;
        state.attempts = state.attempts.saturating_add(1);
        state.last_attempt_at = Some(Instant::now());
        Some(DeliveryGuard { tracker: self.clone(), id: id.to_owned(), settled: false })
    }

    /// Attempts made for `id` since its last successful delivery.
    pub fn attempts(&self, id: &str) -> u32 {
        self.states
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(id)
            .map_or(0, |s| s.attempts)
    }

    /// When the last attempt for `id` started.
    pub fn last_attempt_at(&self, id: &str) -> Option<Instant> {
        self.states
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(id)
            .and_then(|s| s.last_attempt_at)
    }

    fn settle(&self, id: &str, delivered: bool) {
        let mut states = self.states.lock().unwrap_or_else(|p| p.into_inner());
        if delivered {
            states.remove(id);
            return;
        }
        let state = states.entry(id.to_owned()).or_default();
        state.in_flight = false;
        let delay = self.policy.delay_after(state.attempts);
        state.next_eligible_at = (!delay.is_zero()).then(|| Instant::now() + delay);
    }
}

/// An in-flight attempt. Dropping it without [`DeliveryGuard::delivered`]
/// records a failure.
pub struct DeliveryGuard {
    tracker: DeliveryTracker,
    id: String,
    settled: bool,
}

impl DeliveryGuard {
    pub fn delivered(mut self) {
        self.settled = true;
        self.tracker.settle(&self.id, true);
    }

    pub fn failed(mut self) {
        self.settled = true;
        self.tracker.settle(&self.id, false);
    }
}

impl Drop for DeliveryGuard {
    fn drop(&mut self) {
        if !self.settled {
            self.tracker.settle(&self.id, false);
        }
    }
}
