use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

use dashmap::DashMap;

/// Circuit state for one (provider, model) endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Calls flow normally.
    Closed,
    /// Calls are suspended until the cooldown elapses.
    Open,
    /// One probe call is allowed; its outcome decides the next state.
    HalfOpen,
}

/// A point-in-time view of one endpoint's breaker, for health reporting.
#[derive(Debug, Clone)]
pub struct BreakerSnapshot {
    /// Current state after applying any due cooldown transition.
    pub state: BreakerState,
    /// Failures in the current rolling window.
    pub windowed_failures: usize,
    /// Consecutive failures since the last success.
    pub consecutive_failures: u32,
    /// Time left until an open breaker moves to half-open.
    pub cooldown_remaining: Option<Duration>,
}

#[derive(Debug)]
struct Entry {
    state: BreakerState,
    consecutive_failures: u32,
    window: VecDeque<Instant>,
    opened_at: Option<Instant>,
}

impl Entry {
    fn new() -> Self {
        Self {
            state: BreakerState::Closed,
            consecutive_failures: 0,
            window: VecDeque::new(),
            opened_at: None,
        }
    }
}

/// Per-endpoint circuit breaker.
///
/// Transitions: `CLOSED → OPEN` at the threshold number of failures within
/// the rolling window; `OPEN → HALF_OPEN` once the cooldown elapses;
/// `HALF_OPEN → CLOSED` on the next success and `HALF_OPEN → OPEN` on the
/// next failure, restarting the cooldown.
pub struct CircuitBreaker {
    entries: DashMap<String, Entry>,
    failure_threshold: usize,
    failure_window: Duration,
    cooldown: Duration,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(600), Duration::from_secs(600))
    }
}

impl CircuitBreaker {
    /// Create a breaker with explicit thresholds. The defaults are five
    /// failures in ten minutes, ten-minute cooldown.
    pub fn new(failure_threshold: usize, failure_window: Duration, cooldown: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            failure_threshold,
            failure_window,
            cooldown,
        }
    }

    /// Whether a call to this endpoint may be issued right now.
    pub fn is_callable(&self, key: &str) -> bool {
        self.state(key) != BreakerState::Open
    }

    /// Current state, applying any due `OPEN → HALF_OPEN` transition.
    pub fn state(&self, key: &str) -> BreakerState {
        self.state_at(key, Instant::now())
    }

    /// Record a breaker-tripping failure for this endpoint.
    pub fn record_failure(&self, key: &str) {
        self.record_failure_at(key, Instant::now());
    }

    /// Record a successful call for this endpoint.
    pub fn record_success(&self, key: &str) {
        self.record_success_at(key, Instant::now());
    }

    /// Point-in-time view for health reporting.
    pub fn snapshot(&self, key: &str) -> BreakerSnapshot {
        self.snapshot_at(key, Instant::now())
    }

    fn state_at(&self, key: &str, now: Instant) -> BreakerState {
        let Some(mut entry) = self.entries.get_mut(key) else {
            return BreakerState::Closed;
        };

        self.apply_cooldown(&mut entry, now);
        entry.state
    }

    fn record_failure_at(&self, key: &str, now: Instant) {
        let mut entry = self.entries.entry(key.to_string()).or_insert_with(Entry::new);

        self.apply_cooldown(&mut entry, now);
        self.prune_window(&mut entry, now);

        entry.consecutive_failures += 1;
        entry.window.push_back(now);

        match entry.state {
            BreakerState::Closed if entry.window.len() >= self.failure_threshold => {
                log::warn!(
                    "Circuit breaker for {key} opened after {} failures within the window",
                    entry.window.len()
                );
                entry.state = BreakerState::Open;
                entry.opened_at = Some(now);
            }
            BreakerState::HalfOpen => {
                log::warn!("Circuit breaker for {key} re-opened after a failed probe");
                entry.state = BreakerState::Open;
                entry.opened_at = Some(now);
            }
            _ => {}
        }
    }

    fn record_success_at(&self, key: &str, now: Instant) {
        let Some(mut entry) = self.entries.get_mut(key) else {
            return;
        };

        self.apply_cooldown(&mut entry, now);

        if entry.state == BreakerState::HalfOpen {
            log::info!("Circuit breaker for {key} closed after a successful probe");
            entry.state = BreakerState::Closed;
            entry.opened_at = None;
            entry.window.clear();
        }

        entry.consecutive_failures = 0;
    }

    fn snapshot_at(&self, key: &str, now: Instant) -> BreakerSnapshot {
        let Some(mut entry) = self.entries.get_mut(key) else {
            return BreakerSnapshot {
                state: BreakerState::Closed,
                windowed_failures: 0,
                consecutive_failures: 0,
                cooldown_remaining: None,
            };
        };

        self.apply_cooldown(&mut entry, now);
        self.prune_window(&mut entry, now);

        let cooldown_remaining = match (entry.state, entry.opened_at) {
            (BreakerState::Open, Some(opened_at)) => Some(self.cooldown.saturating_sub(now - opened_at)),
            _ => None,
        };

        BreakerSnapshot {
            state: entry.state,
            windowed_failures: entry.window.len(),
            consecutive_failures: entry.consecutive_failures,
            cooldown_remaining,
        }
    }

    fn apply_cooldown(&self, entry: &mut Entry, now: Instant) {
        if entry.state == BreakerState::Open
            && let Some(opened_at) = entry.opened_at
            && now - opened_at >= self.cooldown
        {
            entry.state = BreakerState::HalfOpen;
        }
    }

    fn prune_window(&self, entry: &mut Entry, now: Instant) {
        while let Some(front) = entry.window.front() {
            if now - *front >= self.failure_window {
                entry.window.pop_front();
            } else {
                break;
            }
        }
    }
}
