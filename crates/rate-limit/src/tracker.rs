use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

use catalog::RateLimits;
use dashmap::DashMap;

const MINUTE: Duration = Duration::from_secs(60);
const DAY: Duration = Duration::from_secs(86_400);

#[derive(Debug, Default)]
struct Windows {
    requests: VecDeque<Instant>,
    tokens: VecDeque<(Instant, u64)>,
}

impl Windows {
    fn prune(&mut self, now: Instant, horizon: Duration) {
        while self.requests.front().is_some_and(|t| now - *t >= horizon) {
            self.requests.pop_front();
        }

        while self.tokens.front().is_some_and(|(t, _)| now - *t >= horizon) {
            self.tokens.pop_front();
        }
    }

    fn token_total(&self) -> u64 {
        self.tokens.iter().map(|(_, n)| n).sum()
    }
}

#[derive(Debug, Default)]
struct Entry {
    minute: Windows,
    day: Windows,
}

/// Rolling per-(provider, model) request and token accounting.
///
/// Pure bookkeeping: `would_exceed` answers whether a projected call fits
/// inside every active window, and nothing here ever sleeps. A rate limit
/// of zero means the provider documents no ceiling for that window.
#[derive(Default)]
pub struct RateTracker {
    entries: DashMap<String, Entry>,
}

impl RateTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether issuing one more request with the projected token usage
    /// would overflow any active window.
    pub fn would_exceed(&self, key: &str, limits: &RateLimits, projected_tokens: u64) -> bool {
        self.would_exceed_at(key, limits, projected_tokens, Instant::now())
    }

    /// Count an issued request against the minute and day windows.
    pub fn record_request(&self, key: &str) {
        self.record_request_at(key, Instant::now());
    }

    /// Count actual token usage once a call has completed.
    pub fn record_tokens(&self, key: &str, tokens: u64) {
        self.record_tokens_at(key, tokens, Instant::now());
    }

    fn would_exceed_at(&self, key: &str, limits: &RateLimits, projected_tokens: u64, now: Instant) -> bool {
        let Some(mut entry) = self.entries.get_mut(key) else {
            // Nothing recorded yet: only a projection larger than a whole
            // window can overflow.
            return (limits.tpm > 0 && projected_tokens > limits.tpm)
                || (limits.tpd > 0 && projected_tokens > limits.tpd);
        };

        entry.minute.prune(now, MINUTE);
        entry.day.prune(now, DAY);

        if limits.rpm > 0 && entry.minute.requests.len() as u64 + 1 > limits.rpm {
            return true;
        }

        if limits.rpd > 0 && entry.day.requests.len() as u64 + 1 > limits.rpd {
            return true;
        }

        if limits.tpm > 0 && entry.minute.token_total() + projected_tokens > limits.tpm {
            return true;
        }

        if limits.tpd > 0 && entry.day.token_total() + projected_tokens > limits.tpd {
            return true;
        }

        false
    }

    fn record_request_at(&self, key: &str, now: Instant) {
        let mut entry = self.entries.entry(key.to_string()).or_default();

        entry.minute.prune(now, MINUTE);
        entry.day.prune(now, DAY);
        entry.minute.requests.push_back(now);
        entry.day.requests.push_back(now);
    }

    fn record_tokens_at(&self, key: &str, tokens: u64, now: Instant) {
        let mut entry = self.entries.entry(key.to_string()).or_default();

        entry.minute.tokens.push_back((now, tokens));
        entry.day.tokens.push_back((now, tokens));
    }
}
