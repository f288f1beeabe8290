//! Rolling-window submission limits.
//!
//! Each [`WindowLimit`] allows at most `max_requests` submissions in any rolling
//! `window`. A [`Pacer`] enforces several limits at once (e.g. 5 per 4 s and 58 per
//! 10 min) by keeping one sliding log of submission instants per limit.
//!
//! The pacer never sleeps itself: [`Pacer::ready_at`] tells the caller when the next
//! submission is allowed, so the caller can wait on that deadline together with other
//! events.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tokio::time::{Duration, Instant};

/// At most `max_requests` submissions per rolling `window_secs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WindowLimit {
    pub max_requests: usize,
    pub window_secs: u64,
}

impl WindowLimit {
    pub const fn new(max_requests: usize, window_secs: u64) -> Self {
        Self {
            max_requests,
            window_secs,
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

#[derive(Debug, Clone)]
struct SlidingLog {
    limit: WindowLimit,
    stamps: VecDeque<Instant>,
}

impl SlidingLog {
    fn prune(&mut self, now: Instant) {
        let window = self.limit.window();
        while self
            .stamps
            .front()
            .is_some_and(|&t| now.saturating_duration_since(t) >= window)
        {
            self.stamps.pop_front();
        }
    }

    fn ready_at(&mut self, now: Instant) -> Option<Instant> {
        self.prune(now);
        if self.stamps.len() < self.limit.max_requests {
            return None;
        }
        // The oldest stamp that must leave the window before another fits.
        let idx = self.stamps.len() - self.limit.max_requests;
        self.stamps.get(idx).map(|&t| t + self.limit.window())
    }
}

/// Enforces every configured [`WindowLimit`] at once.
#[derive(Debug, Clone)]
pub struct Pacer {
    logs: Vec<SlidingLog>,
}

impl Pacer {
    /// Limits with `max_requests == 0` are ignored.
    pub fn new(limits: &[WindowLimit]) -> Self {
        Self {
            logs: limits
                .iter()
                .filter(|l| l.max_requests > 0)
                .map(|&limit| SlidingLog {
                    limit,
                    stamps: VecDeque::with_capacity(limit.max_requests),
                })
                .collect(),
        }
    }

    /// `None` when a submission is allowed at `now`, otherwise the earliest instant at
    /// which every limit has room again.
    pub fn ready_at(&mut self, now: Instant) -> Option<Instant> {
        self.logs
            .iter_mut()
            .filter_map(|log| log.ready_at(now))
            .max()
    }

    /// Record a submission at `now`.
    pub fn record(&mut self, now: Instant) {
        for log in &mut self.logs {
            log.stamps.push_back(now);
        }
    }

    /// Submissions inside the widest window.
    pub fn recent(&mut self, now: Instant) -> usize {
        self.logs
            .iter_mut()
            .map(|log| {
                log.prune(now);
                log.stamps.len()
            })
            .max()
            .unwrap_or(0)
    }
}
