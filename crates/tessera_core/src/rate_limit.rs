//! In-process, per-user sliding-window rate limiter (spec.md §4.2 step 3).
//!
//! State lives in process memory only — it is advisory, not persisted,
//! and restarting the control plane resets it (spec.md §4.2, §9 "Rate-limit
//! state"). Guarded by per-key locks (`DashMap`'s sharded internal
//! mutexes) so one user's bucket never blocks another's.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tessera_ids::UserId;

const WINDOW: Duration = Duration::from_secs(60);

/// Sliding 60s request-count window per user.
pub struct RateLimiter {
    windows: DashMap<UserId, VecDeque<Instant>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

pub struct RateLimitResult {
    pub allowed: bool,
    /// Requests remaining in the current window if allowed.
    pub remaining: u32,
    /// Seconds until the oldest request ages out of the window.
    pub retry_after_seconds: u64,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            windows: DashMap::new(),
        }
    }

    /// Record a request attempt and report whether it's within
    /// `requests_per_minute`. Evicts entries older than the 60s window
    /// before counting, per spec.md §4.2 step 3.
    pub fn check_and_record(&self, user_id: UserId, requests_per_minute: u32) -> RateLimitResult {
        let now = Instant::now();
        let mut entry = self.windows.entry(user_id).or_default();

        while matches!(entry.front(), Some(t) if now.duration_since(*t) >= WINDOW) {
            entry.pop_front();
        }

        if entry.len() >= requests_per_minute as usize {
            let retry_after = entry
                .front()
                .map(|oldest| WINDOW.saturating_sub(now.duration_since(*oldest)))
                .unwrap_or(WINDOW);
            return RateLimitResult {
                allowed: false,
                remaining: 0,
                retry_after_seconds: retry_after.as_secs().max(1),
            };
        }

        entry.push_back(now);
        RateLimitResult {
            allowed: true,
            remaining: requests_per_minute.saturating_sub(entry.len() as u32),
            retry_after_seconds: 0,
        }
    }

    /// Read the current window without recording a new request. Used to
    /// render `X-RateLimit-*` response headers on endpoints that don't
    /// themselves consume a slot (spec.md §6.1).
    pub fn peek(&self, user_id: UserId, requests_per_minute: u32) -> RateLimitResult {
        let now = Instant::now();
        let count = self
            .windows
            .get(&user_id)
            .map(|entry| entry.iter().filter(|t| now.duration_since(**t) < WINDOW).count())
            .unwrap_or(0) as u32;
        let remaining = requests_per_minute.saturating_sub(count);
        let retry_after_seconds = if remaining > 0 {
            0
        } else {
            self.windows
                .get(&user_id)
                .and_then(|entry| entry.front().copied())
                .map(|oldest| WINDOW.saturating_sub(now.duration_since(oldest)).as_secs().max(1))
                .unwrap_or(0)
        };
        RateLimitResult {
            allowed: remaining > 0,
            remaining,
            retry_after_seconds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_the_per_minute_limit() {
        let limiter = RateLimiter::new();
        let user = UserId::new();
        for _ in 0..3 {
            assert!(limiter.check_and_record(user, 3).allowed);
        }
        assert!(!limiter.check_and_record(user, 3).allowed);
    }

    #[test]
    fn different_users_have_independent_windows() {
        let limiter = RateLimiter::new();
        let a = UserId::new();
        let b = UserId::new();
        assert!(limiter.check_and_record(a, 1).allowed);
        assert!(!limiter.check_and_record(a, 1).allowed);
        assert!(limiter.check_and_record(b, 1).allowed);
    }
}
