//! Fixed-window request counting keyed by client identifier.
//!
//! Counters live in a [`DashMap`]; every check is a single entry-locked
//! read-modify-write, so concurrent requests from one client cannot both
//! observe the window as under its ceiling. Memory is bounded by a periodic
//! sweep of elapsed windows plus a hard cap on tracked keys.
//!
//! Window starts are also queued in arrival order. Sweeping and eviction pop
//! from the front of that queue, so neither scans the whole table.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;
use tracing::debug;

/// Default tracked-key ceiling per limiter.
pub const DEFAULT_MAX_KEYS: usize = 100_000;

/// Window length and ceiling for one limiter instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub window: Duration,
    pub max_requests: u32,
    pub max_keys: usize,
}

impl RateLimitPolicy {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests,
            max_keys: DEFAULT_MAX_KEYS,
        }
    }

    pub fn with_max_keys(mut self, max_keys: usize) -> Self {
        self.max_keys = max_keys.max(1);
        self
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Outcome of a single [`FixedWindowLimiter::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Time until the current window closes.
    pub reset_after: Duration,
}

impl RateDecision {
    /// Seconds until reset, rounded up (never zero while a window is open).
    pub fn reset_secs(&self) -> u64 {
        let secs = self.reset_after.as_secs();
        if self.reset_after.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs
        }
    }
}

/// Window starts in arrival order. A record whose start no longer matches the
/// key's current window is stale and skipped when popped.
type StartQueue = VecDeque<(String, Instant)>;

/// Per-key fixed-window counter.
///
/// A disabled limiter is an explicit pass-through: every check is allowed
/// and nothing is recorded.
#[derive(Debug)]
pub struct FixedWindowLimiter {
    policy: RateLimitPolicy,
    enabled: bool,
    windows: DashMap<String, Window>,
    /// Also serializes admission of new keys so the cap holds under
    /// concurrent inserts. Never locked while a map shard is held.
    starts: Mutex<StartQueue>,
}

impl FixedWindowLimiter {
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self {
            policy,
            enabled: true,
            windows: DashMap::new(),
            starts: Mutex::new(VecDeque::new()),
        }
    }

    /// A limiter that admits everything.
    pub fn disabled(policy: RateLimitPolicy) -> Self {
        Self {
            enabled: false,
            ..Self::new(policy)
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn policy(&self) -> RateLimitPolicy {
        self.policy
    }

    /// Number of tracked client keys.
    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }

    /// Count one request for `key` and decide whether it is admitted.
    ///
    /// The window starts at the first request for the key and resets once
    /// `policy.window` has elapsed from that instant.
    pub fn check(&self, key: &str) -> RateDecision {
        let limit = self.policy.max_requests;
        if !self.enabled {
            return RateDecision {
                allowed: true,
                limit,
                remaining: limit,
                reset_after: self.policy.window,
            };
        }

        let now = Instant::now();
        if let Some(mut window) = self.windows.get_mut(key) {
            let (decision, restarted) = self.count(&mut window, now);
            drop(window);
            if restarted {
                self.starts().push_back((key.to_owned(), now));
            }
            return decision;
        }
        self.admit(key, now)
    }

    /// Track a key not yet in the table, making room first when at the cap.
    fn admit(&self, key: &str, now: Instant) -> RateDecision {
        let mut starts = self.starts();
        if !self.windows.contains_key(key) {
            while self.windows.len() >= self.policy.max_keys {
                if !self.evict_front(&mut starts, now) {
                    break;
                }
            }
        }

        let mut window = self.windows.entry(key.to_owned()).or_insert(Window {
            started: now,
            count: 0,
        });
        let (decision, restarted) = self.count(&mut window, now);
        if restarted {
            starts.push_back((key.to_owned(), now));
        }
        decision
    }

    /// Count against `window`. The flag reports a window that began at `now`.
    fn count(&self, window: &mut Window, now: Instant) -> (RateDecision, bool) {
        let limit = self.policy.max_requests;
        let fresh = window.count == 0;
        let restarted = if now.duration_since(window.started) >= self.policy.window {
            window.started = now;
            window.count = 0;
            true
        } else {
            fresh
        };
        window.count = window.count.saturating_add(1);

        let elapsed = now.duration_since(window.started);
        let decision = RateDecision {
            allowed: window.count <= limit,
            limit,
            remaining: limit.saturating_sub(window.count),
            reset_after: self.policy.window.saturating_sub(elapsed),
        };
        (decision, restarted)
    }

    /// Drop every window that has fully elapsed. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    fn sweep_at(&self, now: Instant) -> usize {
        let mut starts = self.starts();
        let mut removed = 0;
        while let Some((_, started)) = starts.front() {
            if now.duration_since(*started) < self.policy.window {
                break;
            }
            if let Some((key, started)) = starts.pop_front()
                && self.remove_window(&key, started)
            {
                removed += 1;
            }
        }
        removed
    }

    /// Remove the oldest window: an elapsed one if any, else the oldest live
    /// one. Returns `false` once nothing is left to remove.
    fn evict_front(&self, starts: &mut StartQueue, now: Instant) -> bool {
        while let Some((key, started)) = starts.pop_front() {
            if self.remove_window(&key, started) {
                if now.duration_since(started) < self.policy.window {
                    debug!(
                        max_keys = self.policy.max_keys,
                        "rate limiter evicted oldest window at capacity"
                    );
                }
                return true;
            }
        }
        false
    }

    fn remove_window(&self, key: &str, started: Instant) -> bool {
        self.windows
            .remove_if(key, |_, w| w.started == started)
            .is_some()
    }

    fn starts(&self) -> MutexGuard<'_, StartQueue> {
        self.starts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawn a periodic sweep of expired windows.
    pub fn spawn_sweep_task(self: &Arc<Self>, period: Duration) -> tokio::task::JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let removed = limiter.sweep_expired();
                if removed > 0 {
                    debug!(removed, "rate limiter sweep");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(15 * 60);

    fn limiter(max: u32) -> FixedWindowLimiter {
        FixedWindowLimiter::new(RateLimitPolicy::new(WINDOW, max))
    }

    #[tokio::test(start_paused = true)]
    async fn admits_up_to_ceiling_then_rejects() {
        let l = limiter(5);
        for i in 0..5 {
            let d = l.check("10.0.0.1");
            assert!(d.allowed, "request {i} should pass");
            assert_eq!(d.remaining, 4 - i);
        }
        let d = l.check("10.0.0.1");
        assert!(!d.allowed);
        assert_eq!(d.remaining, 0);
        assert_eq!(d.limit, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn window_resets_after_elapsing() {
        let l = limiter(2);
        l.check("k");
        l.check("k");
        assert!(!l.check("k").allowed);

        tokio::time::advance(WINDOW).await;
        let d = l.check("k");
        assert!(d.allowed);
        assert_eq!(d.remaining, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn window_is_anchored_at_first_request() {
        let l = limiter(2);
        l.check("k");
        tokio::time::advance(WINDOW / 2).await;
        l.check("k");
        assert!(!l.check("k").allowed);

        // Half a window after the second request is a full window after the first.
        tokio::time::advance(WINDOW / 2).await;
        assert!(l.check("k").allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_after_counts_down() {
        let l = limiter(3);
        assert_eq!(l.check("k").reset_secs(), WINDOW.as_secs());
        tokio::time::advance(Duration::from_millis(1500)).await;
        assert_eq!(l.check("k").reset_secs(), WINDOW.as_secs() - 1);
    }

    #[tokio::test(start_paused = true)]
    async fn keys_are_independent() {
        let l = limiter(1);
        assert!(l.check("a").allowed);
        assert!(!l.check("a").allowed);
        assert!(l.check("b").allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_limiter_is_pass_through() {
        let l = FixedWindowLimiter::disabled(RateLimitPolicy::new(WINDOW, 1));
        for _ in 0..50 {
            assert!(l.check("k").allowed);
        }
        assert_eq!(l.tracked_keys(), 0);
        assert!(!l.is_enabled());
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_drops_only_elapsed_windows() {
        let l = limiter(10);
        l.check("old");
        tokio::time::advance(WINDOW / 2).await;
        l.check("fresh");
        tokio::time::advance(WINDOW / 2).await;

        assert_eq!(l.sweep_expired(), 1);
        assert_eq!(l.tracked_keys(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cap_evicts_oldest_window() {
        let l = FixedWindowLimiter::new(RateLimitPolicy::new(WINDOW, 1).with_max_keys(2));
        l.check("first");
        tokio::time::advance(Duration::from_secs(1)).await;
        l.check("second");
        tokio::time::advance(Duration::from_secs(1)).await;
        l.check("third");

        assert_eq!(l.tracked_keys(), 2);
        // "first" was evicted, so it gets a fresh window.
        assert!(l.check("first").allowed);
        assert!(!l.check("third").allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn cap_prefers_sweeping_expired_windows() {
        let l = FixedWindowLimiter::new(RateLimitPolicy::new(WINDOW, 1).with_max_keys(2));
        l.check("stale");
        tokio::time::advance(WINDOW / 2).await;
        l.check("live");
        tokio::time::advance(WINDOW / 2).await;
        l.check("new");

        // "live" survives because the sweep freed the slot.
        assert!(!l.check("live").allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn eviction_skips_windows_that_restarted() {
        let l = FixedWindowLimiter::new(RateLimitPolicy::new(WINDOW, 1).with_max_keys(2));
        l.check("a");
        tokio::time::advance(Duration::from_secs(1)).await;
        l.check("b");
        tokio::time::advance(WINDOW - Duration::from_secs(1)).await;
        // "a" opens a new window; "b" is now the oldest live one.
        assert!(l.check("a").allowed);
        l.check("c");

        assert_eq!(l.tracked_keys(), 2);
        assert!(!l.check("a").allowed);
        assert!(l.check("b").allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_ignores_superseded_starts() {
        let l = limiter(10);
        l.check("k");
        tokio::time::advance(WINDOW).await;
        l.check("k");

        assert_eq!(l.sweep_expired(), 0);
        assert_eq!(l.tracked_keys(), 1);
        tokio::time::advance(WINDOW).await;
        assert_eq!(l.sweep_expired(), 1);
        assert_eq!(l.tracked_keys(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_new_keys_respect_the_cap() {
        let l = Arc::new(FixedWindowLimiter::new(
            RateLimitPolicy::new(WINDOW, 5).with_max_keys(8),
        ));
        let mut handles = Vec::new();
        for i in 0..256 {
            let l = Arc::clone(&l);
            handles.push(tokio::spawn(async move {
                l.check(&format!("10.0.{}.{}", i / 256, i % 256)).allowed
            }));
        }
        for h in handles {
            assert!(h.await.unwrap());
        }
        assert_eq!(l.tracked_keys(), 8);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_checks_never_overshoot() {
        let l = Arc::new(limiter(10));
        let mut handles = Vec::new();
        for _ in 0..64 {
            let l = Arc::clone(&l);
            handles.push(tokio::spawn(async move { l.check("shared").allowed }));
        }
        let mut admitted = 0;
        for h in handles {
            if h.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_task_reclaims_elapsed_windows() {
        let l = Arc::new(limiter(10));
        l.check("k");
        let handle = l.spawn_sweep_task(Duration::from_secs(60));

        tokio::time::sleep(WINDOW + Duration::from_secs(120)).await;
        assert_eq!(l.tracked_keys(), 0);
        handle.abort();
    }
}
