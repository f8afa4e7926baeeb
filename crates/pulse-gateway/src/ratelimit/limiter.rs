//! Windowed rate limiter
//!
//! Counts actions per (actor, action class) pair against the configured
//! rules. Each bucket covers one window; when the window elapses the
//! count resets. A denied check reports how long until the window turns
//! over so the client can be told when to retry.

use dashmap::DashMap;
use pulse_common::{RateLimitConfig, RateLimitRule};
use std::time::{Duration, Instant};

/// The classes of client action that are limited independently
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionClass {
    Identify,
    Resume,
    PresenceUpdate,
    LazyRequest,
    /// Any inbound frame; the overall flood budget
    Recv,
}

impl ActionClass {
    fn rule(self, config: &RateLimitConfig) -> RateLimitRule {
        match self {
            Self::Identify => config.identify,
            Self::Resume => config.resume,
            Self::PresenceUpdate => config.presence_update,
            Self::LazyRequest => config.lazy_request,
            Self::Recv => config.recv,
        }
    }
}

/// Outcome of a rate limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    /// Over the limit; retry once the current window turns over
    Deny { retry_after: Duration },
}

impl Decision {
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

#[derive(Debug)]
struct Bucket {
    window_start: Instant,
    count: u32,
}

/// Counts actions per actor and action class
pub struct RateLimiter {
    buckets: DashMap<(String, ActionClass), Bucket>,
    config: RateLimitConfig,
}

impl RateLimiter {
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            buckets: DashMap::new(),
            config,
        }
    }

    /// Count one action and decide whether it is within the limit.
    ///
    /// The actor key is the connection ID so limits are per connection,
    /// not per user.
    pub fn check(&self, actor: &str, action: ActionClass) -> Decision {
        let rule = action.rule(&self.config);
        let window = Duration::from_secs(rule.window_secs);
        let now = Instant::now();

        let mut bucket = self
            .buckets
            .entry((actor.to_string(), action))
            .or_insert_with(|| Bucket {
                window_start: now,
                count: 0,
            });

        let elapsed = now.duration_since(bucket.window_start);
        if elapsed >= window {
            bucket.window_start = now;
            bucket.count = 0;
        }

        if bucket.count < rule.limit {
            bucket.count += 1;
            Decision::Allow
        } else {
            let retry_after = window.saturating_sub(now.duration_since(bucket.window_start));
            tracing::debug!(actor, ?action, retry_after_ms = retry_after.as_millis() as u64, "Rate limit exceeded");
            Decision::Deny { retry_after }
        }
    }

    /// Drop all buckets of an actor. Called when the connection closes.
    pub fn forget(&self, actor: &str) {
        self.buckets.retain(|(a, _), _| a != actor);
    }

    /// Drop buckets whose window elapsed long ago. Returns how many were
    /// removed.
    pub fn purge_idle(&self) -> usize {
        let before = self.buckets.len();
        let now = Instant::now();
        self.buckets.retain(|(_, action), bucket| {
            let window = Duration::from_secs(action.rule(&self.config).window_secs);
            now.duration_since(bucket.window_start) < window * 2
        });
        before - self.buckets.len()
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("buckets", &self.buckets.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter() -> RateLimiter {
        RateLimiter::new(pulse_common::GatewayConfig::for_tests().rate_limit)
    }

    #[test]
    fn test_allows_up_to_limit_then_denies() {
        let limiter = limiter();

        // default resume rule is 5 per 60s
        for _ in 0..5 {
            assert!(limiter.check("conn-1", ActionClass::Resume).is_allowed());
        }

        match limiter.check("conn-1", ActionClass::Resume) {
            Decision::Deny { retry_after } => assert!(retry_after <= Duration::from_secs(60)),
            Decision::Allow => panic!("expected deny after limit"),
        }
    }

    #[test]
    fn test_actors_are_independent() {
        let limiter = limiter();

        assert!(limiter.check("conn-1", ActionClass::Identify).is_allowed());
        assert!(!limiter.check("conn-1", ActionClass::Identify).is_allowed());
        assert!(limiter.check("conn-2", ActionClass::Identify).is_allowed());
    }

    #[test]
    fn test_action_classes_are_independent() {
        let limiter = limiter();

        assert!(limiter.check("conn-1", ActionClass::Identify).is_allowed());
        assert!(!limiter.check("conn-1", ActionClass::Identify).is_allowed());
        // a different class still has budget
        assert!(limiter.check("conn-1", ActionClass::PresenceUpdate).is_allowed());
    }

    #[test]
    fn test_zero_width_window_always_resets() {
        let mut config = pulse_common::GatewayConfig::for_tests().rate_limit;
        config.identify = RateLimitRule {
            limit: 1,
            window_secs: 0,
        };
        let limiter = RateLimiter::new(config);

        for _ in 0..10 {
            assert!(limiter.check("conn-1", ActionClass::Identify).is_allowed());
        }
    }

    #[test]
    fn test_forget_clears_actor_buckets() {
        let limiter = limiter();

        assert!(limiter.check("conn-1", ActionClass::Identify).is_allowed());
        assert!(!limiter.check("conn-1", ActionClass::Identify).is_allowed());

        limiter.forget("conn-1");
        assert_eq!(limiter.bucket_count(), 0);
        assert!(limiter.check("conn-1", ActionClass::Identify).is_allowed());
    }
}
