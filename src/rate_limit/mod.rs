//! In-memory token-bucket rate limiting.
//!
//! Each feature class has its own family of buckets keyed by caller (user id, client
//! IP or email). Buckets start full, refill lazily on access and never go below zero
//! or above capacity. The registry lock only guards bucket creation; every bucket has
//! its own lock so unrelated keys never contend.
//!
//! State is per process. Running several replicas multiplies the effective quota.

use parking_lot::{Mutex, RwLock};
use std::{
    collections::HashMap,
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};

const MINUTE: f64 = 60.0;
const HOUR: f64 = 60.0 * MINUTE;
const DAY: f64 = 24.0 * HOUR;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RateLimitAction {
    /// Any authenticated API call, per user.
    General,
    /// Login and registration attempts, per client IP.
    Login,
    /// AI assistant calls, per user.
    Ai,
    /// Report card and certificate generation, per user.
    DocumentGeneration,
    /// File uploads, per user.
    FileUpload,
    /// Password reset requests, per email.
    PasswordReset,
}

impl RateLimitAction {
    pub const ALL: [Self; 6] = [
        Self::General,
        Self::Login,
        Self::Ai,
        Self::DocumentGeneration,
        Self::FileUpload,
        Self::PasswordReset,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Login => "login",
            Self::Ai => "ai",
            Self::DocumentGeneration => "document_generation",
            Self::FileUpload => "file_upload",
            Self::PasswordReset => "password_reset",
        }
    }

    #[must_use]
    pub fn default_quota(self) -> Quota {
        match self {
            Self::General => Quota::per_period(100, MINUTE),
            Self::Login => Quota::per_period(10, HOUR),
            Self::Ai => Quota::per_period(20, MINUTE),
            Self::DocumentGeneration => Quota::per_period(5, DAY),
            Self::FileUpload => Quota::per_period(20, HOUR),
            Self::PasswordReset => Quota::per_period(5, HOUR),
        }
    }
}

impl fmt::Display for RateLimitAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bucket shape: burst capacity and steady refill rate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Quota {
    capacity: f64,
    refill_per_second: f64,
}

impl Quota {
    #[must_use]
    pub fn new(capacity: u32, refill_per_second: f64) -> Self {
        Self {
            capacity: f64::from(capacity),
            refill_per_second: refill_per_second.max(0.0),
        }
    }

    /// `limit` requests per `period_seconds`, with the whole limit available as burst.
    #[must_use]
    pub fn per_period(limit: u32, period_seconds: f64) -> Self {
        Self::new(limit, f64::from(limit) / period_seconds)
    }

    #[must_use]
    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    #[must_use]
    pub fn refill_per_second(&self) -> f64 {
        self.refill_per_second
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RateLimitDecision {
    Allowed,
    Limited { retry_after: Duration },
}

impl RateLimitDecision {
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn full(quota: Quota, now: Instant) -> Self {
        Self {
            tokens: quota.capacity,
            last_refill: now,
        }
    }

    fn try_acquire(&mut self, quota: Quota, now: Instant) -> RateLimitDecision {
        // Instants from racing callers may arrive slightly out of order; never rewind.
        if now > self.last_refill {
            let elapsed = now.duration_since(self.last_refill).as_secs_f64();
            self.tokens = (self.tokens + elapsed * quota.refill_per_second).min(quota.capacity);
            self.last_refill = now;
        }

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            return RateLimitDecision::Allowed;
        }

        let missing = 1.0 - self.tokens;
        let retry_after = if quota.refill_per_second > 0.0 {
            Duration::try_from_secs_f64(missing / quota.refill_per_second).unwrap_or(Duration::MAX)
        } else {
            Duration::MAX
        };
        RateLimitDecision::Limited { retry_after }
    }
}

/// One family of buckets sharing a quota.
#[derive(Debug)]
struct BucketFamily {
    quota: Quota,
    buckets: RwLock<HashMap<String, Arc<Mutex<TokenBucket>>>>,
}

impl BucketFamily {
    fn new(quota: Quota) -> Self {
        Self {
            quota,
            buckets: RwLock::new(HashMap::new()),
        }
    }

    fn bucket(&self, key: &str, now: Instant) -> Arc<Mutex<TokenBucket>> {
        if let Some(bucket) = self.buckets.read().get(key) {
            return Arc::clone(bucket);
        }
        let mut buckets = self.buckets.write();
        Arc::clone(
            buckets
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(TokenBucket::full(self.quota, now)))),
        )
    }

    fn check(&self, key: &str, now: Instant) -> RateLimitDecision {
        let bucket = self.bucket(key, now);
        let mut bucket = bucket.lock();
        bucket.try_acquire(self.quota, now)
    }

    fn len(&self) -> usize {
        self.buckets.read().len()
    }
}

/// Per-family quota overrides; unset families use their defaults.
#[derive(Clone, Debug, Default)]
pub struct LimitsConfig {
    overrides: HashMap<RateLimitAction, Quota>,
}

impl LimitsConfig {
    #[must_use]
    pub fn with_quota(mut self, action: RateLimitAction, quota: Quota) -> Self {
        self.overrides.insert(action, quota);
        self
    }

    #[must_use]
    pub fn quota(&self, action: RateLimitAction) -> Quota {
        self.overrides
            .get(&action)
            .copied()
            .unwrap_or_else(|| action.default_quota())
    }
}

#[derive(Debug)]
pub struct RateLimiter {
    families: HashMap<RateLimitAction, BucketFamily>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(&LimitsConfig::default())
    }
}

impl RateLimiter {
    #[must_use]
    pub fn new(config: &LimitsConfig) -> Self {
        let families = RateLimitAction::ALL
            .into_iter()
            .map(|action| (action, BucketFamily::new(config.quota(action))))
            .collect();
        Self { families }
    }

    /// Take one token from `key`'s bucket in the `action` family.
    pub fn check(&self, action: RateLimitAction, key: &str) -> RateLimitDecision {
        self.check_at(action, key, Instant::now())
    }

    pub(crate) fn check_at(
        &self,
        action: RateLimitAction,
        key: &str,
        now: Instant,
    ) -> RateLimitDecision {
        match self.families.get(&action) {
            Some(family) => family.check(key, now),
            // Every action gets a family in `new`.
            None => RateLimitDecision::Allowed,
        }
    }

    #[must_use]
    pub fn quota(&self, action: RateLimitAction) -> Option<Quota> {
        self.families.get(&action).map(|family| family.quota)
    }

    /// Number of distinct keys seen by a family.
    #[must_use]
    pub fn tracked_keys(&self, action: RateLimitAction) -> usize {
        self.families.get(&action).map_or(0, BucketFamily::len)
    }
}
