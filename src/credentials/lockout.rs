//! Failed-login lockout escalation.

use chrono::{DateTime, Duration, Utc};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockState {
    Unlocked,
    Until(DateTime<Utc>),
    /// Stays locked until an operator clears it.
    Indefinite,
}

impl LockState {
    #[must_use]
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        match self {
            Self::Unlocked => false,
            Self::Until(until) => now < *until,
            Self::Indefinite => true,
        }
    }

    /// Rebuild the state from the two persisted columns.
    #[must_use]
    pub fn from_columns(locked_until: Option<DateTime<Utc>>, locked_indefinitely: bool) -> Self {
        if locked_indefinitely {
            Self::Indefinite
        } else {
            locked_until.map_or(Self::Unlocked, Self::Until)
        }
    }

    /// Split into `(locked_until, locked_indefinitely)` for storage.
    #[must_use]
    pub fn to_columns(self) -> (Option<DateTime<Utc>>, bool) {
        match self {
            Self::Unlocked => (None, false),
            Self::Until(until) => (Some(until), false),
            Self::Indefinite => (None, true),
        }
    }
}

/// Counter and lock to persist after a failed attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FailedLogin {
    pub attempts: i32,
    pub lock: LockState,
}

#[derive(Clone, Copy, Debug)]
pub struct LockoutPolicy {
    timed_threshold: i32,
    indefinite_threshold: i32,
    timed_duration: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            timed_threshold: 5,
            indefinite_threshold: 15,
            timed_duration: Duration::minutes(15),
        }
    }
}

impl LockoutPolicy {
    #[must_use]
    pub fn timed_threshold(&self) -> i32 {
        self.timed_threshold
    }

    #[must_use]
    pub fn indefinite_threshold(&self) -> i32 {
        self.indefinite_threshold
    }

    #[must_use]
    pub fn timed_duration(&self) -> Duration {
        self.timed_duration
    }

    /// Every failure at or past the timed threshold re-arms the 15-minute lock;
    /// reaching the indefinite threshold locks until an operator reset.
    #[must_use]
    pub fn record_failure(&self, previous_attempts: i32, now: DateTime<Utc>) -> FailedLogin {
        let attempts = previous_attempts.saturating_add(1);
        let lock = if attempts >= self.indefinite_threshold {
            LockState::Indefinite
        } else if attempts >= self.timed_threshold {
            LockState::Until(now + self.timed_duration)
        } else {
            LockState::Unlocked
        };
        FailedLogin { attempts, lock }
    }
}
