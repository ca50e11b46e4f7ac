use crate::config::RateLimitConfig;
use crate::errors::{AppError, Result};
use crate::rate_limit::bucket::Bucket;

/// Result of applying the policy to one attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Allowed,
    Blocked {
        /// Milliseconds until the lockout ends
        retry_after_ms: i64,
        /// True when this attempt started the lockout
        newly_blocked: bool,
    },
}

/// Decision for one attempt plus the bucket state that follows it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub outcome: Outcome,
    pub bucket: Bucket,
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self.outcome, Outcome::Allowed)
    }

    /// An attempt made during an existing lockout leaves the bucket untouched
    pub fn needs_write(&self) -> bool {
        !matches!(
            self.outcome,
            Outcome::Blocked {
                newly_blocked: false,
                ..
            }
        )
    }
}

/// Sliding window with lockout.
///
/// Pure: the caller supplies `now`, so every decision is reproducible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterPolicy {
    window_ms: i64,
    max_attempts: u32,
    block_ms: i64,
}

impl Default for LimiterPolicy {
    fn default() -> Self {
        Self {
            window_ms: 5 * 60 * 1000,
            max_attempts: 10,
            block_ms: 15 * 60 * 1000,
        }
    }
}

impl LimiterPolicy {
    pub fn new(window_ms: i64, max_attempts: u32, block_ms: i64) -> Result<Self> {
        if window_ms <= 0 || block_ms <= 0 || max_attempts == 0 {
            return Err(AppError::Configuration(format!(
                "Invalid limiter policy (window {} ms, max attempts {}, block {} ms)",
                window_ms, max_attempts, block_ms
            )));
        }

        Ok(Self {
            window_ms,
            max_attempts,
            block_ms,
        })
    }

    pub fn from_config(config: &RateLimitConfig) -> Result<Self> {
        Self::new(config.window_ms, config.max_attempts, config.block_ms)
    }

    pub fn window_ms(&self) -> i64 {
        self.window_ms
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn block_ms(&self) -> i64 {
        self.block_ms
    }

    /// Decide on an attempt made at `now` given the stored bucket, if any
    pub fn decide(&self, existing: Option<&Bucket>, now: i64) -> Decision {
        let current = match existing {
            // A lockout longer than one block period cannot come from this
            // policy and is discarded below
            Some(bucket)
                if bucket.is_blocked_at(now)
                    && bucket.remaining_block(now) <= self.block_ms =>
            {
                return Decision {
                    outcome: Outcome::Blocked {
                        retry_after_ms: bucket.remaining_block(now),
                        newly_blocked: false,
                    },
                    bucket: *bucket,
                };
            }
            // `<=` keeps an attempt at exactly `first_attempt_at + window`
            // in the current window; only strictly later attempts reset it
            Some(bucket)
                if bucket.blocked_until.is_none()
                    && now.saturating_sub(bucket.first_attempt_at) <= self.window_ms =>
            {
                bucket
            }
            // Absent, stale, lapsed or implausible lockout: start over
            _ => {
                return Decision {
                    outcome: Outcome::Allowed,
                    bucket: Bucket::fresh(now),
                };
            }
        };

        let mut bucket = *current;
        bucket.count = bucket.count.saturating_add(1);

        if bucket.count > self.max_attempts {
            bucket.blocked_until = Some(now.saturating_add(self.block_ms));
            Decision {
                outcome: Outcome::Blocked {
                    retry_after_ms: self.block_ms,
                    newly_blocked: true,
                },
                bucket,
            }
        } else {
            Decision {
                outcome: Outcome::Allowed,
                bucket,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: i64 = 300_000;
    const BLOCK: i64 = 900_000;
    const MINUTE: i64 = 60_000;

    fn policy() -> LimiterPolicy {
        LimiterPolicy::new(WINDOW, 10, BLOCK).unwrap()
    }

    #[test]
    fn test_first_attempt_starts_window() {
        let decision = policy().decide(None, 1000);
        assert!(decision.is_allowed());
        assert_eq!(decision.bucket, Bucket::fresh(1000));
        assert!(decision.needs_write());
    }

    #[test]
    fn test_window_reset() {
        let existing = Bucket {
            count: 7,
            first_attempt_at: 0,
            blocked_until: None,
        };

        let decision = policy().decide(Some(&existing), WINDOW + 1);
        assert!(decision.is_allowed());
        assert_eq!(decision.bucket, Bucket::fresh(WINDOW + 1));
    }

    #[test]
    fn test_exact_window_edge_still_counts() {
        let existing = Bucket {
            count: 7,
            first_attempt_at: 0,
            blocked_until: None,
        };

        let decision = policy().decide(Some(&existing), WINDOW);
        assert!(decision.is_allowed());
        assert_eq!(decision.bucket.count, 8);
        assert_eq!(decision.bucket.first_attempt_at, 0);
    }

    #[test]
    fn test_lockout_trigger() {
        let policy = policy();
        let mut bucket = None;

        for attempt in 1..=10 {
            let decision = policy.decide(bucket.as_ref(), attempt * 1000);
            assert!(decision.is_allowed(), "Attempt {} should be allowed", attempt);
            bucket = Some(decision.bucket);
        }

        let now = 11_000;
        let decision = policy.decide(bucket.as_ref(), now);
        assert_eq!(
            decision.outcome,
            Outcome::Blocked {
                retry_after_ms: BLOCK,
                newly_blocked: true,
            }
        );
        assert_eq!(decision.bucket.count, 11);
        assert_eq!(decision.bucket.blocked_until, Some(now + BLOCK));
        assert!(decision.needs_write());
    }

    #[test]
    fn test_lockout_persistence() {
        let existing = Bucket {
            count: 11,
            first_attempt_at: 0,
            blocked_until: Some(BLOCK),
        };

        for now in [1, WINDOW + 1, BLOCK - 1] {
            let decision = policy().decide(Some(&existing), now);
            assert_eq!(
                decision.outcome,
                Outcome::Blocked {
                    retry_after_ms: BLOCK - now,
                    newly_blocked: false,
                }
            );
            assert_eq!(decision.bucket, existing);
            assert!(!decision.needs_write());
        }
    }

    #[test]
    fn test_lockout_expiry() {
        let existing = Bucket {
            count: 11,
            first_attempt_at: 0,
            blocked_until: Some(BLOCK),
        };

        // Strict comparison: the block has lapsed at its own deadline
        let decision = policy().decide(Some(&existing), BLOCK);
        assert!(decision.is_allowed());
        assert_eq!(decision.bucket, Bucket::fresh(BLOCK));

        let decision = policy().decide(Some(&existing), BLOCK + 1);
        assert!(decision.is_allowed());
        assert_eq!(decision.bucket.count, 1);
    }

    #[test]
    fn test_lapsed_short_block_inside_window_starts_fresh() {
        let policy = LimiterPolicy::new(WINDOW, 10, 1_000).unwrap();
        let existing = Bucket {
            count: 11,
            first_attempt_at: 0,
            blocked_until: Some(2_000),
        };

        let decision = policy.decide(Some(&existing), 2_001);
        assert!(decision.is_allowed());
        assert_eq!(decision.bucket, Bucket::fresh(2_001));
    }

    #[test]
    fn test_extreme_timestamps_start_fresh() {
        let now = 1_700_000_000_000;

        let ancient = Bucket {
            count: 4,
            first_attempt_at: i64::MIN,
            blocked_until: None,
        };
        assert_eq!(policy().decide(Some(&ancient), now).bucket, Bucket::fresh(now));

        let endless = Bucket {
            count: 11,
            first_attempt_at: now,
            blocked_until: Some(i64::MAX),
        };
        let decision = policy().decide(Some(&endless), now);
        assert!(decision.is_allowed());
        assert_eq!(decision.bucket, Bucket::fresh(now));
    }

    #[test]
    fn test_example_trace() {
        let policy = policy();
        let t0 = 1_700_000_000_000;
        let mut bucket = None;

        for i in 0..10 {
            let decision = policy.decide(bucket.as_ref(), t0 + i * 5_000);
            assert!(decision.is_allowed());
            bucket = Some(decision.bucket);
        }
        assert_eq!(bucket.unwrap().count, 10);

        let blocked_at = t0 + 2 * MINUTE;
        let decision = policy.decide(bucket.as_ref(), blocked_at);
        assert!(!decision.is_allowed());
        assert_eq!(decision.bucket.blocked_until, Some(blocked_at + 900_000));
        bucket = Some(decision.bucket);

        let decision = policy.decide(bucket.as_ref(), t0 + 10 * MINUTE);
        assert!(!decision.is_allowed());

        let decision = policy.decide(bucket.as_ref(), blocked_at + 900_000 + 1);
        assert!(decision.is_allowed());
        assert_eq!(decision.bucket.count, 1);
    }

    #[test]
    fn test_rejects_invalid_policy() {
        assert!(LimiterPolicy::new(0, 10, BLOCK).is_err());
        assert!(LimiterPolicy::new(WINDOW, 0, BLOCK).is_err());
        assert!(LimiterPolicy::new(WINDOW, 10, -5).is_err());
        assert_eq!(
            LimiterPolicy::from_config(&RateLimitConfig::default()).unwrap(),
            LimiterPolicy::default()
        );
    }
}
