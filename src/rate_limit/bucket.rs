use crate::errors::{AppError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Upper bound for stored timestamps (around the year 33658)
pub const MAX_TIMESTAMP_MS: i64 = 1_000_000_000_000_000;

/// Attempt history of one identity within the current tracking period.
///
/// Timestamps are milliseconds since the Unix epoch. The persisted form uses
/// camelCase field names: `{"count":3,"firstAttemptAt":..,"blockedUntil":null}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    /// Attempts recorded since `first_attempt_at` (always >= 1)
    pub count: u32,
    /// First attempt of the current window
    pub first_attempt_at: i64,
    /// End of an active lockout, if any
    pub blocked_until: Option<i64>,
}

impl Bucket {
    /// Start a fresh window at `now`
    pub fn fresh(now: i64) -> Self {
        Self {
            count: 1,
            first_attempt_at: now,
            blocked_until: None,
        }
    }

    /// Whether a lockout is active at `now`
    pub fn is_blocked_at(&self, now: i64) -> bool {
        matches!(self.blocked_until, Some(until) if until > now)
    }

    /// Milliseconds of lockout left at `now` (zero when not blocked)
    pub fn remaining_block(&self, now: i64) -> i64 {
        self.blocked_until
            .map_or(0, |until| until.saturating_sub(now).max(0))
    }

    /// Serialize to the stored JSON record
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| AppError::Internal(format!("Failed to encode bucket: {}", e)))
    }

    /// Parse a stored record.
    ///
    /// Anything that is not an object with an integer `count >= 1` and a
    /// numeric `firstAttemptAt` in `0..=MAX_TIMESTAMP_MS` yields `None`;
    /// corrupt records behave like a cache miss. A `blockedUntil` that is
    /// not such a timestamp is dropped.
    pub fn decode(raw: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(raw).ok()?;
        let record = value.as_object()?;

        let count = record.get("count")?.as_u64().filter(|count| *count >= 1)?;
        let count = u32::try_from(count).ok()?;
        let first_attempt_at = millis(record.get("firstAttemptAt")?)?;
        let blocked_until = record.get("blockedUntil").and_then(millis);

        Some(Self {
            count,
            first_attempt_at,
            blocked_until,
        })
    }
}

fn millis(value: &Value) -> Option<i64> {
    let ms = match value.as_i64() {
        Some(ms) => ms,
        None => {
            let ms = value.as_f64()?;
            if !(0.0..=MAX_TIMESTAMP_MS as f64).contains(&ms) {
                return None;
            }
            ms as i64
        }
    };
    (0..=MAX_TIMESTAMP_MS).contains(&ms).then_some(ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let bucket = Bucket {
            count: 11,
            first_attempt_at: 1_700_000_000_000,
            blocked_until: Some(1_700_000_900_000),
        };

        let raw = bucket.encode().unwrap();
        assert_eq!(Bucket::decode(&raw), Some(bucket));

        let fresh = Bucket::fresh(42);
        assert_eq!(Bucket::decode(&fresh.encode().unwrap()), Some(fresh));
    }

    #[test]
    fn test_wire_field_names() {
        let raw = Bucket::fresh(1000).encode().unwrap();
        assert_eq!(raw, r#"{"count":1,"firstAttemptAt":1000,"blockedUntil":null}"#);
    }

    #[test]
    fn test_truncated_record_is_absent() {
        let raw = Bucket::fresh(1000).encode().unwrap();
        assert_eq!(Bucket::decode(&raw[..raw.len() / 2]), None);
        assert_eq!(Bucket::decode(""), None);
        assert_eq!(Bucket::decode("not json"), None);
    }

    #[test]
    fn test_invalid_fields_are_absent() {
        assert_eq!(Bucket::decode(r#"{"count":"3","firstAttemptAt":1000}"#), None);
        assert_eq!(Bucket::decode(r#"{"count":2.5,"firstAttemptAt":1000}"#), None);
        assert_eq!(Bucket::decode(r#"{"count":0,"firstAttemptAt":1000}"#), None);
        assert_eq!(Bucket::decode(r#"{"count":3,"firstAttemptAt":"yesterday"}"#), None);
        assert_eq!(Bucket::decode(r#"{"count":3}"#), None);
        assert_eq!(Bucket::decode(r#"[3,1000]"#), None);
    }

    #[test]
    fn test_lenient_optional_fields() {
        // Fractional timestamps are accepted, a garbled block is dropped
        let bucket = Bucket::decode(r#"{"count":3,"firstAttemptAt":1000.7,"blockedUntil":"soon"}"#)
            .unwrap();
        assert_eq!(bucket.count, 3);
        assert_eq!(bucket.first_attempt_at, 1000);
        assert_eq!(bucket.blocked_until, None);

        let bucket = Bucket::decode(r#"{"count":3,"firstAttemptAt":1000}"#).unwrap();
        assert_eq!(bucket.blocked_until, None);
    }

    #[test]
    fn test_out_of_range_timestamps() {
        assert_eq!(Bucket::decode(r#"{"count":1,"firstAttemptAt":-1e300}"#), None);
        assert_eq!(Bucket::decode(r#"{"count":1,"firstAttemptAt":1e300}"#), None);
        assert_eq!(Bucket::decode(r#"{"count":1,"firstAttemptAt":-5}"#), None);
        assert_eq!(
            Bucket::decode(r#"{"count":1,"firstAttemptAt":9223372036854775807}"#),
            None
        );

        let bucket =
            Bucket::decode(r#"{"count":11,"firstAttemptAt":1000,"blockedUntil":1e19}"#).unwrap();
        assert_eq!(bucket.first_attempt_at, 1000);
        assert_eq!(bucket.blocked_until, None);

        let bucket = Bucket::decode(r#"{"count":1,"firstAttemptAt":1000000000000000}"#).unwrap();
        assert_eq!(bucket.first_attempt_at, MAX_TIMESTAMP_MS);
    }

    #[test]
    fn test_is_blocked_at_boundary() {
        let bucket = Bucket {
            count: 11,
            first_attempt_at: 0,
            blocked_until: Some(5000),
        };
        assert!(bucket.is_blocked_at(4999));
        assert!(!bucket.is_blocked_at(5000));
        assert!(!Bucket::fresh(0).is_blocked_at(0));
    }
}
