//! Timestamp value object for immutable points in time.

use chrono::{DateTime, Duration, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Immutable point in time, always UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Creates a timestamp for the current moment.
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a timestamp from a DateTime<Utc>.
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Returns the inner DateTime.
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Checks if this timestamp is before another.
    pub fn is_before(&self, other: &Timestamp) -> bool {
        self.0 < other.0
    }

    /// Checks if this timestamp is after another.
    pub fn is_after(&self, other: &Timestamp) -> bool {
        self.0 > other.0
    }

    /// Creates a timestamp from Unix seconds.
    ///
    /// Out-of-range values collapse to the Unix epoch.
    pub fn from_unix_secs(secs: u64) -> Self {
        Self(Utc.timestamp_opt(secs as i64, 0).single().unwrap_or_default())
    }

    /// Creates a timestamp from Unix milliseconds.
    pub fn from_unix_millis(millis: i64) -> Self {
        Self(Utc.timestamp_millis_opt(millis).single().unwrap_or_default())
    }

    /// Returns the timestamp as Unix seconds.
    pub fn as_unix_secs(&self) -> u64 {
        self.0.timestamp().max(0) as u64
    }

    /// Returns the timestamp as Unix milliseconds.
    pub fn as_unix_millis(&self) -> i64 {
        self.0.timestamp_millis()
    }

    /// Creates a new timestamp by adding the specified number of seconds.
    ///
    /// Saturates at the latest representable instant.
    pub fn plus_secs(&self, secs: u64) -> Self {
        i64::try_from(secs)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|d| self.0.checked_add_signed(d))
            .map_or(Self(DateTime::<Utc>::MAX_UTC), Self)
    }

    /// Creates a new timestamp by adding the specified number of milliseconds.
    ///
    /// Saturates at the earliest or latest representable instant.
    pub fn plus_millis(&self, millis: i64) -> Self {
        let bound = if millis < 0 {
            DateTime::<Utc>::MIN_UTC
        } else {
            DateTime::<Utc>::MAX_UTC
        };
        Duration::try_milliseconds(millis)
            .and_then(|d| self.0.checked_add_signed(d))
            .map_or(Self(bound), Self)
    }

    /// Whole seconds from `self` until `later`, rounded up. Zero if `later` is not after `self`.
    pub fn secs_until(&self, later: &Timestamp) -> u64 {
        let millis = later.as_unix_millis() - self.as_unix_millis();
        if millis <= 0 {
            0
        } else {
            ((millis + 999) / 1000) as u64
        }
    }

    /// RFC 3339 rendering used in response headers.
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_rfc3339())
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_now_creates_current_time() {
        let before = Utc::now();
        let ts = Timestamp::now();
        let after = Utc::now();

        assert!(ts.as_datetime() >= &before);
        assert!(ts.as_datetime() <= &after);
    }

    #[test]
    fn unix_millis_preserved() {
        let ts = Timestamp::from_unix_millis(1_700_000_000_123);
        assert_eq!(ts.as_unix_millis(), 1_700_000_000_123);
        assert_eq!(ts.as_unix_secs(), 1_700_000_000);
    }

    #[test]
    fn ordering_helpers() {
        let a = Timestamp::from_unix_secs(100);
        let b = a.plus_secs(5);
        assert!(a.is_before(&b));
        assert!(b.is_after(&a));
    }

    #[test]
    fn huge_offsets_saturate() {
        let ts = Timestamp::from_unix_secs(1_700_000_000);

        let far = ts.plus_secs(u64::MAX);
        assert!(far.is_after(&ts));
        assert_eq!(far, ts.plus_secs(i64::MAX as u64));
        assert!(ts.secs_until(&far) > 0);

        assert!(ts.plus_millis(i64::MIN).is_before(&ts));
        assert!(ts.plus_millis(i64::MAX).is_after(&ts));
    }

    #[test]
    fn secs_until_rounds_up() {
        let a = Timestamp::from_unix_millis(1_000);
        assert_eq!(a.secs_until(&Timestamp::from_unix_millis(2_001)), 2);
        assert_eq!(a.secs_until(&Timestamp::from_unix_millis(2_000)), 1);
        assert_eq!(a.secs_until(&Timestamp::from_unix_millis(500)), 0);
    }

    #[test]
    fn rfc3339_is_utc() {
        let ts = Timestamp::from_unix_secs(0);
        assert_eq!(ts.to_rfc3339(), "1970-01-01T00:00:00.000Z");
    }

    #[test]
    fn timestamp_serializes_to_json() {
        let ts = Timestamp::from_unix_secs(1_705_314_600);
        let json = serde_json::to_string(&ts).unwrap();
        assert_eq!(json, "\"2024-01-15T10:30:00Z\"");
        let back: Timestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ts);
    }
}
