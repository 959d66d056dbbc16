use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of ticks in one second (one tick is 100 nanoseconds).
pub const TICKS_PER_SECOND: i64 = 10_000_000;

/// Ticks between 0001-01-01T00:00:00Z and the Unix epoch.
const UNIX_EPOCH_TICKS: i64 = 621_355_968_000_000_000;

/// Last tick of 9999-12-31T23:59:59.9999999Z.
const MAX_TICKS: i64 = 3_155_378_975_999_999_999;

/// Point in time stored as 100ns ticks since 0001-01-01T00:00:00Z.
///
/// Records carry timestamps in this form so that the value written to a log
/// line is exactly the value read back. Conversions from `DateTime<Utc>`
/// truncate anything finer than one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Build a timestamp from a raw tick count, rejecting values outside
    /// years 1 through 9999.
    pub fn from_ticks(ticks: i64) -> Option<Self> {
        (0..=MAX_TICKS).contains(&ticks).then_some(Self(ticks))
    }

    pub const fn ticks(self) -> i64 {
        self.0
    }

    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        let whole = dt.timestamp().saturating_mul(TICKS_PER_SECOND);
        let sub = i64::from(dt.timestamp_subsec_nanos() / 100);
        let ticks = UNIX_EPOCH_TICKS.saturating_add(whole).saturating_add(sub);
        Self(ticks.clamp(0, MAX_TICKS))
    }

    pub fn to_datetime(self) -> DateTime<Utc> {
        let relative = self.0 - UNIX_EPOCH_TICKS;
        let secs = relative.div_euclid(TICKS_PER_SECOND);
        // rem_euclid is in [0, TICKS_PER_SECOND), so the nanos fit in u32
        let nanos = (relative.rem_euclid(TICKS_PER_SECOND) * 100) as u32;
        DateTime::from_timestamp(secs, nanos).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self::from_datetime(dt)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_datetime().to_rfc3339())
    }
}
