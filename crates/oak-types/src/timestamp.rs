use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A point in time carried as both an ISO-8601 string and an epoch-seconds
/// integer, so range queries can stay index-friendly without re-parsing
/// strings on every comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp {
    epoch: i64,
}

impl Timestamp {
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self { epoch: dt.timestamp() }
    }

    pub fn from_epoch(epoch: i64) -> Self {
        Self { epoch }
    }

    pub fn epoch(&self) -> i64 {
        self.epoch
    }

    pub fn to_datetime(self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.epoch, 0).unwrap_or_else(Utc::now)
    }

    pub fn to_iso(self) -> String {
        self.to_datetime().to_rfc3339()
    }

    pub fn from_iso(s: &str) -> Option<Self> {
        DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| Self::from_datetime(dt.with_timezone(&Utc)))
    }

    pub fn seconds_since(&self, other: &Timestamp) -> i64 {
        self.epoch - other.epoch
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_iso())
    }
}
