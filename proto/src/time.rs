use std::fmt;

use chrono::Utc;
use serde::{Serialize, Serializer};

/// A second:nanosecond timestamp as carried in grain messages, e.g.
/// `"1513670741:520081182"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp {
    pub secs: u64,
    pub nanos: u32,
}

impl Timestamp {
    pub fn now() -> Self {
        let now = Utc::now();
        Timestamp { secs: now.timestamp().max(0) as u64, nanos: now.timestamp_subsec_nanos() }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:09}", self.secs, self.nanos)
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
