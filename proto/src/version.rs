use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ParseError;

/// An IS-04 API version, rendered on the wire as `v<major>.<minor>`.
///
/// Ordering compares the two integer components, so `v1.2 < v1.10`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ApiVersion {
    pub major: u8,
    pub minor: u8,
}

impl ApiVersion {
    pub const V1_0: ApiVersion = ApiVersion { major: 1, minor: 0 };
    pub const V1_1: ApiVersion = ApiVersion { major: 1, minor: 1 };
    pub const V1_2: ApiVersion = ApiVersion { major: 1, minor: 2 };
    pub const V1_3: ApiVersion = ApiVersion { major: 1, minor: 3 };

    /// Every version this service can serve, oldest first.
    pub const ALL: [ApiVersion; 4] = [Self::V1_0, Self::V1_1, Self::V1_2, Self::V1_3];

    /// The newest version this service understands.
    pub const LATEST: ApiVersion = Self::V1_3;

    /// The next version down the ladder, or `None` at the bottom.
    pub fn pred(self) -> Option<ApiVersion> {
        match self.minor.checked_sub(1) {
            Some(minor) => Some(ApiVersion { major: self.major, minor }),
            None => None,
        }
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}.{}", self.major, self.minor)
    }
}

impl FromStr for ApiVersion {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseError::ApiVersion(s.to_string());
        let rest = s.strip_prefix('v').ok_or_else(err)?;
        let (major, minor) = rest.split_once('.').ok_or_else(err)?;
        Ok(ApiVersion {
            major: major.parse().map_err(|_| err())?,
            minor: minor.parse().map_err(|_| err())?,
        })
    }
}

impl Serialize for ApiVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ApiVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}
