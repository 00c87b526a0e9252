//! Context identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Reserved prefix of every context identifier.
pub const CONTEXT_PREFIX: &str = "NC";

/// Stable identifier of a naming context, rendered `NC<n>`.
///
/// The root is always `NC0`; the activator hands out the rest from a
/// monotonic counter. Identifiers are immutable and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(pub u64);

impl ContextId {
    pub const ROOT: ContextId = ContextId(0);

    pub fn is_root(&self) -> bool {
        *self == Self::ROOT
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{CONTEXT_PREFIX}{}", self.0)
    }
}

/// Error returned when a string is not of the form `NC<digits>`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed context identifier '{0}'")]
pub struct ParseContextIdError(pub String);

impl FromStr for ContextId {
    type Err = ParseContextIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix(CONTEXT_PREFIX)
            .filter(|d| !d.is_empty() && d.bytes().all(|b| b.is_ascii_digit()))
            .ok_or_else(|| ParseContextIdError(s.to_string()))?;
        digits
            .parse::<u64>()
            .map(ContextId)
            .map_err(|_| ParseContextIdError(s.to_string()))
    }
}

impl Serialize for ContextId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ContextId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
