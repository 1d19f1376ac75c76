//! Graph version identifiers
//!
//! A version is a UTC millisecond timestamp serialized as a decimal string.
//! It is generated once at trigger time and identifies one complete,
//! immutable build of the graph. Consumers treat versions as opaque strings;
//! only the metadata layer compares them.
//!
//! Ordering is length-then-lexicographic, which on decimal timestamp strings
//! is numeric ordering without ever parsing the number back.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Identifier of one complete graph build.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(String);

impl Version {
    /// Generate a fresh version from the current UTC time.
    ///
    /// Collisions within one millisecond are impossible in practice because
    /// triggers are serialized by the admission CAS.
    pub fn now() -> Self {
        Version(Utc::now().timestamp_millis().to_string())
    }

    /// View the version as its string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The trigger instant encoded in the version, as epoch milliseconds.
    ///
    /// Returns `None` for versions that are not decimal timestamps (never
    /// produced by this service, but versions are accepted as opaque input).
    pub fn timestamp_millis(&self) -> Option<i64> {
        self.0.parse().ok()
    }
}

impl From<String> for Version {
    fn from(s: String) -> Self {
        Version(s)
    }
}

impl From<&str> for Version {
    fn from(s: &str) -> Self {
        Version(s.to_string())
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .len()
            .cmp(&other.0.len())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn ordering_is_numeric_on_timestamps() {
        let a = Version::from("1700000000001");
        let b = Version::from("1700000000500");
        assert!(a < b);
        assert!(b > a);
        assert_eq!(a, Version::from("1700000000001"));
    }

    #[test]
    fn shorter_string_orders_first() {
        // A shorter decimal is always a smaller number
        let a = Version::from("999999999999");
        let b = Version::from("1700000000000");
        assert!(a < b);
    }

    #[test]
    fn now_is_decimal() {
        let v = Version::now();
        assert!(v.as_str().chars().all(|c| c.is_ascii_digit()));
        assert!(v.timestamp_millis().is_some());
    }

    proptest! {
        #[test]
        fn ordering_matches_numeric(a in 0u64..=u64::MAX / 2, b in 0u64..=u64::MAX / 2) {
            let va = Version::from(a.to_string());
            let vb = Version::from(b.to_string());
            prop_assert_eq!(va.cmp(&vb), a.cmp(&b));
        }
    }
}
