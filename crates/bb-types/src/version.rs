// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Dotted numeric version, used for worker declarations and engine
//! compatibility checks (`spec.md` §6).

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::str::FromStr;

/// A dotted numeric version (`1`, `1.2`, `1.2.3`, ...). Compares
/// component-wise; a missing trailing component is treated as `0`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Version(pub Vec<u32>);

impl Version {
    /// Whether `self` satisfies a `required` minimum version (`self >= required`).
    pub fn satisfies(&self, required: &Version) -> bool {
        self >= required
    }
}

/// Error returned when a version string is not dotted-numeric.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid version string: {0}")]
pub struct VersionParseError(pub String);

impl FromStr for Version {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(VersionParseError(s.to_string()));
        }
        let mut parts = Vec::new();
        for segment in s.split('.') {
            let n: u32 = segment.parse().map_err(|_| VersionParseError(s.to_string()))?;
            parts.push(n);
        }
        Ok(Version(parts))
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rendered: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "{}", rendered.join("."))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.0.len().max(other.0.len());
        for i in 0..len {
            let a = self.0.get(i).copied().unwrap_or(0);
            let b = other.0.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
        Ordering::Equal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dotted_numeric() {
        let v: Version = "1.2.3".parse().unwrap();
        assert_eq!(v.0, vec![1, 2, 3]);
    }

    #[test]
    fn missing_trailing_component_is_zero() {
        let a: Version = "1.2".parse().unwrap();
        let b: Version = "1.2.0".parse().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn ordering_is_component_wise() {
        let a: Version = "1.9".parse().unwrap();
        let b: Version = "1.10".parse().unwrap();
        assert!(a < b);
    }

    #[test]
    fn rejects_non_numeric_segment() {
        assert!("1.x".parse::<Version>().is_err());
    }
}
