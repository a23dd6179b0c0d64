//! Dotted-decimal version parsing and comparison (§4.5), used to gate
//! on-disk (§4.6) and on-wire (§6) format compatibility.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::{Errno, Error};

/// A dotted-decimal version, e.g. `2.1.0`.
///
/// Components are compared lexicographically, component by component, with
/// a missing trailing component treated as `0` (so `"2.1" < "2.1.1"` but
/// `"2.1" == "2.1.0"`).
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Version {
    components: Vec<u32>,
}

impl Version {
    /// Builds a version directly from its components.
    pub fn new(components: impl Into<Vec<u32>>) -> Self {
        Self {
            components: components.into(),
        }
    }

    /// Returns the first two components as `(major, minor)`, `0` for any
    /// component that is absent.
    pub fn get_major(&self) -> (u32, u32) {
        (
            self.components.first().copied().unwrap_or(0),
            self.components.get(1).copied().unwrap_or(0),
        )
    }

    fn component(&self, index: usize) -> u32 {
        self.components.get(index).copied().unwrap_or(0)
    }
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(Error::with_msg(Errno::Invalid, "empty version string"));
        }
        let mut components = Vec::new();
        for part in s.split('.') {
            let n: u32 = part
                .parse()
                .map_err(|_| Error::with_msg(Errno::Invalid, "non-numeric version component"))?;
            components.push(n);
        }
        Ok(Version { components })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.components.iter().map(u32::to_string).collect();
        write!(f, "{}", parts.join("."))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.components.len().max(other.components.len());
        for i in 0..len {
            match self.component(i).cmp(&other.component(i)) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        Ordering::Equal
    }
}

/// Returns `true` if `disk` and `expected` share the same major version
/// (§4.6: superblock read validates "version compatibility (equal major)").
pub fn major_compatible(disk: &Version, expected: &Version) -> bool {
    disk.get_major() == expected.get_major()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dotted_decimal() {
        let v: Version = "2.1.0".parse().unwrap();
        assert_eq!(v.get_major(), (2, 1));
        assert_eq!(v.to_string(), "2.1.0");
    }

    #[test]
    fn missing_trailing_component_is_zero() {
        let a: Version = "2.1".parse().unwrap();
        let b: Version = "2.1.0".parse().unwrap();
        assert_eq!(a, b);
        let c: Version = "2.1.1".parse().unwrap();
        assert!(a < c);
    }

    #[test]
    fn major_compatibility_ignores_patch() {
        let a: Version = "2.1.0".parse().unwrap();
        let b: Version = "2.1.9".parse().unwrap();
        let c: Version = "2.2.0".parse().unwrap();
        assert!(major_compatible(&a, &b));
        assert!(!major_compatible(&a, &c));
    }

    #[test]
    fn rejects_non_numeric() {
        assert!("2.x".parse::<Version>().is_err());
        assert!("".parse::<Version>().is_err());
    }
}
