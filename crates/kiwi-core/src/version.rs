//! Semver helpers.
//!
//! Artifact versions are strict `MAJOR.MINOR.PATCH` strings. `0.0.0` is the
//! "unset" placeholder and is rejected before signing.

use std::cmp::Ordering;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::{KiwiError, KiwiResult};

static SEMVER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+\.\d+\.\d+$").unwrap());

/// True if `s` is a well-formed `MAJOR.MINOR.PATCH` version.
pub fn is_valid_version(s: &str) -> bool {
    SEMVER_RE.is_match(s)
}

/// True if a version value is usable for signing: present, well-formed, and
/// not the `0.0.0` placeholder.
pub fn is_signable_version(s: &str) -> bool {
    is_valid_version(s) && s != "0.0.0"
}

fn parse_parts(s: &str) -> KiwiResult<(u64, u64, u64)> {
    if !is_valid_version(s) {
        return Err(KiwiError::invalid_argument(format!(
            "invalid version format: {s}"
        )));
    }
    let mut it = s.split('.').map(|p| p.parse::<u64>());
    let major = it.next().unwrap().map_err(|_| overflow(s))?;
    let minor = it.next().unwrap().map_err(|_| overflow(s))?;
    let patch = it.next().unwrap().map_err(|_| overflow(s))?;
    Ok((major, minor, patch))
}

fn overflow(s: &str) -> KiwiError {
    KiwiError::invalid_argument(format!("version component out of range: {s}"))
}

/// Compare two semver strings.
pub fn compare_versions(a: &str, b: &str) -> KiwiResult<Ordering> {
    Ok(parse_parts(a)?.cmp(&parse_parts(b)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_versions() {
        assert!(is_valid_version("1.0.0"));
        assert!(is_valid_version("12.34.56"));
        assert!(!is_valid_version("1.0"));
        assert!(!is_valid_version("1.0.0-rc1"));
        assert!(!is_valid_version("v1.0.0"));
    }

    #[test]
    fn placeholder_not_signable() {
        assert!(!is_signable_version("0.0.0"));
        assert!(is_signable_version("0.0.1"));
    }

    #[test]
    fn ordering() {
        assert_eq!(compare_versions("1.0.0", "1.0.1").unwrap(), Ordering::Less);
        assert_eq!(
            compare_versions("2.0.0", "1.9.9").unwrap(),
            Ordering::Greater
        );
        assert_eq!(compare_versions("1.2.3", "1.2.3").unwrap(), Ordering::Equal);
        // Numeric, not lexicographic.
        assert_eq!(
            compare_versions("1.10.0", "1.9.0").unwrap(),
            Ordering::Greater
        );
    }
}
