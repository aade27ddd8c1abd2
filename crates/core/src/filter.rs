//! Key filtering over listing results
//!
//! Two mutually exclusive modes: a regex anchored at the start of the key
//! (optionally after skipping a shared prefix), and a single-level ("ls")
//! view that keeps only keys directly under a prefix.

use regex::Regex;

use crate::error::{Error, Result};
use crate::traits::ObjectInfo;

/// A start-anchored key pattern
#[derive(Debug, Clone)]
pub struct KeyRegex {
    regex: Regex,
    strip_prefix_len: usize,
}

impl KeyRegex {
    /// Compile `pattern` so that it must match from the start of the key
    pub fn new(pattern: &str) -> Result<Self> {
        Self::with_stripped_prefix(pattern, 0)
    }

    /// Like [`KeyRegex::new`], matching against the key minus its first
    /// `strip_prefix_len` bytes
    pub fn with_stripped_prefix(pattern: &str, strip_prefix_len: usize) -> Result<Self> {
        let regex = Regex::new(&format!("^(?:{pattern})"))
            .map_err(|e| Error::InvalidInput(format!("Invalid regex '{pattern}': {e}")))?;
        Ok(Self {
            regex,
            strip_prefix_len,
        })
    }

    /// Whether `key` matches
    pub fn is_match(&self, key: &str) -> bool {
        let subject = key.get(self.strip_prefix_len..).unwrap_or("");
        self.regex.is_match(subject)
    }
}

/// How a listing should be shaped
#[derive(Debug, Clone)]
pub enum ListingMode {
    /// Every key under the prefix
    Recursive,
    /// Every key under the prefix whose key matches the regex
    Regex(KeyRegex),
    /// Only entries directly under the prefix
    SingleLevel,
}

impl ListingMode {
    /// Build the mode from caller flags.
    ///
    /// Combining a regex with a single-level listing is rejected.
    pub fn from_flags(regex: Option<&str>, single_level: bool) -> Result<Self> {
        match (regex, single_level) {
            (Some(_), true) => Err(Error::InvalidInput(
                "regex filtering cannot be combined with a single-level listing".to_string(),
            )),
            (Some(pattern), false) => Ok(ListingMode::Regex(KeyRegex::new(pattern)?)),
            (None, true) => Ok(ListingMode::SingleLevel),
            (None, false) => Ok(ListingMode::Recursive),
        }
    }
}

/// Keep only records whose key matches, preserving order
pub fn filter_regex(objects: Vec<ObjectInfo>, regex: &KeyRegex) -> Vec<ObjectInfo> {
    objects
        .into_iter()
        .filter(|o| regex.is_match(&o.key))
        .collect()
}

/// Keep only keys with no further `/` once `prefix` is stripped
pub fn single_level(objects: Vec<ObjectInfo>, prefix: &str) -> Vec<ObjectInfo> {
    objects
        .into_iter()
        .filter(|o| is_single_level(&o.key, prefix))
        .collect()
}

/// Whether `key` sits directly under `prefix`
pub fn is_single_level(key: &str, prefix: &str) -> bool {
    match key.strip_prefix(prefix) {
        Some(rest) => !rest.is_empty() && !rest.contains('/'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn objects(keys: &[&str]) -> Vec<ObjectInfo> {
        keys.iter().map(|k| ObjectInfo::file(*k, 1)).collect()
    }

    fn keys(objects: &[ObjectInfo]) -> Vec<&str> {
        objects.iter().map(|o| o.key.as_str()).collect()
    }

    #[test]
    fn test_regex_is_start_anchored() {
        let regex = KeyRegex::new(r"ds084\.1/.*\.nc").unwrap();
        assert!(regex.is_match("ds084.1/a.nc"));
        assert!(regex.is_match("ds084.1/a.nc.tar"));
        assert!(!regex.is_match("old/ds084.1/a.nc"));
    }

    #[test]
    fn test_regex_alternation_stays_anchored() {
        let regex = KeyRegex::new("a|b").unwrap();
        assert!(regex.is_match("apple"));
        assert!(regex.is_match("banana"));
        assert!(!regex.is_match("cab"));
    }

    #[test]
    fn test_regex_with_stripped_prefix() {
        let regex = KeyRegex::with_stripped_prefix(r"\d+\.txt", 3).unwrap();
        assert!(regex.is_match("ds/12.txt"));
        assert!(!regex.is_match("ds/x12.txt"));
        assert!(!regex.is_match("ds"));
    }

    #[test]
    fn test_invalid_regex() {
        assert!(matches!(KeyRegex::new("("), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_filter_regex_preserves_order() {
        let regex = KeyRegex::new("ds/").unwrap();
        let filtered = filter_regex(objects(&["ds/c", "other/a", "ds/a", "ds/b"]), &regex);
        assert_eq!(keys(&filtered), vec!["ds/c", "ds/a", "ds/b"]);
    }

    #[test]
    fn test_single_level() {
        let filtered = single_level(objects(&["ds/x.txt", "ds/sub/x.txt", "ds/", "other"]), "ds/");
        assert_eq!(keys(&filtered), vec!["ds/x.txt"]);
    }

    #[test]
    fn test_listing_mode_rejects_regex_with_single_level() {
        assert!(matches!(
            ListingMode::from_flags(Some(".*"), true),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            ListingMode::from_flags(None, true),
            Ok(ListingMode::SingleLevel)
        ));
        assert!(matches!(
            ListingMode::from_flags(Some("a"), false),
            Ok(ListingMode::Regex(_))
        ));
        assert!(matches!(
            ListingMode::from_flags(None, false),
            Ok(ListingMode::Recursive)
        ));
    }
}
