//! Content fingerprints
//!
//! A [`Fingerprint`] is the opaque, content-derived record a backend or cache
//! produces for an artifact (for example `sha256` + `size` for local files, an
//! `etag` for object stores). Outputs only store and compare fingerprints; the
//! meaning of individual fields belongs to whoever produced them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Key holding a content hash
pub const HASH_KEY: &str = "sha256";
/// Key holding a size in bytes
pub const SIZE_KEY: &str = "size";
/// Key holding an object-store entity tag
pub const ETAG_KEY: &str = "etag";
/// Suffix marking the hash of a directory manifest
pub const DIR_SUFFIX: &str = ".dir";

/// Ordered field map describing an artifact's content
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(BTreeMap<String, String>);

impl Fingerprint {
    /// Create an empty fingerprint
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Fingerprint of content stored under a hash
    pub fn from_hash(hash: impl Into<String>, size: u64) -> Self {
        Self::new().with(HASH_KEY, hash).with(SIZE_KEY, size.to_string())
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Insert a field
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Get a field
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Content hash, if the producer recorded one
    pub fn hash(&self) -> Option<&str> {
        self.get(HASH_KEY)
    }

    /// Recorded size, if present and numeric
    pub fn size(&self) -> Option<u64> {
        self.get(SIZE_KEY).and_then(|s| s.parse().ok())
    }

    /// Whether the hash refers to a directory manifest
    pub fn is_dir(&self) -> bool {
        self.hash().is_some_and(|h| h.ends_with(DIR_SUFFIX))
    }

    /// Whether there are no fields
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over fields in key order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }
}

impl FromIterator<(String, String)> for Fingerprint {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.hash() {
            Some(hash) => write!(f, "{}", hash.chars().take(12).collect::<String>()),
            None => {
                let fields: Vec<String> = self.0.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
                write!(f, "{{{}}}", fields.join(", "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_hash() {
        let fp = Fingerprint::from_hash("abc123", 42);
        assert_eq!(fp.hash(), Some("abc123"));
        assert_eq!(fp.size(), Some(42));
        assert!(!fp.is_dir());
        assert!(Fingerprint::from_hash("abc.dir", 0).is_dir());
    }

    #[test]
    fn test_serializes_as_flat_map() {
        let fp = Fingerprint::new().with(ETAG_KEY, "\"d41d8\"");
        let json = serde_json::to_value(&fp).unwrap();
        assert_eq!(json, serde_json::json!({"etag": "\"d41d8\""}));
    }

    #[test]
    fn test_display_short_hash() {
        let fp = Fingerprint::from_hash("0123456789abcdef", 1);
        assert_eq!(fp.to_string(), "0123456789ab");
    }

    #[test]
    fn test_display_non_ascii_hash() {
        let fp = Fingerprint::from_hash("ééééééééééééééé", 1);
        assert_eq!(fp.to_string(), "éééééééééééé");
    }
}
