//! Package records, their availability state, and content digests.

use crate::identity::PackageIdentity;
use crate::version;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Availability of a stored gem.
///
/// `Available` gems are discoverable through search, the source index and
/// their specification address. `Yanked` gems are hidden from all three but
/// their blob stays retrievable by direct address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GemState {
    Available,
    Yanked,
}

/// Lowercase hex SHA-256 of a gem's bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentDigest(String);

impl ContentDigest {
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = ContentHasher::new();
        hasher.update(data);
        hasher.finish().0
    }

    pub fn as_hex(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Incremental digest over a gem body that arrives in chunks.
#[derive(Default)]
pub struct ContentHasher {
    hasher: Sha256,
    size: u64,
}

impl ContentHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
        self.size += chunk.len() as u64;
    }

    /// Bytes hashed so far.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn finish(self) -> (ContentDigest, u64) {
        (
            ContentDigest(format!("{:x}", self.hasher.finalize())),
            self.size,
        )
    }
}

/// Metadata entry for one stored gem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRecord {
    #[serde(flatten)]
    pub identity: PackageIdentity,
    pub state: GemState,
    pub sha256: ContentDigest,
    pub size: u64,
    pub pushed_at: DateTime<Utc>,
}

impl PackageRecord {
    /// A freshly pushed, available record.
    pub fn available(identity: PackageIdentity, sha256: ContentDigest, size: u64) -> Self {
        Self {
            identity,
            state: GemState::Available,
            sha256,
            size,
            pushed_at: Utc::now(),
        }
    }

    pub fn is_available(&self) -> bool {
        self.state == GemState::Available
    }

    /// The same record in the `Yanked` state; digest and size are unchanged.
    pub fn yanked(&self) -> Self {
        Self {
            state: GemState::Yanked,
            ..self.clone()
        }
    }

    pub fn specification(&self) -> Specification {
        Specification {
            identity: self.identity.clone(),
            sha256: self.sha256.clone(),
            size: self.size,
            prerelease: version::is_prerelease(self.identity.version()),
            pushed_at: self.pushed_at,
        }
    }
}

/// Published metadata view of an available gem, as served to clients that
/// resolve dependencies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Specification {
    #[serde(flatten)]
    pub identity: PackageIdentity,
    pub sha256: ContentDigest,
    pub size: u64,
    pub prerelease: bool,
    pub pushed_at: DateTime<Utc>,
}

impl Specification {
    pub fn name(&self) -> &str {
        self.identity.name()
    }

    pub fn version(&self) -> &str {
        self.identity.version()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_known_value() {
        let digest = ContentDigest::compute(b"hello world");
        assert_eq!(
            digest.as_hex(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_chunked_digest_matches_whole() {
        let mut hasher = ContentHasher::new();
        hasher.update(b"hello ");
        hasher.update(b"world");
        assert_eq!(hasher.size(), 11);
        let (digest, size) = hasher.finish();
        assert_eq!(digest, ContentDigest::compute(b"hello world"));
        assert_eq!(size, 11);
    }

    #[test]
    fn test_yank_keeps_digest() {
        let identity = PackageIdentity::new("foo", "1.0.0").unwrap();
        let record = PackageRecord::available(identity, ContentDigest::compute(b"gem"), 3);
        let yanked = record.yanked();
        assert!(record.is_available());
        assert!(!yanked.is_available());
        assert_eq!(yanked.sha256, record.sha256);
        assert_eq!(yanked.pushed_at, record.pushed_at);
    }

    #[test]
    fn test_record_json_shape() {
        let identity = PackageIdentity::new("foo", "1.0.0").unwrap();
        let record = PackageRecord::available(identity, ContentDigest::compute(b"gem"), 3).yanked();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["name"], "foo");
        assert_eq!(json["version"], "1.0.0");
        assert_eq!(json["state"], "yanked");
        assert_eq!(json["size"], 3);

        let back: PackageRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_specification_flags_prerelease() {
        let identity = PackageIdentity::new("foo", "2.0.0.rc1").unwrap();
        let spec = PackageRecord::available(identity, ContentDigest::compute(b""), 0).specification();
        assert!(spec.prerelease);
        assert_eq!(spec.name(), "foo");
        assert_eq!(spec.version(), "2.0.0.rc1");
    }
}
