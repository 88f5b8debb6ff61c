//! Gem identity: the `(name, version)` key every repository lookup uses.

use crate::error::{RepositoryError, RepositoryResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Maximum allowed gem name length
pub const MAX_NAME_LENGTH: usize = 214;

/// Maximum allowed version string length
pub const MAX_VERSION_LENGTH: usize = 64;

/// File extension of stored gem blobs.
pub const GEM_EXTENSION: &str = "gem";

/// File extension of stored specification records.
pub const SPEC_EXTENSION: &str = "json";

/// Identifies a gem by exact, case-sensitive name and version.
///
/// Identities are plain values: two identities built independently compare
/// equal whenever their names and versions match. Construction validates both
/// parts so an identity can always be turned into a file name and a URI path
/// segment without escaping.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "IdentityParts")]
pub struct PackageIdentity {
    name: String,
    version: String,
}

#[derive(Deserialize)]
struct IdentityParts {
    name: String,
    version: String,
}

impl TryFrom<IdentityParts> for PackageIdentity {
    type Error = RepositoryError;

    fn try_from(parts: IdentityParts) -> Result<Self, Self::Error> {
        PackageIdentity::new(parts.name, parts.version)
    }
}

impl PackageIdentity {
    /// Create a validated identity.
    ///
    /// Names may contain ASCII letters, digits, `.`, `-` and `_` and must start
    /// with a letter or digit. Versions start with a digit and may contain
    /// ASCII letters, digits and `.`; a version never contains `-`, which is
    /// what makes `<name>-<version>` file names unambiguous.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> RepositoryResult<Self> {
        let name = name.into();
        let version = version.into();
        validate_name(&name)?;
        validate_version(&version)?;
        Ok(Self { name, version })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// `<name>-<version>`, the stem shared by blob and specification files.
    pub fn file_stem(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }

    pub fn gem_file_name(&self) -> String {
        format!("{}.{}", self.file_stem(), GEM_EXTENSION)
    }

    pub fn spec_file_name(&self) -> String {
        format!("{}.{}", self.file_stem(), SPEC_EXTENSION)
    }

    /// Parse `<name>-<version>.<extension>`.
    ///
    /// The version is everything after the last `-`, so names containing
    /// dashes (`net-http-persistent-4.0.2.gem`) parse correctly.
    pub fn from_file_name(file_name: &str, extension: &str) -> RepositoryResult<Self> {
        let stem = file_name
            .strip_suffix(extension)
            .and_then(|s| s.strip_suffix('.'))
            .ok_or_else(|| {
                RepositoryError::InvalidIdentity(format!(
                    "'{file_name}' does not end in .{extension}"
                ))
            })?;
        let (name, version) = stem.rsplit_once('-').ok_or_else(|| {
            RepositoryError::InvalidIdentity(format!(
                "'{file_name}' is not of the form <name>-<version>.{extension}"
            ))
        })?;
        Self::new(name, version)
    }

    pub fn from_gem_file_name(file_name: &str) -> RepositoryResult<Self> {
        Self::from_file_name(file_name, GEM_EXTENSION)
    }

    /// Extract the identity of a local gem file from its path.
    pub fn from_gem_path(path: &Path) -> RepositoryResult<Self> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                RepositoryError::InvalidIdentity(format!(
                    "'{}' has no usable file name",
                    path.display()
                ))
            })?;
        Self::from_gem_file_name(file_name)
    }
}

impl fmt::Display for PackageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.name, self.version)
    }
}

fn validate_name(name: &str) -> RepositoryResult<()> {
    if name.is_empty() {
        return Err(RepositoryError::InvalidIdentity(
            "gem name cannot be empty".to_string(),
        ));
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err(RepositoryError::InvalidIdentity(format!(
            "gem name is {} characters, maximum is {MAX_NAME_LENGTH}",
            name.len()
        )));
    }
    if !name.starts_with(|c: char| c.is_ascii_alphanumeric()) {
        return Err(RepositoryError::InvalidIdentity(format!(
            "gem name '{name}' must start with a letter or digit"
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
    {
        return Err(RepositoryError::InvalidIdentity(format!(
            "gem name '{name}' contains invalid characters"
        )));
    }
    Ok(())
}

fn validate_version(version: &str) -> RepositoryResult<()> {
    if version.is_empty() {
        return Err(RepositoryError::InvalidIdentity(
            "gem version cannot be empty".to_string(),
        ));
    }
    if version.len() > MAX_VERSION_LENGTH {
        return Err(RepositoryError::InvalidIdentity(format!(
            "gem version is {} characters, maximum is {MAX_VERSION_LENGTH}",
            version.len()
        )));
    }
    if !version.starts_with(|c: char| c.is_ascii_digit()) {
        return Err(RepositoryError::InvalidIdentity(format!(
            "gem version '{version}' must start with a digit"
        )));
    }
    if !version
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.')
    {
        return Err(RepositoryError::InvalidIdentity(format!(
            "gem version '{version}' contains invalid characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(name: &str, version: &str) -> PackageIdentity {
        PackageIdentity::new(name, version).expect("valid identity")
    }

    #[test]
    fn test_value_equality() {
        assert_eq!(id("foo", "1.0.0"), id("foo", "1.0.0"));
        assert_ne!(id("foo", "1.0.0"), id("Foo", "1.0.0"));
        assert_ne!(id("foo", "1.0.0"), id("foo", "1.0"));
    }

    #[test]
    fn test_file_names() {
        let foo = id("foo", "1.0.0");
        assert_eq!(foo.to_string(), "foo-1.0.0");
        assert_eq!(foo.gem_file_name(), "foo-1.0.0.gem");
        assert_eq!(foo.spec_file_name(), "foo-1.0.0.json");
    }

    #[test]
    fn test_parse_gem_file_name() {
        assert_eq!(
            PackageIdentity::from_gem_file_name("foo-1.0.0.gem").unwrap(),
            id("foo", "1.0.0")
        );
        assert_eq!(
            PackageIdentity::from_gem_file_name("net-http-persistent-4.0.2.gem").unwrap(),
            id("net-http-persistent", "4.0.2")
        );
        assert_eq!(
            PackageIdentity::from_gem_file_name("rails-7.1.0.beta1.gem").unwrap(),
            id("rails", "7.1.0.beta1")
        );
    }

    #[test]
    fn test_parse_rejects_malformed_names() {
        for bad in ["foo.gem", "foo-1.0.0.tgz", "foo-.gem", "-1.0.0.gem", "foo-bar.gem"] {
            assert!(
                PackageIdentity::from_gem_file_name(bad).is_err(),
                "{bad} should not parse"
            );
        }
    }

    #[test]
    fn test_from_gem_path() {
        let path = Path::new("/tmp/gems/foo-1.0.0.gem");
        assert_eq!(
            PackageIdentity::from_gem_path(path).unwrap(),
            id("foo", "1.0.0")
        );
    }

    #[test]
    fn test_validation() {
        assert!(PackageIdentity::new("", "1.0.0").is_err());
        assert!(PackageIdentity::new("foo", "").is_err());
        assert!(PackageIdentity::new("../etc", "1.0.0").is_err());
        assert!(PackageIdentity::new("foo bar", "1.0.0").is_err());
        assert!(PackageIdentity::new("foo", "1.0-1").is_err());
        assert!(PackageIdentity::new("foo", "v1.0").is_err());
        assert!(PackageIdentity::new("a".repeat(MAX_NAME_LENGTH + 1), "1.0").is_err());
        assert!(PackageIdentity::new("foo_bar.baz", "1.0.0.rc2").is_ok());
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: PackageIdentity =
            serde_json::from_str(r#"{"name":"foo","version":"1.0.0"}"#).unwrap();
        assert_eq!(ok, id("foo", "1.0.0"));

        let bad = serde_json::from_str::<PackageIdentity>(r#"{"name":"../x","version":"1"}"#);
        assert!(bad.is_err());
    }
}
