//! Address resolution for gem blobs and specification records.
//!
//! Resolvers are pure: they turn an identity into an address without
//! checking whether anything is stored there. The repository decides
//! visibility before asking for an address.

use crate::error::{RepositoryError, RepositoryResult};
use crate::identity::PackageIdentity;
use std::fmt;
use std::path::Path;
use url::Url;

/// What an address should point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UriIntent {
    /// The raw gem blob.
    Gem,
    /// The gem's specification record.
    Specification,
}

/// Maps identities to locatable addresses for one backend.
pub trait UriResolver: Send + Sync + fmt::Debug {
    /// Root address of the repository.
    fn base(&self) -> &Url;

    /// Address of the collection holding everything of the given kind.
    fn collection(&self, intent: UriIntent) -> &Url;

    fn resolve(&self, identity: &PackageIdentity, intent: UriIntent) -> Url;
}

/// Resolver for layouts where blobs and records live in two sibling
/// collections below a base address, e.g. `file:///srv/gems/` on disk or
/// `http://host:9292/gems/` behind the HTTP server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutResolver {
    base: Url,
    gems: Url,
    specifications: Url,
}

pub const DEFAULT_GEMS_COLLECTION: &str = "gems";
pub const DEFAULT_SPECIFICATIONS_COLLECTION: &str = "specifications";

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

impl LayoutResolver {
    pub fn new(base: Url, gems: &str, specifications: &str) -> RepositoryResult<Self> {
        if base.cannot_be_a_base() {
            return Err(RepositoryError::Config(format!(
                "'{base}' cannot be used as a repository base address"
            )));
        }
        let base = with_trailing_slash(base);
        let collection = |name: &str| -> RepositoryResult<Url> {
            let trimmed = name.trim_matches('/');
            base.join(&format!("{trimmed}/")).map_err(|e| {
                RepositoryError::Config(format!("invalid collection '{name}' under {base}: {e}"))
            })
        };
        Ok(Self {
            gems: collection(gems)?,
            specifications: collection(specifications)?,
            base,
        })
    }

    /// `file://` addresses for a repository rooted at an absolute directory.
    pub fn for_directory(root: &Path, gems: &str, specifications: &str) -> RepositoryResult<Self> {
        let base = Url::from_directory_path(root).map_err(|()| {
            RepositoryError::Config(format!(
                "'{}' is not an absolute directory path",
                root.display()
            ))
        })?;
        Self::new(base, gems, specifications)
    }

    /// Addresses served by the HTTP front end at `server`.
    pub fn for_server(server: &Url) -> RepositoryResult<Self> {
        Self::new(
            server.clone(),
            DEFAULT_GEMS_COLLECTION,
            DEFAULT_SPECIFICATIONS_COLLECTION,
        )
    }
}

impl UriResolver for LayoutResolver {
    fn base(&self) -> &Url {
        &self.base
    }

    fn collection(&self, intent: UriIntent) -> &Url {
        match intent {
            UriIntent::Gem => &self.gems,
            UriIntent::Specification => &self.specifications,
        }
    }

    fn resolve(&self, identity: &PackageIdentity, intent: UriIntent) -> Url {
        let file_name = match intent {
            UriIntent::Gem => identity.gem_file_name(),
            UriIntent::Specification => identity.spec_file_name(),
        };
        let mut url = self.collection(intent).clone();
        // Collections are built from base-capable URLs, so segments are always available.
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(&file_name);
        }
        url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn foo() -> PackageIdentity {
        PackageIdentity::new("foo", "1.0.0").unwrap()
    }

    #[test]
    fn test_server_layout() {
        let server = Url::parse("http://localhost:9292").unwrap();
        let resolver = LayoutResolver::for_server(&server).unwrap();
        assert_eq!(resolver.base().as_str(), "http://localhost:9292/");
        assert_eq!(
            resolver.collection(UriIntent::Gem).as_str(),
            "http://localhost:9292/gems/"
        );
        assert_eq!(
            resolver.resolve(&foo(), UriIntent::Gem).as_str(),
            "http://localhost:9292/gems/foo-1.0.0.gem"
        );
        assert_eq!(
            resolver.resolve(&foo(), UriIntent::Specification).as_str(),
            "http://localhost:9292/specifications/foo-1.0.0.json"
        );
    }

    #[test]
    fn test_server_layout_under_path_prefix() {
        let server = Url::parse("https://example.com/mirror").unwrap();
        let resolver = LayoutResolver::for_server(&server).unwrap();
        assert_eq!(
            resolver.resolve(&foo(), UriIntent::Gem).as_str(),
            "https://example.com/mirror/gems/foo-1.0.0.gem"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_directory_layout() {
        let resolver =
            LayoutResolver::for_directory(Path::new("/srv/repo"), "gems", "specifications")
                .unwrap();
        assert_eq!(resolver.base().as_str(), "file:///srv/repo/");
        assert_eq!(
            resolver.resolve(&foo(), UriIntent::Gem).as_str(),
            "file:///srv/repo/gems/foo-1.0.0.gem"
        );
        assert_eq!(
            resolver.resolve(&foo(), UriIntent::Specification).as_str(),
            "file:///srv/repo/specifications/foo-1.0.0.json"
        );
    }

    #[test]
    fn test_relative_directory_rejected() {
        let result = LayoutResolver::for_directory(Path::new("relative/dir"), "gems", "specs");
        assert!(matches!(result, Err(RepositoryError::Config(_))));
    }

    #[test]
    fn test_cannot_be_a_base_rejected() {
        let url = Url::parse("mailto:someone@example.com").unwrap();
        assert!(LayoutResolver::new(url, "gems", "specifications").is_err());
    }
}
