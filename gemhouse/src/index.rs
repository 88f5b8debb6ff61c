//! In-memory gem index and the source index snapshot built from it.

use crate::identity::PackageIdentity;
use crate::record::{PackageRecord, Specification};
use crate::version;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Search predicate over identities.
///
/// Each field that is set must match exactly; an empty query matches every
/// gem. The same shape is used as the query string of the HTTP search route.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl SpecQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            version: None,
        }
    }

    /// Match exactly one identity.
    pub fn exact(identity: &PackageIdentity) -> Self {
        Self::name(identity.name()).version(identity.version())
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn matches(&self, identity: &PackageIdentity) -> bool {
        self.name.as_deref().is_none_or(|n| n == identity.name())
            && self.version.as_deref().is_none_or(|v| v == identity.version())
    }
}

impl From<&PackageIdentity> for SpecQuery {
    fn from(identity: &PackageIdentity) -> Self {
        Self::exact(identity)
    }
}

/// Records keyed by identity, in every state.
///
/// Lookups are `O(log n)`. Readers receive clones, so no lock is held once a
/// method returns.
#[derive(Debug, Default)]
pub struct GemIndex {
    records: RwLock<BTreeMap<PackageIdentity, PackageRecord>>,
}

impl GemIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<PackageIdentity, PackageRecord>> {
        self.records.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<PackageIdentity, PackageRecord>> {
        self.records.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace the record for its identity, returning the previous one.
    pub fn insert(&self, record: PackageRecord) -> Option<PackageRecord> {
        self.write().insert(record.identity.clone(), record)
    }

    pub fn remove(&self, identity: &PackageIdentity) -> Option<PackageRecord> {
        self.write().remove(identity)
    }

    pub fn find(&self, identity: &PackageIdentity) -> Option<PackageRecord> {
        self.read().get(identity).cloned()
    }

    pub fn contains(&self, identity: &PackageIdentity) -> bool {
        self.read().contains_key(identity)
    }

    /// Records of any state matching `query`.
    pub fn search(&self, query: &SpecQuery) -> Vec<PackageRecord> {
        let records = self.read();
        match &query.name {
            // Identities order by name first, so matches for a name are contiguous.
            Some(name) => records
                .iter()
                .skip_while(|(id, _)| id.name() < name.as_str())
                .take_while(|(id, _)| id.name() == name.as_str())
                .filter(|(id, _)| query.matches(id))
                .map(|(_, record)| record.clone())
                .collect(),
            None => records
                .values()
                .filter(|record| query.matches(&record.identity))
                .cloned()
                .collect(),
        }
    }

    /// Every available record.
    pub fn snapshot(&self) -> Vec<PackageRecord> {
        self.read()
            .values()
            .filter(|record| record.is_available())
            .cloned()
            .collect()
    }

    /// Swap the whole contents, used when rebuilding from storage.
    pub fn replace(&self, records: impl IntoIterator<Item = PackageRecord>) {
        let rebuilt = records
            .into_iter()
            .map(|record| (record.identity.clone(), record))
            .collect();
        *self.write() = rebuilt;
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

fn spec_order(a: &Specification, b: &Specification) -> Ordering {
    a.name()
        .cmp(b.name())
        .then_with(|| version::compare(a.version(), b.version()))
}

/// Point-in-time index of every available gem, ordered by name and then by
/// version, for client-side dependency resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceIndex {
    pub generated_at: DateTime<Utc>,
    specifications: Vec<Specification>,
}

impl SourceIndex {
    pub fn new(specifications: impl IntoIterator<Item = Specification>) -> Self {
        let mut specifications: Vec<Specification> = specifications.into_iter().collect();
        specifications.sort_by(spec_order);
        Self {
            generated_at: Utc::now(),
            specifications,
        }
    }

    pub fn len(&self) -> usize {
        self.specifications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specifications.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Specification> {
        self.specifications.iter()
    }

    pub fn search(&self, query: &SpecQuery) -> Vec<&Specification> {
        self.iter().filter(|s| query.matches(&s.identity)).collect()
    }

    /// Distinct gem names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.iter().map(Specification::name).collect();
        names.dedup();
        names
    }

    /// Highest version of `name`, prereleases included.
    pub fn latest(&self, name: &str) -> Option<&Specification> {
        self.iter().filter(|s| s.name() == name).last()
    }

    /// Highest version of every gem.
    pub fn latest_specs(&self) -> Vec<&Specification> {
        let mut latest: Vec<&Specification> = Vec::new();
        for spec in self.iter() {
            match latest.last_mut() {
                Some(last) if last.name() == spec.name() => *last = spec,
                _ => latest.push(spec),
            }
        }
        latest
    }

    pub fn into_specifications(self) -> Vec<Specification> {
        self.specifications
    }
}

impl<'a> IntoIterator for &'a SourceIndex {
    type Item = &'a Specification;
    type IntoIter = std::slice::Iter<'a, Specification>;

    fn into_iter(self) -> Self::IntoIter {
        self.specifications.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ContentDigest;

    fn record(name: &str, version: &str) -> PackageRecord {
        let identity = PackageIdentity::new(name, version).unwrap();
        PackageRecord::available(identity, ContentDigest::compute(name.as_bytes()), 1)
    }

    fn populated() -> GemIndex {
        let index = GemIndex::new();
        for (name, version) in [
            ("bar", "0.1.0"),
            ("foo", "1.0.0"),
            ("foo", "1.1.0"),
            ("foo-ext", "1.0.0"),
            ("zed", "3.0"),
        ] {
            index.insert(record(name, version));
        }
        index
    }

    #[test]
    fn test_find_insert_remove() {
        let index = GemIndex::new();
        let foo = record("foo", "1.0.0");
        assert!(index.find(&foo.identity).is_none());
        assert!(index.insert(foo.clone()).is_none());
        assert_eq!(index.find(&foo.identity), Some(foo.clone()));
        assert_eq!(index.remove(&foo.identity), Some(foo.clone()));
        assert!(index.remove(&foo.identity).is_none());
        assert!(index.is_empty());
    }

    #[test]
    fn test_search_by_name_and_version() {
        let index = populated();
        let foo = index.search(&SpecQuery::name("foo"));
        assert_eq!(foo.len(), 2);
        assert!(foo.iter().all(|r| r.identity.name() == "foo"));

        let exact = index.search(&SpecQuery::name("foo").version("1.1.0"));
        assert_eq!(exact.len(), 1);
        assert_eq!(exact[0].identity.version(), "1.1.0");

        assert!(index.search(&SpecQuery::name("nope")).is_empty());
        assert_eq!(index.search(&SpecQuery::all()).len(), 5);
        assert_eq!(
            index
                .search(&SpecQuery {
                    name: None,
                    version: Some("1.0.0".into())
                })
                .len(),
            2
        );
    }

    #[test]
    fn test_search_includes_yanked_snapshot_does_not() {
        let index = populated();
        let foo = record("foo", "1.0.0");
        index.insert(foo.yanked());

        assert_eq!(index.search(&SpecQuery::exact(&foo.identity)).len(), 1);
        assert!(index
            .snapshot()
            .iter()
            .all(|r| r.identity != foo.identity));
        assert_eq!(index.snapshot().len(), 4);
    }

    #[test]
    fn test_replace() {
        let index = populated();
        index.replace(vec![record("only", "1.0")]);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_source_index_ordering_and_latest() {
        let specs = ["1.10.0", "1.9.0", "1.10.0.rc1", "2.0.0.beta"]
            .iter()
            .map(|v| record("foo", v).specification())
            .chain([record("bar", "0.2").specification()]);
        let index = SourceIndex::new(specs);

        let versions: Vec<&str> = index.iter().map(|s| s.version()).collect();
        assert_eq!(
            versions,
            vec!["0.2", "1.9.0", "1.10.0.rc1", "1.10.0", "2.0.0.beta"]
        );
        assert_eq!(index.names(), vec!["bar", "foo"]);
        assert_eq!(index.latest("foo").map(|s| s.version()), Some("2.0.0.beta"));
        assert!(index.latest("missing").is_none());

        let latest: Vec<String> = index
            .latest_specs()
            .iter()
            .map(|s| s.identity.to_string())
            .collect();
        assert_eq!(latest, vec!["bar-0.2", "foo-2.0.0.beta"]);
        assert_eq!(index.search(&SpecQuery::name("foo")).len(), 4);
    }
}
