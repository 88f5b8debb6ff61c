//! # Repository API
//!
//! [`RepositoryApi`] is the contract every backend honours: publish with
//! [`add`](RepositoryApi::add) / [`push`](RepositoryApi::push), retrieve with
//! [`get`](RepositoryApi::get) / [`open`](RepositoryApi::open), discover with
//! [`search_for`](RepositoryApi::search_for) /
//! [`source_index`](RepositoryApi::source_index), and retire with
//! [`yank`](RepositoryApi::yank) / [`delete`](RepositoryApi::delete).
//!
//! Two implementations ship with the crate:
//!
//! - [`Repository`]: orchestrates a [`BlobStore`], a [`RecordStore`] and an
//!   in-memory [`GemIndex`]. Backed by the filesystem ([`Repository::local`])
//!   or by memory ([`Repository::in_memory`]).
//! - [`RemoteRepository`](crate::remote::RemoteRepository): talks HTTP to a
//!   server built from [`crate::server::router`].
//!
//! ## Visibility rules
//!
//! | State | `get`/`open`/`uri_for_gem` | `search_for`/`source_index`/`uri_for_specification` |
//! |---|---|---|
//! | Available | present | present |
//! | Yanked | present | absent |
//! | Deleted / never pushed | absent | absent |

use crate::config::StorageConfig;
use crate::error::{RepositoryError, RepositoryResult};
use crate::identity::PackageIdentity;
use crate::index::{GemIndex, SourceIndex, SpecQuery};
use crate::locks::IdentityLocks;
use crate::record::{ContentDigest, ContentHasher, PackageRecord, Specification};
use crate::storage::{
    bytes_stream, open_file_stream, BlobStore, FsBlobStore, FsRecordStore, GemStream,
    MemoryBlobStore, MemoryRecordStore, RecordStore,
};
use crate::uri::{LayoutResolver, UriIntent, UriResolver};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

/// Input to [`RepositoryApi::add`]: an identity and the gem bytes as a stream.
pub struct AddRequest {
    pub identity: PackageIdentity,
    pub body: GemStream,
}

impl AddRequest {
    pub fn new(identity: PackageIdentity, body: GemStream) -> Self {
        Self { identity, body }
    }

    pub fn from_bytes(identity: PackageIdentity, data: impl Into<Bytes>) -> Self {
        Self::new(identity, bytes_stream(data.into()))
    }

    /// Stream a local `<name>-<version>.gem` file, taking the identity from
    /// its file name.
    pub async fn from_file(path: &Path) -> RepositoryResult<Self> {
        let identity = PackageIdentity::from_gem_path(path)?;
        let body = open_file_stream(path).await?;
        Ok(Self::new(identity, body))
    }
}

impl fmt::Debug for AddRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AddRequest")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

/// Operations shared by every repository backend.
///
/// Absence is never an error: lookups return `None`, `yank` returns `None`
/// and `delete` returns `false` when there is nothing to act on. Only
/// `add`/`push` fail in normal operation, with
/// [`RepositoryError::Duplicate`] when a record for the identity already
/// exists in any state. Storage and transport failures propagate as
/// [`RepositoryError::Storage`].
#[async_trait]
pub trait RepositoryApi: Send + Sync {
    /// Address layout of this backend.
    fn resolver(&self) -> &dyn UriResolver;

    /// Base address of the repository.
    fn uri(&self) -> Url {
        self.resolver().base().clone()
    }

    /// Address of the collection holding gem blobs.
    fn gems_uri(&self) -> Url {
        self.resolver().collection(UriIntent::Gem).clone()
    }

    /// Address of the collection holding specification records.
    fn specifications_uri(&self) -> Url {
        self.resolver().collection(UriIntent::Specification).clone()
    }

    /// Publish a local gem file.
    async fn push(&self, path: &Path) -> RepositoryResult<PackageRecord> {
        let request = AddRequest::from_file(path).await?;
        self.add(request).await
    }

    /// Publish a gem from a byte stream.
    async fn add(&self, request: AddRequest) -> RepositoryResult<PackageRecord>;

    /// Raw gem bytes, for available and yanked gems alike.
    async fn get(&self, identity: &PackageIdentity) -> RepositoryResult<Option<Bytes>>;

    /// Like [`get`](Self::get) but streamed.
    async fn open(&self, identity: &PackageIdentity) -> RepositoryResult<Option<GemStream>>;

    /// Metadata of a stored gem in any state.
    async fn record(&self, identity: &PackageIdentity) -> RepositoryResult<Option<PackageRecord>>;

    /// Available gems matching `query`, ordered by name then version.
    async fn search_for(&self, query: &SpecQuery) -> RepositoryResult<Vec<Specification>>;

    /// Snapshot of every available gem.
    async fn source_index(&self) -> RepositoryResult<SourceIndex>;

    /// Address of the gem blob. Present for yanked gems too.
    async fn uri_for_gem(&self, identity: &PackageIdentity) -> RepositoryResult<Option<Url>> {
        Ok(self
            .record(identity)
            .await?
            .map(|_| self.resolver().resolve(identity, UriIntent::Gem)))
    }

    /// Address of the specification record. Absent unless the gem is available.
    async fn uri_for_specification(
        &self,
        identity: &PackageIdentity,
    ) -> RepositoryResult<Option<Url>> {
        Ok(self
            .record(identity)
            .await?
            .filter(PackageRecord::is_available)
            .map(|_| self.resolver().resolve(identity, UriIntent::Specification)))
    }

    /// Hide an available gem from discovery. Returns its gem address, or
    /// `None` if there was no available gem to yank.
    async fn yank(&self, identity: &PackageIdentity) -> RepositoryResult<Option<Url>>;

    /// Remove record and blob in any state. Returns `false` if nothing existed.
    async fn delete(&self, identity: &PackageIdentity) -> RepositoryResult<bool>;
}

/// Storage-backed repository.
pub struct Repository {
    blobs: Arc<dyn BlobStore>,
    records: Arc<dyn RecordStore>,
    resolver: Arc<dyn UriResolver>,
    index: GemIndex,
    locks: IdentityLocks,
    max_gem_size: Option<u64>,
}

impl fmt::Debug for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("resolver", &self.resolver)
            .field("gems", &self.index.len())
            .field("max_gem_size", &self.max_gem_size)
            .finish_non_exhaustive()
    }
}

/// Assembles a [`Repository`] from its parts.
#[derive(Default)]
pub struct RepositoryBuilder {
    blobs: Option<Arc<dyn BlobStore>>,
    records: Option<Arc<dyn RecordStore>>,
    resolver: Option<Arc<dyn UriResolver>>,
    max_gem_size: Option<u64>,
}

impl RepositoryBuilder {
    pub fn blob_store(mut self, blobs: Arc<dyn BlobStore>) -> Self {
        self.blobs = Some(blobs);
        self
    }

    pub fn record_store(mut self, records: Arc<dyn RecordStore>) -> Self {
        self.records = Some(records);
        self
    }

    pub fn resolver(mut self, resolver: Arc<dyn UriResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Reject gems larger than `bytes`.
    pub fn max_gem_size(mut self, bytes: u64) -> Self {
        self.max_gem_size = Some(bytes);
        self
    }

    /// Build the repository and load its index from the stores.
    ///
    /// Stores default to in-memory ones; a resolver is required.
    pub async fn build(self) -> RepositoryResult<Repository> {
        let resolver = self
            .resolver
            .ok_or_else(|| RepositoryError::Config("repository has no uri resolver".into()))?;
        let repository = Repository {
            blobs: self
                .blobs
                .unwrap_or_else(|| Arc::new(MemoryBlobStore::new())),
            records: self
                .records
                .unwrap_or_else(|| Arc::new(MemoryRecordStore::new())),
            resolver,
            index: GemIndex::new(),
            locks: IdentityLocks::new(),
            max_gem_size: self.max_gem_size,
        };
        repository.rebuild_index().await?;
        Ok(repository)
    }
}

impl Repository {
    pub fn builder() -> RepositoryBuilder {
        RepositoryBuilder::default()
    }

    /// Builder for a filesystem repository laid out per `storage`, addressed
    /// with `file://` URLs. Creates the directories if needed.
    pub async fn local(storage: &StorageConfig) -> RepositoryResult<RepositoryBuilder> {
        tokio::fs::create_dir_all(storage.gems_path()).await?;
        tokio::fs::create_dir_all(storage.specifications_path()).await?;
        let root = tokio::fs::canonicalize(&storage.data_dir).await?;

        let resolver = LayoutResolver::for_directory(
            &root,
            &storage.gems_dir,
            &storage.specifications_dir,
        )?;
        debug!(root = %root.display(), "Opening local repository");

        Ok(Self::builder()
            .blob_store(Arc::new(FsBlobStore::new(root.join(&storage.gems_dir))))
            .record_store(Arc::new(FsRecordStore::new(
                root.join(&storage.specifications_dir),
            )))
            .resolver(Arc::new(resolver)))
    }

    /// Open the filesystem repository at `dir` with the default layout.
    pub async fn open_local(dir: &Path) -> RepositoryResult<Self> {
        Self::local(&StorageConfig::at(dir)).await?.build().await
    }

    /// An empty repository held in memory, addressed like a server at `base`.
    pub async fn in_memory(base: &Url) -> RepositoryResult<Self> {
        Self::builder()
            .resolver(Arc::new(LayoutResolver::for_server(base)?))
            .build()
            .await
    }

    /// Reload the index from the record store, reconciling it with the
    /// stored blobs. Returns the number of indexed gems.
    ///
    /// A blob without a record is indexed as available with a fresh digest.
    /// A record without a blob is discarded.
    pub async fn rebuild_index(&self) -> RepositoryResult<usize> {
        let mut orphans: HashSet<PackageIdentity> =
            self.blobs.list().await?.into_iter().collect();

        let mut rebuilt = Vec::new();
        for record in self.records.load_all().await? {
            if orphans.remove(&record.identity) {
                rebuilt.push(record);
            } else {
                warn!(gem = %record.identity, "Discarding specification record without a gem blob");
                self.records.remove(&record.identity).await?;
            }
        }

        for identity in orphans {
            let Some(data) = self.blobs.read(&identity).await? else {
                continue;
            };
            let record =
                PackageRecord::available(identity, ContentDigest::compute(&data), data.len() as u64);
            self.records.save(&record).await?;
            warn!(gem = %record.identity, "Indexed gem blob that had no specification record");
            rebuilt.push(record);
        }

        let count = rebuilt.len();
        self.index.replace(rebuilt);
        info!(gems = count, "Index rebuilt");
        Ok(count)
    }

    /// Drain an upload, enforcing the size limit as bytes arrive.
    async fn collect_body(
        &self,
        mut body: GemStream,
    ) -> RepositoryResult<(Bytes, ContentDigest, u64)> {
        let mut hasher = ContentHasher::new();
        let mut buf = BytesMut::new();
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            hasher.update(&chunk);
            if let Some(limit) = self.max_gem_size {
                if hasher.size() > limit {
                    return Err(RepositoryError::TooLarge { limit });
                }
            }
            buf.extend_from_slice(&chunk);
        }
        let (digest, size) = hasher.finish();
        Ok((buf.freeze(), digest, size))
    }
}

#[async_trait]
impl RepositoryApi for Repository {
    fn resolver(&self) -> &dyn UriResolver {
        self.resolver.as_ref()
    }

    async fn add(&self, request: AddRequest) -> RepositoryResult<PackageRecord> {
        let AddRequest { identity, body } = request;
        let _guard = self.locks.lock(&identity).await;

        if self.index.contains(&identity) {
            debug!(gem = %identity, "Rejecting duplicate push");
            return Err(RepositoryError::Duplicate(identity));
        }

        let (data, sha256, size) = self.collect_body(body).await?;
        self.blobs.write(&identity, data).await?;

        let record = PackageRecord::available(identity, sha256, size);
        if let Err(e) = self.records.save(&record).await {
            if let Err(cleanup) = self.blobs.remove(&record.identity).await {
                warn!(gem = %record.identity, error = %cleanup, "Failed to remove blob after record write failure");
            }
            return Err(e.into());
        }

        self.index.insert(record.clone());
        info!(gem = %record.identity, size, sha256 = %record.sha256, "Gem added");
        Ok(record)
    }

    async fn get(&self, identity: &PackageIdentity) -> RepositoryResult<Option<Bytes>> {
        if !self.index.contains(identity) {
            debug!(gem = %identity, "Gem not found");
            return Ok(None);
        }
        let data = self.blobs.read(identity).await?;
        if data.is_none() {
            warn!(gem = %identity, "Indexed gem has no blob");
        }
        Ok(data)
    }

    async fn open(&self, identity: &PackageIdentity) -> RepositoryResult<Option<GemStream>> {
        if !self.index.contains(identity) {
            debug!(gem = %identity, "Gem not found");
            return Ok(None);
        }
        let stream = self.blobs.open_read(identity).await?;
        if stream.is_none() {
            warn!(gem = %identity, "Indexed gem has no blob");
        }
        Ok(stream)
    }

    async fn record(&self, identity: &PackageIdentity) -> RepositoryResult<Option<PackageRecord>> {
        Ok(self.index.find(identity))
    }

    async fn search_for(&self, query: &SpecQuery) -> RepositoryResult<Vec<Specification>> {
        let matches = self
            .index
            .search(query)
            .iter()
            .filter(|record| record.is_available())
            .map(PackageRecord::specification)
            .collect::<Vec<_>>();
        Ok(SourceIndex::new(matches).into_specifications())
    }

    async fn source_index(&self) -> RepositoryResult<SourceIndex> {
        Ok(SourceIndex::new(
            self.index.snapshot().iter().map(PackageRecord::specification),
        ))
    }

    async fn yank(&self, identity: &PackageIdentity) -> RepositoryResult<Option<Url>> {
        let _guard = self.locks.lock(identity).await;

        let Some(record) = self.index.find(identity).filter(PackageRecord::is_available) else {
            debug!(gem = %identity, "Nothing to yank");
            return Ok(None);
        };

        let yanked = record.yanked();
        self.records.save(&yanked).await?;
        self.index.insert(yanked);
        info!(gem = %identity, "Gem yanked");
        Ok(Some(self.resolver.resolve(identity, UriIntent::Gem)))
    }

    async fn delete(&self, identity: &PackageIdentity) -> RepositoryResult<bool> {
        let _guard = self.locks.lock(identity).await;

        let Some(record) = self.index.remove(identity) else {
            debug!(gem = %identity, "Nothing to delete");
            return Ok(false);
        };

        if let Err(e) = self.blobs.remove(identity).await {
            self.index.insert(record);
            return Err(e.into());
        }
        self.records.remove(identity).await?;
        info!(gem = %identity, state = ?record.state, "Gem deleted");
        Ok(true)
    }
}
