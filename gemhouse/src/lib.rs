//! # Gemhouse
//!
//! A gem repository: versioned packages addressed by name and version, with
//! publish, retrieve, yank (soft delete), delete and search, plus a source
//! index for client-side dependency resolution.
//!
//! Every backend implements [`RepositoryApi`] with the same visibility and
//! consistency guarantees:
//!
//! - [`Repository`]: blobs and records in a [`storage`] backend (filesystem
//!   or memory), indexed in memory and rebuilt from storage on open.
//! - [`RemoteRepository`]: the same API over HTTP, talking to [`server`].
//!
//! ## Key Modules
//!
//! - [`identity`]: `PackageIdentity` and gem file name parsing
//! - [`record`]: package records, availability state and digests
//! - [`index`]: the in-memory index, search queries and the source index
//! - [`storage`]: blob and record storage traits and implementations
//! - [`uri`]: address resolution for gems and specifications
//! - [`repository`]: the API contract and the storage-backed orchestrator
//! - [`remote`]: the HTTP client backend
//! - [`server`]: the axum front end
//! - [`config`]: JSON configuration
//! - [`error`]: error types and HTTP error responses
//!
//! ```rust,no_run
//! use gemhouse::{AddRequest, PackageIdentity, Repository, RepositoryApi, SpecQuery};
//! # async fn demo() -> gemhouse::RepositoryResult<()> {
//! let repo = Repository::open_local(std::path::Path::new("./data")).await?;
//! let foo = PackageIdentity::new("foo", "1.0.0")?;
//! repo.add(AddRequest::from_bytes(foo.clone(), &b"..."[..])).await?;
//! assert_eq!(repo.search_for(&SpecQuery::from(&foo)).await?.len(), 1);
//! repo.yank(&foo).await?;
//! assert!(repo.search_for(&SpecQuery::from(&foo)).await?.is_empty());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod identity;
pub mod index;
pub mod locks;
pub mod record;
pub mod remote;
pub mod repository;
pub mod server;
pub mod storage;
pub mod uri;
pub mod version;

pub use config::Config;
pub use error::{
    ApiErrorResponse, AppError, AppResult, ErrorCode, RepositoryError, RepositoryResult,
    StorageError, StorageResult,
};
pub use identity::PackageIdentity;
pub use index::{GemIndex, SourceIndex, SpecQuery};
pub use record::{ContentDigest, GemState, PackageRecord, Specification};
pub use remote::RemoteRepository;
pub use repository::{AddRequest, Repository, RepositoryApi, RepositoryBuilder};
pub use server::{router, run_server};
pub use storage::{BlobStore, GemStream, RecordStore};
pub use uri::{LayoutResolver, UriIntent, UriResolver};
