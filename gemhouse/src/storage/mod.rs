//! # Blob and Record Storage
//!
//! A repository persists two things per gem: the raw bytes (the blob) and
//! the metadata record that says whether the gem is available or yanked.
//! Each has its own trait so backends can place them independently, e.g.
//! blobs on disk next to JSON records, or both in memory for tests.
//!
//! ## Guarantees implementations provide
//!
//! - A completed [`BlobStore::write`] is visible to the very next
//!   [`BlobStore::read`] or [`BlobStore::open_read`]; readers never observe a
//!   partially written blob.
//! - Missing entries are `Ok(None)` / `Ok(false)`, never errors.
//! - Every I/O failure is returned as a [`StorageError`](crate::error::StorageError).

use crate::error::StorageResult;
use crate::identity::PackageIdentity;
use crate::record::PackageRecord;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::stream::{self, BoxStream, StreamExt};
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

pub mod fs;
pub mod memory;

pub use fs::{FsBlobStore, FsRecordStore};
pub use memory::{MemoryBlobStore, MemoryRecordStore};

/// Chunk size used when streaming files from disk.
pub const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Lazily produced gem bytes.
pub type GemStream = BoxStream<'static, StorageResult<Bytes>>;

/// Content storage for raw gem bytes, addressed by identity.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store the complete blob for `identity`, replacing any stray leftover.
    async fn write(&self, identity: &PackageIdentity, data: Bytes) -> StorageResult<()>;

    async fn read(&self, identity: &PackageIdentity) -> StorageResult<Option<Bytes>>;

    async fn open_read(&self, identity: &PackageIdentity) -> StorageResult<Option<GemStream>>;

    /// Returns `true` if a blob was removed.
    async fn remove(&self, identity: &PackageIdentity) -> StorageResult<bool>;

    /// Identities of every stored blob, in no particular order.
    async fn list(&self) -> StorageResult<Vec<PackageIdentity>>;
}

/// Durable home of package records, from which the index is rebuilt.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn save(&self, record: &PackageRecord) -> StorageResult<()>;

    /// Returns `true` if a record was removed.
    async fn remove(&self, identity: &PackageIdentity) -> StorageResult<bool>;

    async fn load_all(&self) -> StorageResult<Vec<PackageRecord>>;
}

/// A single-chunk stream over bytes already in memory.
pub fn bytes_stream(data: Bytes) -> GemStream {
    stream::once(async move { Ok(data) }).boxed()
}

/// Stream an open file in [`STREAM_CHUNK_SIZE`] chunks.
pub fn file_stream(file: File) -> GemStream {
    stream::try_unfold(file, next_chunk).boxed()
}

async fn next_chunk(mut file: File) -> StorageResult<Option<(Bytes, File)>> {
    let mut buf = BytesMut::with_capacity(STREAM_CHUNK_SIZE);
    if file.read_buf(&mut buf).await? == 0 {
        return Ok(None);
    }
    Ok(Some((buf.freeze(), file)))
}

/// Open a local file as a [`GemStream`].
pub async fn open_file_stream(path: &Path) -> StorageResult<GemStream> {
    let file = File::open(path).await?;
    Ok(file_stream(file))
}

/// Drain a stream into one buffer.
pub async fn collect_stream(mut stream: GemStream) -> StorageResult<Bytes> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        buf.extend_from_slice(&chunk?);
    }
    Ok(buf.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_file_stream_yields_whole_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big.gem");
        let data: Vec<u8> = (0..(STREAM_CHUNK_SIZE * 2 + 17))
            .map(|i| (i % 251) as u8)
            .collect();
        std::fs::write(&path, &data).unwrap();

        let stream = open_file_stream(&path).await.unwrap();
        let collected = collect_stream(stream).await.unwrap();
        assert_eq!(collected.as_ref(), data.as_slice());
    }

    #[tokio::test]
    async fn test_open_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let result = open_file_stream(&dir.path().join("missing.gem")).await;
        assert!(matches!(result, Err(StorageError::Io(_))));
    }

    #[tokio::test]
    async fn test_bytes_stream() {
        let collected = collect_stream(bytes_stream(Bytes::from_static(b"abc")))
            .await
            .unwrap();
        assert_eq!(collected, Bytes::from_static(b"abc"));
    }
}
