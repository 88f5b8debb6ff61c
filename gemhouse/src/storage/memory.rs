//! In-process storage, used for ephemeral repositories and tests.

use super::{bytes_stream, BlobStore, GemStream, RecordStore};
use crate::error::StorageResult;
use crate::identity::PackageIdentity;
use crate::record::PackageRecord;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<PackageIdentity, Bytes>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&self, identity: &PackageIdentity) -> Option<Bytes> {
        self.blobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(identity)
            .cloned()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn write(&self, identity: &PackageIdentity, data: Bytes) -> StorageResult<()> {
        self.blobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(identity.clone(), data);
        Ok(())
    }

    async fn read(&self, identity: &PackageIdentity) -> StorageResult<Option<Bytes>> {
        Ok(self.get(identity))
    }

    async fn open_read(&self, identity: &PackageIdentity) -> StorageResult<Option<GemStream>> {
        Ok(self.get(identity).map(bytes_stream))
    }

    async fn remove(&self, identity: &PackageIdentity) -> StorageResult<bool> {
        Ok(self
            .blobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(identity)
            .is_some())
    }

    async fn list(&self) -> StorageResult<Vec<PackageIdentity>> {
        Ok(self
            .blobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect())
    }
}

#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: RwLock<HashMap<PackageIdentity, PackageRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn save(&self, record: &PackageRecord) -> StorageResult<()> {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(record.identity.clone(), record.clone());
        Ok(())
    }

    async fn remove(&self, identity: &PackageIdentity) -> StorageResult<bool> {
        Ok(self
            .records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(identity)
            .is_some())
    }

    async fn load_all(&self) -> StorageResult<Vec<PackageRecord>> {
        Ok(self
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect())
    }
}
