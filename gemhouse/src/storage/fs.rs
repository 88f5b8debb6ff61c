//! Filesystem storage: `<gems_dir>/<name>-<version>.gem` blobs and
//! `<specifications_dir>/<name>-<version>.json` records.

use super::{file_stream, BlobStore, GemStream, RecordStore};
use crate::error::{StorageError, StorageResult};
use crate::identity::{PackageIdentity, GEM_EXTENSION, SPEC_EXTENSION};
use crate::record::PackageRecord;
use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

/// Write `data` to `dir/file_name` through a temporary file and a rename, so
/// the final path only ever holds complete content.
async fn write_atomically(dir: &Path, file_name: &str, data: &[u8]) -> StorageResult<PathBuf> {
    fs::create_dir_all(dir).await?;
    let target = dir.join(file_name);
    let temp = dir.join(format!(".{file_name}.{}.tmp", Uuid::new_v4()));

    if let Err(e) = fs::write(&temp, data).await {
        let _ = fs::remove_file(&temp).await;
        return Err(e.into());
    }
    if let Err(e) = fs::rename(&temp, &target).await {
        let _ = fs::remove_file(&temp).await;
        return Err(e.into());
    }
    debug!(path = %target.display(), size = data.len(), "File written");
    Ok(target)
}

async fn remove_if_present(path: &Path) -> StorageResult<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// File names in `dir` ending in `.<extension>`, skipping temporaries.
async fn list_files(dir: &Path, extension: &str) -> StorageResult<Vec<String>> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let suffix = format!(".{extension}");
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            continue;
        };
        if !name.starts_with('.') && name.ends_with(&suffix) {
            names.push(name);
        }
    }
    Ok(names)
}

/// Gem blobs stored as plain files in one directory.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    dir: PathBuf,
}

impl FsBlobStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn gem_path(&self, identity: &PackageIdentity) -> PathBuf {
        self.dir.join(identity.gem_file_name())
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn write(&self, identity: &PackageIdentity, data: Bytes) -> StorageResult<()> {
        write_atomically(&self.dir, &identity.gem_file_name(), &data).await?;
        Ok(())
    }

    async fn read(&self, identity: &PackageIdentity) -> StorageResult<Option<Bytes>> {
        match fs::read(self.gem_path(identity)).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn open_read(&self, identity: &PackageIdentity) -> StorageResult<Option<GemStream>> {
        match fs::File::open(self.gem_path(identity)).await {
            Ok(file) => Ok(Some(file_stream(file))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove(&self, identity: &PackageIdentity) -> StorageResult<bool> {
        remove_if_present(&self.gem_path(identity)).await
    }

    async fn list(&self) -> StorageResult<Vec<PackageIdentity>> {
        let mut identities = Vec::new();
        for name in list_files(&self.dir, GEM_EXTENSION).await? {
            match PackageIdentity::from_gem_file_name(&name) {
                Ok(identity) => identities.push(identity),
                Err(e) => warn!(file = %name, error = %e, "Ignoring unrecognised file in gem directory"),
            }
        }
        Ok(identities)
    }
}

/// Package records stored as one pretty-printed JSON document per gem.
#[derive(Debug, Clone)]
pub struct FsRecordStore {
    dir: PathBuf,
}

impl FsRecordStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn record_path(&self, identity: &PackageIdentity) -> PathBuf {
        self.dir.join(identity.spec_file_name())
    }
}

#[async_trait]
impl RecordStore for FsRecordStore {
    async fn save(&self, record: &PackageRecord) -> StorageResult<()> {
        let json = serde_json::to_vec_pretty(record)?;
        write_atomically(&self.dir, &record.identity.spec_file_name(), &json).await?;
        Ok(())
    }

    async fn remove(&self, identity: &PackageIdentity) -> StorageResult<bool> {
        remove_if_present(&self.record_path(identity)).await
    }

    async fn load_all(&self) -> StorageResult<Vec<PackageRecord>> {
        let mut records = Vec::new();
        for name in list_files(&self.dir, SPEC_EXTENSION).await? {
            let content = fs::read(self.dir.join(&name)).await?;
            let record: PackageRecord = serde_json::from_slice(&content).map_err(|e| {
                warn!(file = %name, error = %e, "Corrupt specification record");
                StorageError::from(e)
            })?;
            records.push(record);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ContentDigest;
    use crate::storage::collect_stream;
    use tempfile::TempDir;

    fn foo() -> PackageIdentity {
        PackageIdentity::new("foo", "1.0.0").unwrap()
    }

    #[tokio::test]
    async fn test_blob_write_read_remove() {
        let dir = TempDir::new().unwrap();
        let store = FsBlobStore::new(dir.path().join("gems"));

        assert!(store.read(&foo()).await.unwrap().is_none());
        assert!(store.open_read(&foo()).await.unwrap().is_none());

        store.write(&foo(), Bytes::from_static(b"gem bytes")).await.unwrap();
        assert!(store.gem_path(&foo()).ends_with("gems/foo-1.0.0.gem"));
        assert_eq!(
            store.read(&foo()).await.unwrap(),
            Some(Bytes::from_static(b"gem bytes"))
        );
        let stream = store.open_read(&foo()).await.unwrap().unwrap();
        assert_eq!(collect_stream(stream).await.unwrap().as_ref(), b"gem bytes");

        assert!(store.remove(&foo()).await.unwrap());
        assert!(!store.remove(&foo()).await.unwrap());
        assert!(store.read(&foo()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_blob_list_skips_foreign_files() {
        let dir = TempDir::new().unwrap();
        let store = FsBlobStore::new(dir.path());
        store.write(&foo(), Bytes::from_static(b"x")).await.unwrap();
        std::fs::write(dir.path().join("README.txt"), "hi").unwrap();
        std::fs::write(dir.path().join("not-a-version.gem"), "hi").unwrap();
        std::fs::write(dir.path().join(".foo-2.0.0.gem.abc.tmp"), "hi").unwrap();

        assert_eq!(store.list().await.unwrap(), vec![foo()]);
    }

    #[tokio::test]
    async fn test_list_of_missing_dir_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = FsBlobStore::new(dir.path().join("never-created"));
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_write_leaves_no_temporaries() {
        let dir = TempDir::new().unwrap();
        let store = FsBlobStore::new(dir.path());
        store.write(&foo(), Bytes::from_static(b"one")).await.unwrap();
        store.write(&foo(), Bytes::from_static(b"two")).await.unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["foo-1.0.0.gem".to_string()]);
        assert_eq!(store.read(&foo()).await.unwrap().unwrap().as_ref(), b"two");
    }

    #[tokio::test]
    async fn test_record_round_trip_and_corruption() {
        let dir = TempDir::new().unwrap();
        let store = FsRecordStore::new(dir.path());
        let record = PackageRecord::available(foo(), ContentDigest::compute(b"x"), 1);

        store.save(&record).await.unwrap();
        store.save(&record.yanked()).await.unwrap();
        assert_eq!(store.load_all().await.unwrap(), vec![record.yanked()]);

        std::fs::write(dir.path().join("bar-1.0.json"), "{not json").unwrap();
        assert!(matches!(
            store.load_all().await,
            Err(StorageError::Serialization(_))
        ));

        assert!(store.remove(&foo()).await.unwrap());
        assert!(!store.remove(&foo()).await.unwrap());
    }
}
