//! Shared fixtures for the integration tests.
//!
//! Every backend is wrapped in a [`Fixture`] that owns whatever keeps it alive
//! (temporary directories, the server task) next to a `foo-1.0.0.gem` file.

#![allow(dead_code)]

use gemhouse::config::RemoteConfig;
use gemhouse::{PackageIdentity, RemoteRepository, Repository, RepositoryApi};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use url::Url;

pub struct Fixture {
    pub repo: Arc<dyn RepositoryApi>,
    pub gem_path: PathBuf,
    pub gem_bytes: Vec<u8>,
    pub dir: TempDir,
    server: Option<JoinHandle<()>>,
}

impl Drop for Fixture {
    fn drop(&mut self) {
        if let Some(server) = self.server.take() {
            server.abort();
        }
    }
}

pub fn foo() -> PackageIdentity {
    PackageIdentity::new("foo", "1.0.0").unwrap()
}

pub fn identity(name: &str, version: &str) -> PackageIdentity {
    PackageIdentity::new(name, version).unwrap()
}

pub fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

/// Deterministic gem content large enough to span several stream chunks.
pub fn gem_content(seed: u8) -> Vec<u8> {
    (0..150_000u32)
        .map(|i| ((i * 31 + seed as u32) % 251) as u8)
        .collect()
}

fn write_gem(dir: &TempDir) -> (PathBuf, Vec<u8>) {
    let path = dir.path().join("foo-1.0.0.gem");
    let bytes = gem_content(7);
    std::fs::write(&path, &bytes).unwrap();
    (path, bytes)
}

fn fixture(repo: Arc<dyn RepositoryApi>, dir: TempDir, server: Option<JoinHandle<()>>) -> Fixture {
    let (gem_path, gem_bytes) = write_gem(&dir);
    Fixture {
        repo,
        gem_path,
        gem_bytes,
        dir,
        server,
    }
}

pub async fn memory_backend() -> Fixture {
    let base = Url::parse("http://gems.example.test/").unwrap();
    let repo = Repository::in_memory(&base).await.unwrap();
    fixture(Arc::new(repo), TempDir::new().unwrap(), None)
}

pub async fn local_backend() -> Fixture {
    let dir = TempDir::new().unwrap();
    let repo = Repository::open_local(&dir.path().join("repo")).await.unwrap();
    fixture(Arc::new(repo), dir, None)
}

/// A live server on an ephemeral port over an in-memory repository, and a
/// [`RemoteRepository`] pointed at it.
pub async fn remote_backend() -> Fixture {
    served_backend("127.0.0.1").await
}

/// Like [`remote_backend`], but the client reaches the server under a
/// different host name than the one the server addresses itself by.
pub async fn remote_hostname_backend() -> Fixture {
    served_backend("localhost").await
}

async fn served_backend(client_host: &str) -> Fixture {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let server_base = Url::parse(&format!("http://127.0.0.1:{port}/")).unwrap();
    let client_base = Url::parse(&format!("http://{client_host}:{port}/")).unwrap();

    let served = Repository::in_memory(&server_base).await.unwrap();
    let server = tokio::spawn(async move {
        let _ = gemhouse::server::serve(listener, Arc::new(served)).await;
    });

    let repo = RemoteRepository::new(client_base, &RemoteConfig::default()).unwrap();
    fixture(Arc::new(repo), TempDir::new().unwrap(), Some(server))
}

/// A client for a port nothing listens on.
pub async fn unreachable_remote() -> RemoteRepository {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let base = Url::parse(&format!("http://{addr}/")).unwrap();
    RemoteRepository::new(base, &RemoteConfig::default()).unwrap()
}
