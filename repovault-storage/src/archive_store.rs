// Copyright 2025 Repovault (https://github.com/repovault)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Versioned archive object store.
//!
//! Keys are logical object paths like `ACME/platform/main.zip`. Every
//! successful write yields a new store-assigned version identifier; a key
//! is never overwritten in place. Retention of old versions is the store's
//! own lifecycle policy, not ours.

use async_trait::async_trait;
use dashmap::DashMap;
use object_store::{path::Path as ObjectPath, ObjectStore, PutPayload};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;
use url::Url;
use uuid::Uuid;

use crate::error::StorageError;

/// One immutable write of an object key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredVersion {
    pub object_key: String,
    pub version_id: String,
}

/// Versioned object storage for archive files.
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    /// Download the most recent stored version of `key` into `dest_dir`.
    /// `Ok(None)` when the key has never been written.
    async fn fetch_latest(
        &self,
        key: &str,
        dest_dir: &Path,
    ) -> Result<Option<PathBuf>, StorageError>;

    /// Upload `file` under `key`. The store assigns the version.
    async fn store(&self, key: &str, file: &Path) -> Result<StoredVersion, StorageError>;
}

fn download_file_name(key: &str) -> String {
    key.replace('/', "__")
}

/// Archive store backed by any `object_store` compatible service
/// (S3 and friends via URL, `file://` for development).
///
/// The backing bucket is expected to have versioning enabled; a put that
/// comes back without a version identifier (or at least an etag) is
/// rejected rather than recorded blind.
pub struct RemoteArchiveStore {
    store: Arc<dyn ObjectStore>,
    prefix: ObjectPath,
}

impl RemoteArchiveStore {
    pub fn from_url(url: &str) -> Result<Self, StorageError> {
        let url = Url::parse(url)?;
        let (store, prefix) = object_store::parse_url(&url)?;
        Ok(Self {
            store: Arc::from(store),
            prefix,
        })
    }

    fn key_path(&self, key: &str) -> ObjectPath {
        let mut path = self.prefix.clone();
        for part in key.split('/').filter(|p| !p.is_empty()) {
            path = path.child(part);
        }
        path
    }
}

impl std::fmt::Debug for RemoteArchiveStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteArchiveStore")
            .field("prefix", &self.prefix)
            .finish()
    }
}

#[async_trait]
impl ArchiveStore for RemoteArchiveStore {
    async fn fetch_latest(
        &self,
        key: &str,
        dest_dir: &Path,
    ) -> Result<Option<PathBuf>, StorageError> {
        let path = self.key_path(key);
        let result = match self.store.get(&path).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let bytes = result.bytes().await?;

        tokio::fs::create_dir_all(dest_dir).await?;
        let dest = dest_dir.join(download_file_name(key));
        tokio::fs::write(&dest, &bytes).await?;
        Ok(Some(dest))
    }

    async fn store(&self, key: &str, file: &Path) -> Result<StoredVersion, StorageError> {
        let bytes = tokio::fs::read(file).await?;
        let path = self.key_path(key);
        let put = self.store.put(&path, PutPayload::from(bytes)).await?;

        let version_id = put
            .version
            .or(put.e_tag)
            .ok_or_else(|| StorageError::NoVersion {
                key: key.to_string(),
            })?;

        debug!(%key, version = %version_id, "stored object");
        Ok(StoredVersion {
            object_key: key.to_string(),
            version_id,
        })
    }
}

/// Filesystem-backed archive store that mints its own version ids.
///
/// Layout: `{root}/objects/{key}/{version}` with a `LATEST` pointer file
/// per key. Versions are never rewritten; the pointer moves last.
#[derive(Debug, Clone)]
pub struct LocalArchiveStore {
    root: PathBuf,
}

const LATEST_POINTER: &str = "LATEST";

impl LocalArchiveStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_dir(&self, key: &str) -> PathBuf {
        let mut dir = self.root.join("objects");
        for part in key.split('/').filter(|p| !p.is_empty()) {
            dir = dir.join(part);
        }
        dir
    }
}

#[async_trait]
impl ArchiveStore for LocalArchiveStore {
    async fn fetch_latest(
        &self,
        key: &str,
        dest_dir: &Path,
    ) -> Result<Option<PathBuf>, StorageError> {
        let dir = self.object_dir(key);
        let pointer = dir.join(LATEST_POINTER);
        let version = match tokio::fs::read_to_string(&pointer).await {
            Ok(version) => version,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let source = dir.join(version.trim());
        tokio::fs::create_dir_all(dest_dir).await?;
        let dest = dest_dir.join(download_file_name(key));
        match tokio::fs::copy(&source, &dest).await {
            Ok(_) => Ok(Some(dest)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn store(&self, key: &str, file: &Path) -> Result<StoredVersion, StorageError> {
        let dir = self.object_dir(key);
        tokio::fs::create_dir_all(&dir).await?;

        let version_id = Uuid::new_v4().to_string();
        tokio::fs::copy(file, dir.join(&version_id)).await?;
        tokio::fs::write(dir.join(LATEST_POINTER), &version_id).await?;

        debug!(%key, version = %version_id, "stored object");
        Ok(StoredVersion {
            object_key: key.to_string(),
            version_id,
        })
    }
}

/// In-memory archive store for tests and lightweight use.
///
/// Keeps every version's bytes and counts operations so pipeline tests can
/// assert on store traffic.
#[derive(Debug, Default)]
pub struct MemoryArchiveStore {
    objects: DashMap<String, Vec<(String, Vec<u8>)>>,
    fetches: AtomicU64,
    stores: AtomicU64,
}

impl MemoryArchiveStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of versions stored under `key`.
    pub fn version_count(&self, key: &str) -> usize {
        self.objects.get(key).map(|v| v.len()).unwrap_or(0)
    }

    pub fn fetch_calls(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }

    pub fn store_calls(&self) -> u64 {
        self.stores.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ArchiveStore for MemoryArchiveStore {
    async fn fetch_latest(
        &self,
        key: &str,
        dest_dir: &Path,
    ) -> Result<Option<PathBuf>, StorageError> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        let bytes = match self.objects.get(key) {
            Some(versions) => match versions.last() {
                Some((_, bytes)) => bytes.clone(),
                None => return Ok(None),
            },
            None => return Ok(None),
        };

        tokio::fs::create_dir_all(dest_dir).await?;
        let dest = dest_dir.join(download_file_name(key));
        tokio::fs::write(&dest, &bytes).await?;
        Ok(Some(dest))
    }

    async fn store(&self, key: &str, file: &Path) -> Result<StoredVersion, StorageError> {
        self.stores.fetch_add(1, Ordering::Relaxed);
        let bytes = tokio::fs::read(file).await?;
        let version_id = Uuid::new_v4().to_string();
        self.objects
            .entry(key.to_string())
            .or_default()
            .push((version_id.clone(), bytes));

        Ok(StoredVersion {
            object_key: key.to_string(),
            version_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_store_mints_distinct_versions() {
        let data = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let store = LocalArchiveStore::new(data.path());

        let first = scratch.path().join("a.zip");
        std::fs::write(&first, b"first").unwrap();
        let second = scratch.path().join("b.zip");
        std::fs::write(&second, b"second").unwrap();

        let v1 = store.store("ACME/platform/main.zip", &first).await.unwrap();
        let v2 = store.store("ACME/platform/main.zip", &second).await.unwrap();
        assert_ne!(v1.version_id, v2.version_id);

        let fetched = store
            .fetch_latest("ACME/platform/main.zip", scratch.path())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(std::fs::read(fetched).unwrap(), b"second");
    }

    #[tokio::test]
    async fn local_store_misses_cleanly() {
        let data = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let store = LocalArchiveStore::new(data.path());
        let fetched = store
            .fetch_latest("ACME/platform/main.zip", scratch.path())
            .await
            .unwrap();
        assert!(fetched.is_none());
    }

    #[tokio::test]
    async fn remote_store_round_trips_through_file_url() {
        let data = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let url = format!("file://{}", data.path().display());
        let store = RemoteArchiveStore::from_url(&url).unwrap();

        let file = scratch.path().join("a.zip");
        std::fs::write(&file, b"archive bytes").unwrap();

        let stored = store.store("ACME/platform/main.zip", &file).await.unwrap();
        assert!(!stored.version_id.is_empty());

        let fetched = store
            .fetch_latest("ACME/platform/main.zip", scratch.path())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(std::fs::read(fetched).unwrap(), b"archive bytes");

        let miss = store
            .fetch_latest("ACME/platform/other.zip", scratch.path())
            .await
            .unwrap();
        assert!(miss.is_none());
    }

    #[tokio::test]
    async fn memory_store_counts_traffic() {
        let scratch = tempfile::tempdir().unwrap();
        let store = MemoryArchiveStore::new();
        let file = scratch.path().join("a.zip");
        std::fs::write(&file, b"bytes").unwrap();

        assert!(store
            .fetch_latest("k.zip", scratch.path())
            .await
            .unwrap()
            .is_none());
        store.store("k.zip", &file).await.unwrap();
        store.store("k.zip", &file).await.unwrap();

        assert_eq!(store.version_count("k.zip"), 2);
        assert_eq!(store.fetch_calls(), 1);
        assert_eq!(store.store_calls(), 2);
    }
}
