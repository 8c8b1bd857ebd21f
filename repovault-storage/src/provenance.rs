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

//! Provenance metadata store.
//!
//! One row per stored archive version, written exactly once, after the
//! object store confirmed the write. Rows are never updated or deleted
//! here; expiry is the backing store's own housekeeping via `expires_at`.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::StorageError;

/// Metadata row linking a stored version to its triggering notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvenanceRecord {
    /// Store-assigned version identifier; unique key of the row.
    pub version_id: String,
    pub object_key: String,
    pub project_key: String,
    pub repository: String,
    pub branch: String,
    pub pushed_by: String,
    /// Serialized revision list from the notification.
    pub revisions: String,
    /// The original notification payload, verbatim.
    pub payload: String,
    /// Seconds since epoch when the row was written.
    pub recorded_at: i64,
    /// Seconds since epoch after which the store may expire the row.
    pub expires_at: i64,
}

/// Write-once metadata storage.
#[async_trait]
pub trait ProvenanceStore: Send + Sync {
    /// Single write, no update-in-place, no read-before-write.
    async fn record(&self, record: &ProvenanceRecord) -> Result<(), StorageError>;
}

/// JSON-file-per-row store under `{root}/provenance/`.
#[derive(Debug, Clone)]
pub struct JsonProvenanceStore {
    root: PathBuf,
}

impl JsonProvenanceStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn row_path(&self, version_id: &str) -> PathBuf {
        // Version ids can carry characters hostile to filenames (S3 etags
        // are quoted), so they are sanitized for the path only.
        let file: String = version_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.root.join("provenance").join(format!("{file}.json"))
    }
}

#[async_trait]
impl ProvenanceStore for JsonProvenanceStore {
    async fn record(&self, record: &ProvenanceRecord) -> Result<(), StorageError> {
        let path = self.row_path(&record.version_id);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let body = serde_json::to_vec_pretty(record)?;
        tokio::fs::write(&path, body).await?;
        Ok(())
    }
}

/// In-memory store keyed by version id; counts writes for tests.
#[derive(Debug, Default)]
pub struct MemoryProvenanceStore {
    rows: DashMap<String, ProvenanceRecord>,
}

impl MemoryProvenanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, version_id: &str) -> Option<ProvenanceRecord> {
        self.rows.get(version_id).map(|r| r.clone())
    }
}

#[async_trait]
impl ProvenanceStore for MemoryProvenanceStore {
    async fn record(&self, record: &ProvenanceRecord) -> Result<(), StorageError> {
        self.rows
            .insert(record.version_id.clone(), record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record(version_id: &str) -> ProvenanceRecord {
        ProvenanceRecord {
            version_id: version_id.to_string(),
            object_key: "ACME/platform/main.zip".to_string(),
            project_key: "ACME".to_string(),
            repository: "platform".to_string(),
            branch: "main".to_string(),
            pushed_by: "rbarnes".to_string(),
            revisions: "[]".to_string(),
            payload: "{}".to_string(),
            recorded_at: 1_750_000_000,
            expires_at: 1_750_086_400,
        }
    }

    #[tokio::test]
    async fn json_store_writes_one_file_per_version() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonProvenanceStore::new(dir.path());
        store.record(&sample_record("v-1")).await.unwrap();

        let path = dir.path().join("provenance").join("v-1.json");
        let row: ProvenanceRecord =
            serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
        assert_eq!(row.object_key, "ACME/platform/main.zip");
        assert_eq!(row.version_id, "v-1");
    }

    #[tokio::test]
    async fn json_store_sanitizes_etag_version_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonProvenanceStore::new(dir.path());
        store
            .record(&sample_record("\"9a0364b9e99bb480dd25e1f0284c8555\""))
            .await
            .unwrap();

        let provenance_dir = dir.path().join("provenance");
        let entries: Vec<_> = std::fs::read_dir(provenance_dir).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn memory_store_keys_by_version() {
        let store = MemoryProvenanceStore::new();
        store.record(&sample_record("v-1")).await.unwrap();
        store.record(&sample_record("v-2")).await.unwrap();
        assert_eq!(store.len(), 2);
        assert!(store.get("v-1").is_some());
        assert!(store.get("v-3").is_none());
    }
}
