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

//! Provenance recording.
//!
//! Invoked only after the object store confirmed a write and handed back a
//! version id, which keeps the invariant: a record exists iff a version
//! was stored. A failed record leaves the object without a row — logged
//! and surfaced as a storage error, never retried in place.

use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::info;

use repovault_core::{ArchivalError, PushEvent};
use repovault_storage::{ProvenanceRecord, ProvenanceStore, StoredVersion};

/// Builds and writes one provenance row per stored version.
pub struct ProvenanceRecorder {
    store: Arc<dyn ProvenanceStore>,
    ttl: Duration,
}

impl ProvenanceRecorder {
    pub fn new(store: Arc<dyn ProvenanceStore>, ttl_days: i64) -> Self {
        Self {
            store,
            ttl: Duration::days(ttl_days),
        }
    }

    pub async fn record(
        &self,
        version: &StoredVersion,
        event: &PushEvent,
    ) -> Result<ProvenanceRecord, ArchivalError> {
        let revisions = serde_json::to_string(&event.revisions)
            .map_err(|err| ArchivalError::Storage(err.to_string()))?;

        let now = Utc::now();
        let record = ProvenanceRecord {
            version_id: version.version_id.clone(),
            object_key: version.object_key.clone(),
            project_key: event.project_key.clone(),
            repository: event.repository.clone(),
            branch: event.branch.clone(),
            pushed_by: event.pushed_by.clone(),
            revisions,
            payload: event.raw_payload.clone(),
            recorded_at: now.timestamp(),
            expires_at: (now + self.ttl).timestamp(),
        };

        self.store.record(&record).await?;
        info!(
            version = %record.version_id,
            key = %record.object_key,
            "recorded provenance"
        );
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use repovault_storage::MemoryProvenanceStore;

    fn push_event() -> PushEvent {
        PushEvent {
            project_key: "ACME".into(),
            repository: "platform".into(),
            branch: "main".into(),
            pushed_by: "rbarnes".into(),
            revisions: vec![repovault_core::Revision {
                rev: Some("0123abc".into()),
                comment: Some("fix pagination".into()),
            }],
            raw_payload: r#"{"id": 4967}"#.into(),
        }
    }

    #[tokio::test]
    async fn record_carries_notification_context() {
        let store = Arc::new(MemoryProvenanceStore::new());
        let recorder = ProvenanceRecorder::new(store.clone(), 30);

        let version = StoredVersion {
            object_key: "ACME/platform/main.zip".into(),
            version_id: "v-abc".into(),
        };
        let record = recorder.record(&version, &push_event()).await.unwrap();

        assert_eq!(record.expires_at - record.recorded_at, 30 * 24 * 3600);
        let stored = store.get("v-abc").unwrap();
        assert_eq!(stored.branch, "main");
        assert_eq!(stored.pushed_by, "rbarnes");
        assert!(stored.revisions.contains("0123abc"));
        assert_eq!(stored.payload, r#"{"id": 4967}"#);
    }
}
