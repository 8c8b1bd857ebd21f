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

//! Notification dispatch.
//!
//! One exhaustive match over the finite set of event kinds. Pushes run the
//! archival pipeline; pull-request events are acknowledged no-ops; unknown
//! kinds are logged and dropped so a host-side addition never poisons the
//! queue.

use thiserror::Error;
use tracing::{info, warn};

use repovault_archive::{ArchivalPipeline, PipelineReport};
use repovault_core::{
    ArchivalError, EventKind, NotificationError, PushEvent, WebhookNotification,
};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Notification(#[from] NotificationError),

    #[error(transparent)]
    Archival(#[from] ArchivalError),
}

/// How one notification was handled.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// A push ran the pipeline to completion.
    Archived(PipelineReport),
    /// A known kind this service deliberately does nothing with.
    Ignored(EventKind),
    /// An unknown kind code, dropped.
    Dropped(i64),
}

pub async fn dispatch_notification(
    pipeline: &ArchivalPipeline,
    raw_body: &str,
) -> Result<DispatchOutcome, DispatchError> {
    let notification = WebhookNotification::parse(raw_body)?;

    match notification.kind() {
        EventKind::GitPushed => {
            let event = PushEvent::from_notification(&notification, raw_body)?;
            let report = pipeline.run(&event).await?;
            Ok(DispatchOutcome::Archived(report))
        }
        kind @ (EventKind::PullRequestCreated | EventKind::PullRequestUpdated) => {
            info!(%kind, "event kind not archived, ignoring");
            Ok(DispatchOutcome::Ignored(kind))
        }
        EventKind::Unknown(code) => {
            warn!(code, "unknown event kind, dropping");
            Ok(DispatchOutcome::Dropped(code))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use repovault_archive::{GitClient, PipelineSettings};
    use repovault_core::PolicyLoader;
    use repovault_storage::{MemoryArchiveStore, MemoryProvenanceStore, MemorySecretStore};
    use std::sync::Arc;

    fn inert_pipeline(root: &std::path::Path) -> ArchivalPipeline {
        ArchivalPipeline::new(
            Arc::new(GitClient::new(5)),
            Arc::new(MemoryArchiveStore::new()),
            Arc::new(MemoryProvenanceStore::new()),
            Arc::new(MemorySecretStore::new()),
            PolicyLoader::new(root.join("configs")),
            PipelineSettings {
                git_server_url: "git@vcs.example.com".into(),
                secret_name: "deploy-key".into(),
                work_dir: root.join("work"),
                ssh_dir: root.join("ssh"),
                provenance_ttl_days: 30,
            },
        )
    }

    fn envelope(event_type: i64) -> String {
        format!(
            r#"{{
                "id": 1,
                "project": {{"id": 1, "projectKey": "ACME", "name": "Acme"}},
                "type": {event_type},
                "content": {{}},
                "createdUser": {{"id": 1, "name": "rbarnes"}}
            }}"#
        )
    }

    #[tokio::test]
    async fn pull_request_events_are_ignored() {
        let root = tempfile::tempdir().unwrap();
        let pipeline = inert_pipeline(root.path());
        let outcome = dispatch_notification(&pipeline, &envelope(18)).await.unwrap();
        assert!(matches!(
            outcome,
            DispatchOutcome::Ignored(EventKind::PullRequestCreated)
        ));
    }

    #[tokio::test]
    async fn unknown_kinds_are_dropped_not_fatal() {
        let root = tempfile::tempdir().unwrap();
        let pipeline = inert_pipeline(root.path());
        let outcome = dispatch_notification(&pipeline, &envelope(99)).await.unwrap();
        assert!(matches!(outcome, DispatchOutcome::Dropped(99)));
    }

    #[tokio::test]
    async fn malformed_bodies_error_for_redelivery() {
        let root = tempfile::tempdir().unwrap();
        let pipeline = inert_pipeline(root.path());
        let err = dispatch_notification(&pipeline, "not json").await.unwrap_err();
        assert!(matches!(err, DispatchError::Notification(_)));
    }
}
