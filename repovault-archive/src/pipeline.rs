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

//! Pipeline orchestration for one push notification.
//!
//! The run is safe to repeat with identical inputs: an unchanged tree
//! produces archives that compare equal to the stored versions and nothing
//! is written. Whole-run failures (config, credentials, sync) abort before
//! any archive work; per-archive failures are isolated from their siblings
//! and reported after every archive has finished.

use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use repovault_core::{ArchivalError, PolicyLoader, PushEvent};
use repovault_storage::{
    materialize_ssh_key, ArchiveStore, ProvenanceStore, SecretStore, StoredVersion,
};

use crate::compare;
use crate::git::VersionControl;
use crate::producer::{plan_archives, produce_archives, ProducedArchive};
use crate::provenance::ProvenanceRecorder;

/// Whole-run settings, explicit at construction so runs are reproducible
/// and testable with substitute collaborators.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Host part of the SSH remote, e.g. `git@vcs.example.com`.
    pub git_server_url: String,
    /// Name of the SSH key secret in the credential store.
    pub secret_name: String,
    /// Root under which working copies live, keyed by
    /// project/repository/branch.
    pub work_dir: PathBuf,
    /// Directory the SSH key pair is materialized into.
    pub ssh_dir: PathBuf,
    /// TTL applied to provenance rows.
    pub provenance_ttl_days: i64,
}

/// What happened to one archive of the run.
#[derive(Debug, Clone, Serialize)]
pub enum ArchiveDisposition {
    /// Content differed from the latest stored version (or none existed);
    /// a new version was written and recorded.
    Uploaded(StoredVersion),
    /// Content matched the latest stored version; nothing was written.
    Unchanged,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArchiveOutcome {
    pub object_key: String,
    pub disposition: ArchiveDisposition,
}

/// Result of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    /// False when the pushed branch is not in the trigger set; the run
    /// ended with zero side effects.
    pub branch_triggered: bool,
    pub outcomes: Vec<ArchiveOutcome>,
}

impl PipelineReport {
    fn skipped() -> Self {
        Self {
            branch_triggered: false,
            outcomes: Vec::new(),
        }
    }

    pub fn uploads(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.disposition, ArchiveDisposition::Uploaded(_)))
            .count()
    }
}

/// Drives one notification from policy lookup to provenance record.
pub struct ArchivalPipeline {
    vcs: Arc<dyn VersionControl>,
    archive_store: Arc<dyn ArchiveStore>,
    secrets: Arc<dyn SecretStore>,
    policies: PolicyLoader,
    recorder: ProvenanceRecorder,
    settings: PipelineSettings,
}

impl ArchivalPipeline {
    pub fn new(
        vcs: Arc<dyn VersionControl>,
        archive_store: Arc<dyn ArchiveStore>,
        provenance: Arc<dyn ProvenanceStore>,
        secrets: Arc<dyn SecretStore>,
        policies: PolicyLoader,
        settings: PipelineSettings,
    ) -> Self {
        let recorder = ProvenanceRecorder::new(provenance, settings.provenance_ttl_days);
        Self {
            vcs,
            archive_store,
            secrets,
            policies,
            recorder,
            settings,
        }
    }

    fn remote_url(&self, event: &PushEvent) -> String {
        format!(
            "ssh://{}:/{}/{}.git",
            self.settings.git_server_url, event.project_key, event.repository
        )
    }

    fn working_copy_path(&self, event: &PushEvent) -> PathBuf {
        self.settings
            .work_dir
            .join(&event.project_key)
            .join(&event.repository)
            .join(&event.branch)
    }

    /// Run the pipeline for one push. Ok with zero uploads is a normal
    /// outcome (untriggered branch, or nothing changed).
    pub async fn run(&self, event: &PushEvent) -> Result<PipelineReport, ArchivalError> {
        info!(
            project = %event.project_key,
            repository = %event.repository,
            branch = %event.branch,
            "archival run started"
        );

        let policy = self
            .policies
            .load(&event.project_key, &event.repository)
            .await;

        if !policy.is_triggered_by(&event.branch) {
            info!(
                branch = %event.branch,
                "branch not in trigger set, skipping"
            );
            return Ok(PipelineReport::skipped());
        }

        let material = self.secrets.fetch(&self.settings.secret_name).await?;
        let key_files = materialize_ssh_key(&material, &self.settings.ssh_dir).await?;

        let local = self.working_copy_path(event);
        self.vcs
            .sync(&key_files, &self.remote_url(event), &event.branch, &local)
            .await?;

        let plans = plan_archives(&policy, event, &local);
        if plans.is_empty() {
            // Only reachable with a non-empty subfolder configuration where
            // every subfolder is absent: a misconfiguration, not a no-op.
            return Err(ArchivalError::Archive(format!(
                "none of the configured subfolders {:?} exist in {}/{}",
                policy.archive_by_subfolders, event.project_key, event.repository
            )));
        }

        let scratch =
            tempfile::tempdir().map_err(|err| ArchivalError::Archive(err.to_string()))?;
        let produced = produce_archives(self.vcs.as_ref(), &local, &plans, scratch.path())
            .await
            .map_err(|err| ArchivalError::Archive(err.to_string()))?;

        // Per-archive steps are independent; a failure in one never
        // cancels the others, and the run reports failed only after all
        // of them settled.
        let results = futures::future::join_all(
            produced
                .iter()
                .map(|archive| self.process_archive(archive, event)),
        )
        .await;

        let mut outcomes = Vec::with_capacity(results.len());
        let mut first_error = None;
        for (archive, result) in produced.iter().zip(results) {
            match result {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => {
                    error!(key = %archive.object_key, %err, "archive sub-step failed");
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
            }
        }
        if let Some(err) = first_error {
            return Err(err);
        }

        info!(
            archives = outcomes.len(),
            uploads = outcomes
                .iter()
                .filter(|o| matches!(o.disposition, ArchiveDisposition::Uploaded(_)))
                .count(),
            "archival run finished"
        );
        Ok(PipelineReport {
            branch_triggered: true,
            outcomes,
        })
    }

    async fn process_archive(
        &self,
        archive: &ProducedArchive,
        event: &PushEvent,
    ) -> Result<ArchiveOutcome, ArchivalError> {
        // Per-archive scratch for the previous version download; removed on
        // drop whichever way this function exits.
        let download_dir =
            tempfile::tempdir().map_err(|err| ArchivalError::Storage(err.to_string()))?;

        let previous = match self
            .archive_store
            .fetch_latest(&archive.object_key, download_dir.path())
            .await
        {
            Ok(previous) => previous,
            Err(err) => {
                warn!(
                    key = %archive.object_key,
                    %err,
                    "failed to fetch previous version, treating as absent"
                );
                None
            }
        };

        if let Some(previous) = previous {
            if compare::is_unchanged(&previous, &archive.file_path).await {
                info!(key = %archive.object_key, "no content changes, skipping upload");
                return Ok(ArchiveOutcome {
                    object_key: archive.object_key.clone(),
                    disposition: ArchiveDisposition::Unchanged,
                });
            }
        }

        let stored = self
            .archive_store
            .store(&archive.object_key, &archive.file_path)
            .await?;
        info!(
            key = %stored.object_key,
            version = %stored.version_id,
            "uploaded new archive version"
        );

        // Provenance is written strictly after the store confirmed the
        // version id; an upload that yields no id has already failed above.
        self.recorder.record(&stored, event).await?;

        Ok(ArchiveOutcome {
            object_key: archive.object_key.clone(),
            disposition: ArchiveDisposition::Uploaded(stored),
        })
    }
}
