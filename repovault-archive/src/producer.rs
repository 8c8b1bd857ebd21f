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

//! Archive planning and production.
//!
//! Decides, from the repository's policy, whether one whole-tree archive
//! or one archive per configured subfolder is produced, and names the
//! logical object key of each. Subfolders absent from the working tree are
//! skipped with a notice; they are a soft condition, not a failure.

use std::path::{Path, PathBuf};
use tracing::info;

use repovault_core::{ArchivePolicy, PushEvent};

use crate::git::{GitError, VersionControl};

/// Logical object key of an archive:
/// `{project}/{repository}/{branch}.zip` for the whole tree,
/// `{project}/{repository}/{branch}/{subfolder}.zip` per subfolder.
pub fn archive_object_key(
    project_key: &str,
    repository: &str,
    branch: &str,
    subfolder: Option<&str>,
) -> String {
    match subfolder {
        Some(subfolder) => format!("{project_key}/{repository}/{branch}/{subfolder}.zip"),
        None => format!("{project_key}/{repository}/{branch}.zip"),
    }
}

/// An archive the run intends to produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedArchive {
    pub object_key: String,
    pub subfolder: Option<String>,
}

/// An archive written to the run's scratch directory, ready for
/// comparison and upload.
#[derive(Debug, Clone)]
pub struct ProducedArchive {
    pub object_key: String,
    pub file_path: PathBuf,
}

/// Compute the archive plan for one synced working copy.
///
/// An empty subfolder configuration yields exactly one whole-tree plan.
/// Otherwise one plan per configured subfolder that exists in the tree;
/// absent subfolders are logged and skipped. The resulting list is empty
/// only when every configured subfolder is missing — the caller treats
/// that as a misconfiguration.
pub fn plan_archives(
    policy: &ArchivePolicy,
    event: &PushEvent,
    worktree: &Path,
) -> Vec<PlannedArchive> {
    if policy.archive_by_subfolders.is_empty() {
        return vec![PlannedArchive {
            object_key: archive_object_key(
                &event.project_key,
                &event.repository,
                &event.branch,
                None,
            ),
            subfolder: None,
        }];
    }

    let mut plans = Vec::new();
    for subfolder in &policy.archive_by_subfolders {
        if !worktree.join(subfolder).is_dir() {
            info!(
                subfolder = %subfolder,
                repository = %event.repository,
                "configured subfolder absent from tree, skipping"
            );
            continue;
        }
        plans.push(PlannedArchive {
            object_key: archive_object_key(
                &event.project_key,
                &event.repository,
                &event.branch,
                Some(subfolder),
            ),
            subfolder: Some(subfolder.clone()),
        });
    }
    plans
}

/// Produce every planned archive into `scratch_dir`.
pub async fn produce_archives(
    vcs: &dyn VersionControl,
    worktree: &Path,
    plans: &[PlannedArchive],
    scratch_dir: &Path,
) -> Result<Vec<ProducedArchive>, GitError> {
    let mut produced = Vec::with_capacity(plans.len());
    for plan in plans {
        let file_name = match &plan.subfolder {
            Some(subfolder) => format!("{}.zip", subfolder.replace('/', "_")),
            None => "archive.zip".to_string(),
        };
        let file_path = scratch_dir.join(file_name);
        vcs.archive(worktree, plan.subfolder.as_deref(), &file_path)
            .await?;
        produced.push(ProducedArchive {
            object_key: plan.object_key.clone(),
            file_path,
        });
    }
    Ok(produced)
}
