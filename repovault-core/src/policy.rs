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

//! Per-repository archive policy.
//!
//! A policy names the branches that trigger archival and the subfolders to
//! archive independently (empty list means the whole tree). Policies are
//! loaded fresh on every pipeline run from
//! `{config_dir}/{project}/{repository}.json`, falling back to
//! `{config_dir}/default.json`, falling back to the compiled-in default.
//! Loading never fails: unreadable overrides are logged and skipped.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Archival policy for one (project, repository) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivePolicy {
    /// Branch names whose pushes trigger archival.
    pub git_branch_pushed_trigger: Vec<String>,
    /// Subfolders archived as independent objects; empty means one
    /// whole-tree archive.
    #[serde(default)]
    pub archive_by_subfolders: Vec<String>,
}

impl Default for ArchivePolicy {
    fn default() -> Self {
        Self {
            git_branch_pushed_trigger: vec!["main".to_string()],
            archive_by_subfolders: Vec::new(),
        }
    }
}

impl ArchivePolicy {
    pub fn is_triggered_by(&self, branch: &str) -> bool {
        self.git_branch_pushed_trigger.iter().any(|b| b == branch)
    }
}

/// Loads archive policies from a config directory with fallback.
#[derive(Debug, Clone)]
pub struct PolicyLoader {
    config_dir: PathBuf,
    fallback: ArchivePolicy,
}

impl PolicyLoader {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            fallback: ArchivePolicy::default(),
        }
    }

    pub fn with_fallback(mut self, fallback: ArchivePolicy) -> Self {
        self.fallback = fallback;
        self
    }

    /// Resolve the effective policy for one repository. Never fails.
    pub async fn load(&self, project_key: &str, repository: &str) -> ArchivePolicy {
        let override_path = self
            .config_dir
            .join(project_key)
            .join(format!("{repository}.json"));
        if let Some(policy) = Self::read_policy(&override_path).await {
            debug!(path = %override_path.display(), "loaded repository archive policy");
            return policy;
        }

        let default_path = self.config_dir.join("default.json");
        if let Some(policy) = Self::read_policy(&default_path).await {
            return policy;
        }

        self.fallback.clone()
    }

    async fn read_policy(path: &Path) -> Option<ArchivePolicy> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
            Err(err) => {
                warn!(path = %path.display(), %err, "unreadable archive policy, falling back");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(policy) => Some(policy),
            Err(err) => {
                warn!(path = %path.display(), %err, "malformed archive policy, falling back");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn falls_back_to_builtin_default() {
        let dir = tempfile::tempdir().unwrap();
        let loader = PolicyLoader::new(dir.path());
        let policy = loader.load("ACME", "platform").await;
        assert_eq!(policy, ArchivePolicy::default());
    }

    #[tokio::test]
    async fn prefers_repository_override_over_default_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("default.json"),
            r#"{"git_branch_pushed_trigger": ["develop"], "archive_by_subfolders": []}"#,
        )
        .unwrap();
        std::fs::create_dir_all(dir.path().join("ACME")).unwrap();
        std::fs::write(
            dir.path().join("ACME").join("platform.json"),
            r#"{"git_branch_pushed_trigger": ["release"], "archive_by_subfolders": ["api", "web"]}"#,
        )
        .unwrap();

        let loader = PolicyLoader::new(dir.path());
        let policy = loader.load("ACME", "platform").await;
        assert_eq!(policy.git_branch_pushed_trigger, vec!["release"]);
        assert_eq!(policy.archive_by_subfolders, vec!["api", "web"]);

        let other = loader.load("ACME", "website").await;
        assert_eq!(other.git_branch_pushed_trigger, vec!["develop"]);
    }

    #[tokio::test]
    async fn malformed_override_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("ACME")).unwrap();
        std::fs::write(dir.path().join("ACME").join("platform.json"), "{not json").unwrap();

        let loader = PolicyLoader::new(dir.path());
        let policy = loader.load("ACME", "platform").await;
        assert_eq!(policy, ArchivePolicy::default());
    }

    #[test]
    fn trigger_match_is_exact() {
        let policy = ArchivePolicy {
            git_branch_pushed_trigger: vec!["main".into(), "release".into()],
            archive_by_subfolders: vec![],
        };
        assert!(policy.is_triggered_by("main"));
        assert!(!policy.is_triggered_by("feature/main"));
    }
}
