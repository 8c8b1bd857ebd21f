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

//! Version-control client.
//!
//! Wraps the git CLI for one local working copy: shallow clone on first
//! contact, clean + fetch + hard-reset afterwards, and `git archive` for
//! snapshot production. The working copy is exclusive to the run operating
//! on it (the queue serializes runs per project/repository/branch), so no
//! locking happens here.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use repovault_core::ArchivalError;
use repovault_storage::SshKeyFiles;

/// Failures of git subprocess invocations.
#[derive(Debug, Error)]
pub enum GitError {
    #[error("Failed to run git: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("git {args} exited with {status}: {stderr}")]
    Command {
        args: String,
        status: String,
        stderr: String,
    },
}

impl From<GitError> for ArchivalError {
    fn from(err: GitError) -> Self {
        ArchivalError::VersionControl(err.to_string())
    }
}

/// Seam between the pipeline and the VCS. The real implementation shells
/// out to git; tests substitute a fake that writes trees directly.
#[async_trait]
pub trait VersionControl: Send + Sync {
    /// Bring `local_path` to the remote tip of `branch`: shallow clone when
    /// the path does not exist, otherwise discard untracked and ignored
    /// files, fetch, and hard-reset.
    async fn sync(
        &self,
        key_files: &SshKeyFiles,
        remote_url: &str,
        branch: &str,
        local_path: &Path,
    ) -> Result<(), GitError>;

    /// Write a zip of `HEAD` (or `HEAD:{subfolder}`) to `out_path` without
    /// mutating the working copy.
    async fn archive(
        &self,
        local_path: &Path,
        subfolder: Option<&str>,
        out_path: &Path,
    ) -> Result<(), GitError>;
}

/// Git CLI client.
#[derive(Debug, Clone)]
pub struct GitClient {
    clone_depth: u32,
}

impl GitClient {
    pub fn new(clone_depth: u32) -> Self {
        Self { clone_depth }
    }

    async fn run(args: Vec<String>, ssh_command: Option<&str>) -> Result<(), GitError> {
        debug!(args = %args.join(" "), "git");

        let mut cmd = Command::new("git");
        cmd.args(&args).stdin(Stdio::null());
        if let Some(ssh) = ssh_command {
            cmd.env("GIT_SSH_COMMAND", ssh);
        }

        let output = cmd.output().await?;
        if !output.status.success() {
            return Err(GitError::Command {
                args: args.join(" "),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    fn ssh_command(key_files: &SshKeyFiles) -> String {
        format!(
            "ssh -o StrictHostKeyChecking=no -i {}",
            key_files.private_key_path.display()
        )
    }
}

#[async_trait]
impl VersionControl for GitClient {
    async fn sync(
        &self,
        key_files: &SshKeyFiles,
        remote_url: &str,
        branch: &str,
        local_path: &Path,
    ) -> Result<(), GitError> {
        let ssh = Self::ssh_command(key_files);
        let local = local_path.display().to_string();

        if !local_path.exists() {
            if let Some(parent) = local_path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            Self::run(
                vec![
                    "clone".into(),
                    "--depth".into(),
                    self.clone_depth.to_string(),
                    "--single-branch".into(),
                    "--branch".into(),
                    branch.to_string(),
                    remote_url.to_string(),
                    local,
                ],
                Some(&ssh),
            )
            .await
        } else {
            Self::run(
                vec!["-C".into(), local.clone(), "clean".into(), "-fdx".into()],
                None,
            )
            .await?;
            Self::run(
                vec!["-C".into(), local.clone(), "fetch".into()],
                Some(&ssh),
            )
            .await?;
            Self::run(
                vec![
                    "-C".into(),
                    local,
                    "reset".into(),
                    "--hard".into(),
                    format!("origin/{branch}"),
                ],
                None,
            )
            .await
        }
    }

    async fn archive(
        &self,
        local_path: &Path,
        subfolder: Option<&str>,
        out_path: &Path,
    ) -> Result<(), GitError> {
        let target = match subfolder {
            Some(subfolder) => format!("HEAD:{subfolder}"),
            None => "HEAD".to_string(),
        };
        Self::run(
            vec![
                "-C".into(),
                local_path.display().to_string(),
                "archive".into(),
                "-o".into(),
                out_path.display().to_string(),
                "--format=zip".into(),
                target,
            ],
            None,
        )
        .await
    }
}
