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

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use repovault_core::ArchivalError;

/// Repovault server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: HttpServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub queue: QueueConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpServerConfig {
    /// HTTP listen address (e.g., "127.0.0.1:47300")
    #[serde(default = "default_http_addr")]
    pub listen_addr: String,

    /// Enable CORS
    #[serde(default = "default_enable_cors")]
    pub enable_cors: bool,

    /// Allowed CORS origins (empty = allow all, use specific origins in production)
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Local data directory (provenance rows, local archive store)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Remote archive store URL (e.g., "s3://bucket/prefix"). Unset means
    /// the local filesystem store under `data_dir`.
    #[serde(default)]
    pub archive_store_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// SSH host of the git server (e.g., "git@vcs.example.com").
    /// Required; there is no usable default.
    #[serde(default)]
    pub git_server_url: Option<String>,

    /// Name of the SSH key secret
    #[serde(default = "default_secret_name")]
    pub ssh_secret_name: String,

    /// Directory holding secret JSON documents
    #[serde(default = "default_secrets_dir")]
    pub secrets_dir: PathBuf,

    /// Directory holding per-repository archive policies
    #[serde(default = "default_config_dir")]
    pub config_dir: PathBuf,

    /// Root for local working copies
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Directory the SSH key pair is materialized into
    #[serde(default = "default_ssh_dir")]
    pub ssh_dir: PathBuf,

    /// Shallow clone depth
    #[serde(default = "default_clone_depth")]
    pub clone_depth: u32,

    /// TTL applied to provenance rows, in days
    #[serde(default = "default_provenance_ttl_days")]
    pub provenance_ttl_days: i64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    /// Deliveries before a message moves to the dead-letter list
    #[serde(default = "default_max_receive_count")]
    pub max_receive_count: u32,

    /// Records per consumer invocation. Must be 1: per-branch serial
    /// ordering only holds when each invocation sees a single record.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Concurrent consumer tasks (distinct groups only; one group is
    /// never handled by two workers at once)
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_http_addr() -> String {
    "127.0.0.1:47300".to_string()
}

fn default_enable_cors() -> bool {
    true
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./repovault-data")
}

fn default_secret_name() -> String {
    "repovault-deploy-key".to_string()
}

fn default_secrets_dir() -> PathBuf {
    PathBuf::from("./secrets")
}

fn default_config_dir() -> PathBuf {
    PathBuf::from("./archive-configs")
}

fn default_work_dir() -> PathBuf {
    std::env::temp_dir().join("repovault").join("work")
}

fn default_ssh_dir() -> PathBuf {
    std::env::temp_dir().join("repovault").join(".ssh")
}

fn default_clone_depth() -> u32 {
    5
}

fn default_provenance_ttl_days() -> i64 {
    90
}

fn default_max_receive_count() -> u32 {
    3
}

fn default_batch_size() -> usize {
    1
}

fn default_workers() -> usize {
    4
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_http_addr(),
            enable_cors: default_enable_cors(),
            cors_origins: vec![],
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            archive_store_url: None,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            git_server_url: None,
            ssh_secret_name: default_secret_name(),
            secrets_dir: default_secrets_dir(),
            config_dir: default_config_dir(),
            work_dir: default_work_dir(),
            ssh_dir: default_ssh_dir(),
            clone_depth: default_clone_depth(),
            provenance_ttl_days: default_provenance_ttl_days(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_receive_count: default_max_receive_count(),
            batch_size: default_batch_size(),
            workers: default_workers(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server: HttpServerConfig::default(),
            storage: StorageConfig::default(),
            pipeline: PipelineConfig::default(),
            queue: QueueConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from environment variables
    ///
    /// Supported environment variables:
    /// - REPOVAULT_HTTP_ADDR: HTTP listen address
    /// - REPOVAULT_DATA_DIR: Data directory path
    /// - REPOVAULT_ARCHIVE_STORE_URL: Remote archive store URL
    /// - REPOVAULT_GIT_SERVER_URL: SSH host of the git server
    /// - REPOVAULT_SSH_SECRET_NAME: Name of the SSH key secret
    /// - REPOVAULT_CONFIG_DIR: Per-repository policy directory
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("REPOVAULT_HTTP_ADDR") {
            config.server.listen_addr = addr;
        }

        if let Ok(data_dir) = std::env::var("REPOVAULT_DATA_DIR") {
            config.storage.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(url) = std::env::var("REPOVAULT_ARCHIVE_STORE_URL") {
            config.storage.archive_store_url = Some(url);
        }

        if let Ok(url) = std::env::var("REPOVAULT_GIT_SERVER_URL") {
            config.pipeline.git_server_url = Some(url);
        }

        if let Ok(name) = std::env::var("REPOVAULT_SSH_SECRET_NAME") {
            config.pipeline.ssh_secret_name = name;
        }

        if let Ok(dir) = std::env::var("REPOVAULT_CONFIG_DIR") {
            config.pipeline.config_dir = PathBuf::from(dir);
        }

        config
    }

    /// Load configuration with priority: file > env > defaults
    pub fn load(config_file: Option<PathBuf>) -> Result<Self> {
        let config = if let Some(path) = config_file {
            if path.exists() {
                tracing::info!("Loading configuration from file: {:?}", path);
                Self::from_file(&path)?
            } else {
                tracing::warn!("Config file not found: {:?}, using environment", path);
                Self::from_env()
            }
        } else {
            Self::from_env()
        };
        Ok(config)
    }

    /// Reject configurations the pipeline cannot run under. Called once at
    /// startup, before any store or queue is constructed.
    pub fn validate(&self) -> Result<(), ArchivalError> {
        if self
            .pipeline
            .git_server_url
            .as_deref()
            .unwrap_or("")
            .is_empty()
        {
            return Err(ArchivalError::Configuration(
                "pipeline.git_server_url is not configured".to_string(),
            ));
        }
        if self.queue.batch_size != 1 {
            return Err(ArchivalError::Configuration(format!(
                "queue.batch_size must be 1 to preserve per-branch ordering, got {}",
                self.queue.batch_size
            )));
        }
        if self.queue.workers == 0 {
            return Err(ArchivalError::Configuration(
                "queue.workers must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_need_a_git_server_url() {
        let config = ServerConfig::default();
        assert!(matches!(
            config.validate(),
            Err(ArchivalError::Configuration(_))
        ));
    }

    #[test]
    fn minimal_toml_with_git_server_validates() {
        let config: ServerConfig = toml::from_str(
            r#"
            [pipeline]
            git_server_url = "git@vcs.example.com"
            "#,
        )
        .unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.queue.batch_size, 1);
        assert_eq!(config.pipeline.clone_depth, 5);
    }

    #[test]
    fn batch_size_other_than_one_is_rejected() {
        let config: ServerConfig = toml::from_str(
            r#"
            [pipeline]
            git_server_url = "git@vcs.example.com"

            [queue]
            batch_size = 10
            "#,
        )
        .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ArchivalError::Configuration(_))
        ));
    }
}
