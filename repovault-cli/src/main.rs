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

//! Repovault command line tool.
//!
//! `replay` drives the archival pipeline once on a notification payload
//! saved to a file — the same code path the server's queue worker takes,
//! minus the queue. Useful for redriving a dead-lettered notification or
//! smoke-testing a repository's policy.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use repovault_archive::{
    ArchiveDisposition, ArchivalPipeline, GitClient, PipelineSettings,
};
use repovault_core::{EventKind, PolicyLoader, PushEvent, WebhookNotification};
use repovault_storage::{
    ArchiveStore, FileSecretStore, JsonProvenanceStore, LocalArchiveStore, RemoteArchiveStore,
};

#[derive(Parser, Debug)]
#[command(name = "repovault", author, version, about = "Repository archival toolkit")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the archival pipeline once on a notification JSON file
    Replay {
        /// Path to the notification payload
        file: PathBuf,

        /// SSH host of the git server
        #[arg(long, env = "REPOVAULT_GIT_SERVER_URL")]
        git_server_url: String,

        /// Local data directory (provenance rows, local archive store)
        #[arg(long, env = "REPOVAULT_DATA_DIR", default_value = "./repovault-data")]
        data_dir: PathBuf,

        /// Remote archive store URL; unset uses the local store
        #[arg(long, env = "REPOVAULT_ARCHIVE_STORE_URL")]
        archive_store_url: Option<String>,

        /// Per-repository policy directory
        #[arg(long, env = "REPOVAULT_CONFIG_DIR", default_value = "./archive-configs")]
        config_dir: PathBuf,

        /// Directory holding secret JSON documents
        #[arg(long, default_value = "./secrets")]
        secrets_dir: PathBuf,

        /// Name of the SSH key secret
        #[arg(
            long,
            env = "REPOVAULT_SSH_SECRET_NAME",
            default_value = "repovault-deploy-key"
        )]
        secret_name: String,

        /// Root for local working copies (defaults under the temp dir)
        #[arg(long)]
        work_dir: Option<PathBuf>,

        /// Directory the SSH key pair is materialized into
        #[arg(long)]
        ssh_dir: Option<PathBuf>,

        /// Shallow clone depth
        #[arg(long, default_value_t = 5)]
        clone_depth: u32,

        /// Provenance row TTL in days
        #[arg(long, default_value_t = 90)]
        ttl_days: i64,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the effective archive policy for a repository
    Policy {
        project: String,
        repository: String,

        #[arg(long, env = "REPOVAULT_CONFIG_DIR", default_value = "./archive-configs")]
        config_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "repovault=info".into()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Replay {
            file,
            git_server_url,
            data_dir,
            archive_store_url,
            config_dir,
            secrets_dir,
            secret_name,
            work_dir,
            ssh_dir,
            clone_depth,
            ttl_days,
            json,
        } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let notification = WebhookNotification::parse(&raw)?;

            match notification.kind() {
                EventKind::GitPushed => {}
                kind => {
                    println!("event kind {kind} is not archived, nothing to do");
                    return Ok(());
                }
            }
            let event = PushEvent::from_notification(&notification, &raw)?;

            let archive_store: Arc<dyn ArchiveStore> = match &archive_store_url {
                Some(url) => Arc::new(RemoteArchiveStore::from_url(url)?),
                None => Arc::new(LocalArchiveStore::new(&data_dir)),
            };
            let pipeline = ArchivalPipeline::new(
                Arc::new(GitClient::new(clone_depth)),
                archive_store,
                Arc::new(JsonProvenanceStore::new(&data_dir)),
                Arc::new(FileSecretStore::new(&secrets_dir)),
                PolicyLoader::new(&config_dir),
                PipelineSettings {
                    git_server_url,
                    secret_name,
                    work_dir: work_dir.unwrap_or_else(|| {
                        std::env::temp_dir().join("repovault").join("work")
                    }),
                    ssh_dir: ssh_dir
                        .unwrap_or_else(|| std::env::temp_dir().join("repovault").join(".ssh")),
                    provenance_ttl_days: ttl_days,
                },
            );

            let report = pipeline.run(&event).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else if !report.branch_triggered {
                println!(
                    "branch '{}' is not in the trigger set, nothing archived",
                    event.branch
                );
            } else {
                for outcome in &report.outcomes {
                    match &outcome.disposition {
                        ArchiveDisposition::Uploaded(version) => println!(
                            "✓ uploaded {} (version {})",
                            outcome.object_key, version.version_id
                        ),
                        ArchiveDisposition::Unchanged => {
                            println!("- unchanged {}", outcome.object_key)
                        }
                    }
                }
            }
        }

        Commands::Policy {
            project,
            repository,
            config_dir,
        } => {
            let policy = PolicyLoader::new(&config_dir)
                .load(&project, &repository)
                .await;
            println!("{}", serde_json::to_string_pretty(&policy)?);
        }
    }

    Ok(())
}
