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

pub mod api;
pub mod config;
pub mod dispatch;
pub mod queue;

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Instant;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api::{health_check, receive_webhook, AppState};
use config::ServerConfig;
use dispatch::{dispatch_notification, DispatchOutcome};
use queue::{NotificationQueue, QueuedMessage};
use repovault_archive::{ArchivalPipeline, GitClient, PipelineSettings};
use repovault_core::PolicyLoader;
use repovault_storage::{
    ArchiveStore, FileSecretStore, JsonProvenanceStore, LocalArchiveStore, RemoteArchiveStore,
};

pub async fn run_server(config: ServerConfig) -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "repovault_server=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Repovault server");
    info!("Configuration: {:#?}", config);

    config.validate()?;

    let pipeline = Arc::new(build_pipeline(&config)?);
    let queue = Arc::new(NotificationQueue::new(config.queue.max_receive_count));

    for worker_id in 0..config.queue.workers {
        tokio::spawn(run_worker(worker_id, queue.clone(), pipeline.clone()));
    }

    let state = AppState {
        queue: queue.clone(),
        started_at: Instant::now(),
    };

    let mut app = Router::new()
        .route("/webhook", post(receive_webhook))
        .route("/health", get(health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if config.server.enable_cors {
        app = app.layer(cors_layer(&config.server.cors_origins));
    }

    let listener = tokio::net::TcpListener::bind(&config.server.listen_addr).await?;
    info!(addr = %config.server.listen_addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(queue))
        .await?;

    Ok(())
}

/// Construct the pipeline with explicit collaborators. Store handles are
/// built here, once, and passed in by parameter — nothing is resolved
/// lazily mid-run.
fn build_pipeline(config: &ServerConfig) -> Result<ArchivalPipeline> {
    let archive_store: Arc<dyn ArchiveStore> = match &config.storage.archive_store_url {
        Some(url) => {
            info!(%url, "using remote archive store");
            Arc::new(RemoteArchiveStore::from_url(url)?)
        }
        None => {
            info!(dir = %config.storage.data_dir.display(), "using local archive store");
            Arc::new(LocalArchiveStore::new(&config.storage.data_dir))
        }
    };

    let git_server_url = config
        .pipeline
        .git_server_url
        .clone()
        .ok_or_else(|| anyhow::anyhow!("pipeline.git_server_url is not configured"))?;

    Ok(ArchivalPipeline::new(
        Arc::new(GitClient::new(config.pipeline.clone_depth)),
        archive_store,
        Arc::new(JsonProvenanceStore::new(&config.storage.data_dir)),
        Arc::new(FileSecretStore::new(&config.pipeline.secrets_dir)),
        PolicyLoader::new(&config.pipeline.config_dir),
        PipelineSettings {
            git_server_url,
            secret_name: config.pipeline.ssh_secret_name.clone(),
            work_dir: config.pipeline.work_dir.clone(),
            ssh_dir: config.pipeline.ssh_dir.clone(),
            provenance_ttl_days: config.pipeline.provenance_ttl_days,
        },
    ))
}

/// Consumer loop: one message per iteration, acknowledged on success,
/// rejected for redelivery on failure. Ends when the queue closes.
async fn run_worker(
    worker_id: usize,
    queue: Arc<NotificationQueue>,
    pipeline: Arc<ArchivalPipeline>,
) {
    info!(worker_id, "queue worker started");
    while let Some(message) = queue.receive().await {
        handle_message(&queue, &pipeline, &message).await;
    }
    info!(worker_id, "queue worker stopped");
}

async fn handle_message(
    queue: &NotificationQueue,
    pipeline: &ArchivalPipeline,
    message: &QueuedMessage,
) {
    let body = match percent_encoding::percent_decode_str(&message.body).decode_utf8() {
        Ok(body) => body.into_owned(),
        Err(err) => {
            warn!(message_id = %message.message_id, %err, "undecodable message body");
            queue.reject(message, &format!("undecodable body: {err}"));
            return;
        }
    };

    match dispatch_notification(pipeline, &body).await {
        Ok(DispatchOutcome::Archived(report)) => {
            info!(
                message_id = %message.message_id,
                group = %message.group_id,
                uploads = report.uploads(),
                archives = report.outcomes.len(),
                triggered = report.branch_triggered,
                "notification archived"
            );
            queue.acknowledge(message);
        }
        Ok(DispatchOutcome::Ignored(_)) | Ok(DispatchOutcome::Dropped(_)) => {
            queue.acknowledge(message);
        }
        Err(err) => {
            error!(
                message_id = %message.message_id,
                group = %message.group_id,
                %err,
                "notification handling failed"
            );
            queue.reject(message, &err.to_string());
        }
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins
            .iter()
            .filter_map(|origin| origin.parse::<http::HeaderValue>().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

async fn shutdown_signal(queue: Arc<NotificationQueue>) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(%err, "failed to install shutdown handler");
        return;
    }
    info!("shutdown requested, closing queue");
    queue.close();
}
