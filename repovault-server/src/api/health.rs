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

use axum::{extract::State, response::IntoResponse, Json};
use serde::Serialize;
use tracing::debug;

use crate::api::{ApiError, AppState};

/// Health check response structure
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub queue: QueueHealth,
}

#[derive(Debug, Serialize)]
pub struct QueueHealth {
    pub depth: usize,
    pub dead_letters: usize,
}

/// GET /health - Liveness plus queue depth
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    debug!("Health check requested");

    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        queue: QueueHealth {
            depth: state.queue.depth(),
            dead_letters: state.queue.dead_letter_count(),
        },
    }))
}
