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

pub mod health;
pub mod ingress;

pub use health::health_check;
pub use ingress::receive_webhook;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

use crate::queue::NotificationQueue;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub queue: Arc<NotificationQueue>,
    pub started_at: Instant,
}

/// API error type.
///
/// The ingress replies only to queue acceptance, never to pipeline
/// outcome, so the surface is small: bad payloads, a missing queue
/// target, and everything else.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Queue does not exist: {0}")]
    QueueGone(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            ApiError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "Bad request".to_string(), msg)
            }
            ApiError::QueueGone(msg) => (
                StatusCode::BAD_REQUEST,
                "Queue does not exist".to_string(),
                msg,
            ),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
                msg,
            ),
        };

        (status, Json(ErrorResponse { error, message })).into_response()
    }
}
