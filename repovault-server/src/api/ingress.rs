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

//! Webhook ingress.
//!
//! Accepts the VCS host's POST, pulls the grouping key out of three fixed
//! JSON paths and forwards the URL-encoded original body to the queue.
//! The response acknowledges queue acceptance only — pipeline outcome is
//! observable through logs and the dead-letter path, never here.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde::Serialize;
use tracing::info;

use crate::api::{ApiError, AppState};

/// Response for POST /webhook
#[derive(Debug, Serialize)]
pub struct WebhookAccepted {
    #[serde(rename = "messageId")]
    pub message_id: String,
    #[serde(rename = "contentHash")]
    pub content_hash: String,
}

fn json_str_at<'a>(value: &'a serde_json::Value, pointer: &str) -> Result<&'a str, ApiError> {
    value
        .pointer(pointer)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::BadRequest(format!("missing {pointer} in payload")))
}

/// POST /webhook - Accept one notification into the queue
pub async fn receive_webhook(
    State(state): State<AppState>,
    body: String,
) -> Result<impl IntoResponse, ApiError> {
    let value: serde_json::Value = serde_json::from_str(&body)
        .map_err(|err| ApiError::BadRequest(format!("payload is not JSON: {err}")))?;

    let project_key = json_str_at(&value, "/project/projectKey")?;
    let repository = json_str_at(&value, "/content/repository/name")?;
    let git_ref = json_str_at(&value, "/content/ref")?;
    let group_id = format!("{project_key}/{repository}/{git_ref}");

    let encoded_body = utf8_percent_encode(&body, NON_ALPHANUMERIC).to_string();
    let receipt = state
        .queue
        .enqueue(&group_id, &encoded_body)
        .map_err(|err| ApiError::QueueGone(err.to_string()))?;

    info!(
        group = %group_id,
        message_id = %receipt.message_id,
        deduplicated = receipt.deduplicated,
        "notification accepted"
    );

    Ok((
        StatusCode::OK,
        Json(WebhookAccepted {
            message_id: receipt.message_id,
            content_hash: receipt.content_hash,
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::NotificationQueue;
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::post;
    use axum::Router;
    use std::sync::Arc;
    use std::time::Instant;
    use tower::ServiceExt;

    fn app(queue: Arc<NotificationQueue>) -> Router {
        Router::new()
            .route("/webhook", post(receive_webhook))
            .with_state(AppState {
                queue,
                started_at: Instant::now(),
            })
    }

    fn push_body() -> String {
        r#"{
            "id": 1,
            "project": {"id": 1, "projectKey": "ACME", "name": "Acme"},
            "type": 12,
            "content": {
                "ref": "refs/heads/main",
                "repository": {"id": 9, "name": "platform"},
                "revisions": []
            },
            "createdUser": {"id": 7, "name": "rbarnes"}
        }"#
        .to_string()
    }

    async fn response_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn accepted_webhook_returns_message_id_and_hash() {
        let queue = Arc::new(NotificationQueue::new(3));
        let response = app(queue.clone())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/webhook")
                    .header("content-type", "application/json")
                    .body(Body::from(push_body()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = response_json(response).await;
        assert!(json["messageId"].as_str().is_some());
        assert_eq!(json["contentHash"].as_str().unwrap().len(), 64);
        assert_eq!(queue.depth(), 1);
    }

    #[tokio::test]
    async fn missing_fixed_paths_are_a_bad_request() {
        let queue = Arc::new(NotificationQueue::new(3));
        let response = app(queue.clone())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/webhook")
                    .body(Body::from(r#"{"project": {}}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(queue.depth(), 0);
    }

    #[tokio::test]
    async fn closed_queue_maps_to_queue_gone() {
        let queue = Arc::new(NotificationQueue::new(3));
        queue.close();
        let response = app(queue)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/webhook")
                    .body(Body::from(push_body()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = response_json(response).await;
        assert_eq!(json["error"].as_str().unwrap(), "Queue does not exist");
    }

    #[tokio::test]
    async fn queued_body_round_trips_through_percent_encoding() {
        let queue = Arc::new(NotificationQueue::new(3));
        app(queue.clone())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/webhook")
                    .body(Body::from(push_body()))
                    .unwrap(),
            )
            .await
            .unwrap();

        let message = queue.try_receive().unwrap();
        let decoded = percent_encoding::percent_decode_str(&message.body)
            .decode_utf8()
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&decoded).unwrap();
        assert_eq!(value["project"]["projectKey"], "ACME");
    }
}
