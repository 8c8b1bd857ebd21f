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

//! Webhook notification model.
//!
//! Mirrors the JSON the VCS host posts to the ingress endpoint. The outer
//! envelope is common to all event kinds; `content` stays untyped until the
//! dispatcher knows the kind, then push events are narrowed into
//! [`PushContent`] and flattened into the [`PushEvent`] the pipeline
//! consumes.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Notification parsing failures.
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Malformed notification payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),

    #[error("Push notification has no ref")]
    MissingRef,
}

/// The finite set of event kinds the dispatcher understands.
///
/// Unknown codes are carried, logged and dropped — never fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    GitPushed,
    PullRequestCreated,
    PullRequestUpdated,
    Unknown(i64),
}

impl EventKind {
    pub fn from_code(code: i64) -> Self {
        match code {
            12 => EventKind::GitPushed,
            18 => EventKind::PullRequestCreated,
            19 => EventKind::PullRequestUpdated,
            other => EventKind::Unknown(other),
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::GitPushed => write!(f, "git-pushed"),
            EventKind::PullRequestCreated => write!(f, "pull-request-created"),
            EventKind::PullRequestUpdated => write!(f, "pull-request-updated"),
            EventKind::Unknown(code) => write!(f, "unknown({code})"),
        }
    }
}

/// Project the notification belongs to. `project_key` is the stable key
/// used in object keys and working-copy paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    #[serde(rename = "projectKey")]
    pub project_key: String,
    #[serde(default)]
    pub name: String,
}

/// The user that triggered the event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    pub id: i64,
    #[serde(default)]
    pub name: String,
}

/// Repository descriptor inside push content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// One commit summary from a push.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Revision {
    #[serde(default)]
    pub rev: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
}

/// Typed content of a `GitPushed` notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushContent {
    #[serde(default)]
    pub change_type: Option<String>,
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub repository: Repository,
    #[serde(default)]
    pub revision_count: Option<i64>,
    #[serde(default)]
    pub revision_type: Option<String>,
    #[serde(default)]
    pub revisions: Vec<Revision>,
}

/// The inbound webhook envelope. Immutable; the pipeline never writes back
/// to the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookNotification {
    pub id: i64,
    pub project: Project,
    #[serde(rename = "type")]
    pub event_type: i64,
    /// Kind-specific content, narrowed once the kind is known.
    pub content: serde_json::Value,
    #[serde(rename = "createdUser")]
    pub created_user: Actor,
    #[serde(default)]
    pub created: Option<String>,
}

impl WebhookNotification {
    pub fn parse(raw: &str) -> Result<Self, NotificationError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn kind(&self) -> EventKind {
        EventKind::from_code(self.event_type)
    }
}

/// A validated push, flattened to exactly what the pipeline needs, plus the
/// raw payload retained for provenance.
#[derive(Debug, Clone)]
pub struct PushEvent {
    pub project_key: String,
    pub repository: String,
    pub branch: String,
    pub pushed_by: String,
    pub revisions: Vec<Revision>,
    pub raw_payload: String,
}

impl PushEvent {
    /// Narrow a `GitPushed` notification. The branch name is the ref with
    /// the `refs/heads/` prefix stripped.
    pub fn from_notification(
        notification: &WebhookNotification,
        raw_payload: &str,
    ) -> Result<Self, NotificationError> {
        let content: PushContent = serde_json::from_value(notification.content.clone())?;
        if content.git_ref.is_empty() {
            return Err(NotificationError::MissingRef);
        }
        let branch = content
            .git_ref
            .strip_prefix("refs/heads/")
            .unwrap_or(&content.git_ref)
            .to_string();

        Ok(Self {
            project_key: notification.project.project_key.clone(),
            repository: content.repository.name.clone(),
            branch,
            pushed_by: notification.created_user.name.clone(),
            revisions: content.revisions,
            raw_payload: raw_payload.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PUSH_PAYLOAD: &str = r#"{
        "id": 4967,
        "project": {
            "id": 101,
            "projectKey": "ACME",
            "name": "Acme Platform"
        },
        "type": 12,
        "content": {
            "change_type": "update",
            "ref": "refs/heads/main",
            "repository": { "id": 9, "name": "platform", "description": null },
            "revision_count": 2,
            "revision_type": "commit",
            "revisions": [
                { "rev": "0123abc", "comment": "fix pagination" },
                { "rev": "4567def", "comment": "bump deps" }
            ]
        },
        "createdUser": { "id": 7, "name": "rbarnes" },
        "created": "2025-06-02T08:14:11Z"
    }"#;

    #[test]
    fn parses_push_notification() {
        let notification = WebhookNotification::parse(PUSH_PAYLOAD).unwrap();
        assert_eq!(notification.kind(), EventKind::GitPushed);
        assert_eq!(notification.project.project_key, "ACME");
        assert_eq!(notification.created_user.name, "rbarnes");
    }

    #[test]
    fn push_event_strips_ref_prefix() {
        let notification = WebhookNotification::parse(PUSH_PAYLOAD).unwrap();
        let event = PushEvent::from_notification(&notification, PUSH_PAYLOAD).unwrap();
        assert_eq!(event.branch, "main");
        assert_eq!(event.repository, "platform");
        assert_eq!(event.revisions.len(), 2);
        assert_eq!(event.pushed_by, "rbarnes");
    }

    #[test]
    fn unknown_event_codes_are_preserved() {
        assert_eq!(EventKind::from_code(12), EventKind::GitPushed);
        assert_eq!(EventKind::from_code(18), EventKind::PullRequestCreated);
        assert_eq!(EventKind::from_code(19), EventKind::PullRequestUpdated);
        assert_eq!(EventKind::from_code(42), EventKind::Unknown(42));
    }

    #[test]
    fn malformed_content_is_rejected() {
        let mut notification = WebhookNotification::parse(PUSH_PAYLOAD).unwrap();
        notification.content = serde_json::json!({ "unexpected": true });
        assert!(PushEvent::from_notification(&notification, PUSH_PAYLOAD).is_err());
    }
}
