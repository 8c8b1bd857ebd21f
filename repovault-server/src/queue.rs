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

//! In-process FIFO notification queue.
//!
//! Implements the delivery contract the pipeline depends on:
//!
//! - per-group serial delivery — at most one in-flight message per
//!   `{project}/{repository}/{ref}` group, so no two runs ever touch the
//!   same working copy concurrently;
//! - content-based deduplication scoped to the group;
//! - at-least-once redelivery — a rejected message returns to the front of
//!   its group until `max_receive_count` deliveries, then moves to the
//!   dead-letter list.
//!
//! Delivery across distinct groups is unordered and concurrent.

use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use thiserror::Error;
use tokio::sync::Notify;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue does not exist")]
    Closed,
}

/// Returned to the ingress caller on accept.
#[derive(Debug, Clone)]
pub struct EnqueueReceipt {
    pub message_id: String,
    pub content_hash: String,
    /// True when an identical body was already pending in the group.
    pub deduplicated: bool,
}

/// One queued notification.
#[derive(Debug, Clone)]
pub struct QueuedMessage {
    pub message_id: String,
    pub group_id: String,
    /// URL-encoded original notification payload.
    pub body: String,
    pub content_hash: String,
    pub receive_count: u32,
}

/// A message that exhausted its redeliveries.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub message: QueuedMessage,
    pub reason: String,
}

#[derive(Default)]
struct GroupState {
    pending: VecDeque<QueuedMessage>,
    in_flight: bool,
}

pub struct NotificationQueue {
    groups: Mutex<HashMap<String, GroupState>>,
    dead_letters: Mutex<Vec<DeadLetter>>,
    notify: Notify,
    closed: AtomicBool,
    max_receive_count: u32,
}

impl NotificationQueue {
    pub fn new(max_receive_count: u32) -> Self {
        Self {
            groups: Mutex::new(HashMap::new()),
            dead_letters: Mutex::new(Vec::new()),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            max_receive_count,
        }
    }

    /// Accept one notification body into `group_id`.
    pub fn enqueue(&self, group_id: &str, body: &str) -> Result<EnqueueReceipt, QueueError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(QueueError::Closed);
        }

        let content_hash = hex::encode(Sha256::digest(body.as_bytes()));
        let mut groups = self.groups.lock().unwrap();
        let group = groups.entry(group_id.to_string()).or_default();

        if let Some(existing) = group
            .pending
            .iter()
            .find(|m| m.content_hash == content_hash)
        {
            return Ok(EnqueueReceipt {
                message_id: existing.message_id.clone(),
                content_hash,
                deduplicated: true,
            });
        }

        let message = QueuedMessage {
            message_id: Uuid::new_v4().to_string(),
            group_id: group_id.to_string(),
            body: body.to_string(),
            content_hash: content_hash.clone(),
            receive_count: 0,
        };
        let receipt = EnqueueReceipt {
            message_id: message.message_id.clone(),
            content_hash,
            deduplicated: false,
        };
        group.pending.push_back(message);
        drop(groups);

        self.notify.notify_one();
        Ok(receipt)
    }

    /// Deliver the front message of some idle group, if any.
    pub fn try_receive(&self) -> Option<QueuedMessage> {
        let mut groups = self.groups.lock().unwrap();
        for group in groups.values_mut() {
            if group.in_flight {
                continue;
            }
            if let Some(front) = group.pending.front_mut() {
                group.in_flight = true;
                front.receive_count += 1;
                return Some(front.clone());
            }
        }
        None
    }

    /// Wait for the next deliverable message. Returns `None` once the
    /// queue is closed and drained.
    pub async fn receive(&self) -> Option<QueuedMessage> {
        loop {
            if let Some(message) = self.try_receive() {
                return Some(message);
            }
            if self.closed.load(Ordering::Acquire) && self.depth() == 0 {
                return None;
            }
            self.notify.notified().await;
        }
    }

    /// Successful handling: drop the message, free its group.
    pub fn acknowledge(&self, message: &QueuedMessage) {
        let mut groups = self.groups.lock().unwrap();
        if let Some(group) = groups.get_mut(&message.group_id) {
            group.in_flight = false;
            if group
                .pending
                .front()
                .map(|m| m.message_id == message.message_id)
                .unwrap_or(false)
            {
                group.pending.pop_front();
            }
        }
        drop(groups);
        self.notify.notify_one();
    }

    /// Failed handling: leave the message at the front of its group for
    /// redelivery, or move it to the dead-letter list once its receive
    /// count is exhausted.
    pub fn reject(&self, message: &QueuedMessage, reason: &str) {
        let mut groups = self.groups.lock().unwrap();
        if let Some(group) = groups.get_mut(&message.group_id) {
            group.in_flight = false;
            let exhausted = group
                .pending
                .front()
                .map(|m| {
                    m.message_id == message.message_id
                        && m.receive_count >= self.max_receive_count
                })
                .unwrap_or(false);
            if exhausted {
                if let Some(dead) = group.pending.pop_front() {
                    warn!(
                        message_id = %dead.message_id,
                        group = %dead.group_id,
                        receive_count = dead.receive_count,
                        %reason,
                        "message exhausted redeliveries, moving to dead-letter"
                    );
                    self.dead_letters.lock().unwrap().push(DeadLetter {
                        message: dead,
                        reason: reason.to_string(),
                    });
                }
            }
        }
        drop(groups);
        self.notify.notify_one();
    }

    pub fn depth(&self) -> usize {
        self.groups
            .lock()
            .unwrap()
            .values()
            .map(|g| g.pending.len())
            .sum()
    }

    pub fn dead_letter_count(&self) -> usize {
        self.dead_letters.lock().unwrap().len()
    }

    /// Stop accepting new messages; pending ones still drain.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_deliver_serially() {
        let queue = NotificationQueue::new(3);
        queue.enqueue("ACME/platform/refs/heads/main", "{\"a\":1}").unwrap();
        queue.enqueue("ACME/platform/refs/heads/main", "{\"a\":2}").unwrap();

        let first = queue.try_receive().unwrap();
        // Same group is busy until the first message settles.
        assert!(queue.try_receive().is_none());

        queue.acknowledge(&first);
        let second = queue.try_receive().unwrap();
        assert_ne!(first.message_id, second.message_id);
    }

    #[test]
    fn distinct_groups_deliver_concurrently() {
        let queue = NotificationQueue::new(3);
        queue.enqueue("ACME/platform/refs/heads/main", "{\"a\":1}").unwrap();
        queue.enqueue("ACME/website/refs/heads/main", "{\"b\":1}").unwrap();

        let one = queue.try_receive().unwrap();
        let two = queue.try_receive().unwrap();
        assert_ne!(one.group_id, two.group_id);
    }

    #[test]
    fn identical_bodies_deduplicate_within_a_group() {
        let queue = NotificationQueue::new(3);
        let first = queue.enqueue("g", "{\"a\":1}").unwrap();
        let replay = queue.enqueue("g", "{\"a\":1}").unwrap();

        assert!(!first.deduplicated);
        assert!(replay.deduplicated);
        assert_eq!(first.message_id, replay.message_id);
        assert_eq!(queue.depth(), 1);

        // A different body in the same group is a new message.
        let other = queue.enqueue("g", "{\"a\":2}").unwrap();
        assert!(!other.deduplicated);
        assert_eq!(queue.depth(), 2);
    }

    #[test]
    fn rejected_messages_redeliver_then_dead_letter() {
        let queue = NotificationQueue::new(3);
        queue.enqueue("g", "{\"a\":1}").unwrap();

        for attempt in 1..=3u32 {
            let message = queue.try_receive().unwrap();
            assert_eq!(message.receive_count, attempt);
            queue.reject(&message, "sync failed");
        }

        assert!(queue.try_receive().is_none());
        assert_eq!(queue.depth(), 0);
        assert_eq!(queue.dead_letter_count(), 1);
    }

    #[test]
    fn closed_queue_rejects_new_messages() {
        let queue = NotificationQueue::new(3);
        queue.close();
        assert!(matches!(
            queue.enqueue("g", "{}"),
            Err(QueueError::Closed)
        ));
    }

    #[tokio::test]
    async fn receive_returns_none_when_closed_and_drained() {
        let queue = NotificationQueue::new(3);
        queue.enqueue("g", "{\"a\":1}").unwrap();
        queue.close();

        let message = queue.receive().await.unwrap();
        queue.acknowledge(&message);
        assert!(queue.receive().await.is_none());
    }
}
