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

//! Core data model for the Repovault archival pipeline.
//!
//! Contains the webhook notification types shared by the ingress, the
//! dispatcher and the pipeline, the per-repository archive policy with its
//! fallback loading chain, and the error taxonomy every other crate maps
//! into.

pub mod error;
pub mod notification;
pub mod policy;

pub use error::ArchivalError;
pub use notification::{
    Actor, EventKind, NotificationError, Project, PushContent, PushEvent, Repository, Revision,
    WebhookNotification,
};
pub use policy::{ArchivePolicy, PolicyLoader};
