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

//! The archival pipeline.
//!
//! One push notification in, zero or more stored archive versions out:
//!
//! ```text
//! PushEvent ──► policy ──► trigger filter ──► credentials ──► sync
//!                                                              │
//!                              ┌───────────────────────────────┘
//!                              ▼
//!                       produce archives ──► per archive, concurrently:
//!                                            fetch previous ► content diff
//!                                            ► upload if changed ► record
//! ```
//!
//! Change detection compares decompressed bytes, never zip metadata, so a
//! replayed notification against an unchanged tree uploads nothing. The
//! pipeline holds no global state; all collaborators are passed in at
//! construction, which is also what the tests exploit.

pub mod compare;
pub mod git;
pub mod pipeline;
pub mod producer;
pub mod provenance;

pub use git::{GitClient, GitError, VersionControl};
pub use pipeline::{
    ArchiveDisposition, ArchiveOutcome, ArchivalPipeline, PipelineReport, PipelineSettings,
};
pub use producer::{
    archive_object_key, plan_archives, produce_archives, PlannedArchive, ProducedArchive,
};
pub use provenance::ProvenanceRecorder;
