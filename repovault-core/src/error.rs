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

//! Error taxonomy for an archival run.
//!
//! Configuration and credential failures abort a run before any VCS call;
//! version-control failures abort before any archive is produced; archive
//! and storage failures are scoped to the archive they occurred on.

use thiserror::Error;

/// Classified failure of one archival run or of one of its per-archive
/// sub-steps.
#[derive(Debug, Clone, Error)]
pub enum ArchivalError {
    /// A required setting is missing or malformed. No side effects occurred.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The VCS credential secret is missing or malformed. Raised before any
    /// VCS operation runs.
    #[error("Credential error: {0}")]
    Credential(String),

    /// Clone, fetch, reset or archive invocation failed. The working copy
    /// may be left inconsistent; the next run repairs it via
    /// clean + fetch + reset.
    #[error("Version control error: {0}")]
    VersionControl(String),

    /// Archive production or decompression failed.
    #[error("Archive error: {0}")]
    Archive(String),

    /// Object or metadata write failed. Scoped to a single archive's
    /// sub-step; sibling archives continue.
    #[error("Storage error: {0}")]
    Storage(String),
}
