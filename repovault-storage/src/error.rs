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

use repovault_core::ArchivalError;
use thiserror::Error;

/// Store backend errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("Invalid store URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The store accepted a write but returned no version identifier.
    /// Recording provenance for an unidentifiable version would break the
    /// version-to-record invariant, so this is fatal for the archive.
    #[error("Store returned no version id for {key}")]
    NoVersion { key: String },
}

impl From<StorageError> for ArchivalError {
    fn from(err: StorageError) -> Self {
        ArchivalError::Storage(err.to_string())
    }
}
