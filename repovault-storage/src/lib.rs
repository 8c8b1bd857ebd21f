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

//! Durable-store collaborators of the archival pipeline.
//!
//! Every external service the pipeline talks to is behind a trait so runs
//! can be driven against substitutes in tests:
//!
//! - [`ArchiveStore`] — versioned object storage for archive zips. The
//!   remote backend wraps any [`object_store`]-compatible service; the
//!   local backend mints its own version ids under a data directory.
//! - [`ProvenanceStore`] — write-once metadata rows keyed by stored
//!   version id.
//! - [`SecretStore`] — SSH key material for VCS access, materialized to
//!   owner-only files before git runs.

pub mod archive_store;
pub mod error;
pub mod provenance;
pub mod secrets;

pub use archive_store::{
    ArchiveStore, LocalArchiveStore, MemoryArchiveStore, RemoteArchiveStore, StoredVersion,
};
pub use error::StorageError;
pub use provenance::{
    JsonProvenanceStore, MemoryProvenanceStore, ProvenanceRecord, ProvenanceStore,
};
pub use secrets::{
    materialize_ssh_key, FileSecretStore, MemorySecretStore, SecretError, SecretStore,
    SshKeyFiles, SshKeyMaterial,
};
