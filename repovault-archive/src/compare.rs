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

//! Content-level change detection between two zip archives.
//!
//! Both archives are fully decompressed into scratch directories and the
//! resulting trees compared by file set, size and byte content. Zip
//! metadata — timestamps, compression method, entry ordering — never
//! participates, so re-archiving an unchanged tree compares equal.
//!
//! Failure policy is fail-open: anything that prevents a trustworthy
//! comparison (corrupt zip, IO error) reports "changed", trading a
//! redundant upload for never silently dropping one. Scratch directories
//! are removed on every exit path.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;
use walkdir::WalkDir;

#[derive(Debug, Error)]
enum CompareError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),
}

/// True only if both archives decompress to byte-identical trees.
///
/// A missing previous archive never reaches this function; the pipeline
/// treats "no stored version" as changed without comparing.
pub async fn is_unchanged(previous: &Path, new: &Path) -> bool {
    let previous = previous.to_path_buf();
    let new = new.to_path_buf();

    let result =
        tokio::task::spawn_blocking(move || compare_archive_contents(&previous, &new)).await;

    match result {
        Ok(Ok(unchanged)) => unchanged,
        Ok(Err(err)) => {
            warn!(%err, "archive comparison failed, treating as changed");
            false
        }
        Err(err) => {
            warn!(%err, "archive comparison task failed, treating as changed");
            false
        }
    }
}

fn compare_archive_contents(previous: &Path, new: &Path) -> Result<bool, CompareError> {
    let previous_dir = tempfile::tempdir()?;
    let new_dir = tempfile::tempdir()?;

    extract(previous, previous_dir.path())?;
    extract(new, new_dir.path())?;

    trees_identical(previous_dir.path(), new_dir.path())
}

fn extract(archive_path: &Path, dest: &Path) -> Result<(), CompareError> {
    let file = std::fs::File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file)?;
    archive.extract(dest)?;
    Ok(())
}

fn collect_files(root: &Path) -> Result<BTreeMap<PathBuf, u64>, CompareError> {
    let mut files = BTreeMap::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|err| std::io::Error::other(err.to_string()))?
            .to_path_buf();
        files.insert(relative, entry.metadata()?.len());
    }
    Ok(files)
}

fn trees_identical(a: &Path, b: &Path) -> Result<bool, CompareError> {
    let files_a = collect_files(a)?;
    let files_b = collect_files(b)?;

    if files_a.len() != files_b.len() {
        return Ok(false);
    }

    for (relative, size) in &files_a {
        match files_b.get(relative) {
            Some(other_size) if other_size == size => {}
            _ => return Ok(false),
        }
    }

    for relative in files_a.keys() {
        if !file_contents_equal(&a.join(relative), &b.join(relative))? {
            return Ok(false);
        }
    }

    Ok(true)
}

fn file_contents_equal(a: &Path, b: &Path) -> Result<bool, CompareError> {
    let mut reader_a = std::io::BufReader::new(std::fs::File::open(a)?);
    let mut reader_b = std::io::BufReader::new(std::fs::File::open(b)?);

    let mut buf_a = [0u8; 8192];
    let mut buf_b = [0u8; 8192];

    loop {
        let read_a = reader_a.read(&mut buf_a)?;
        let read_b = reader_b.read(&mut buf_b)?;
        if read_a != read_b || buf_a[..read_a] != buf_b[..read_b] {
            return Ok(false);
        }
        if read_a == 0 {
            return Ok(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn write_zip(
        path: &Path,
        entries: &[(&str, &[u8])],
        method: zip::CompressionMethod,
        timestamp: zip::DateTime,
    ) {
        let file = std::fs::File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = SimpleFileOptions::default()
            .compression_method(method)
            .last_modified_time(timestamp);
        for (name, bytes) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(bytes).unwrap();
        }
        writer.finish().unwrap();
    }

    fn ts(year: u16) -> zip::DateTime {
        zip::DateTime::from_date_and_time(year, 1, 1, 0, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn identical_trees_compare_equal_despite_zip_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let entries: &[(&str, &[u8])] = &[
            ("src/main.rs", b"fn main() {}\n"),
            ("README.md", b"# hello\n"),
        ];

        let old = dir.path().join("old.zip");
        let new = dir.path().join("new.zip");
        write_zip(&old, entries, zip::CompressionMethod::Deflated, ts(2020));
        write_zip(&new, entries, zip::CompressionMethod::Stored, ts(2024));

        assert!(is_unchanged(&old, &new).await);
    }

    #[tokio::test]
    async fn byte_difference_is_a_change() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("old.zip");
        let new = dir.path().join("new.zip");
        write_zip(
            &old,
            &[("a.txt", b"one")],
            zip::CompressionMethod::Deflated,
            ts(2024),
        );
        write_zip(
            &new,
            &[("a.txt", b"two")],
            zip::CompressionMethod::Deflated,
            ts(2024),
        );

        assert!(!is_unchanged(&old, &new).await);
    }

    #[tokio::test]
    async fn differing_file_sets_are_a_change() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("old.zip");
        let new = dir.path().join("new.zip");
        write_zip(
            &old,
            &[("a.txt", b"one")],
            zip::CompressionMethod::Deflated,
            ts(2024),
        );
        write_zip(
            &new,
            &[("a.txt", b"one"), ("b.txt", b"two")],
            zip::CompressionMethod::Deflated,
            ts(2024),
        );

        assert!(!is_unchanged(&old, &new).await);
        assert!(!is_unchanged(&new, &old).await);
    }

    #[tokio::test]
    async fn corrupt_archive_fails_open_toward_changed() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.zip");
        let corrupt = dir.path().join("corrupt.zip");
        write_zip(
            &good,
            &[("a.txt", b"one")],
            zip::CompressionMethod::Deflated,
            ts(2024),
        );
        std::fs::write(&corrupt, b"this is not a zip").unwrap();

        assert!(!is_unchanged(&corrupt, &good).await);
        assert!(!is_unchanged(&good, &corrupt).await);
    }
}
