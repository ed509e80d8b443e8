// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Discovering and reading shard files.
//!
//! A shard is a partial [`TestReport`] written by a single test job. Shards are read
//! independently of each other, so this module has no shared state and is safe to call from
//! multiple threads at once.

use crate::errors::{DiscoverShardsError, ShardReadError};
use camino::{Utf8Path, Utf8PathBuf};
use flakeguard_metadata::TestReport;
use walkdir::WalkDir;
use xxhash_rust::xxh3::xxh3_64;

/// A shard that has been read and validated.
#[derive(Clone, Debug, PartialEq)]
pub struct ShardReport {
    path: Utf8PathBuf,
    content_hash: u64,
    report: TestReport,
}

impl ShardReport {
    /// Creates a shard from an in-memory report.
    ///
    /// The content hash is computed over the serialized report.
    pub fn new(path: impl Into<Utf8PathBuf>, report: TestReport) -> Self {
        // Every map in a report is keyed by strings, so serialization cannot fail.
        let content_hash = serde_json::to_vec(&report).map_or(0, |bytes| xxh3_64(&bytes));
        Self {
            path: path.into(),
            content_hash,
            report,
        }
    }

    /// The file this shard was read from.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// A hash of the shard's contents, used to detect duplicate shards.
    pub fn content_hash(&self) -> u64 {
        self.content_hash
    }

    /// The report contained in this shard.
    pub fn report(&self) -> &TestReport {
        &self.report
    }

    /// Consumes self, returning the contained report.
    pub fn into_report(self) -> TestReport {
        self.report
    }
}

/// Returns all `*.json` files in `input_dir`, sorted by path.
///
/// Only direct children are returned unless `recursive` is true.
pub fn discover_shards(
    input_dir: &Utf8Path,
    recursive: bool,
) -> Result<Vec<Utf8PathBuf>, DiscoverShardsError> {
    if !input_dir.exists() {
        return Err(DiscoverShardsError::NotFound {
            path: input_dir.to_owned(),
        });
    }
    if !input_dir.is_dir() {
        return Err(DiscoverShardsError::NotADirectory {
            path: input_dir.to_owned(),
        });
    }

    let mut walker = WalkDir::new(input_dir).min_depth(1).follow_links(true);
    if !recursive {
        walker = walker.max_depth(1);
    }

    let mut paths = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|error| DiscoverShardsError::ReadDir {
            path: input_dir.to_owned(),
            error,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = Utf8PathBuf::try_from(entry.into_path())
            .map_err(|error| DiscoverShardsError::NonUtf8Path { error })?;
        if path.extension() == Some("json") {
            paths.push(path);
        }
    }

    paths.sort_unstable();
    Ok(paths)
}

/// Reads and validates a single shard file.
pub fn read_shard(path: &Utf8Path) -> Result<ShardReport, ShardReadError> {
    let contents = std::fs::read(path).map_err(|error| ShardReadError::Read {
        path: path.to_owned(),
        error,
    })?;

    let mut deserializer = serde_json::Deserializer::from_slice(&contents);
    let report: TestReport = serde_path_to_error::deserialize(&mut deserializer).map_err(
        |error| ShardReadError::Deserialize {
            path: path.to_owned(),
            json_path: error.path().to_string(),
            error: error.into_inner(),
        },
    )?;
    // Reject trailing data after the report.
    deserializer
        .end()
        .map_err(|error| ShardReadError::Deserialize {
            path: path.to_owned(),
            json_path: ".".to_owned(),
            error,
        })?;

    validate(path, &report)?;

    Ok(ShardReport {
        path: path.to_owned(),
        content_hash: xxh3_64(&contents),
        report,
    })
}

fn validate(path: &Utf8Path, report: &TestReport) -> Result<(), ShardReadError> {
    for (index, result) in report.results.iter().enumerate() {
        for (field, value) in [
            ("test_name", &result.test_name),
            ("test_package", &result.test_package),
        ] {
            if value.trim().is_empty() {
                return Err(ShardReadError::MissingIdentity {
                    path: path.to_owned(),
                    index,
                    field,
                });
            }
        }

        for (field, value) in [
            ("successes", result.successes),
            ("failures", result.failures),
            (
                "successes + failures",
                result.successes.saturating_add(result.failures),
            ),
        ] {
            if value > result.runs {
                return Err(ShardReadError::InvalidCounters {
                    path: path.to_owned(),
                    test: result.key(),
                    field,
                    value,
                    runs: result.runs,
                });
            }
        }
    }

    Ok(())
}
