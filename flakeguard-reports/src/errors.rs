// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by flakeguard.

use camino::{FromPathBufError, Utf8Path, Utf8PathBuf};
use config::ConfigError;
use flakeguard_metadata::TestKey;
use std::{error::Error as StdError, fmt};
use thiserror::Error;

/// An error that occurred while parsing the config.
#[derive(Debug, Error)]
#[error("failed to parse flakeguard config at `{config_file}`")]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Utf8PathBuf,
    #[source]
    kind: ConfigParseErrorKind,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: impl Into<Utf8PathBuf>, kind: ConfigParseErrorKind) -> Self {
        Self {
            config_file: config_file.into(),
            kind,
        }
    }

    /// Returns the config file for this error.
    pub fn config_file(&self) -> &Utf8Path {
        &self.config_file
    }

    /// Returns the kind of error this is.
    pub fn kind(&self) -> &ConfigParseErrorKind {
        &self.kind
    }
}

/// The kind of error that occurred while parsing a config.
///
/// Returned by [`ConfigParseError::kind`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigParseErrorKind {
    /// An error occurred while building the config.
    #[error(transparent)]
    BuildError(Box<ConfigError>),

    /// An error occurred while deserializing the config.
    #[error(transparent)]
    DeserializeError(Box<serde_path_to_error::Error<ConfigError>>),
}

/// An error that occurs while parsing a [`MaxPassRatio`](crate::classify::MaxPassRatio).
#[derive(Clone, Debug, Error)]
#[error("invalid max pass ratio `{input}`: {reason}")]
pub struct MaxPassRatioParseError {
    input: String,
    reason: &'static str,
}

impl MaxPassRatioParseError {
    pub(crate) fn new(input: impl Into<String>, reason: &'static str) -> Self {
        Self {
            input: input.into(),
            reason,
        }
    }
}

/// An error that occurred while discovering shard files in an input directory.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DiscoverShardsError {
    /// The input directory does not exist.
    #[error("input directory `{path}` does not exist")]
    NotFound {
        /// The input directory.
        path: Utf8PathBuf,
    },

    /// The input path exists but is not a directory.
    #[error("input path `{path}` is not a directory")]
    NotADirectory {
        /// The input path.
        path: Utf8PathBuf,
    },

    /// An error occurred while walking the input directory.
    #[error("error reading input directory `{path}`")]
    ReadDir {
        /// The input directory.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: walkdir::Error,
    },

    /// A file in the input directory does not have a UTF-8 path.
    #[error("shard path is not valid UTF-8")]
    NonUtf8Path {
        /// The underlying error.
        #[source]
        error: FromPathBufError,
    },
}

/// An error that occurred while reading a single shard file.
///
/// Depending on configuration, these errors either abort aggregation or cause the shard to be
/// skipped.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ShardReadError {
    /// The shard could not be read from disk.
    #[error("failed to read shard `{path}`")]
    Read {
        /// The shard file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// The shard is not valid JSON, or does not have the shape of a test report.
    #[error("failed to deserialize shard `{path}` at `{json_path}`")]
    Deserialize {
        /// The shard file.
        path: Utf8PathBuf,

        /// The location within the document at which deserialization failed.
        json_path: String,

        /// The underlying error.
        #[source]
        error: serde_json::Error,
    },

    /// A test result in the shard has an empty identity field.
    #[error("shard `{path}`: result at index {index} has an empty `{field}`")]
    MissingIdentity {
        /// The shard file.
        path: Utf8PathBuf,

        /// The index of the result within the shard.
        index: usize,

        /// The empty field.
        field: &'static str,
    },

    /// A test result in the shard has counters that contradict each other.
    #[error("shard `{path}`: test `{test}` has {field} = {value}, more than its {runs} runs")]
    InvalidCounters {
        /// The shard file.
        path: Utf8PathBuf,

        /// The test with invalid counters.
        test: TestKey,

        /// The counter that exceeds the number of runs.
        field: &'static str,

        /// The value of that counter.
        value: usize,

        /// The number of runs.
        runs: usize,
    },
}

impl ShardReadError {
    /// Returns the shard file this error is for.
    pub fn path(&self) -> &Utf8Path {
        match self {
            Self::Read { path, .. }
            | Self::Deserialize { path, .. }
            | Self::MissingIdentity { path, .. }
            | Self::InvalidCounters { path, .. } => path,
        }
    }
}

/// An error that aborted aggregation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AggregateError {
    /// Shard files could not be discovered.
    #[error("error discovering shard files")]
    Discover(#[from] DiscoverShardsError),

    /// The input directory does not contain any shard files.
    #[error("no input reports found in `{input_dir}`")]
    NoInputReports {
        /// The input directory.
        input_dir: Utf8PathBuf,
    },

    /// Every shard file failed to parse.
    #[error("no valid input reports in `{input_dir}` ({skipped} shards could not be read)")]
    NoValidInputReports {
        /// The input directory.
        input_dir: Utf8PathBuf,

        /// The number of shards that could not be read.
        skipped: usize,
    },

    /// A shard could not be read, and aggregation is in strict mode.
    #[error("error reading shard in strict mode")]
    ShardRead(#[from] ShardReadError),

    /// The worker pool used to read shards could not be created.
    #[error("failed to build shard reader thread pool")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// An error that occurred while reading a CODEOWNERS file.
///
/// Ownership is optional: these errors are reported as warnings and aggregation continues without
/// owners.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CodeOwnersParseError {
    /// The file could not be read.
    #[error("failed to read CODEOWNERS file `{path}`")]
    Read {
        /// The CODEOWNERS file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// A pattern in the file is not a valid glob.
    #[error("{path}:{line}: invalid CODEOWNERS pattern `{pattern}`")]
    InvalidPattern {
        /// The CODEOWNERS file.
        path: Utf8PathBuf,

        /// The 1-based line number.
        line: usize,

        /// The pattern as written.
        pattern: String,

        /// The underlying error.
        #[source]
        error: globset::Error,
    },
}

/// An error that occurred while saving a report to disk.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SaveReportError {
    /// The directory to write the report to could not be created.
    #[error("failed to create directory `{path}`")]
    CreateDir {
        /// The directory that could not be created.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// The report could not be serialized.
    #[error("failed to serialize report")]
    Serialize {
        /// The underlying error.
        #[source]
        error: serde_json::Error,
    },

    /// The report could not be written.
    #[error("failed to write report to `{path}`")]
    Write {
        /// The path that could not be written.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },
}

/// An error that occurred while writing the set of output artifacts.
///
/// When this error is returned, no artifacts from the failed call are left on disk.
#[derive(Debug, Error)]
#[error("error writing {artifact}")]
pub struct WriteArtifactsError {
    artifact: &'static str,
    #[source]
    err: SaveReportError,
}

impl WriteArtifactsError {
    pub(crate) fn new(artifact: &'static str, err: SaveReportError) -> Self {
        Self { artifact, err }
    }

    /// Returns the file name of the artifact that failed to be written.
    pub fn artifact(&self) -> &'static str {
        self.artifact
    }

    /// Returns the underlying error.
    pub fn save_error(&self) -> &SaveReportError {
        &self.err
    }
}

/// Displays an error along with its chain of sources, on a single line.
#[derive(Clone, Copy, Debug)]
pub struct DisplayErrorChain<E> {
    error: E,
}

impl<E: StdError> DisplayErrorChain<E> {
    /// Creates a new `DisplayErrorChain`.
    pub fn new(error: E) -> Self {
        Self { error }
    }
}

impl<E: StdError> fmt::Display for DisplayErrorChain<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;
        let mut source = self.error.source();
        while let Some(error) = source {
            write!(f, ": {error}")?;
            source = error.source();
        }
        Ok(())
    }
}
