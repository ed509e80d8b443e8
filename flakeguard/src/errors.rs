// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::output::{NO_HEADING, StderrStyles};
use camino::Utf8PathBuf;
use flakeguard_metadata::FlakeguardExitCode;
use flakeguard_reports::errors::{
    AggregateError, ConfigParseError, ConfigParseErrorKind, SaveReportError, WriteArtifactsError,
};
use owo_colors::OwoColorize;
use std::error::Error;
use thiserror::Error;

pub(crate) type Result<T, E = ExpectedError> = std::result::Result<T, E>;

// Note that the #[error()] strings are mostly placeholder messages: the expected way to print out
// errors is with the display_to_stderr method, which colorizes errors.

/// An error that was anticipated and is reported to the user, rather than a bug in flakeguard.
#[derive(Debug, Error)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("config parse error")]
    ConfigParseError {
        #[from]
        err: ConfigParseError,
    },
    #[error("aggregation failed")]
    AggregateError {
        input_dir: Utf8PathBuf,
        #[source]
        err: AggregateError,
    },
    #[error("error writing reports")]
    WriteArtifactsError {
        output_dir: Utf8PathBuf,
        #[source]
        err: WriteArtifactsError,
    },
}

impl ExpectedError {
    pub(crate) fn aggregate_error(input_dir: impl Into<Utf8PathBuf>, err: AggregateError) -> Self {
        Self::AggregateError {
            input_dir: input_dir.into(),
            err,
        }
    }

    pub(crate) fn write_artifacts_error(
        output_dir: impl Into<Utf8PathBuf>,
        err: WriteArtifactsError,
    ) -> Self {
        Self::WriteArtifactsError {
            output_dir: output_dir.into(),
            err,
        }
    }

    /// Returns the exit code for the process.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::ConfigParseError { .. } => FlakeguardExitCode::SETUP_ERROR,
            Self::AggregateError { err, .. } => match err {
                AggregateError::ThreadPool(_) => FlakeguardExitCode::SETUP_ERROR,
                _ => FlakeguardExitCode::INPUT_ERROR,
            },
            Self::WriteArtifactsError { err, .. } => match err.save_error() {
                SaveReportError::CreateDir { .. } => FlakeguardExitCode::SETUP_ERROR,
                _ => FlakeguardExitCode::WRITE_OUTPUT_ERROR,
            },
        }
    }

    /// Displays this error to stderr.
    pub fn display_to_stderr(&self, styles: &StderrStyles) {
        let mut next_error = match &self {
            Self::ConfigParseError { err } => {
                tracing::error!(
                    "failed to parse config file `{}`",
                    err.config_file().style(styles.bold)
                );
                match err.kind() {
                    ConfigParseErrorKind::BuildError(error) => Some(error.as_ref() as &dyn Error),
                    ConfigParseErrorKind::DeserializeError(error) => {
                        tracing::error!(
                            target: NO_HEADING,
                            "  (at key `{}`)",
                            error.path().style(styles.bold)
                        );
                        Some(error.inner() as &dyn Error)
                    }
                    _ => Some(err.kind() as &dyn Error),
                }
            }
            Self::AggregateError { input_dir, err } => match err {
                AggregateError::NoInputReports { .. } => {
                    tracing::error!(
                        "no input reports found in `{}`",
                        input_dir.style(styles.bold)
                    );
                    None
                }
                AggregateError::NoValidInputReports { skipped, .. } => {
                    tracing::error!(
                        "no valid input reports in `{}` ({} {} could not be read)",
                        input_dir.style(styles.bold),
                        skipped.style(styles.warning_text),
                        if *skipped == 1 { "shard" } else { "shards" },
                    );
                    None
                }
                AggregateError::ShardRead(error) => {
                    tracing::error!(
                        "failed to read shard `{}` (strict mode is enabled)",
                        error.path().style(styles.bold)
                    );
                    Some(error as &dyn Error)
                }
                other => {
                    tracing::error!(
                        "error aggregating reports in `{}`",
                        input_dir.style(styles.bold)
                    );
                    Some(other as &dyn Error)
                }
            },
            Self::WriteArtifactsError { output_dir, err } => {
                tracing::error!(
                    "error writing `{}` to `{}`",
                    err.artifact().style(styles.bold),
                    output_dir.style(styles.bold),
                );
                err.source()
            }
        };

        while let Some(err) = next_error {
            tracing::error!(target: NO_HEADING, "\nCaused by:\n  {}", err);
            next_error = err.source();
        }
    }
}
