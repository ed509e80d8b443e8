// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Writing reports to disk.

use crate::errors::{SaveReportError, WriteArtifactsError};
use atomicwrites::{AllowOverwrite, AtomicFile};
use camino::{Utf8Path, Utf8PathBuf};
use flakeguard_metadata::{TestReport, TestResult};
use std::io::Write;
use tracing::debug;

/// The full report, without logs. Always written.
pub const ALL_TEST_RESULTS: &str = "all-test-results.json";

/// Failed and flaky tests, with logs. Only written if there are any.
pub const FAILED_TEST_RESULTS_WITH_LOGS: &str = "failed-test-results-with-logs.json";

/// Failed and flaky tests, without logs. Only written if there are any.
pub const FAILED_TEST_RESULTS: &str = "failed-test-results.json";

/// Removes log output from every result in `report`.
///
/// Counters, pass ratios and identities are unchanged.
pub fn strip_logs(report: &mut TestReport) {
    for result in &mut report.results {
        result.clear_logs();
    }
}

/// Creates `dir` and its parents if they don't exist.
///
/// On Unix, new directories are created with mode `0755`.
pub fn create_output_dir(dir: &Utf8Path) -> Result<(), SaveReportError> {
    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o755);
    }
    builder
        .create(dir)
        .map_err(|error| SaveReportError::CreateDir {
            path: dir.to_owned(),
            error,
        })
}

/// Serializes `report` as pretty-printed JSON and atomically writes it to `path`.
///
/// The parent directory is created if it doesn't exist.
pub fn save_report(path: &Utf8Path, report: &TestReport) -> Result<(), SaveReportError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_str().is_empty()) {
        create_output_dir(parent)?;
    }

    let mut contents = serde_json::to_vec_pretty(report)
        .map_err(|error| SaveReportError::Serialize { error })?;
    contents.push(b'\n');

    AtomicFile::new(path, AllowOverwrite)
        .write(|file| file.write_all(&contents))
        .map_err(|error| SaveReportError::Write {
            path: path.to_owned(),
            error: match error {
                atomicwrites::Error::Internal(error) | atomicwrites::Error::User(error) => error,
            },
        })?;

    debug!("wrote {} bytes to {path}", contents.len());
    Ok(())
}

/// The files written by [`write_artifacts`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReportArtifacts {
    /// The full report, without logs.
    pub all_results: Utf8PathBuf,

    /// Failed and flaky tests with logs, if any tests failed.
    pub failed_results_with_logs: Option<Utf8PathBuf>,

    /// Failed and flaky tests without logs, if any tests failed.
    pub failed_results: Option<Utf8PathBuf>,
}

/// Writes the output artifacts for `report` to `output_dir`.
///
/// If `failed` is non-empty, two failed reports are produced: one with logs and one without. The
/// full report is always produced, with logs stripped.
///
/// Every artifact is first written to a staging directory inside `output_dir`, so a failure to
/// serialize or write leaves existing files in `output_dir` untouched. The staged files are then
/// moved into place, full report first. If a move fails, artifacts already moved by this call are
/// removed.
pub fn write_artifacts(
    output_dir: &Utf8Path,
    report: &TestReport,
    failed: &[TestResult],
) -> Result<ReportArtifacts, WriteArtifactsError> {
    create_output_dir(output_dir)
        .map_err(|err| WriteArtifactsError::new(ALL_TEST_RESULTS, err))?;

    let staging_dir = camino_tempfile::Builder::new()
        .prefix(".flakeguard-staging-")
        .rand_bytes(5)
        .tempdir_in(output_dir)
        .map_err(|error| {
            WriteArtifactsError::new(
                ALL_TEST_RESULTS,
                SaveReportError::CreateDir {
                    path: output_dir.to_owned(),
                    error,
                },
            )
        })?;

    let mut staged = Vec::with_capacity(3);

    let mut all_report = report.clone();
    strip_logs(&mut all_report);
    staged.push(stage(staging_dir.path(), ALL_TEST_RESULTS, &all_report)?);

    if !failed.is_empty() {
        let mut failed_report = TestReport {
            results: failed.to_vec(),
            ..report.clone()
        };
        staged.push(stage(
            staging_dir.path(),
            FAILED_TEST_RESULTS_WITH_LOGS,
            &failed_report,
        )?);

        strip_logs(&mut failed_report);
        staged.push(stage(staging_dir.path(), FAILED_TEST_RESULTS, &failed_report)?);
    }

    let mut committer = ArtifactCommitter {
        output_dir,
        committed: Vec::new(),
    };
    let mut artifacts = ReportArtifacts::default();
    for (artifact, staged_path) in staged {
        let path = committer.commit(artifact, &staged_path)?;
        match artifact {
            ALL_TEST_RESULTS => artifacts.all_results = path,
            FAILED_TEST_RESULTS_WITH_LOGS => artifacts.failed_results_with_logs = Some(path),
            _ => artifacts.failed_results = Some(path),
        }
    }

    committer.committed.clear();
    Ok(artifacts)
}

fn stage(
    staging_dir: &Utf8Path,
    artifact: &'static str,
    report: &TestReport,
) -> Result<(&'static str, Utf8PathBuf), WriteArtifactsError> {
    let path = staging_dir.join(artifact);
    save_report(&path, report).map_err(|err| WriteArtifactsError::new(artifact, err))?;
    Ok((artifact, path))
}

/// Moves staged artifacts into place, and removes them again if dropped before being cleared.
struct ArtifactCommitter<'a> {
    output_dir: &'a Utf8Path,
    committed: Vec<Utf8PathBuf>,
}

impl ArtifactCommitter<'_> {
    fn commit(
        &mut self,
        artifact: &'static str,
        staged_path: &Utf8Path,
    ) -> Result<Utf8PathBuf, WriteArtifactsError> {
        let path = self.output_dir.join(artifact);
        std::fs::rename(staged_path, &path).map_err(|error| {
            WriteArtifactsError::new(
                artifact,
                SaveReportError::Write {
                    path: path.clone(),
                    error,
                },
            )
        })?;
        self.committed.push(path.clone());
        Ok(path)
    }
}

impl Drop for ArtifactCommitter<'_> {
    fn drop(&mut self) {
        for path in self.committed.drain(..) {
            debug!("removing partially written artifact {path}");
            // The original error is reported instead.
            _ = std::fs::remove_file(&path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{result, single_run};
    use camino_tempfile::Utf8TempDir;
    use pretty_assertions::assert_eq;

    fn report() -> TestReport {
        let mut flaky = single_run("pkg/foo", "TestBar", "1", false);
        flaky.package_outputs = vec!["FAIL pkg/foo".to_owned()];
        TestReport {
            id: "test-report".to_owned(),
            project: "example.com/project".to_owned(),
            head_sha: Some("abc123".to_owned()),
            race_detection: true,
            results: vec![flaky, single_run("pkg/foo", "TestOk", "1", true)],
            ..Default::default()
        }
    }

    fn read(path: &Utf8Path) -> TestReport {
        serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
    }

    #[test]
    fn strip_logs_keeps_outcomes() {
        let original = report();
        let mut stripped = original.clone();
        strip_logs(&mut stripped);

        assert_eq!(stripped.results.len(), original.results.len());
        for (stripped, original) in stripped.results.iter().zip(&original.results) {
            assert!(!stripped.has_logs());
            assert_eq!(stripped.key(), original.key());
            assert_eq!(stripped.pass_ratio, original.pass_ratio);
            assert_eq!(stripped.runs, original.runs);
            assert_eq!(stripped.successes, original.successes);
            assert_eq!(stripped.failures, original.failures);
        }
    }

    #[test]
    fn no_failures_writes_only_all_results() {
        let dir = Utf8TempDir::new().unwrap();
        let report = TestReport {
            results: vec![result("pkg/foo", "TestOk")],
            ..report()
        };

        let artifacts = write_artifacts(dir.path(), &report, &[]).unwrap();
        assert_eq!(
            artifacts,
            ReportArtifacts {
                all_results: dir.path().join(ALL_TEST_RESULTS),
                failed_results_with_logs: None,
                failed_results: None,
            }
        );
        assert!(!dir.path().join(FAILED_TEST_RESULTS).exists());
        assert!(!dir.path().join(FAILED_TEST_RESULTS_WITH_LOGS).exists());
        assert_eq!(read(&artifacts.all_results), report);
    }

    #[test]
    fn failures_write_three_artifacts() {
        let dir = Utf8TempDir::new().unwrap();
        let output_dir = dir.path().join("nested/report");
        let report = report();
        let failed = vec![report.results[0].clone()];

        let artifacts = write_artifacts(&output_dir, &report, &failed).unwrap();

        let with_logs = read(&artifacts.failed_results_with_logs.unwrap());
        assert_eq!(with_logs.results, failed);
        assert!(with_logs.results[0].has_logs());
        assert_eq!(with_logs.id, "test-report");
        assert_eq!(with_logs.head_sha.as_deref(), Some("abc123"));
        assert!(with_logs.race_detection);

        let without_logs = read(&artifacts.failed_results.unwrap());
        assert_eq!(without_logs.results.len(), 1);
        assert!(!without_logs.results[0].has_logs());

        let all = read(&artifacts.all_results);
        assert_eq!(all.results.len(), 2);
        assert!(all.results.iter().all(|r| !r.has_logs()));
    }

    #[cfg(unix)]
    #[test]
    fn output_dir_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = Utf8TempDir::new().unwrap();
        let output_dir = dir.path().join("report");
        create_output_dir(&output_dir).unwrap();
        let mode = std::fs::metadata(&output_dir).unwrap().permissions().mode();
        // The process umask can only remove bits.
        assert_eq!(mode & !0o755 & 0o777, 0);
    }

    #[test]
    fn failed_write_keeps_previous_artifacts() {
        let dir = Utf8TempDir::new().unwrap();
        let previous = "previous run\n";
        for artifact in [FAILED_TEST_RESULTS_WITH_LOGS, FAILED_TEST_RESULTS] {
            std::fs::write(dir.path().join(artifact), previous).unwrap();
        }
        // A directory in the way of the full report makes moving it into place fail.
        std::fs::create_dir(dir.path().join(ALL_TEST_RESULTS)).unwrap();
        let report = report();
        let failed = vec![report.results[0].clone()];

        let err = write_artifacts(dir.path(), &report, &failed).unwrap_err();
        assert_eq!(err.artifact(), ALL_TEST_RESULTS);
        for artifact in [FAILED_TEST_RESULTS_WITH_LOGS, FAILED_TEST_RESULTS] {
            assert_eq!(
                std::fs::read_to_string(dir.path().join(artifact)).unwrap(),
                previous,
                "{artifact} from the previous run is untouched"
            );
        }

        let mut entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect();
        entries.sort();
        assert_eq!(
            entries,
            vec![ALL_TEST_RESULTS, FAILED_TEST_RESULTS_WITH_LOGS, FAILED_TEST_RESULTS],
            "staging directory is removed"
        );
    }

    #[test]
    fn rewriting_replaces_previous_artifacts() {
        let dir = Utf8TempDir::new().unwrap();
        let report = report();
        let failed = vec![report.results[0].clone()];
        write_artifacts(dir.path(), &report, &failed).unwrap();

        let mut next = report.clone();
        next.id = "next-report".to_owned();
        let artifacts = write_artifacts(dir.path(), &next, &failed).unwrap();

        assert_eq!(read(&artifacts.all_results).id, "next-report");
        assert_eq!(read(&artifacts.failed_results.unwrap()).id, "next-report");
    }
}
