// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    time::Duration,
};

/// A test report: either a single shard produced by one test job, or the aggregate of many shards.
///
/// Shards and aggregated reports share the same format. In a shard, derived fields such as
/// [`TestResult::pass_ratio`] and [`summary_data`](Self::summary_data) are informational: they
/// are always recomputed during aggregation.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct TestReport {
    /// The identifier for this report.
    ///
    /// Empty in shards; assigned once per aggregation run.
    #[serde(default)]
    pub id: String,

    /// The project the tests belong to, e.g. a module path.
    #[serde(default)]
    pub project: String,

    /// The URL of the repository the tests were run against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_url: Option<String>,

    /// The branch the tests were run against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_name: Option<String>,

    /// The commit the tests were run against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head_sha: Option<String>,

    /// The base commit of the change being tested, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_sha: Option<String>,

    /// The name of the CI workflow that produced the report.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_workflow_name: Option<String>,

    /// A link to the CI workflow run that produced the report.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_workflow_run_url: Option<String>,

    /// Statistics computed over [`results`](Self::results).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_data: Option<SummaryData>,

    /// True if tests were run with race detection enabled.
    #[serde(default)]
    pub race_detection: bool,

    /// Tests that were explicitly excluded from the run.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub excluded_tests: BTreeSet<String>,

    /// Tests that were explicitly selected for the run.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub selected_tests: BTreeSet<String>,

    /// Per-test results.
    #[serde(default)]
    pub results: Vec<TestResult>,
}

/// The identity of a test: its package and its name.
///
/// After aggregation, no two results in a report share a key.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct TestKey {
    /// The package the test lives in.
    pub test_package: String,

    /// The name of the test.
    pub test_name: String,
}

impl TestKey {
    /// Creates a new key.
    pub fn new(test_package: impl Into<String>, test_name: impl Into<String>) -> Self {
        Self {
            test_package: test_package.into(),
            test_name: test_name.into(),
        }
    }
}

impl fmt::Display for TestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.test_package, self.test_name)
    }
}

/// The outcome of a single logical test, across every run observed for it.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct TestResult {
    /// The name of the test.
    pub test_name: String,

    /// The package the test lives in.
    pub test_package: String,

    /// The source file the test is defined in, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_path: Option<String>,

    /// True if the package panicked outside of any individual test.
    #[serde(default)]
    pub package_panic: bool,

    /// True if the test panicked in at least one run.
    #[serde(default)]
    pub panic: bool,

    /// True if the test timed out in at least one run.
    #[serde(default)]
    pub timeout: bool,

    /// True if a data race was detected in at least one run.
    #[serde(default)]
    pub race: bool,

    /// True if the test was skipped.
    #[serde(default)]
    pub skipped: bool,

    /// `successes / runs`, or 1.0 if the test never ran.
    #[serde(default)]
    pub pass_ratio: f64,

    /// The number of times the test ran to completion.
    pub runs: usize,

    /// The number of runs that passed.
    pub successes: usize,

    /// The number of runs that failed.
    #[serde(default)]
    pub failures: usize,

    /// The number of times the test was skipped.
    #[serde(default)]
    pub skips: usize,

    /// The duration of each run. Serialized as integer nanoseconds.
    #[serde(
        default,
        with = "duration_nanos",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub durations: Vec<Duration>,

    /// Output lines for passing runs, keyed by run ID.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub passed_outputs: BTreeMap<String, Vec<String>>,

    /// Output lines for failing runs, keyed by run ID.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub failed_outputs: BTreeMap<String, Vec<String>>,

    /// Output lines emitted by the package rather than by an individual test.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub package_outputs: Vec<String>,

    /// The owners of the test, from CODEOWNERS.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub code_owners: Vec<String>,
}

impl TestResult {
    /// Returns the identity of this test.
    pub fn key(&self) -> TestKey {
        TestKey::new(&self.test_package, &self.test_name)
    }

    /// Returns true if any log output is attached to this result.
    pub fn has_logs(&self) -> bool {
        !self.passed_outputs.is_empty()
            || !self.failed_outputs.is_empty()
            || !self.package_outputs.is_empty()
    }

    /// Drops all log output attached to this result.
    ///
    /// Identity, counters and the pass ratio are unaffected.
    pub fn clear_logs(&mut self) {
        self.passed_outputs.clear();
        self.failed_outputs.clear();
        self.package_outputs.clear();
    }
}

/// Statistics computed over the results of a report.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct SummaryData {
    /// The number of distinct tests that ran at least once.
    pub unique_tests_run: usize,

    /// The number of distinct tests that were skipped.
    pub unique_skipped_test_count: usize,

    /// The largest number of runs recorded for any single test.
    pub test_run_count: usize,

    /// The number of tests that panicked, or whose package panicked.
    pub panicked_tests: usize,

    /// The number of tests in which a data race was detected.
    pub raced_tests: usize,

    /// The number of tests classified as flaky.
    pub flaky_tests: usize,

    /// `flaky_tests` as a percentage of `unique_tests_run`.
    pub flaky_test_percent: f64,

    /// The total number of runs across all tests.
    pub total_runs: usize,

    /// The number of runs that passed.
    pub passed_runs: usize,

    /// The number of runs that failed.
    pub failed_runs: usize,

    /// The number of times a test was skipped.
    pub skipped_runs: usize,

    /// `passed_runs` as a percentage of `total_runs`.
    pub pass_percent: f64,
}

mod duration_nanos {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub(super) fn serialize<S>(durations: &[Duration], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let nanos: Vec<u64> = durations
            .iter()
            .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
            .collect();
        nanos.serialize(serializer)
    }

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let nanos = Vec::<u64>::deserialize(deserializer)?;
        Ok(nanos.into_iter().map(Duration::from_nanos).collect())
    }
}
