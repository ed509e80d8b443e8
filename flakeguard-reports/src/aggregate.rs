// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Aggregation of shard reports into a single report.
//!
//! Shards are read in parallel, then sorted by path and split into contiguous chunks. Each chunk
//! is folded into a worker-local [`PartialReport`], and the partial reports are merged in chunk
//! order. Counters and flags are combined with associative and commutative operations, and
//! sequences such as log lines are concatenated in path order, so the result does not depend on
//! the order in which shards were discovered or read.

use crate::{
    classify::{MaxPassRatio, TestClassifier},
    codeowners::{CodeOwners, OwnershipResolver, TestLocator},
    config::FlakeguardConfig,
    errors::{AggregateError, DisplayErrorChain, ShardReadError},
    report_id::resolve_report_id,
    shard::{ShardReport, discover_shards, read_shard},
    summary::compute_summary,
};
use camino::{Utf8Path, Utf8PathBuf};
use flakeguard_metadata::{TestKey, TestReport, TestResult};
use itertools::Itertools;
use rayon::prelude::*;
use serde::Deserialize;
use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    num::NonZeroUsize,
};
use tracing::{debug, info, warn};

/// What to do with shards whose contents are identical.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicateShards {
    /// Count the runs in every copy.
    #[default]
    Additive,

    /// Only count the first copy, in path order.
    Deduplicate,
}

/// Context about the CI run that produced the shards, attached to the aggregated report.
///
/// Values are opaque strings. Empty strings are treated as absent.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReportMetadata {
    /// The URL of the repository.
    pub repo_url: Option<String>,

    /// The branch the tests ran on.
    pub branch_name: Option<String>,

    /// The commit the tests ran on.
    pub head_sha: Option<String>,

    /// The base commit, for pull requests.
    pub base_sha: Option<String>,

    /// The name of the workflow that ran the tests.
    pub github_workflow_name: Option<String>,

    /// The URL of the workflow run.
    pub github_workflow_run_url: Option<String>,
}

impl ReportMetadata {
    /// Returns `self` with empty and whitespace-only values replaced by `None`.
    pub fn normalized(self) -> Self {
        fn normalize(value: Option<String>) -> Option<String> {
            value.filter(|value| !value.trim().is_empty())
        }

        Self {
            repo_url: normalize(self.repo_url),
            branch_name: normalize(self.branch_name),
            head_sha: normalize(self.head_sha),
            base_sha: normalize(self.base_sha),
            github_workflow_name: normalize(self.github_workflow_name),
            github_workflow_run_url: normalize(self.github_workflow_run_url),
        }
    }

    fn apply(&self, report: &mut TestReport) {
        report.repo_url.clone_from(&self.repo_url);
        report.branch_name.clone_from(&self.branch_name);
        report.head_sha.clone_from(&self.head_sha);
        report.base_sha.clone_from(&self.base_sha);
        report
            .github_workflow_name
            .clone_from(&self.github_workflow_name);
        report
            .github_workflow_run_url
            .clone_from(&self.github_workflow_run_url);
    }
}

/// The result of an aggregation run: the report, and diagnostics about how it was built.
#[derive(Debug)]
pub struct AggregateOutcome {
    /// The aggregated report.
    pub report: TestReport,

    /// The number of shards that contributed to the report.
    pub shards_read: usize,

    /// Shards that could not be read and were skipped.
    pub skipped: Vec<ShardReadError>,

    /// The number of shards dropped because their contents duplicated an earlier shard.
    pub deduplicated: usize,

    /// The number of tests that no CODEOWNERS rule matched. Always 0 without an ownership
    /// resolver.
    pub tests_without_owners: usize,
}

/// Builder for a [`ReportAggregator`].
pub struct AggregatorBuilder {
    metadata: ReportMetadata,
    report_id: Option<String>,
    classifier: Box<dyn TestClassifier + Send + Sync>,
    resolver: Option<Box<dyn OwnershipResolver + Send + Sync>>,
    repo_path: Utf8PathBuf,
    strict: bool,
    duplicate_shards: DuplicateShards,
    recursive: bool,
    threads: Option<NonZeroUsize>,
}

impl Default for AggregatorBuilder {
    fn default() -> Self {
        Self {
            metadata: ReportMetadata::default(),
            report_id: None,
            classifier: Box::new(MaxPassRatio::default()),
            resolver: None,
            repo_path: Utf8PathBuf::from("."),
            strict: false,
            duplicate_shards: DuplicateShards::default(),
            recursive: false,
            threads: None,
        }
    }
}

impl AggregatorBuilder {
    /// Creates a new builder with options taken from `config`.
    pub fn from_config(config: &FlakeguardConfig) -> Self {
        let mut builder = Self::default();
        builder
            .set_classifier(config.max_pass_ratio())
            .set_strict(config.strict())
            .set_duplicate_shards(config.duplicate_shards())
            .set_recursive(config.recursive())
            .set_threads(config.threads());
        builder
    }

    /// Sets the CI context attached to the report.
    pub fn set_metadata(&mut self, metadata: ReportMetadata) -> &mut Self {
        self.metadata = metadata.normalized();
        self
    }

    /// Sets the report ID. If unset or blank, an ID is generated.
    pub fn set_report_id(&mut self, report_id: Option<String>) -> &mut Self {
        self.report_id = report_id;
        self
    }

    /// Sets the predicate used to count flaky tests in the summary.
    pub fn set_classifier(
        &mut self,
        classifier: impl TestClassifier + Send + Sync + 'static,
    ) -> &mut Self {
        self.classifier = Box::new(classifier);
        self
    }

    /// Sets the resolver used to assign owners to tests.
    pub fn set_ownership_resolver(
        &mut self,
        resolver: impl OwnershipResolver + Send + Sync + 'static,
    ) -> &mut Self {
        self.resolver = Some(Box::new(resolver));
        self
    }

    /// Loads a CODEOWNERS file to assign owners to tests.
    ///
    /// Ownership is optional: if the file cannot be loaded, a warning is logged and tests are
    /// left without owners.
    pub fn load_codeowners(&mut self, path: &Utf8Path) -> &mut Self {
        match CodeOwners::from_path(path) {
            Ok(codeowners) => {
                debug!("loaded {} rules from {path}", codeowners.len());
                self.set_ownership_resolver(codeowners);
            }
            Err(error) => {
                warn!(
                    "continuing without code owners: {}",
                    DisplayErrorChain::new(&error)
                );
            }
        }
        self
    }

    /// Sets the repository root, used to make test paths relative for ownership lookups.
    pub fn set_repo_path(&mut self, repo_path: impl Into<Utf8PathBuf>) -> &mut Self {
        self.repo_path = repo_path.into();
        self
    }

    /// If true, a shard that cannot be read aborts aggregation.
    pub fn set_strict(&mut self, strict: bool) -> &mut Self {
        self.strict = strict;
        self
    }

    /// Sets what to do with shards whose contents are identical.
    pub fn set_duplicate_shards(&mut self, duplicate_shards: DuplicateShards) -> &mut Self {
        self.duplicate_shards = duplicate_shards;
        self
    }

    /// If true, shards are discovered in subdirectories of the input directory.
    pub fn set_recursive(&mut self, recursive: bool) -> &mut Self {
        self.recursive = recursive;
        self
    }

    /// Sets the number of threads used to read and fold shards. `None` means one per CPU.
    pub fn set_threads(&mut self, threads: Option<NonZeroUsize>) -> &mut Self {
        self.threads = threads;
        self
    }

    /// Creates the aggregator, resolving the report ID.
    pub fn build(self) -> ReportAggregator {
        let report_id = resolve_report_id(self.report_id.as_deref(), &self.metadata);
        debug!("using report ID {report_id}");

        ReportAggregator {
            metadata: self.metadata,
            report_id,
            classifier: self.classifier,
            resolver: self.resolver,
            repo_path: self.repo_path,
            strict: self.strict,
            duplicate_shards: self.duplicate_shards,
            recursive: self.recursive,
            threads: self.threads,
        }
    }
}

/// Aggregates shard reports into a single report.
pub struct ReportAggregator {
    metadata: ReportMetadata,
    report_id: String,
    classifier: Box<dyn TestClassifier + Send + Sync>,
    resolver: Option<Box<dyn OwnershipResolver + Send + Sync>>,
    repo_path: Utf8PathBuf,
    strict: bool,
    duplicate_shards: DuplicateShards,
    recursive: bool,
    threads: Option<NonZeroUsize>,
}

impl ReportAggregator {
    /// The ID attached to reports produced by this aggregator.
    pub fn report_id(&self) -> &str {
        &self.report_id
    }

    /// Reads every shard in `input_dir` and aggregates them.
    pub fn aggregate(&self, input_dir: &Utf8Path) -> Result<AggregateOutcome, AggregateError> {
        let paths = discover_shards(input_dir, self.recursive)?;
        if paths.is_empty() {
            return Err(AggregateError::NoInputReports {
                input_dir: input_dir.to_owned(),
            });
        }
        debug!("found {} shards in {input_dir}", paths.len());

        let pool = self.thread_pool()?;
        let read: Vec<_> = pool.install(|| paths.par_iter().map(|path| read_shard(path)).collect());

        let mut shards = Vec::with_capacity(read.len());
        let mut skipped = Vec::new();
        for result in read {
            match result {
                Ok(shard) => shards.push(shard),
                Err(error) if self.strict => return Err(error.into()),
                Err(error) => {
                    warn!("skipping shard: {}", DisplayErrorChain::new(&error));
                    skipped.push(error);
                }
            }
        }

        if shards.is_empty() {
            return Err(AggregateError::NoValidInputReports {
                input_dir: input_dir.to_owned(),
                skipped: skipped.len(),
            });
        }

        let mut outcome = self.aggregate_in(&pool, shards);
        outcome.skipped = skipped;
        Ok(outcome)
    }

    /// Aggregates shards that have already been read.
    ///
    /// The order of `shards` does not matter.
    pub fn aggregate_shards(
        &self,
        shards: Vec<ShardReport>,
    ) -> Result<AggregateOutcome, AggregateError> {
        let pool = self.thread_pool()?;
        Ok(self.aggregate_in(&pool, shards))
    }

    fn thread_pool(&self) -> Result<rayon::ThreadPool, AggregateError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads.map_or(0, NonZeroUsize::get))
            .thread_name(|index| format!("flakeguard-shard-{index}"))
            .build()?;
        Ok(pool)
    }

    fn aggregate_in(
        &self,
        pool: &rayon::ThreadPool,
        mut shards: Vec<ShardReport>,
    ) -> AggregateOutcome {
        shards.sort_by(|a, b| a.path().cmp(b.path()));

        let mut deduplicated = 0;
        if self.duplicate_shards == DuplicateShards::Deduplicate {
            let mut seen: HashMap<u64, Utf8PathBuf> = HashMap::new();
            shards.retain(|shard| match seen.get(&shard.content_hash()) {
                Some(first) => {
                    info!(
                        "skipping shard {} (same contents as {first})",
                        shard.path()
                    );
                    deduplicated += 1;
                    false
                }
                None => {
                    seen.insert(shard.content_hash(), shard.path().to_owned());
                    true
                }
            });
        }
        let shards_read = shards.len();

        // Contiguous chunks, one per worker, so that merging partial reports in chunk order is
        // the same as folding every shard in path order.
        let chunk_size = shards_read.div_ceil(pool.current_num_threads()).max(1);
        let chunks: Vec<Vec<TestReport>> = shards
            .into_iter()
            .map(ShardReport::into_report)
            .chunks(chunk_size)
            .into_iter()
            .map(Iterator::collect)
            .collect();

        let partials: Vec<PartialReport> = pool.install(|| {
            chunks
                .into_par_iter()
                .map(PartialReport::from_reports)
                .collect()
        });
        let merged = partials
            .into_iter()
            .fold(PartialReport::default(), |mut acc, partial| {
                acc.merge(partial);
                acc
            });

        let mut report = merged.finish();
        report.summary_data = Some(compute_summary(&report.results, &*self.classifier));
        self.metadata.apply(&mut report);
        report.id.clone_from(&self.report_id);
        let tests_without_owners = self.assign_owners(&mut report);

        AggregateOutcome {
            report,
            shards_read,
            skipped: Vec::new(),
            deduplicated,
            tests_without_owners,
        }
    }

    fn assign_owners(&self, report: &mut TestReport) -> usize {
        let Some(resolver) = &self.resolver else {
            return 0;
        };

        let locator = TestLocator::new(self.repo_path.clone(), report.project.as_str());
        let mut without_owners = 0;
        for result in &mut report.results {
            let path = locator.locate(&result.test_package, result.test_path.as_deref());
            match resolver.resolve_owner(&path) {
                Some(owners) => result.code_owners = owners.to_vec(),
                None => {
                    result.code_owners.clear();
                    without_owners += 1;
                }
            }
        }
        without_owners
    }
}

/// Shards folded together by one worker.
#[derive(Debug, Default)]
struct PartialReport {
    projects: BTreeSet<String>,
    race_detection: bool,
    excluded_tests: BTreeSet<String>,
    selected_tests: BTreeSet<String>,
    results: BTreeMap<TestKey, TestResult>,
}

impl PartialReport {
    fn from_reports(reports: Vec<TestReport>) -> Self {
        let mut partial = Self::default();
        for report in reports {
            partial.add_report(report);
        }
        partial
    }

    fn add_report(&mut self, report: TestReport) {
        if !report.project.is_empty() {
            self.projects.insert(report.project);
        }
        self.race_detection |= report.race_detection;
        self.excluded_tests.extend(report.excluded_tests);
        self.selected_tests.extend(report.selected_tests);
        for result in report.results {
            self.add_result(result);
        }
    }

    fn add_result(&mut self, result: TestResult) {
        match self.results.get_mut(&result.key()) {
            Some(existing) => merge_result(existing, result),
            None => {
                self.results.insert(result.key(), result);
            }
        }
    }

    /// Merges `other`, which holds shards that sort after the ones in `self`.
    fn merge(&mut self, other: PartialReport) {
        self.projects.extend(other.projects);
        self.race_detection |= other.race_detection;
        self.excluded_tests.extend(other.excluded_tests);
        self.selected_tests.extend(other.selected_tests);
        for result in other.results.into_values() {
            self.add_result(result);
        }
    }

    fn finish(self) -> TestReport {
        let mut projects = self.projects.into_iter();
        let project = projects.next().unwrap_or_default();
        let others: Vec<_> = projects.collect();
        if !others.is_empty() {
            warn!(
                "shards disagree on the project name, using `{project}` (also seen: {})",
                others.iter().map(|p| format!("`{p}`")).join(", ")
            );
        }

        let results = self
            .results
            .into_values()
            .map(|mut result| {
                result.pass_ratio = pass_ratio(result.successes, result.runs);
                result
            })
            .collect();

        TestReport {
            project,
            race_detection: self.race_detection,
            excluded_tests: self.excluded_tests,
            selected_tests: self.selected_tests,
            results,
            ..Default::default()
        }
    }
}

/// Combines `other` into `existing`. Both results must be for the same test, and `other` must
/// come from a shard that sorts after the ones `existing` was built from.
fn merge_result(existing: &mut TestResult, other: TestResult) {
    for (field, count, other_count) in [
        ("runs", &mut existing.runs, other.runs),
        ("successes", &mut existing.successes, other.successes),
        ("failures", &mut existing.failures, other.failures),
        ("skips", &mut existing.skips, other.skips),
    ] {
        add_counter(&existing.test_package, &existing.test_name, field, count, other_count);
    }

    existing.package_panic |= other.package_panic;
    existing.panic |= other.panic;
    existing.timeout |= other.timeout;
    existing.race |= other.race;
    existing.skipped &= other.skipped;

    existing.test_path = match (existing.test_path.take(), other.test_path) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    };

    existing.durations.extend(other.durations);
    for (run_id, lines) in other.passed_outputs {
        existing.passed_outputs.entry(run_id).or_default().extend(lines);
    }
    for (run_id, lines) in other.failed_outputs {
        existing.failed_outputs.entry(run_id).or_default().extend(lines);
    }
    existing.package_outputs.extend(other.package_outputs);
}

/// Adds `other` to `count`, saturating on overflow. The result stays independent of merge order,
/// and `successes <= runs` still holds.
fn add_counter(package: &str, name: &str, field: &str, count: &mut usize, other: usize) {
    match count.checked_add(other) {
        Some(sum) => *count = sum,
        None => {
            warn!("{field} for test `{package}::{name}` overflowed, capping at {}", usize::MAX);
            *count = usize::MAX;
        }
    }
}

fn pass_ratio(successes: usize, runs: usize) -> f64 {
    if runs == 0 {
        1.0
    } else {
        successes as f64 / runs as f64
    }
}
