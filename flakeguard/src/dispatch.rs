// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    disk_usage,
    errors::{ExpectedError, Result},
    output::{OutputContext, OutputOpts, clap_styles},
};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser, Subcommand};
use flakeguard_metadata::FlakeguardExitCode;
use flakeguard_reports::{
    aggregate::{AggregatorBuilder, DuplicateShards, ReportMetadata},
    classify::{MaxPassRatio, filter_tests},
    config::FlakeguardConfig,
    errors::DisplayErrorChain,
    materialize::write_artifacts,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Finds flaky tests in sharded test reports.
#[derive(Debug, Parser)]
#[command(version, styles = clap_styles::style())]
pub struct FlakeguardApp {
    #[clap(flatten)]
    output: OutputOpts,

    #[clap(subcommand)]
    command: Command,
}

impl FlakeguardApp {
    /// Initializes logging and returns the output context.
    pub fn init_output(&self) -> OutputContext {
        self.output.init()
    }

    /// Executes the app, returning the exit code.
    pub fn exec(self, output: OutputContext) -> Result<i32> {
        match self.command {
            Command::AggregateResults(opts) => opts.exec(output),
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Aggregate test results into a single JSON report
    ///
    /// Reads every `*.json` shard in the results directory, merges results for the same test,
    /// and writes `all-test-results.json` to the output directory. If any tests failed or are
    /// flaky, `failed-test-results-with-logs.json` and `failed-test-results.json` are written as
    /// well.
    AggregateResults(AggregateResultsOpts),
}

#[derive(Debug, Args)]
struct AggregateResultsOpts {
    /// Path to the directory containing JSON test result files
    #[arg(long, short = 'p', value_name = "DIR")]
    results_path: Utf8PathBuf,

    /// Directory to write the aggregated results to [default: ./report]
    #[arg(long, short = 'o', value_name = "DIR")]
    output_path: Option<Utf8PathBuf>,

    /// Tests with a pass ratio strictly below this are reported as failed or flaky [default: 1.0]
    #[arg(long, value_name = "RATIO")]
    max_pass_ratio: Option<MaxPassRatio>,

    /// Path to the CODEOWNERS file
    #[arg(long, value_name = "PATH")]
    codeowners_path: Option<Utf8PathBuf>,

    /// Path to the root of the repository
    #[arg(long, value_name = "DIR", default_value = ".")]
    repo_path: Utf8PathBuf,

    /// Config file [default: repo-path/.config/flakeguard.toml]
    #[arg(long, value_name = "PATH")]
    config_file: Option<Utf8PathBuf>,

    /// Identifier for the report, generated if not provided
    #[arg(long, value_name = "ID")]
    report_id: Option<String>,

    #[clap(flatten)]
    metadata: MetadataOpts,

    /// Abort if a shard cannot be read, rather than skipping it
    #[arg(long, help_heading = "Shard options")]
    strict: bool,

    /// Count shards with identical contents only once
    #[arg(long, help_heading = "Shard options")]
    dedupe_shards: bool,

    /// Look for shards in subdirectories of the results path
    #[arg(long, help_heading = "Shard options")]
    recursive: bool,
}

#[derive(Debug, Args)]
#[command(next_help_heading = "Report metadata")]
struct MetadataOpts {
    /// The repository URL
    #[arg(long, value_name = "URL")]
    repo_url: Option<String>,

    /// The branch the tests ran on
    #[arg(long, value_name = "NAME")]
    branch_name: Option<String>,

    /// The head commit SHA
    #[arg(long, value_name = "SHA")]
    head_sha: Option<String>,

    /// The base commit SHA
    #[arg(long, value_name = "SHA")]
    base_sha: Option<String>,

    /// The GitHub workflow name
    #[arg(long, value_name = "NAME")]
    github_workflow_name: Option<String>,

    /// The GitHub workflow run URL
    #[arg(long, value_name = "URL")]
    github_workflow_run_url: Option<String>,
}

impl From<MetadataOpts> for ReportMetadata {
    fn from(opts: MetadataOpts) -> Self {
        Self {
            repo_url: opts.repo_url,
            branch_name: opts.branch_name,
            head_sha: opts.head_sha,
            base_sha: opts.base_sha,
            github_workflow_name: opts.github_workflow_name,
            github_workflow_run_url: opts.github_workflow_run_url,
        }
    }
}

impl AggregateResultsOpts {
    fn exec(self, output: OutputContext) -> Result<i32> {
        let config = FlakeguardConfig::from_sources(&self.repo_path, self.config_file.as_deref())?;
        for key in config.unknown_keys() {
            warn!("ignoring unknown key `{key}` in {}", config.config_file());
        }

        let max_pass_ratio = self.max_pass_ratio.unwrap_or(config.max_pass_ratio());
        let output_dir = self
            .output_path
            .clone()
            .unwrap_or_else(|| config.output_path().to_owned());

        let initial_size = measure_dir(&self.results_path);

        let mut builder = AggregatorBuilder::from_config(&config);
        builder
            .set_classifier(max_pass_ratio)
            .set_metadata(self.metadata.into())
            .set_report_id(self.report_id)
            .set_repo_path(canonical_repo_path(&self.repo_path));
        if self.strict {
            builder.set_strict(true);
        }
        if self.dedupe_shards {
            builder.set_duplicate_shards(DuplicateShards::Deduplicate);
        }
        if self.recursive {
            builder.set_recursive(true);
        }
        if let Some(codeowners_path) = &self.codeowners_path {
            builder.load_codeowners(codeowners_path);
        }
        let aggregator = builder.build();

        let spinner = spinner(output, "Aggregating test reports...");
        let outcome = aggregator.aggregate(&self.results_path);
        spinner.finish_and_clear();
        let outcome =
            outcome.map_err(|err| ExpectedError::aggregate_error(&self.results_path, err))?;
        debug!(
            "aggregated {} shards into {} tests",
            outcome.shards_read,
            outcome.report.results.len()
        );

        if !outcome.skipped.is_empty() {
            warn!(
                "skipped {} unreadable {}",
                outcome.skipped.len(),
                plural_shards(outcome.skipped.len())
            );
        }
        if outcome.deduplicated > 0 {
            info!(
                "ignored {} duplicate {}",
                outcome.deduplicated,
                plural_shards(outcome.deduplicated)
            );
        }
        if outcome.tests_without_owners > 0 {
            warn!(
                "{} {} no code owners",
                outcome.tests_without_owners,
                if outcome.tests_without_owners == 1 {
                    "test has"
                } else {
                    "tests have"
                }
            );
        }

        let failed = filter_tests(&outcome.report.results, &max_pass_ratio);
        if failed.is_empty() {
            debug!("no failed tests found, skipping failed test reports");
        } else {
            info!("found {} failed tests", failed.len());
        }

        let artifacts = write_artifacts(&output_dir, &outcome.report, &failed)
            .map_err(|err| ExpectedError::write_artifacts_error(&output_dir, err))?;
        for path in [
            artifacts.failed_results_with_logs.as_deref(),
            artifacts.failed_results.as_deref(),
        ]
        .into_iter()
        .flatten()
        {
            debug!("failed tests report saved to {path}");
        }

        let final_size = measure_dir(&self.results_path);
        let disk_space_used = match (initial_size, final_size) {
            (Some(initial), Some(last)) => disk_usage::display_growth(initial, last),
            _ => "unknown".to_owned(),
        };
        info!(
            "aggregation complete: report written to {} (disk space used: {disk_space_used})",
            artifacts.all_results,
        );

        Ok(FlakeguardExitCode::OK)
    }
}

fn measure_dir(path: &Utf8Path) -> Option<u64> {
    match disk_usage::dir_size(path) {
        Ok(size) => Some(size),
        Err(error) => {
            // Not fatal: this is only used for reporting.
            warn!(
                "error getting size of {path}: {}",
                DisplayErrorChain::new(&error)
            );
            None
        }
    }
}

fn canonical_repo_path(repo_path: &Utf8Path) -> Utf8PathBuf {
    repo_path
        .canonicalize_utf8()
        .unwrap_or_else(|_| repo_path.to_owned())
}

fn spinner(output: OutputContext, message: &'static str) -> ProgressBar {
    // Verbose output would interleave with the spinner.
    if output.verbose {
        return ProgressBar::hidden();
    }
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner} {msg}")
            .expect("template is known to be valid"),
    );
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

fn plural_shards(count: usize) -> &'static str {
    if count == 1 { "shard" } else { "shards" }
}
