// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Summary statistics for aggregated reports.

use crate::classify::TestClassifier;
use flakeguard_metadata::{SummaryData, TestResult};

/// Computes summary statistics over `results`.
///
/// `classifier` decides which results count towards
/// [`flaky_tests`](SummaryData::flaky_tests).
pub fn compute_summary<C>(results: &[TestResult], classifier: &C) -> SummaryData
where
    C: TestClassifier + ?Sized,
{
    let mut summary = SummaryData::default();

    for result in results {
        if result.runs > 0 {
            summary.unique_tests_run += 1;
        }
        if result.skipped {
            summary.unique_skipped_test_count += 1;
        }
        if result.panic || result.package_panic {
            summary.panicked_tests += 1;
        }
        if result.race {
            summary.raced_tests += 1;
        }
        if classifier.is_flaky(result) {
            summary.flaky_tests += 1;
        }

        summary.test_run_count = summary.test_run_count.max(result.runs);
        summary.total_runs = summary.total_runs.saturating_add(result.runs);
        summary.passed_runs = summary.passed_runs.saturating_add(result.successes);
        summary.failed_runs = summary.failed_runs.saturating_add(result.failures);
        summary.skipped_runs = summary.skipped_runs.saturating_add(result.skips);
    }

    summary.flaky_test_percent = percent(summary.flaky_tests, summary.unique_tests_run, 0.0);
    summary.pass_percent = percent(summary.passed_runs, summary.total_runs, 100.0);
    summary
}

fn percent(numerator: usize, denominator: usize, if_empty: f64) -> f64 {
    if denominator == 0 {
        if_empty
    } else {
        numerator as f64 / denominator as f64 * 100.0
    }
}
