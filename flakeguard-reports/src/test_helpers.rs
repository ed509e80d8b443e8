// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::shard::ShardReport;
use camino::Utf8PathBuf;
use flakeguard_metadata::{TestReport, TestResult};
use proptest::prelude::*;
use std::{collections::BTreeMap, time::Duration};

/// Returns a result with no runs and a pass ratio of 1.0.
pub(crate) fn result(test_package: &str, test_name: &str) -> TestResult {
    TestResult {
        test_name: test_name.to_owned(),
        test_package: test_package.to_owned(),
        pass_ratio: 1.0,
        ..Default::default()
    }
}

/// Returns a result with a single run that passed or failed.
pub(crate) fn single_run(test_package: &str, test_name: &str, run_id: &str, passed: bool) -> TestResult {
    let mut result = result(test_package, test_name);
    result.runs = 1;
    let line = format!("{test_name} in run {run_id}");
    if passed {
        result.successes = 1;
        result.passed_outputs.insert(run_id.to_owned(), vec![line]);
    } else {
        result.failures = 1;
        result.pass_ratio = 0.0;
        result.failed_outputs.insert(run_id.to_owned(), vec![line]);
    }
    result
}

/// Wraps results in a shard with the given file name.
pub(crate) fn shard(file_name: &str, results: Vec<TestResult>) -> ShardReport {
    ShardReport::new(
        Utf8PathBuf::from(format!("shards/{file_name}")),
        TestReport {
            project: "example.com/project".to_owned(),
            results,
            ..Default::default()
        },
    )
}

/// A result for one of a small pool of tests, so that generated shards overlap.
pub(crate) fn arb_result() -> impl Strategy<Value = TestResult> {
    (
        prop::sample::select(vec!["pkg/a", "pkg/b"]),
        prop::sample::select(vec!["TestOne", "TestTwo", "TestThree"]),
        0usize..5,
        any::<bool>(),
        any::<bool>(),
        any::<bool>(),
        prop::collection::vec("[a-z]{1,8}", 0..3),
        0u64..1_000,
    )
        .prop_flat_map(
            |(package, name, runs, skipped, panic, race, lines, nanos)| {
                (0..=runs).prop_map(move |successes| {
                    let failures = runs - successes;
                    let mut result = result(package, name);
                    result.runs = runs;
                    result.successes = successes;
                    result.failures = failures;
                    result.skipped = skipped;
                    result.skips = usize::from(skipped);
                    result.panic = panic;
                    result.race = race;
                    result.pass_ratio = if runs == 0 {
                        1.0
                    } else {
                        successes as f64 / runs as f64
                    };
                    result.durations = vec![Duration::from_nanos(nanos); runs];
                    if failures > 0 {
                        result
                            .failed_outputs
                            .insert(format!("run-{nanos}"), lines.clone());
                    } else if !lines.is_empty() {
                        result.package_outputs = lines.clone();
                    }
                    result
                })
            },
        )
}

/// A shard report's contents, with at most one result per test.
pub(crate) fn arb_report() -> impl Strategy<Value = TestReport> {
    (
        prop::collection::vec(arb_result(), 0..6),
        any::<bool>(),
        prop::collection::btree_set("Test[A-C]", 0..2),
    )
        .prop_map(|(results, race_detection, excluded_tests)| {
            // Keep the last result for each key so each shard is internally unique.
            let results: BTreeMap<_, _> = results.into_iter().map(|r| (r.key(), r)).collect();
            TestReport {
                project: "example.com/project".to_owned(),
                race_detection,
                excluded_tests,
                results: results.into_values().collect(),
                ..Default::default()
            }
        })
}

/// A list of shards with distinct paths, along with a shuffled copy of the same list.
pub(crate) fn arb_shards_with_shuffle() -> impl Strategy<Value = (Vec<ShardReport>, Vec<ShardReport>)> {
    prop::collection::vec(arb_report(), 1..6).prop_flat_map(|reports| {
        let shards: Vec<_> = reports
            .into_iter()
            .enumerate()
            .map(|(index, report)| {
                ShardReport::new(Utf8PathBuf::from(format!("shards/shard-{index:02}.json")), report)
            })
            .collect();
        (Just(shards.clone()), Just(shards).prop_shuffle())
    })
}
