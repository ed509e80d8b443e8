// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::{Utf8Path, Utf8PathBuf};
use camino_tempfile::Utf8TempDir;
use flakeguard_metadata::{FlakeguardExitCode, TestReport};
use indoc::indoc;
use pretty_assertions::assert_eq;
use std::process::{Command, Output};

static SHARD_1: &str = indoc! {r#"
    {
        "project": "example.com/project",
        "results": [
            {
                "test_name": "TestBar",
                "test_package": "example.com/project/pkg/foo",
                "runs": 1,
                "successes": 1,
                "passed_outputs": { "1": ["ok"] }
            },
            {
                "test_name": "TestBaz",
                "test_package": "example.com/project/pkg/foo",
                "skipped": true,
                "runs": 0,
                "successes": 0,
                "skips": 1
            }
        ]
    }
"#};

static SHARD_2: &str = indoc! {r#"
    {
        "project": "example.com/project",
        "results": [
            {
                "test_name": "TestBar",
                "test_package": "example.com/project/pkg/foo",
                "runs": 1,
                "successes": 0,
                "failures": 1,
                "failed_outputs": { "2": ["--- FAIL: TestBar", "bar_test.go:12: boom"] }
            }
        ]
    }
"#};

static SHARD_3: &str = indoc! {r#"
    {
        "project": "example.com/project",
        "results": [
            {
                "test_name": "TestBar",
                "test_package": "example.com/project/pkg/foo",
                "runs": 1,
                "successes": 1
            }
        ]
    }
"#};

struct TempRepo {
    dir: Utf8TempDir,
}

impl TempRepo {
    fn new(shards: &[(&str, &str)]) -> Self {
        let dir = Utf8TempDir::new().expect("created temp dir");
        let results = dir.path().join("results");
        std::fs::create_dir(&results).expect("created results dir");
        for (name, contents) in shards {
            std::fs::write(results.join(name), contents).expect("wrote shard");
        }
        std::fs::write(dir.path().join("CODEOWNERS"), "/pkg/foo/ @org/foo-team\n")
            .expect("wrote CODEOWNERS");
        Self { dir }
    }

    fn root(&self) -> &Utf8Path {
        self.dir.path()
    }

    fn output_dir(&self) -> Utf8PathBuf {
        self.root().join("out/report")
    }

    fn run(&self, extra_args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_flakeguard"))
            .current_dir(self.root())
            .env_remove("FLAKEGUARD_LOG")
            .args(["--color", "never", "aggregate-results", "-p", "results", "-o"])
            .arg(self.output_dir())
            .args(["--repo-path", ".", "--codeowners-path", "CODEOWNERS"])
            .args(extra_args)
            .output()
            .expect("flakeguard ran")
    }

    fn read_report(&self, name: &str) -> TestReport {
        let contents = std::fs::read(self.output_dir().join(name)).expect("report exists");
        serde_json::from_slice(&contents).expect("report is valid JSON")
    }
}

#[test]
fn aggregate_flaky_test() {
    let repo = TempRepo::new(&[
        ("shard-1.json", SHARD_1),
        ("shard-2.json", SHARD_2),
        ("shard-3.json", SHARD_3),
    ]);

    let output = repo.run(&["--head-sha", "abc123", "--report-id", "report-1"]);
    assert_eq!(
        output.status.code(),
        Some(FlakeguardExitCode::OK),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("aggregation complete"),
        "completion is logged: {stderr}"
    );

    let all = repo.read_report("all-test-results.json");
    assert_eq!(all.id, "report-1");
    assert_eq!(all.head_sha.as_deref(), Some("abc123"));
    assert_eq!(all.results.len(), 2);
    let bar = &all.results[0];
    assert_eq!(bar.test_name, "TestBar");
    assert_eq!((bar.runs, bar.successes, bar.failures), (3, 2, 1));
    assert!((bar.pass_ratio - 2.0 / 3.0).abs() < 1e-9);
    assert!(!bar.has_logs(), "all-test-results.json has no logs");
    assert_eq!(bar.code_owners, vec!["@org/foo-team".to_owned()]);

    let summary = all.summary_data.expect("summary is present");
    assert_eq!(summary.flaky_tests, 1);
    assert_eq!(summary.unique_skipped_test_count, 1);

    let with_logs = repo.read_report("failed-test-results-with-logs.json");
    assert_eq!(with_logs.results.len(), 1);
    assert_eq!(
        with_logs.results[0].failed_outputs["2"],
        vec!["--- FAIL: TestBar", "bar_test.go:12: boom"]
    );
    assert_eq!(with_logs.id, "report-1");

    let without_logs = repo.read_report("failed-test-results.json");
    assert_eq!(without_logs.results.len(), 1);
    assert!(!without_logs.results[0].has_logs());
}

#[test]
fn no_failures_writes_only_all_results() {
    let repo = TempRepo::new(&[("shard-1.json", SHARD_1), ("shard-3.json", SHARD_3)]);

    let output = repo.run(&[]);
    assert_eq!(output.status.code(), Some(FlakeguardExitCode::OK));
    assert!(repo.output_dir().join("all-test-results.json").exists());
    assert!(!repo.output_dir().join("failed-test-results.json").exists());
    assert!(
        !repo
            .output_dir()
            .join("failed-test-results-with-logs.json")
            .exists()
    );
}

#[test]
fn no_input_reports() {
    let repo = TempRepo::new(&[]);

    let output = repo.run(&[]);
    assert_eq!(output.status.code(), Some(FlakeguardExitCode::INPUT_ERROR));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("no input reports found"), "stderr: {stderr}");
    assert!(!repo.output_dir().exists(), "no outputs are created");
}

#[test]
fn malformed_shard_is_skipped_unless_strict() {
    let repo = TempRepo::new(&[("shard-1.json", SHARD_1), ("shard-2.json", "{ oops")]);

    let output = repo.run(&[]);
    assert_eq!(output.status.code(), Some(FlakeguardExitCode::OK));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("skipping shard"), "stderr: {stderr}");

    let output = repo.run(&["--strict"]);
    assert_eq!(output.status.code(), Some(FlakeguardExitCode::INPUT_ERROR));
}

#[test]
fn invalid_config() {
    let repo = TempRepo::new(&[("shard-1.json", SHARD_1)]);
    std::fs::create_dir(repo.root().join(".config")).unwrap();
    std::fs::write(
        repo.root().join(".config/flakeguard.toml"),
        "max-pass-ratio = 2.0\n",
    )
    .unwrap();

    let output = repo.run(&[]);
    assert_eq!(output.status.code(), Some(FlakeguardExitCode::SETUP_ERROR));
}

#[test]
fn output_dir_cannot_be_created() {
    let repo = TempRepo::new(&[("shard-1.json", SHARD_1)]);
    std::fs::create_dir(repo.root().join("out")).unwrap();
    std::fs::write(repo.output_dir(), "not a directory").unwrap();

    let output = repo.run(&[]);
    assert_eq!(output.status.code(), Some(FlakeguardExitCode::SETUP_ERROR));
    assert!(repo.output_dir().is_file(), "existing file is untouched");
}
