// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Classification of failed and flaky tests.

use crate::errors::MaxPassRatioParseError;
use flakeguard_metadata::TestResult;
use serde::Deserialize;
use std::{fmt, str::FromStr};

/// Decides whether a test result belongs in the failed/flaky report.
///
/// Implemented by [`MaxPassRatio`], and by any `Fn(&TestResult) -> bool`.
pub trait TestClassifier {
    /// Returns true if `result` should be reported.
    fn is_flaky(&self, result: &TestResult) -> bool;
}

impl<F> TestClassifier for F
where
    F: Fn(&TestResult) -> bool,
{
    fn is_flaky(&self, result: &TestResult) -> bool {
        self(result)
    }
}

/// Returns the results selected by `classifier`, in their original order.
///
/// `results` is not modified.
pub fn filter_tests<C>(results: &[TestResult], classifier: &C) -> Vec<TestResult>
where
    C: TestClassifier + ?Sized,
{
    results
        .iter()
        .filter(|result| classifier.is_flaky(result))
        .cloned()
        .collect()
}

/// The pass ratio below which a test that was not skipped is considered failed or flaky.
///
/// Always in `[0.0, 1.0]`. The default, 1.0, selects every test with at least one recorded
/// failure.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Deserialize)]
#[serde(try_from = "f64")]
pub struct MaxPassRatio(f64);

impl MaxPassRatio {
    /// Selects any test with at least one failure.
    pub const ANY_FAILURE: Self = Self(1.0);

    /// Creates a new threshold, checking that it is within `[0.0, 1.0]`.
    pub fn new(ratio: f64) -> Result<Self, MaxPassRatioParseError> {
        if ratio.is_nan() {
            Err(MaxPassRatioParseError::new(ratio.to_string(), "not a number"))
        } else if !(0.0..=1.0).contains(&ratio) {
            Err(MaxPassRatioParseError::new(
                ratio.to_string(),
                "must be between 0 and 1",
            ))
        } else {
            Ok(Self(ratio))
        }
    }

    /// Returns the threshold as a float.
    pub fn get(self) -> f64 {
        self.0
    }
}

impl Default for MaxPassRatio {
    fn default() -> Self {
        Self::ANY_FAILURE
    }
}

impl TestClassifier for MaxPassRatio {
    fn is_flaky(&self, result: &TestResult) -> bool {
        !result.skipped && result.pass_ratio < self.0
    }
}

impl TryFrom<f64> for MaxPassRatio {
    type Error = MaxPassRatioParseError;

    fn try_from(ratio: f64) -> Result<Self, Self::Error> {
        Self::new(ratio)
    }
}

impl FromStr for MaxPassRatio {
    type Err = MaxPassRatioParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let ratio: f64 = input
            .trim()
            .parse()
            .map_err(|_| MaxPassRatioParseError::new(input, "not a number"))?;
        Self::new(ratio).map_err(|_| MaxPassRatioParseError::new(input, "must be between 0 and 1"))
    }
}

impl fmt::Display for MaxPassRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{arb_result, result};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use test_case::test_case;
    use test_strategy::proptest;

    #[test_case(1.0, false, 1.0, false ; "all passed")]
    #[test_case(2.0 / 3.0, false, 1.0, true ; "one failure at default threshold")]
    #[test_case(2.0 / 3.0, true, 1.0, false ; "skipped")]
    #[test_case(0.5, false, 0.5, false ; "equal to threshold")]
    #[test_case(0.4, false, 0.5, true ; "below threshold")]
    #[test_case(0.0, false, 0.0, false ; "zero threshold selects nothing")]
    #[test_case(0.0, false, 0.01, true ; "failed every run")]
    fn max_pass_ratio(pass_ratio: f64, skipped: bool, threshold: f64, expected: bool) {
        let mut result = result("pkg", "TestA");
        result.pass_ratio = pass_ratio;
        result.skipped = skipped;

        let threshold = MaxPassRatio::new(threshold).expect("threshold is valid");
        assert_eq!(threshold.is_flaky(&result), expected);
    }

    #[test_case("1" , Some(1.0) ; "one")]
    #[test_case(" 0.95 " , Some(0.95) ; "whitespace")]
    #[test_case("0" , Some(0.0) ; "zero")]
    #[test_case("1.5" , None ; "above one")]
    #[test_case("-0.1" , None ; "negative")]
    #[test_case("NaN" , None ; "nan")]
    #[test_case("high" , None ; "not a number")]
    fn parse_max_pass_ratio(input: &str, expected: Option<f64>) {
        let actual = input.parse::<MaxPassRatio>().ok().map(MaxPassRatio::get);
        assert_eq!(actual, expected);
    }

    #[test]
    fn skipped_test_with_no_runs_never_selected() {
        let mut baz = result("pkg", "TestBaz");
        baz.skipped = true;
        baz.skips = 1;
        baz.pass_ratio = 1.0;

        for threshold in [0.0, 0.5, 1.0] {
            let threshold = MaxPassRatio::new(threshold).expect("threshold is valid");
            assert!(filter_tests(std::slice::from_ref(&baz), &threshold).is_empty());
        }
    }

    #[test]
    fn closure_classifier() {
        let mut timed_out = result("pkg", "TestSlow");
        timed_out.timeout = true;
        let results = vec![result("pkg", "TestA"), timed_out.clone()];

        let filtered = filter_tests(&results, &|result: &TestResult| result.timeout);
        assert_eq!(filtered, vec![timed_out]);
    }

    #[proptest]
    fn filter_selects_exactly_matching_results(
        #[strategy(proptest::collection::vec(arb_result(), 0..16))] results: Vec<TestResult>,
        #[strategy(0.0..=1.0f64)] threshold: f64,
    ) {
        let threshold = MaxPassRatio::new(threshold).expect("threshold is in range");
        let before = results.clone();
        let filtered = filter_tests(&results, &threshold);

        prop_assert_eq!(&results, &before, "input is not modified");

        let expected: Vec<_> = results
            .iter()
            .filter(|r| !r.skipped && r.pass_ratio < threshold.get())
            .cloned()
            .collect();
        prop_assert_eq!(filtered, expected);
    }
}
