// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core logic for flakeguard: reading test report shards, aggregating them into a single report,
//! picking out failed and flaky tests, and writing the results to disk.
//!
//! The usual flow is:
//!
//! 1. Load a [`FlakeguardConfig`](config::FlakeguardConfig).
//! 2. Build a [`ReportAggregator`](aggregate::ReportAggregator) and call
//!    [`aggregate`](aggregate::ReportAggregator::aggregate) on a directory of shards.
//! 3. Select failed and flaky tests with [`filter_tests`](classify::filter_tests).
//! 4. Write everything out with [`write_artifacts`](materialize::write_artifacts).
//!
//! The serialized data model lives in the `flakeguard-metadata` crate.

pub mod aggregate;
pub mod classify;
pub mod codeowners;
pub mod config;
pub mod errors;
pub mod materialize;
pub mod report_id;
pub mod shard;
pub mod summary;
#[cfg(test)]
mod test_helpers;
