// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Structured access to flakeguard test reports.
//!
//! Parallel test jobs each write a *shard*: a partial [`TestReport`] in JSON form. flakeguard folds
//! shards together into a single report and derives a report of failed and flaky tests from it.
//! This crate contains the serializable data model shared by all of those files, along with the
//! documented exit codes for the `flakeguard` binary.

mod exit_codes;
mod report;

pub use exit_codes::*;
pub use report::*;
