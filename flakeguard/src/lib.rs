// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Finds flaky tests in sharded test reports.
//!
//! This crate contains the `flakeguard` binary. The aggregation logic lives in
//! `flakeguard-reports`, and the report format in `flakeguard-metadata`.

#![warn(missing_docs)]

mod disk_usage;
mod dispatch;
mod errors;
mod output;

#[doc(hidden)]
pub use dispatch::*;
#[doc(hidden)]
pub use errors::*;
#[doc(hidden)]
pub use output::{OutputContext, StderrStyles};
