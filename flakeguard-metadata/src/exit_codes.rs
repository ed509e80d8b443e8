// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Documented exit codes for `flakeguard` failures.
///
/// `flakeguard` invocations may fail for a variety of reasons. This structure documents the exit
/// codes that may occur in case of expected failures.
///
/// Unknown/unexpected failures will always result in exit code 1.
pub enum FlakeguardExitCode {}

impl FlakeguardExitCode {
    /// No errors occurred and flakeguard exited normally.
    ///
    /// This is also the exit code if failed or flaky tests were found: reporting them is the
    /// purpose of the run, not an error.
    pub const OK: i32 = 0;

    /// A user issue happened while setting up a flakeguard invocation, for example an invalid
    /// config file.
    pub const SETUP_ERROR: i32 = 96;

    /// The input reports could not be read: the input directory is missing, contains no shards, or
    /// a shard failed to parse in strict mode.
    pub const INPUT_ERROR: i32 = 97;

    /// Writing an output artifact produced an error.
    pub const WRITE_OUTPUT_ERROR: i32 = 110;
}
