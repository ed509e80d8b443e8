// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test ownership, from CODEOWNERS files.
//!
//! The format follows GitHub's: each non-comment line is a pattern followed by zero or more
//! owners, and the last matching line wins. A line with a pattern but no owners removes ownership
//! for matching paths.

use crate::errors::CodeOwnersParseError;
use camino::{Utf8Path, Utf8PathBuf};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::fmt;

/// Looks up the owners of a path within the repository.
pub trait OwnershipResolver {
    /// Returns the owners of `path`, or `None` if nobody owns it.
    ///
    /// `path` is relative to the repository root, using `/` as the separator.
    fn resolve_owner(&self, path: &Utf8Path) -> Option<&[String]>;
}

/// A parsed CODEOWNERS file.
#[derive(Clone, Debug, Default)]
pub struct CodeOwners {
    rules: Vec<CodeOwnersRule>,
}

impl CodeOwners {
    /// Reads and parses the CODEOWNERS file at `path`.
    pub fn from_path(path: &Utf8Path) -> Result<Self, CodeOwnersParseError> {
        let contents =
            std::fs::read_to_string(path).map_err(|error| CodeOwnersParseError::Read {
                path: path.to_owned(),
                error,
            })?;
        Self::parse(path, &contents)
    }

    /// Parses CODEOWNERS contents. `path` is only used in error messages.
    pub fn parse(path: &Utf8Path, contents: &str) -> Result<Self, CodeOwnersParseError> {
        let mut rules = Vec::new();

        for (line_index, line) in contents.lines().enumerate() {
            let mut tokens = line
                .split_whitespace()
                .take_while(|token| !token.starts_with('#'));
            let Some(pattern) = tokens.next() else {
                continue;
            };
            let owners = tokens.map(str::to_owned).collect();

            let matcher = compile_pattern(pattern).map_err(|error| {
                CodeOwnersParseError::InvalidPattern {
                    path: path.to_owned(),
                    line: line_index + 1,
                    pattern: pattern.to_owned(),
                    error,
                }
            })?;

            rules.push(CodeOwnersRule {
                pattern: pattern.to_owned(),
                matcher,
                owners,
            });
        }

        Ok(Self { rules })
    }

    /// Returns the number of rules in this file.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns true if this file has no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl OwnershipResolver for CodeOwners {
    fn resolve_owner(&self, path: &Utf8Path) -> Option<&[String]> {
        let path = path.as_str().trim_start_matches("./").trim_start_matches('/');
        let rule = self
            .rules
            .iter()
            .rev()
            .find(|rule| rule.matcher.is_match(path))?;
        if rule.owners.is_empty() {
            None
        } else {
            Some(&rule.owners)
        }
    }
}

#[derive(Clone)]
struct CodeOwnersRule {
    pattern: String,
    matcher: GlobSet,
    owners: Vec<String>,
}

impl fmt::Debug for CodeOwnersRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodeOwnersRule")
            .field("pattern", &self.pattern)
            .field("owners", &self.owners)
            .finish_non_exhaustive()
    }
}

/// Converts a CODEOWNERS pattern into a set of globs over repository-relative paths.
///
/// * A pattern containing a `/` other than at the end is anchored at the repository root;
///   otherwise it matches at any depth.
/// * A trailing `/` is ignored. Directories are looked up by their own path, so a pattern naming a
///   directory matches both the directory and everything under it.
/// * Unless the pattern ends in `/*` or `**`, everything under a matching directory also matches.
fn compile_pattern(pattern: &str) -> Result<GlobSet, globset::Error> {
    let trimmed = pattern.trim_end_matches('/');
    let anchored = trimmed.contains('/');
    let trimmed = trimmed.trim_start_matches('/');

    let base = if anchored || trimmed.starts_with("**") {
        trimmed.to_owned()
    } else {
        format!("**/{trimmed}")
    };

    let mut globs = vec![base.clone()];
    if !base.ends_with("/*") && !base.ends_with("**") {
        globs.push(format!("{base}/**"));
    }

    let mut builder = GlobSetBuilder::new();
    for glob in globs {
        builder.add(GlobBuilder::new(&glob).literal_separator(true).build()?);
    }
    builder.build()
}

/// Maps test results to the repository-relative paths used for ownership lookups.
#[derive(Clone, Debug)]
pub struct TestLocator {
    repo_path: Utf8PathBuf,
    project: String,
}

impl TestLocator {
    /// Creates a new locator for the repository at `repo_path`, containing `project`.
    pub fn new(repo_path: impl Into<Utf8PathBuf>, project: impl Into<String>) -> Self {
        Self {
            repo_path: repo_path.into(),
            project: project.into(),
        }
    }

    /// Returns the path to look up owners for.
    ///
    /// This is `test_path` relative to the repository if it is known, and otherwise the package
    /// directory: the package with the project prefix removed.
    pub fn locate(&self, test_package: &str, test_path: Option<&str>) -> Utf8PathBuf {
        if let Some(test_path) = test_path {
            let test_path = Utf8Path::new(test_path);
            let relative = test_path.strip_prefix(&self.repo_path).unwrap_or(test_path);
            return relative.to_owned();
        }

        // Only strip whole path components: `example.com/projectx` is not under
        // `example.com/project`.
        let package = test_package
            .strip_prefix(self.project.as_str())
            .filter(|rest| rest.is_empty() || rest.starts_with('/'))
            .unwrap_or(test_package);
        Utf8PathBuf::from(package.trim_start_matches('/'))
    }
}
