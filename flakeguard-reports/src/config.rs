// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered configuration for aggregation runs.
//!
//! Sources, from lowest to highest priority:
//!
//! 1. The default config embedded in this crate.
//! 2. `.config/flakeguard.toml` under the repository root, or a file passed in explicitly.
//! 3. `FLAKEGUARD_*` environment variables, for example `FLAKEGUARD_MAX_PASS_RATIO=0.9`.
//!
//! Command-line flags are applied on top of this by the caller.

use crate::{
    aggregate::DuplicateShards,
    classify::MaxPassRatio,
    errors::{ConfigParseError, ConfigParseErrorKind},
};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, ConfigBuilder, File, FileFormat, builder::DefaultState};
use serde::Deserialize;
use std::{collections::BTreeSet, num::NonZeroUsize};

/// Flakeguard configuration, after all sources have been merged.
#[derive(Clone, Debug)]
pub struct FlakeguardConfig {
    config_file: Utf8PathBuf,
    max_pass_ratio: MaxPassRatio,
    strict: bool,
    duplicate_shards: DuplicateShards,
    recursive: bool,
    threads: Option<NonZeroUsize>,
    output_path: Utf8PathBuf,
    unknown_keys: BTreeSet<String>,
}

impl FlakeguardConfig {
    /// The default location of the config within the repository root.
    pub const CONFIG_PATH: &'static str = ".config/flakeguard.toml";

    /// Contains the default config as a TOML file.
    ///
    /// Repository-specific configuration is layered on top of the default config.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../default-config.toml");

    /// Environment variables with this prefix override config keys.
    pub const ENVIRONMENT_PREFIX: &'static str = "FLAKEGUARD_";

    const KEYS: [&'static str; 6] = [
        "max-pass-ratio",
        "strict",
        "duplicate-shards",
        "recursive",
        "threads",
        "output-path",
    ];

    /// Reads the config from the repository at `repo_root`, or from `config_file` if given, and
    /// from the environment.
    ///
    /// A missing file at the default location is not an error. A missing `config_file` is.
    pub fn from_sources(
        repo_root: &Utf8Path,
        config_file: Option<&Utf8Path>,
    ) -> Result<Self, ConfigParseError> {
        Self::from_sources_impl(repo_root, config_file, |name| std::env::var(name).ok())
    }

    fn from_sources_impl(
        repo_root: &Utf8Path,
        config_file: Option<&Utf8Path>,
        env_var: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigParseError> {
        let (config_file, source) = match config_file {
            Some(file) => (file.to_owned(), File::new(file.as_str(), FileFormat::Toml)),
            None => {
                let config_file = repo_root.join(Self::CONFIG_PATH);
                let source = File::new(config_file.as_str(), FileFormat::Toml).required(false);
                (config_file, source)
            }
        };

        let mut builder = Self::make_default_config().add_source(source);
        for key in Self::KEYS {
            let var = Self::env_var_name(key);
            builder = builder
                .set_override_option(key, env_var(&var))
                .map_err(|error| {
                    ConfigParseError::new(
                        &config_file,
                        ConfigParseErrorKind::BuildError(Box::new(error)),
                    )
                })?;
        }

        let (deserialized, unknown_keys) = Self::build_and_deserialize_config(&builder)
            .map_err(|kind| ConfigParseError::new(&config_file, kind))?;
        Ok(Self::from_deserialized(config_file, deserialized, unknown_keys))
    }

    /// Returns the default config, without reading any files or the environment.
    pub fn default_config() -> Self {
        let config = Self::make_default_config()
            .build()
            .expect("default config is always valid");
        let deserialized: FlakeguardConfigDeserialize =
            serde_path_to_error::deserialize(config).expect("default config is always valid");
        Self::from_deserialized(
            Utf8PathBuf::from(Self::CONFIG_PATH),
            deserialized,
            BTreeSet::new(),
        )
    }

    /// The config file that was read, or would have been read if it existed.
    pub fn config_file(&self) -> &Utf8Path {
        &self.config_file
    }

    /// The flaky test threshold.
    pub fn max_pass_ratio(&self) -> MaxPassRatio {
        self.max_pass_ratio
    }

    /// Whether a malformed shard aborts aggregation.
    pub fn strict(&self) -> bool {
        self.strict
    }

    /// What to do with shards whose contents are identical.
    pub fn duplicate_shards(&self) -> DuplicateShards {
        self.duplicate_shards
    }

    /// Whether shards are discovered in subdirectories of the input directory.
    pub fn recursive(&self) -> bool {
        self.recursive
    }

    /// The number of threads used to read shards, if configured.
    pub fn threads(&self) -> Option<NonZeroUsize> {
        self.threads
    }

    /// The directory reports are written to.
    pub fn output_path(&self) -> &Utf8Path {
        &self.output_path
    }

    /// Keys in the config that were not recognized, as dotted paths.
    pub fn unknown_keys(&self) -> &BTreeSet<String> {
        &self.unknown_keys
    }

    fn env_var_name(key: &str) -> String {
        format!(
            "{}{}",
            Self::ENVIRONMENT_PREFIX,
            key.to_ascii_uppercase().replace('-', "_")
        )
    }

    fn make_default_config() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }

    fn build_and_deserialize_config(
        builder: &ConfigBuilder<DefaultState>,
    ) -> Result<(FlakeguardConfigDeserialize, BTreeSet<String>), ConfigParseErrorKind> {
        let config = builder
            .build_cloned()
            .map_err(|error| ConfigParseErrorKind::BuildError(Box::new(error)))?;

        let mut ignored = BTreeSet::new();
        let mut cb = |path: serde_ignored::Path| {
            ignored.insert(path.to_string());
        };
        let ignored_de = serde_ignored::Deserializer::new(config, &mut cb);
        let config: FlakeguardConfigDeserialize = serde_path_to_error::deserialize(ignored_de)
            .map_err(|error| ConfigParseErrorKind::DeserializeError(Box::new(error)))?;

        Ok((config, ignored))
    }

    fn from_deserialized(
        config_file: Utf8PathBuf,
        deserialized: FlakeguardConfigDeserialize,
        unknown_keys: BTreeSet<String>,
    ) -> Self {
        Self {
            config_file,
            max_pass_ratio: deserialized.max_pass_ratio,
            strict: deserialized.strict,
            duplicate_shards: deserialized.duplicate_shards,
            recursive: deserialized.recursive,
            threads: deserialized.threads,
            output_path: deserialized.output_path,
            unknown_keys,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct FlakeguardConfigDeserialize {
    max_pass_ratio: MaxPassRatio,
    strict: bool,
    duplicate_shards: DuplicateShards,
    recursive: bool,
    #[serde(default)]
    threads: Option<NonZeroUsize>,
    output_path: Utf8PathBuf,
}
