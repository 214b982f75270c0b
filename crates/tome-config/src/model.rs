// SPDX-FileCopyrightText: 2026 Tome Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tome_core::LibVersion;

/// Top-level Tome configuration. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TomeConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Registry database settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Catalog, download, and validation settings.
    #[serde(default)]
    pub extensions: ExtensionsConfig,

    /// WASM sandbox limits.
    #[serde(default)]
    pub sandbox: SandboxConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Registry database configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|p| p.join("tome"))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn default_database_path() -> String {
    data_dir().join("tome.db").to_string_lossy().into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// Extension catalog and installer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ExtensionsConfig {
    /// Directory holding transcoded modules and the icon cache.
    #[serde(default = "default_extensions_root")]
    pub root: String,

    /// Catalog repository base URLs.
    #[serde(default)]
    pub repositories: Vec<String>,

    /// Minimum seconds between two unforced catalog refreshes.
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,

    /// Timeout applied to each catalog, artifact, and icon download.
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,

    /// Feature an artifact manifest must declare to be accepted.
    #[serde(default = "default_feature_marker")]
    pub feature_marker: String,

    /// Lowest accepted plugin library version (`major.minor`).
    #[serde(default = "default_lib_version_min")]
    pub lib_version_min: String,

    /// Highest accepted plugin library version (`major.minor`).
    #[serde(default = "default_lib_version_max")]
    pub lib_version_max: String,

    /// Hex-encoded Ed25519 public keys allowed to sign artifacts.
    #[serde(default)]
    pub trusted_keys: Vec<String>,

    /// Upper bound on the size of a downloaded or unpacked artifact.
    #[serde(default = "default_max_artifact_bytes")]
    pub max_artifact_bytes: u64,
}

impl Default for ExtensionsConfig {
    fn default() -> Self {
        Self {
            root: default_extensions_root(),
            repositories: Vec::new(),
            refresh_interval_secs: default_refresh_interval_secs(),
            download_timeout_secs: default_download_timeout_secs(),
            feature_marker: default_feature_marker(),
            lib_version_min: default_lib_version_min(),
            lib_version_max: default_lib_version_max(),
            trusted_keys: Vec::new(),
            max_artifact_bytes: default_max_artifact_bytes(),
        }
    }
}

impl ExtensionsConfig {
    /// Parsed `[lib_version_min, lib_version_max]`.
    pub fn lib_version_range(&self) -> Result<(LibVersion, LibVersion), String> {
        let min: LibVersion = self.lib_version_min.parse()?;
        let max: LibVersion = self.lib_version_max.parse()?;
        Ok((min, max))
    }
}

fn default_extensions_root() -> String {
    data_dir().join("extensions").to_string_lossy().into_owned()
}

fn default_refresh_interval_secs() -> u64 {
    60
}

fn default_download_timeout_secs() -> u64 {
    30
}

fn default_feature_marker() -> String {
    "tome.extension".to_string()
}

fn default_lib_version_min() -> String {
    "1.3".to_string()
}

fn default_lib_version_max() -> String {
    "1.5".to_string()
}

fn default_max_artifact_bytes() -> u64 {
    32 * 1024 * 1024
}

/// WASM sandbox configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SandboxConfig {
    /// Fuel budget for each call into a plugin module.
    #[serde(default = "default_fuel")]
    pub fuel: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            fuel: default_fuel(),
        }
    }
}

fn default_fuel() -> u64 {
    100_000_000
}
