// SPDX-FileCopyrightText: 2026 Tome Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered configuration loading with Figment.
//!
//! Merge order (later overrides earlier):
//! 1. Compiled defaults
//! 2. `/etc/tome/tome.toml`
//! 3. `~/.config/tome/tome.toml`
//! 4. `./tome.toml`
//! 5. `TOME_*` environment variables

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::TomeConfig;

pub(crate) const SYSTEM_CONFIG: &str = "/etc/tome/tome.toml";
pub(crate) const LOCAL_CONFIG: &str = "tome.toml";

pub(crate) fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("tome").join("tome.toml"))
}

/// Load configuration from the standard hierarchy with env var overrides.
pub fn load_config() -> Result<TomeConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no file lookup, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<TomeConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(TomeConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<TomeConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(TomeConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Figment for the full hierarchy, before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(TomeConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG))
        .merge(Toml::file(user_config_path().unwrap_or_default()))
        .merge(Toml::file(LOCAL_CONFIG))
        .merge(env_provider())
}

/// Environment provider with an explicit section mapping.
///
/// `Env::split("_")` would turn `TOME_EXTENSIONS_TRUSTED_KEYS` into
/// `extensions.trusted.keys`; only the first segment names the section.
fn env_provider() -> Env {
    Env::prefixed("TOME_").map(|key| {
        let mapped = key
            .as_str()
            .replacen("logging_", "logging.", 1)
            .replacen("storage_", "storage.", 1)
            .replacen("extensions_", "extensions.", 1)
            .replacen("sandbox_", "sandbox.", 1);
        mapped.into()
    })
}
