// SPDX-FileCopyrightText: 2026 Tome Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Checks semantic constraints serde cannot express: non-empty paths,
//! ordered library versions, well-formed keys and URLs.

use std::collections::HashSet;

use crate::diagnostic::ConfigError;
use crate::model::TomeConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration.
///
/// Collects every failure instead of stopping at the first.
pub fn validate_config(config: &TomeConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut invalid = |message: String| errors.push(ConfigError::Validation { message });

    if !LOG_LEVELS.contains(&config.logging.level.as_str()) {
        invalid(format!(
            "logging.level `{}` must be one of {}",
            config.logging.level,
            LOG_LEVELS.join(", ")
        ));
    }

    if config.storage.database_path.trim().is_empty() {
        invalid("storage.database_path must not be empty".to_string());
    }

    let ext = &config.extensions;
    if ext.root.trim().is_empty() {
        invalid("extensions.root must not be empty".to_string());
    }

    if ext.feature_marker.trim().is_empty() {
        invalid("extensions.feature_marker must not be empty".to_string());
    }

    if ext.download_timeout_secs == 0 {
        invalid("extensions.download_timeout_secs must be greater than 0".to_string());
    }

    if ext.max_artifact_bytes == 0 {
        invalid("extensions.max_artifact_bytes must be greater than 0".to_string());
    }

    match ext.lib_version_range() {
        Ok((min, max)) if min > max => invalid(format!(
            "extensions.lib_version_min ({min}) must not exceed lib_version_max ({max})"
        )),
        Ok(_) => {}
        Err(e) => invalid(format!("extensions: {e}")),
    }

    let mut seen_repos = HashSet::new();
    for repo in &ext.repositories {
        let trimmed = repo.trim();
        if !(trimmed.starts_with("https://") || trimmed.starts_with("http://")) {
            invalid(format!(
                "extensions.repositories entry `{repo}` must be an http(s) URL"
            ));
        }
        if !seen_repos.insert(trimmed.trim_end_matches('/')) {
            invalid(format!("duplicate repository `{repo}`"));
        }
    }

    for (i, key) in ext.trusted_keys.iter().enumerate() {
        let well_formed = key.len() == 64 && key.chars().all(|c| c.is_ascii_hexdigit());
        if !well_formed {
            invalid(format!(
                "extensions.trusted_keys[{i}] must be 64 hex characters (an Ed25519 public key)"
            ));
        }
    }

    if config.sandbox.fuel == 0 {
        invalid("sandbox.fuel must be greater than 0".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages(config: &TomeConfig) -> Vec<String> {
        validate_config(config)
            .unwrap_err()
            .into_iter()
            .map(|e| e.to_string())
            .collect()
    }

    #[test]
    fn default_config_validates() {
        assert!(validate_config(&TomeConfig::default()).is_ok());
    }

    #[test]
    fn empty_database_path_fails_validation() {
        let mut config = TomeConfig::default();
        config.storage.database_path = " ".to_string();
        assert!(messages(&config).iter().any(|m| m.contains("database_path")));
    }

    #[test]
    fn inverted_lib_versions_fail_validation() {
        let mut config = TomeConfig::default();
        config.extensions.lib_version_min = "1.6".to_string();
        assert!(messages(&config).iter().any(|m| m.contains("must not exceed")));
    }

    #[test]
    fn unparseable_lib_version_fails_validation() {
        let mut config = TomeConfig::default();
        config.extensions.lib_version_max = "one.five".to_string();
        assert!(
            messages(&config)
                .iter()
                .any(|m| m.contains("invalid library version"))
        );
    }

    #[test]
    fn malformed_trusted_key_fails_validation() {
        let mut config = TomeConfig::default();
        config.extensions.trusted_keys = vec!["abc".to_string(), "a".repeat(64)];
        let msgs = messages(&config);
        assert_eq!(msgs.len(), 1);
        assert!(msgs[0].contains("trusted_keys[0]"));
    }

    #[test]
    fn repositories_must_be_http_urls_and_unique() {
        let mut config = TomeConfig::default();
        config.extensions.repositories = vec![
            "ftp://repo".to_string(),
            "https://repo.example".to_string(),
            "https://repo.example/".to_string(),
        ];
        let msgs = messages(&config);
        assert!(msgs.iter().any(|m| m.contains("http(s) URL")));
        assert!(msgs.iter().any(|m| m.contains("duplicate repository")));
    }

    #[test]
    fn collects_all_errors() {
        let mut config = TomeConfig::default();
        config.logging.level = "loud".to_string();
        config.extensions.download_timeout_secs = 0;
        config.sandbox.fuel = 0;
        assert_eq!(messages(&config).len(), 3);
    }
}
