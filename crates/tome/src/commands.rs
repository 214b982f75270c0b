// SPDX-FileCopyrightText: 2026 Tome Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Command implementations.

use std::path::Path;

use serde::Serialize;
use tome_config::TomeConfig;
use tome_core::{InstallOutcome, SourceId, TomeError};
use tome_extension::ExtensionManager;

use crate::output::{Output, extension_line, source_line};

/// Result of a lifecycle command in `--json` mode.
#[derive(Debug, Serialize)]
struct LifecycleResult<'a> {
    pkg: &'a str,
    action: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    outcome: Option<InstallOutcome>,
    status: u16,
}

fn report_install(
    out: &Output,
    pkg: &str,
    action: &str,
    outcome: InstallOutcome,
) -> Result<(), TomeError> {
    if out.is_json() {
        return out.json(&LifecycleResult {
            pkg,
            action,
            outcome: Some(outcome),
            status: outcome.http_status(),
        });
    }
    match outcome {
        InstallOutcome::Created => out.success(&format!("{pkg}: {action} complete")),
        InstallOutcome::AlreadyInstalled => {
            println!("{pkg} is already installed (use --force to reinstall)")
        }
    }
    Ok(())
}

pub async fn list_extensions(
    manager: &ExtensionManager,
    refresh: bool,
    out: &Output,
) -> Result<(), TomeError> {
    if refresh {
        manager.refresh_catalog(true).await?;
    }
    let views = manager.list_extensions().await?;
    if out.is_json() {
        return out.json(&views);
    }
    if views.is_empty() {
        println!("No extensions. Configure `extensions.repositories` and run with --refresh.");
        return Ok(());
    }
    for view in &views {
        println!("{}", extension_line(view, out.color()));
    }
    Ok(())
}

pub async fn install(
    manager: &ExtensionManager,
    pkg: &str,
    force: bool,
    out: &Output,
) -> Result<(), TomeError> {
    // The package must be known to the registry before it can be installed.
    manager.refresh_catalog(false).await?;
    let outcome = manager.install_extension(pkg, force).await?;
    report_install(out, pkg, "install", outcome)
}

pub async fn install_file(
    manager: &ExtensionManager,
    path: &Path,
    out: &Output,
) -> Result<(), TomeError> {
    let Some(artifact_name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
        return Err(TomeError::Internal(format!(
            "{} does not name a file",
            path.display()
        )));
    };
    let bytes = tokio::fs::read(path).await?;
    let outcome = manager.install_external(&artifact_name, bytes).await?;
    report_install(out, &artifact_name, "install", outcome)
}

pub async fn uninstall(manager: &ExtensionManager, pkg: &str, out: &Output) -> Result<(), TomeError> {
    manager.uninstall_extension(pkg).await?;
    if out.is_json() {
        return out.json(&LifecycleResult {
            pkg,
            action: "uninstall",
            outcome: None,
            status: 200,
        });
    }
    out.success(&format!("{pkg}: uninstalled"));
    Ok(())
}

pub async fn update(manager: &ExtensionManager, pkg: &str, out: &Output) -> Result<(), TomeError> {
    // Staged updates live in memory; a fresh process learns them from a refresh.
    manager.refresh_catalog(true).await?;
    let outcome = manager.update_extension(pkg).await?;
    report_install(out, pkg, "update", outcome)
}

pub async fn list_sources(manager: &ExtensionManager, out: &Output) -> Result<(), TomeError> {
    let views = manager.list_sources().await?;
    if out.is_json() {
        return out.json(&views);
    }
    if views.is_empty() {
        println!("No sources. Install an extension first.");
        return Ok(());
    }
    for view in &views {
        println!("{}", source_line(view));
    }
    Ok(())
}

/// Resolve `source_id` and print the JSON result of `method`.
pub async fn invoke(
    manager: &ExtensionManager,
    source_id: SourceId,
    method: &str,
    args: serde_json::Value,
    out: &Output,
) -> Result<(), TomeError> {
    let source = manager.resolve_source(source_id).await?;
    let result = source.invoke(method, args).await?;
    out.json(&result)
}

pub fn config_check(config: &TomeConfig, out: &Output) -> Result<(), TomeError> {
    if out.is_json() {
        return out.json(config);
    }
    out.success("configuration is valid");
    for (key, value) in config_summary(config) {
        println!("  {key:<24} {value}");
    }
    Ok(())
}

fn config_summary(config: &TomeConfig) -> Vec<(&'static str, String)> {
    let ext = &config.extensions;
    vec![
        ("storage.database_path", config.storage.database_path.clone()),
        ("extensions.root", ext.root.clone()),
        ("extensions.repositories", ext.repositories.join(", ")),
        (
            "extensions.refresh",
            format!("{}s", ext.refresh_interval_secs),
        ),
        (
            "extensions.lib_version",
            format!("{} to {}", ext.lib_version_min, ext.lib_version_max),
        ),
        ("extensions.trusted_keys", ext.trusted_keys.len().to_string()),
        ("sandbox.fuel", config.sandbox.fuel.to_string()),
        ("logging.level", config.logging.level.clone()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_reports_repositories_and_keys() {
        let mut config = TomeConfig::default();
        config.extensions.repositories = vec!["https://a.test".into(), "https://b.test".into()];
        config.extensions.trusted_keys = vec!["00".repeat(32)];

        let summary = config_summary(&config);
        let get = |key: &str| {
            summary
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.clone())
                .unwrap()
        };
        assert_eq!(get("extensions.repositories"), "https://a.test, https://b.test");
        assert_eq!(get("extensions.trusted_keys"), "1");
        assert_eq!(get("extensions.lib_version"), "1.3 to 1.5");
    }

    #[test]
    fn lifecycle_result_omits_missing_outcome() {
        let body = serde_json::to_value(LifecycleResult {
            pkg: "alpha",
            action: "uninstall",
            outcome: None,
            status: 200,
        })
        .unwrap();
        assert!(body.get("outcome").is_none());

        let body = serde_json::to_value(LifecycleResult {
            pkg: "alpha",
            action: "install",
            outcome: Some(InstallOutcome::AlreadyInstalled),
            status: 302,
        })
        .unwrap();
        assert_eq!(body["outcome"], "AlreadyInstalled");
    }
}
