// SPDX-FileCopyrightText: 2026 Tome Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Remote catalog fetching.
//!
//! Each repository publishes `{repo}/index.min.json`, a JSON array of
//! packages. Repositories are fetched concurrently; one failing repository is
//! logged and skipped. The merged list is deduplicated by package id keeping
//! the highest version code.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use tome_core::{CatalogEntry, LibVersion, TomeError, Transport};
use tracing::{debug, info, warn};

/// One element of `index.min.json`.
#[derive(Debug, Deserialize)]
struct IndexEntry {
    name: String,
    pkg: String,
    file: String,
    lang: String,
    code: i64,
    version: String,
    #[serde(default)]
    nsfw: i64,
    #[serde(default)]
    icon: Option<String>,
}

fn repo_base(repo_url: &str) -> &str {
    repo_url.trim_end_matches('/')
}

pub fn index_url(repo_url: &str) -> String {
    format!("{}/index.min.json", repo_base(repo_url))
}

/// Download URL of an artifact published by `repo_url`.
pub fn artifact_url(repo_url: &str, artifact_name: &str) -> String {
    format!("{}/artifacts/{artifact_name}", repo_base(repo_url))
}

pub fn default_icon_url(repo_url: &str, pkg_name: &str) -> String {
    format!("{}/icon/{pkg_name}.png", repo_base(repo_url))
}

/// Parse a catalog document, dropping entries whose library version is
/// outside `[lib_min, lib_max]`.
pub fn parse_index(
    repo_url: &str,
    body: &[u8],
    lib_min: LibVersion,
    lib_max: LibVersion,
) -> Result<Vec<CatalogEntry>, TomeError> {
    let raw: Vec<IndexEntry> = serde_json::from_slice(body).map_err(|e| TomeError::Network {
        url: index_url(repo_url),
        message: format!("invalid catalog document: {e}"),
        source: Some(Box::new(e)),
    })?;

    let total = raw.len();
    let entries: Vec<CatalogEntry> = raw
        .into_iter()
        .filter(|e| {
            let compatible = LibVersion::from_version_name(&e.version)
                .is_some_and(|v| v.within(lib_min, lib_max));
            if !compatible {
                debug!(pkg = %e.pkg, version = %e.version, "skipping incompatible catalog entry");
            }
            compatible
        })
        .map(|e| CatalogEntry {
            icon_url: e
                .icon
                .unwrap_or_else(|| default_icon_url(repo_url, &e.pkg)),
            pkg_name: e.pkg,
            name: e.name,
            version_code: e.code,
            version_name: e.version,
            lang: e.lang,
            is_nsfw: e.nsfw != 0,
            artifact_name: e.file,
            repo_url: repo_base(repo_url).to_string(),
        })
        .collect();

    debug!(repo = %repo_url, total, kept = entries.len(), "parsed catalog");
    Ok(entries)
}

/// Keep one entry per package: the highest version code, first seen on ties.
///
/// Output order follows the first appearance of each package.
pub fn dedup_by_max_version(entries: Vec<CatalogEntry>) -> Vec<CatalogEntry> {
    let mut position: HashMap<String, usize> = HashMap::with_capacity(entries.len());
    let mut out: Vec<CatalogEntry> = Vec::with_capacity(entries.len());
    for entry in entries {
        match position.get(&entry.pkg_name) {
            Some(&i) => {
                if entry.version_code > out[i].version_code {
                    out[i] = entry;
                }
            }
            None => {
                position.insert(entry.pkg_name.clone(), out.len());
                out.push(entry);
            }
        }
    }
    out
}

/// Fetches and merges the catalogs of every configured repository.
pub struct CatalogFetcher {
    transport: Arc<dyn Transport>,
    lib_min: LibVersion,
    lib_max: LibVersion,
}

impl CatalogFetcher {
    pub fn new(transport: Arc<dyn Transport>, lib_min: LibVersion, lib_max: LibVersion) -> Self {
        Self {
            transport,
            lib_min,
            lib_max,
        }
    }

    /// Fetch all repositories concurrently and merge them.
    ///
    /// Fails only when repositories are configured and every one of them
    /// failed; an empty catalog would otherwise obsolete the whole registry.
    pub async fn fetch(&self, repo_urls: &[String]) -> Result<Vec<CatalogEntry>, TomeError> {
        let results =
            futures::future::join_all(repo_urls.iter().map(|repo| self.fetch_repo(repo))).await;

        let mut merged = Vec::new();
        let mut last_error = None;
        let mut succeeded = 0usize;
        for (repo, result) in repo_urls.iter().zip(results) {
            match result {
                Ok(entries) => {
                    succeeded += 1;
                    merged.extend(entries);
                }
                Err(e) => {
                    warn!(repo = %repo, error = %e, "catalog fetch failed, skipping repository");
                    last_error = Some(e);
                }
            }
        }

        if succeeded == 0 {
            if let Some(e) = last_error {
                return Err(e);
            }
        }

        let fetched = merged.len();
        let entries = dedup_by_max_version(merged);
        info!(
            repositories = repo_urls.len(),
            succeeded,
            fetched,
            unique = entries.len(),
            "catalog fetched"
        );
        Ok(entries)
    }

    async fn fetch_repo(&self, repo_url: &str) -> Result<Vec<CatalogEntry>, TomeError> {
        let url = index_url(repo_url);
        debug!(url = %url, "fetching catalog");
        let body = self.transport.fetch(&url).await?;
        parse_index(repo_url, &body, self.lib_min, self.lib_max)
    }
}
