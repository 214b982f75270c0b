// SPDX-FileCopyrightText: 2026 Tome Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Catalog fixtures.

use serde_json::{Value, json};
use tome_core::CatalogEntry;

/// Repository URL used by fixtures unless a test says otherwise.
pub const TEST_REPO: &str = "https://repo.test";

/// Artifact file name fixtures publish `pkg` at `version_code` under.
pub fn artifact_name(pkg: &str, version_code: i64) -> String {
    format!("{pkg}-v1.4.{version_code}.tar.gz")
}

/// A catalog entry as the fetcher would produce it for [`TEST_REPO`].
pub fn entry(pkg: &str, version_code: i64) -> CatalogEntry {
    CatalogEntry {
        pkg_name: pkg.to_string(),
        name: format!("Name {pkg}"),
        version_code,
        version_name: format!("1.4.{version_code}"),
        lang: "en".into(),
        is_nsfw: false,
        artifact_name: artifact_name(pkg, version_code),
        icon_url: format!("{TEST_REPO}/icon/{pkg}.png"),
        repo_url: TEST_REPO.to_string(),
    }
}

/// Builds an `index.min.json` document.
#[derive(Default, Clone)]
pub struct CatalogBuilder {
    entries: Vec<Value>,
}

impl CatalogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a package with fixture defaults.
    pub fn package(self, pkg: &str, version_code: i64) -> Self {
        self.raw(json!({
            "name": format!("Name {pkg}"),
            "pkg": pkg,
            "file": artifact_name(pkg, version_code),
            "lang": "en",
            "code": version_code,
            "version": format!("1.4.{version_code}"),
            "nsfw": 0,
        }))
    }

    /// Add an arbitrary catalog element.
    pub fn raw(mut self, value: Value) -> Self {
        self.entries.push(value);
        self
    }

    /// Drop every element for `pkg`.
    pub fn without(mut self, pkg: &str) -> Self {
        self.entries.retain(|e| e["pkg"] != pkg);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        serde_json::to_vec(&self.entries).unwrap()
    }
}
