// SPDX-FileCopyrightText: 2026 Tome Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Write-side models for the registry tables.

/// Fields written when an artifact is installed successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledExtension {
    pub pkg_name: String,
    pub name: String,
    pub version_code: i64,
    pub version_name: String,
    pub lang: String,
    pub is_nsfw: bool,
    pub artifact_name: String,
    pub entry_point: String,
    pub icon_url: String,
    pub repo_url: Option<String>,
}

/// Boolean lifecycle flags that can be set in bulk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionFlag {
    HasUpdate,
    Obsolete,
}

impl ExtensionFlag {
    pub(crate) fn column(self) -> &'static str {
        match self {
            ExtensionFlag::HasUpdate => "has_update",
            ExtensionFlag::Obsolete => "is_obsolete",
        }
    }
}
