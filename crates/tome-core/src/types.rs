// SPDX-FileCopyrightText: 2026 Tome Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared by the registry, installer, and cache.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Stable numeric identifier of a source, assigned by its plugin.
pub type SourceId = i64;

/// Route under which extension icons are served locally.
pub const ICON_ROUTE_PREFIX: &str = "/api/v1/extension/icon";

/// One installable plugin as advertised by a remote catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub pkg_name: String,
    pub name: String,
    pub version_code: i64,
    pub version_name: String,
    pub lang: String,
    pub is_nsfw: bool,
    pub artifact_name: String,
    pub icon_url: String,
    pub repo_url: String,
}

/// Durable registry row describing an installable or installed extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionRecord {
    pub id: i64,
    pub pkg_name: String,
    pub name: String,
    pub version_code: i64,
    pub version_name: String,
    pub lang: String,
    pub is_nsfw: bool,
    pub repo_url: Option<String>,
    pub icon_url: String,
    pub artifact_name: String,
    /// Set only after a successful install.
    pub entry_point: Option<String>,
    pub is_installed: bool,
    pub has_update: bool,
    pub is_obsolete: bool,
}

impl ExtensionRecord {
    /// File name of the transcoded module inside the extensions directory.
    pub fn module_file_name(&self) -> String {
        module_file_name(&self.artifact_name)
    }
}

/// Derive the on-disk module file name from an artifact file name.
///
/// Path separators are flattened so the result always names a file directly
/// inside the extensions directory.
pub fn module_file_name(artifact_name: &str) -> String {
    let stem = artifact_name
        .strip_suffix(".tar.gz")
        .or_else(|| artifact_name.strip_suffix(".tgz"))
        .unwrap_or(artifact_name);
    let flat: String = stem
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    format!("{flat}.wasm")
}

/// Durable registry row for one source exposed by an installed extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub id: SourceId,
    pub name: String,
    pub lang: String,
    pub is_nsfw: bool,
    pub extension_id: i64,
    pub is_grouped: bool,
    /// Position inside the group; `None` for single-source extensions.
    pub group_position: Option<u32>,
}

/// What a plugin reports about one of its sources when introspected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub id: SourceId,
    pub name: String,
    pub lang: String,
    #[serde(default)]
    pub nsfw: bool,
}

/// Result of an install request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
pub enum InstallOutcome {
    /// The extension was installed by this call.
    Created,
    /// The extension was already installed and the install was not forced.
    AlreadyInstalled,
}

impl InstallOutcome {
    pub fn http_status(self) -> u16 {
        match self {
            InstallOutcome::Created => 201,
            InstallOutcome::AlreadyInstalled => 302,
        }
    }
}

/// Plugin library version, the `major.minor` prefix of a version name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LibVersion {
    pub major: u32,
    pub minor: u32,
}

impl LibVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Extract the library version from a full version name by dropping the
    /// last dot-separated component (`"1.4.7"` is library `1.4`).
    pub fn from_version_name(version_name: &str) -> Option<Self> {
        let (prefix, _) = version_name.rsplit_once('.')?;
        prefix.parse().ok()
    }

    /// Whether `self` lies in the inclusive range `[min, max]`.
    pub fn within(self, min: LibVersion, max: LibVersion) -> bool {
        self >= min && self <= max
    }
}

impl FromStr for LibVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (major, minor) = match s.split_once('.') {
            Some((major, minor)) => (major, minor),
            None => (s, "0"),
        };
        let major = major
            .parse()
            .map_err(|_| format!("invalid library version `{s}`"))?;
        let minor = minor
            .parse()
            .map_err(|_| format!("invalid library version `{s}`"))?;
        Ok(Self { major, minor })
    }
}

impl fmt::Display for LibVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Extension as presented to API and CLI consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionView {
    pub artifact_name: String,
    pub icon_url: String,
    pub name: String,
    pub pkg_name: String,
    pub version_name: String,
    pub version_code: i64,
    pub lang: String,
    pub is_nsfw: bool,
    pub installed: bool,
    pub has_update: bool,
    pub obsolete: bool,
    pub repository: Option<String>,
}

impl From<&ExtensionRecord> for ExtensionView {
    fn from(record: &ExtensionRecord) -> Self {
        Self {
            artifact_name: record.artifact_name.clone(),
            icon_url: icon_route(&record.artifact_name),
            name: record.name.clone(),
            pkg_name: record.pkg_name.clone(),
            version_name: record.version_name.clone(),
            version_code: record.version_code,
            lang: record.lang.clone(),
            is_nsfw: record.is_nsfw,
            installed: record.is_installed,
            has_update: record.has_update,
            obsolete: record.is_obsolete,
            repository: record.repo_url.clone(),
        }
    }
}

/// Source as presented to API and CLI consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceView {
    /// Rendered as a string so 64-bit ids survive JSON consumers.
    pub id: String,
    pub name: String,
    pub lang: String,
    pub icon_url: String,
    pub is_nsfw: bool,
    pub display_name: String,
    pub extension_pkg: String,
}

impl SourceView {
    pub fn new(source: &SourceRecord, extension: &ExtensionRecord) -> Self {
        Self {
            id: source.id.to_string(),
            name: source.name.clone(),
            lang: source.lang.clone(),
            icon_url: icon_route(&extension.artifact_name),
            is_nsfw: source.is_nsfw,
            display_name: format!("{} ({})", source.name, source.lang),
            extension_pkg: extension.pkg_name.clone(),
        }
    }
}

/// Local route serving the icon of the extension packaged as `artifact_name`.
pub fn icon_route(artifact_name: &str) -> String {
    format!("{ICON_ROUTE_PREFIX}/{artifact_name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> ExtensionRecord {
        ExtensionRecord {
            id: 1,
            pkg_name: "tome.ext.en.mangadex".into(),
            name: "MangaDex".into(),
            version_code: 12,
            version_name: "1.4.12".into(),
            lang: "all".into(),
            is_nsfw: false,
            repo_url: Some("https://repo.example".into()),
            icon_url: "https://repo.example/icon/tome.ext.en.mangadex.png".into(),
            artifact_name: "tome-all.mangadex-v1.4.12.tar.gz".into(),
            entry_point: None,
            is_installed: true,
            has_update: false,
            is_obsolete: false,
        }
    }

    #[test]
    fn lib_version_from_version_name_drops_last_component() {
        assert_eq!(
            LibVersion::from_version_name("1.4.7"),
            Some(LibVersion::new(1, 4))
        );
        assert_eq!(
            LibVersion::from_version_name("1.3"),
            Some(LibVersion::new(1, 0))
        );
        assert_eq!(LibVersion::from_version_name("7"), None);
        assert_eq!(LibVersion::from_version_name("x.y.1"), None);
    }

    #[test]
    fn lib_version_ordering_is_numeric() {
        let min: LibVersion = "1.3".parse().unwrap();
        let max: LibVersion = "1.5".parse().unwrap();
        assert!(LibVersion::new(1, 4).within(min, max));
        assert!(LibVersion::new(1, 5).within(min, max));
        assert!(!LibVersion::new(1, 2).within(min, max));
        assert!(!LibVersion::new(2, 0).within(min, max));
        assert!(LibVersion::new(1, 10) > LibVersion::new(1, 4));
    }

    #[test]
    fn module_file_name_strips_package_suffix() {
        assert_eq!(module_file_name("foo-v1.4.2.tar.gz"), "foo-v1.4.2.wasm");
        assert_eq!(module_file_name("foo.tgz"), "foo.wasm");
        assert_eq!(module_file_name("../evil.tar.gz"), ".._evil.wasm");
    }

    #[test]
    fn extension_view_uses_local_icon_route() {
        let view = ExtensionView::from(&record());
        assert_eq!(
            view.icon_url,
            "/api/v1/extension/icon/tome-all.mangadex-v1.4.12.tar.gz"
        );
        assert!(view.installed);
        assert_eq!(view.repository.as_deref(), Some("https://repo.example"));
    }

    #[test]
    fn source_view_renders_id_as_string_and_display_name() {
        let source = SourceRecord {
            id: 2_499_283_573_021_220_255,
            name: "MangaDex".into(),
            lang: "en".into(),
            is_nsfw: false,
            extension_id: 1,
            is_grouped: true,
            group_position: Some(0),
        };
        let view = SourceView::new(&source, &record());
        assert_eq!(view.id, "2499283573021220255");
        assert_eq!(view.display_name, "MangaDex (en)");
        assert_eq!(view.extension_pkg, "tome.ext.en.mangadex");
    }

    #[test]
    fn install_outcome_status_codes() {
        assert_eq!(InstallOutcome::Created.http_status(), 201);
        assert_eq!(InstallOutcome::AlreadyInstalled.http_status(), 302);
        assert_eq!(InstallOutcome::Created.to_string(), "Created");
    }

    #[test]
    fn source_descriptor_nsfw_defaults_to_false() {
        let d: SourceDescriptor =
            serde_json::from_str(r#"{"id":5,"name":"A","lang":"en"}"#).unwrap();
        assert!(!d.nsfw);
    }
}
