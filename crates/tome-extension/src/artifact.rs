// SPDX-FileCopyrightText: 2026 Tome Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Extension artifact packages.
//!
//! An artifact is a gzip'd tar holding three top-level files:
//!
//! - `extension.toml`: the [`ExtensionManifest`]
//! - `module.wat` or `module.wasm`: the plugin module, as text or binary
//! - `signature.toml`: an Ed25519 signature by the publisher
//!
//! The signature covers `sha256(extension.toml) || sha256(module)` over the
//! bytes exactly as packaged.

use std::io::Read;
use std::path::{Component, Path, PathBuf};

use ed25519_dalek::{Signature, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tome_config::model::ExtensionsConfig;
use tome_core::{IncompatibleReason, LibVersion, TomeError};
use tracing::{debug, warn};

pub const MANIFEST_FILE: &str = "extension.toml";
pub const MODULE_TEXT_FILE: &str = "module.wat";
pub const MODULE_BINARY_FILE: &str = "module.wasm";
pub const SIGNATURE_FILE: &str = "signature.toml";

const WASM_MAGIC: &[u8; 4] = b"\0asm";

/// Publisher-declared metadata of an extension package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtensionManifest {
    pub pkg: String,
    pub name: String,
    pub version_name: String,
    pub version_code: i64,
    #[serde(default)]
    pub lang: String,
    #[serde(default)]
    pub nsfw: bool,
    /// Export that describes the sources this module provides.
    pub entry_point: String,
    #[serde(default)]
    pub features: Vec<String>,
}

/// Hex-encoded publisher key and signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageSignature {
    pub public_key: String,
    pub signature: String,
}

#[derive(Debug, Clone)]
pub enum ModuleSource {
    Text(Vec<u8>),
    Binary(Vec<u8>),
}

impl ModuleSource {
    pub fn bytes(&self) -> &[u8] {
        match self {
            ModuleSource::Text(b) | ModuleSource::Binary(b) => b,
        }
    }
}

/// The message a publisher signs for a package.
pub fn signing_message(manifest: &[u8], module: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(64);
    message.extend_from_slice(&Sha256::digest(manifest));
    message.extend_from_slice(&Sha256::digest(module));
    message
}

/// An unpacked, not yet validated artifact.
#[derive(Debug, Clone)]
pub struct ArtifactPackage {
    pub manifest: ExtensionManifest,
    manifest_bytes: Vec<u8>,
    module: ModuleSource,
    signature: Option<PackageSignature>,
}

fn transcode_err(artifact: &str, message: impl Into<String>) -> TomeError {
    TomeError::Transcode {
        artifact: artifact.to_string(),
        message: message.into(),
    }
}

impl ArtifactPackage {
    /// Unpack an artifact, reading only the known top-level files.
    ///
    /// Entries with `..`, absolute paths, or links are rejected or skipped,
    /// and no entry may exceed `max_bytes`.
    pub fn unpack(artifact_name: &str, bytes: &[u8], max_bytes: u64) -> Result<Self, TomeError> {
        let err = |m: String| transcode_err(artifact_name, m);

        if bytes.len() as u64 > max_bytes {
            return Err(err(format!(
                "artifact is {} bytes, limit is {max_bytes}",
                bytes.len()
            )));
        }

        let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(bytes));
        let entries = archive
            .entries()
            .map_err(|e| err(format!("not a package archive: {e}")))?;

        let mut manifest_bytes = None;
        let mut module = None;
        let mut signature_bytes = None;
        let mut remaining = max_bytes;

        for entry in entries {
            let mut entry = entry.map_err(|e| err(format!("corrupt archive: {e}")))?;
            let kind = entry.header().entry_type();
            if kind.is_symlink() || kind.is_hard_link() {
                warn!(artifact = %artifact_name, "skipping link entry in artifact");
                continue;
            }
            if !kind.is_file() {
                continue;
            }

            let path = entry
                .path()
                .map_err(|e| err(format!("unreadable entry path: {e}")))?
                .into_owned();
            let Some(name) = top_level_name(&path).map_err(err)? else {
                debug!(artifact = %artifact_name, path = %path.display(), "ignoring nested entry");
                continue;
            };

            let slot = match name.as_str() {
                MANIFEST_FILE => &mut manifest_bytes,
                SIGNATURE_FILE => &mut signature_bytes,
                MODULE_TEXT_FILE | MODULE_BINARY_FILE => {
                    if module.is_some() {
                        return Err(err("package contains more than one module".to_string()));
                    }
                    let data = read_limited(&mut entry, &mut remaining).map_err(err)?;
                    module = Some(if name == MODULE_TEXT_FILE {
                        ModuleSource::Text(data)
                    } else {
                        ModuleSource::Binary(data)
                    });
                    continue;
                }
                other => {
                    debug!(artifact = %artifact_name, entry = other, "ignoring unknown entry");
                    continue;
                }
            };
            if slot.is_some() {
                return Err(err(format!("duplicate entry `{name}`")));
            }
            *slot = Some(read_limited(&mut entry, &mut remaining).map_err(err)?);
        }

        let manifest_bytes =
            manifest_bytes.ok_or_else(|| err(format!("missing {MANIFEST_FILE}")))?;
        let module = module.ok_or_else(|| {
            err(format!(
                "missing {MODULE_TEXT_FILE} or {MODULE_BINARY_FILE}"
            ))
        })?;

        let manifest_text = std::str::from_utf8(&manifest_bytes)
            .map_err(|e| err(format!("{MANIFEST_FILE} is not UTF-8: {e}")))?;
        let manifest: ExtensionManifest = toml::from_str(manifest_text)
            .map_err(|e| err(format!("invalid {MANIFEST_FILE}: {e}")))?;

        let signature = match signature_bytes {
            None => None,
            Some(raw) => {
                let text = std::str::from_utf8(&raw)
                    .map_err(|e| err(format!("{SIGNATURE_FILE} is not UTF-8: {e}")))?;
                Some(
                    toml::from_str(text)
                        .map_err(|e| err(format!("invalid {SIGNATURE_FILE}: {e}")))?,
                )
            }
        };

        Ok(Self {
            manifest,
            manifest_bytes,
            module,
            signature,
        })
    }

    pub fn module(&self) -> &ModuleSource {
        &self.module
    }

    pub fn signature(&self) -> Option<&PackageSignature> {
        self.signature.as_ref()
    }

    /// Convert the packaged module into a WASM binary.
    pub fn transcode(&self, artifact_name: &str) -> Result<Vec<u8>, TomeError> {
        match &self.module {
            ModuleSource::Text(text) => wat::parse_bytes(text)
                .map(|wasm| wasm.into_owned())
                .map_err(|e| transcode_err(artifact_name, format!("invalid module text: {e}"))),
            ModuleSource::Binary(wasm) => {
                if wasm.starts_with(WASM_MAGIC) {
                    Ok(wasm.clone())
                } else {
                    Err(transcode_err(artifact_name, "module.wasm is not a WASM binary"))
                }
            }
        }
    }

    fn signed_message(&self) -> Vec<u8> {
        signing_message(&self.manifest_bytes, self.module.bytes())
    }
}

/// The single file name of a top-level entry, `None` for nested entries.
fn top_level_name(path: &Path) -> Result<Option<String>, String> {
    let mut normal = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => normal.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(format!(
                    "archive contains unsafe path component: {}",
                    path.display()
                ));
            }
        }
    }
    match normal.as_slice() {
        [single] => Ok(Some(single.to_string_lossy().into_owned())),
        _ => Ok(None),
    }
}

fn read_limited<R: Read>(entry: R, remaining: &mut u64) -> Result<Vec<u8>, String> {
    let mut data = Vec::new();
    entry
        .take(remaining.saturating_add(1))
        .read_to_end(&mut data)
        .map_err(|e| format!("failed to read entry: {e}"))?;
    let len = data.len() as u64;
    if len > *remaining {
        return Err("unpacked artifact exceeds the size limit".to_string());
    }
    *remaining -= len;
    Ok(data)
}

/// Checks an unpacked artifact against the host's acceptance rules.
#[derive(Debug, Clone)]
pub struct ArtifactValidator {
    feature_marker: String,
    lib_min: LibVersion,
    lib_max: LibVersion,
    trusted: Vec<[u8; 32]>,
}

impl ArtifactValidator {
    pub fn new(
        feature_marker: impl Into<String>,
        lib_min: LibVersion,
        lib_max: LibVersion,
        trusted_keys: &[String],
    ) -> Result<Self, TomeError> {
        let trusted = trusted_keys
            .iter()
            .map(|key| {
                decode_fixed::<32>(key).ok_or_else(|| {
                    TomeError::Config(format!("trusted key `{key}` is not 32 hex-encoded bytes"))
                })
            })
            .collect::<Result<_, _>>()?;
        Ok(Self {
            feature_marker: feature_marker.into(),
            lib_min,
            lib_max,
            trusted,
        })
    }

    pub fn from_config(config: &ExtensionsConfig) -> Result<Self, TomeError> {
        let (min, max) = config.lib_version_range().map_err(TomeError::Config)?;
        Self::new(config.feature_marker.clone(), min, max, &config.trusted_keys)
    }

    /// Validate feature marker, library version, signature, and (when
    /// `expected_pkg` is given) the declared package id, in that order.
    pub fn validate(
        &self,
        artifact_name: &str,
        package: &ArtifactPackage,
        expected_pkg: Option<&str>,
    ) -> Result<(), TomeError> {
        let reject = |reason| TomeError::IncompatibleArtifact {
            artifact: artifact_name.to_string(),
            reason,
        };
        let manifest = &package.manifest;

        if !manifest.features.iter().any(|f| *f == self.feature_marker) {
            return Err(reject(IncompatibleReason::MissingFeature {
                expected: self.feature_marker.clone(),
            }));
        }

        let lib = LibVersion::from_version_name(&manifest.version_name);
        if !lib.is_some_and(|v| v.within(self.lib_min, self.lib_max)) {
            return Err(reject(IncompatibleReason::LibVersionOutOfRange {
                found: lib.map_or_else(|| manifest.version_name.clone(), |v| v.to_string()),
                min: self.lib_min.to_string(),
                max: self.lib_max.to_string(),
            }));
        }

        let signature = package
            .signature()
            .ok_or_else(|| reject(IncompatibleReason::MissingSignature))?;
        self.verify(package, signature).map_err(reject)?;

        if let Some(expected) = expected_pkg {
            if manifest.pkg != expected {
                return Err(reject(IncompatibleReason::PackageMismatch {
                    expected: expected.to_string(),
                    found: manifest.pkg.clone(),
                }));
            }
        }

        Ok(())
    }

    fn verify(
        &self,
        package: &ArtifactPackage,
        signature: &PackageSignature,
    ) -> Result<(), IncompatibleReason> {
        let key_bytes = decode_fixed::<32>(&signature.public_key).ok_or_else(|| {
            IncompatibleReason::BadSignature("public key is not 32 hex-encoded bytes".into())
        })?;
        if !self.trusted.contains(&key_bytes) {
            return Err(IncompatibleReason::UntrustedSigner {
                key: signature.public_key.to_ascii_lowercase(),
            });
        }
        let key = VerifyingKey::from_bytes(&key_bytes)
            .map_err(|e| IncompatibleReason::BadSignature(format!("invalid public key: {e}")))?;
        let sig_bytes = decode_fixed::<64>(&signature.signature).ok_or_else(|| {
            IncompatibleReason::BadSignature("signature is not 64 hex-encoded bytes".into())
        })?;
        key.verify_strict(&package.signed_message(), &Signature::from_bytes(&sig_bytes))
            .map_err(|e| IncompatibleReason::BadSignature(e.to_string()))
    }
}

fn decode_fixed<const N: usize>(hex_str: &str) -> Option<[u8; N]> {
    hex::decode(hex_str.trim()).ok()?.try_into().ok()
}

/// Write `bytes` into `dir` as `file_name` without exposing a partial file.
///
/// The bytes go to a temp file in the same directory which is then renamed
/// over the destination.
pub fn persist_atomic(dir: &Path, file_name: &str, bytes: &[u8]) -> Result<PathBuf, TomeError> {
    use std::io::Write;

    std::fs::create_dir_all(dir)?;
    let destination = dir.join(file_name);
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(&destination)
        .map_err(|e| TomeError::Internal(format!("failed to persist {}: {e}", destination.display())))?;
    Ok(destination)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tome_test_utils::artifact::{ArtifactBuilder, test_public_key_hex};

    const MODULE: &str = r#"(module (func (export "tome_entry")))"#;

    fn validator() -> ArtifactValidator {
        ArtifactValidator::new(
            "tome.extension",
            LibVersion::new(1, 3),
            LibVersion::new(1, 5),
            &[test_public_key_hex()],
        )
        .unwrap()
    }

    fn builder() -> ArtifactBuilder {
        ArtifactBuilder::new("tome.ext.en.demo", 4, MODULE)
    }

    fn unpack(bytes: &[u8]) -> Result<ArtifactPackage, TomeError> {
        ArtifactPackage::unpack("demo.tar.gz", bytes, 1 << 20)
    }

    fn reason(result: Result<(), TomeError>) -> IncompatibleReason {
        match result {
            Err(TomeError::IncompatibleArtifact { reason, .. }) => reason,
            other => panic!("expected IncompatibleArtifact, got {other:?}"),
        }
    }

    #[test]
    fn valid_package_unpacks_transcodes_and_validates() {
        let pkg = unpack(&builder().build()).unwrap();
        assert_eq!(pkg.manifest.pkg, "tome.ext.en.demo");
        assert_eq!(pkg.manifest.version_code, 4);
        let wasm = pkg.transcode("demo.tar.gz").unwrap();
        assert!(wasm.starts_with(WASM_MAGIC));
        validator()
            .validate("demo.tar.gz", &pkg, Some("tome.ext.en.demo"))
            .unwrap();
    }

    #[test]
    fn missing_feature_marker_is_rejected() {
        let pkg = unpack(&builder().features(&["other"]).build()).unwrap();
        assert!(matches!(
            reason(validator().validate("a", &pkg, None)),
            IncompatibleReason::MissingFeature { .. }
        ));
    }

    #[test]
    fn lib_version_outside_range_is_rejected() {
        let pkg = unpack(&builder().version_name("1.6.4").build()).unwrap();
        assert!(matches!(
            reason(validator().validate("a", &pkg, None)),
            IncompatibleReason::LibVersionOutOfRange { found, .. } if found == "1.6"
        ));
    }

    #[test]
    fn unsigned_package_is_rejected() {
        let pkg = unpack(&builder().unsigned().build()).unwrap();
        assert_eq!(
            reason(validator().validate("a", &pkg, None)),
            IncompatibleReason::MissingSignature
        );
    }

    #[test]
    fn untrusted_signer_is_rejected() {
        let pkg = unpack(&builder().signing_seed([9u8; 32]).build()).unwrap();
        assert!(matches!(
            reason(validator().validate("a", &pkg, None)),
            IncompatibleReason::UntrustedSigner { .. }
        ));
    }

    #[test]
    fn tampered_module_fails_verification() {
        let pkg = unpack(
            &builder()
                .tamper_module(r#"(module (func (export "tome_entry")) (func))"#)
                .build(),
        )
        .unwrap();
        assert!(matches!(
            reason(validator().validate("a", &pkg, None)),
            IncompatibleReason::BadSignature(_)
        ));
    }

    #[test]
    fn package_mismatch_is_rejected() {
        let pkg = unpack(&builder().build()).unwrap();
        assert!(matches!(
            reason(validator().validate("a", &pkg, Some("tome.ext.en.other"))),
            IncompatibleReason::PackageMismatch { .. }
        ));
    }

    #[test]
    fn garbage_is_a_transcode_error() {
        assert!(matches!(
            unpack(b"definitely not gzip"),
            Err(TomeError::Transcode { .. })
        ));
    }

    #[test]
    fn invalid_module_text_is_a_transcode_error() {
        let pkg = unpack(&builder().module_text("(module (oops").build()).unwrap();
        assert!(matches!(
            pkg.transcode("a"),
            Err(TomeError::Transcode { .. })
        ));
    }

    #[test]
    fn oversized_artifact_is_rejected() {
        let bytes = builder().build();
        assert!(matches!(
            ArtifactPackage::unpack("a", &bytes, 16),
            Err(TomeError::Transcode { .. })
        ));
    }

    #[test]
    fn unbounded_limit_does_not_overflow() {
        let pkg = ArtifactPackage::unpack("a", &builder().build(), u64::MAX).unwrap();
        assert_eq!(pkg.manifest.pkg, "tome.ext.en.demo");

        let mut remaining = u64::MAX;
        let data = read_limited(&b"hello"[..], &mut remaining).unwrap();
        assert_eq!(data, b"hello");
        assert_eq!(remaining, u64::MAX - 5);
    }

    #[test]
    fn entry_at_exact_limit_is_accepted() {
        let mut remaining = 5;
        assert!(read_limited(&b"hello"[..], &mut remaining).is_ok());
        assert_eq!(remaining, 0);
        assert!(read_limited(&b"!"[..], &mut remaining).is_err());
    }

    #[test]
    fn parent_dir_entries_are_rejected() {
        assert!(top_level_name(Path::new("../extension.toml")).is_err());
        assert_eq!(
            top_level_name(Path::new("./extension.toml")).unwrap(),
            Some("extension.toml".to_string())
        );
        assert_eq!(top_level_name(Path::new("docs/readme.md")).unwrap(), None);
    }

    #[test]
    fn persist_atomic_replaces_destination() {
        let dir = tempfile::tempdir().unwrap();
        let first = persist_atomic(dir.path(), "m.wasm", b"one").unwrap();
        let second = persist_atomic(dir.path(), "m.wasm", b"two").unwrap();
        assert_eq!(first, second);
        assert_eq!(std::fs::read(&second).unwrap(), b"two");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
