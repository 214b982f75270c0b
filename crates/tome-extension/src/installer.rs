// SPDX-FileCopyrightText: 2026 Tome Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Artifact installation, uninstallation, and update.
//!
//! Lifecycle operations on one package are serialized by a per-package async
//! lock; different packages proceed concurrently. Every artifact is unpacked,
//! transcoded, and validated in memory before anything touches disk or the
//! registry.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tome_core::{
    ExtensionRecord, InstallOutcome, ModuleLoader, SourceDescriptor, SourceRecord, TomeError,
    Transport, module_file_name,
};
use tome_storage::Database;
use tome_storage::InstalledExtension;
use tome_storage::queries::{extensions, sources};
use tracing::{debug, info, warn};

use crate::artifact::{ArtifactPackage, ArtifactValidator, persist_atomic};
use crate::cache::SourceCache;
use crate::catalog::artifact_url;
use crate::reconcile::PendingUpdates;

/// Language of an extension from the languages of its sources.
pub fn extension_lang(descriptors: &[SourceDescriptor]) -> String {
    let langs: BTreeSet<&str> = descriptors.iter().map(|d| d.lang.as_str()).collect();
    match langs.len() {
        0 => String::new(),
        1 => langs.into_iter().next().unwrap_or_default().to_string(),
        _ => "all".to_string(),
    }
}

/// One source row per descriptor; grouped sources keep their position.
pub fn source_records(
    extension_id: i64,
    descriptors: &[SourceDescriptor],
    grouped: bool,
) -> Vec<SourceRecord> {
    descriptors
        .iter()
        .enumerate()
        .map(|(position, d)| SourceRecord {
            id: d.id,
            name: d.name.clone(),
            lang: d.lang.clone(),
            is_nsfw: d.nsfw,
            extension_id,
            is_grouped: grouped,
            group_position: grouped.then_some(position as u32),
        })
        .collect()
}

/// Exclusive hold on one package. The package's map entry is removed on
/// drop once no other operation holds or waits on it.
struct PackageGuard<'a> {
    locks: &'a DashMap<String, Arc<Mutex<()>>>,
    pkg_name: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for PackageGuard<'_> {
    fn drop(&mut self) {
        // Release first so our own clone of the lock no longer counts.
        self.guard.take();
        self.locks
            .remove_if(&self.pkg_name, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Everything needed to install, resolved before the package lock is taken.
struct Prepared {
    artifact_name: String,
    package: ArtifactPackage,
    wasm: Vec<u8>,
}

pub struct Installer {
    db: Arc<Database>,
    transport: Arc<dyn Transport>,
    loader: Arc<dyn ModuleLoader>,
    cache: Arc<SourceCache>,
    pending: Arc<PendingUpdates>,
    validator: ArtifactValidator,
    max_artifact_bytes: u64,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl Installer {
    pub fn new(
        db: Arc<Database>,
        transport: Arc<dyn Transport>,
        loader: Arc<dyn ModuleLoader>,
        cache: Arc<SourceCache>,
        pending: Arc<PendingUpdates>,
        validator: ArtifactValidator,
        max_artifact_bytes: u64,
    ) -> Self {
        Self {
            db,
            transport,
            loader,
            cache,
            pending,
            validator,
            max_artifact_bytes,
            locks: DashMap::new(),
        }
    }

    async fn lock_package(&self, pkg_name: &str) -> PackageGuard<'_> {
        let lock = Arc::clone(
            self.locks
                .entry(pkg_name.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        );
        PackageGuard {
            locks: &self.locks,
            pkg_name: pkg_name.to_string(),
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Packages with a lifecycle operation running or waiting.
    pub fn locked_packages(&self) -> usize {
        self.locks.len()
    }

    async fn find(&self, pkg_name: &str) -> Result<ExtensionRecord, TomeError> {
        extensions::fetch_by_pkg(&self.db, pkg_name)
            .await?
            .ok_or_else(|| TomeError::ExtensionNotFound(pkg_name.to_string()))
    }

    /// Install a catalog package.
    ///
    /// An installed package is left alone unless `force` is set, in which
    /// case it is uninstalled first.
    pub async fn install(&self, pkg_name: &str, force: bool) -> Result<InstallOutcome, TomeError> {
        let _guard = self.lock_package(pkg_name).await;

        let record = self.find(pkg_name).await?;
        if record.is_installed && !force {
            debug!(pkg = %pkg_name, "already installed");
            return Ok(InstallOutcome::AlreadyInstalled);
        }
        if record.is_installed {
            self.uninstall_locked(&record).await?;
        }
        self.download_and_install(&record).await
    }

    /// Install an uploaded package. Always replaces an installed copy; the
    /// package id comes from the manifest.
    pub async fn install_external(
        &self,
        artifact_name: &str,
        bytes: Vec<u8>,
    ) -> Result<InstallOutcome, TomeError> {
        let prepared = self.prepare(artifact_name, bytes).await?;
        self.validator
            .validate(artifact_name, &prepared.package, None)?;

        let pkg_name = prepared.package.manifest.pkg.clone();
        let _guard = self.lock_package(&pkg_name).await;

        let mut existing = extensions::fetch_by_pkg(&self.db, &pkg_name).await?;
        if let Some(record) = existing.as_ref().filter(|r| r.is_installed) {
            self.uninstall_locked(record).await?;
            existing = extensions::fetch_by_pkg(&self.db, &pkg_name).await?;
        }
        info!(pkg = %pkg_name, artifact = %artifact_name, "installing external package");
        self.commit_install(prepared, existing.as_ref()).await
    }

    /// Uninstall an installed package.
    pub async fn uninstall(&self, pkg_name: &str) -> Result<(), TomeError> {
        let _guard = self.lock_package(pkg_name).await;

        let record = self.find(pkg_name).await?;
        if !record.is_installed {
            return Err(TomeError::NotInstalled(pkg_name.to_string()));
        }
        self.uninstall_locked(&record).await
    }

    /// Replace an installed package with its staged update.
    pub async fn update(&self, pkg_name: &str) -> Result<InstallOutcome, TomeError> {
        let _guard = self.lock_package(pkg_name).await;

        if self.pending.get(pkg_name).is_none() {
            return Err(TomeError::NoPendingUpdate(pkg_name.to_string()));
        }
        let record = self.find(pkg_name).await?;
        if !record.is_installed {
            return Err(TomeError::NotInstalled(pkg_name.to_string()));
        }
        let Some(entry) = self.pending.take(pkg_name) else {
            return Err(TomeError::NoPendingUpdate(pkg_name.to_string()));
        };

        info!(
            pkg = %pkg_name,
            from = record.version_code,
            to = entry.version_code,
            "updating extension"
        );
        let staged = entry.clone();
        self.db
            .with_transaction(move |tx| extensions::apply_update(tx, &staged))
            .await?;

        // The old module file is named after the old artifact.
        self.uninstall_locked(&record).await?;

        let updated = ExtensionRecord {
            name: entry.name,
            version_code: entry.version_code,
            version_name: entry.version_name,
            lang: entry.lang,
            is_nsfw: entry.is_nsfw,
            repo_url: Some(entry.repo_url),
            icon_url: entry.icon_url,
            artifact_name: entry.artifact_name,
            entry_point: None,
            is_installed: false,
            has_update: false,
            ..record
        };
        self.download_and_install(&updated).await
    }

    async fn download_and_install(&self, record: &ExtensionRecord) -> Result<InstallOutcome, TomeError> {
        let Some(repo_url) = record.repo_url.as_deref() else {
            warn!(pkg = %record.pkg_name, "package has no repository to download from");
            return Err(TomeError::ExtensionNotFound(record.pkg_name.clone()));
        };

        let url = artifact_url(repo_url, &record.artifact_name);
        info!(pkg = %record.pkg_name, url = %url, "downloading artifact");
        let bytes = self.transport.fetch(&url).await?;

        let prepared = self.prepare(&record.artifact_name, bytes).await?;
        self.validator
            .validate(&record.artifact_name, &prepared.package, Some(&record.pkg_name))?;
        self.commit_install(prepared, Some(record)).await
    }

    /// Unpack and transcode off the async runtime.
    async fn prepare(&self, artifact_name: &str, bytes: Vec<u8>) -> Result<Prepared, TomeError> {
        let artifact_name = artifact_name.to_string();
        let max_bytes = self.max_artifact_bytes;
        tokio::task::spawn_blocking(move || {
            let package = ArtifactPackage::unpack(&artifact_name, &bytes, max_bytes)?;
            let wasm = package.transcode(&artifact_name)?;
            Ok(Prepared {
                artifact_name,
                package,
                wasm,
            })
        })
        .await
        .map_err(|e| TomeError::Internal(format!("artifact preparation task panicked: {e}")))?
    }

    /// Persist the module, introspect it, and record the install.
    ///
    /// The module file is removed again if any later step fails.
    async fn commit_install(
        &self,
        prepared: Prepared,
        record: Option<&ExtensionRecord>,
    ) -> Result<InstallOutcome, TomeError> {
        let Prepared {
            artifact_name,
            package,
            wasm,
        } = prepared;
        let manifest = package.manifest;

        let dir = self.cache.modules_dir().to_path_buf();
        let file_name = module_file_name(&artifact_name);
        let path = tokio::task::spawn_blocking(move || persist_atomic(&dir, &file_name, &wasm))
            .await
            .map_err(|e| TomeError::Internal(format!("module write task panicked: {e}")))??;
        self.cache.evict_module(&path);

        let loader = Arc::clone(&self.loader);
        let load_path = path.clone();
        let entry_point = manifest.entry_point.clone();
        let introspected = tokio::task::spawn_blocking(move || {
            let module = loader.load(&load_path, &entry_point)?;
            let capability = module.instantiate()?;
            Ok::<_, TomeError>((capability.is_group(), capability.descriptors()))
        })
        .await
        .map_err(|e| TomeError::Internal(format!("module load task panicked: {e}")));

        let (grouped, descriptors) = match introspected {
            Ok(Ok(found)) => found,
            Ok(Err(e)) | Err(e) => {
                remove_module_file(&path).await;
                return Err(e);
            }
        };

        let installed = InstalledExtension {
            pkg_name: manifest.pkg.clone(),
            name: record.map_or_else(|| manifest.name.clone(), |r| r.name.clone()),
            version_code: manifest.version_code,
            version_name: manifest.version_name.clone(),
            lang: extension_lang(&descriptors),
            is_nsfw: record.map_or(manifest.nsfw, |r| r.is_nsfw),
            artifact_name: artifact_name.clone(),
            entry_point: manifest.entry_point.clone(),
            icon_url: record.map(|r| r.icon_url.clone()).unwrap_or_default(),
            repo_url: record.and_then(|r| r.repo_url.clone()),
        };

        let source_count = descriptors.len();
        let persisted = self
            .db
            .with_transaction(move |tx| {
                let id = extensions::upsert_installed(tx, &installed)?;
                sources::delete_for_extension(tx, id)?;
                sources::insert_all(tx, &source_records(id, &descriptors, grouped))?;
                Ok(id)
            })
            .await;
        if let Err(e) = persisted {
            remove_module_file(&path).await;
            return Err(e);
        }

        self.cache.evict_module(&path);
        info!(
            pkg = %manifest.pkg,
            version = %manifest.version_name,
            sources = source_count,
            grouped,
            "extension installed"
        );
        Ok(InstallOutcome::Created)
    }

    /// Remove an installed package's sources and module. Caller holds the
    /// package lock.
    async fn uninstall_locked(&self, record: &ExtensionRecord) -> Result<(), TomeError> {
        let id = record.id;
        let delete_record = record.is_obsolete;
        self.db
            .with_transaction(move |tx| {
                sources::delete_for_extension(tx, id)?;
                if delete_record {
                    extensions::delete_by_id(tx, id)?;
                } else {
                    extensions::mark_uninstalled(tx, id)?;
                }
                Ok(())
            })
            .await?;

        let path = self.cache.module_path(record);
        self.cache.evict_module(&path);
        remove_module_file(&path).await;
        self.pending.discard(&record.pkg_name);

        info!(pkg = %record.pkg_name, deleted = delete_record, "extension uninstalled");
        Ok(())
    }

    /// Path a package's module would be written to.
    pub fn module_path(&self, record: &ExtensionRecord) -> PathBuf {
        self.cache.module_path(record)
    }
}

async fn remove_module_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "module file removed"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove module file"),
    }
}
