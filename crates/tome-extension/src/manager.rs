// SPDX-FileCopyrightText: 2026 Tome Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The extension manager: one owner for the registry, caches, and locks.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tome_config::TomeConfig;
use tome_config::model::ExtensionsConfig;
use tome_core::{
    CatalogEntry, Clock, ExtensionView, InstallOutcome, ModuleLoader, SourceHandle, SourceId,
    SourceView, SystemClock, TomeError, Transport,
};
use tome_storage::Database;
use tome_storage::queries::{extensions, sources};
use tracing::{debug, info, warn};

use crate::artifact::ArtifactValidator;
use crate::cache::SourceCache;
use crate::catalog::CatalogFetcher;
use crate::icon::IconCache;
use crate::installer::Installer;
use crate::loader::WasmModuleLoader;
use crate::reconcile::{PendingUpdates, ReconcileSummary, Reconciler};
use crate::transport::HttpTransport;

/// Application-root service for extension lifecycle and source resolution.
///
/// Construct once and share behind an `Arc`.
pub struct ExtensionManager {
    db: Arc<Database>,
    repositories: Vec<String>,
    refresh_interval: Duration,
    fetcher: CatalogFetcher,
    reconciler: Reconciler,
    installer: Installer,
    cache: Arc<SourceCache>,
    pending: Arc<PendingUpdates>,
    icons: IconCache,
    clock: Arc<dyn Clock>,
    last_refresh: Mutex<Option<DateTime<Utc>>>,
}

impl ExtensionManager {
    /// Build a manager with the HTTP transport, the WASM loader, and the
    /// system clock.
    pub fn new(db: Arc<Database>, config: &TomeConfig) -> Result<Self, TomeError> {
        let transport = Arc::new(HttpTransport::from_config(&config.extensions)?);
        let loader = Arc::new(WasmModuleLoader::new(config.sandbox.fuel)?);
        Self::with_components(db, &config.extensions, transport, loader, Arc::new(SystemClock))
    }

    /// Build a manager from explicit collaborators.
    pub fn with_components(
        db: Arc<Database>,
        config: &ExtensionsConfig,
        transport: Arc<dyn Transport>,
        loader: Arc<dyn ModuleLoader>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, TomeError> {
        let (lib_min, lib_max) = config.lib_version_range().map_err(TomeError::Config)?;
        let validator = ArtifactValidator::from_config(config)?;
        let root = PathBuf::from(&config.root);

        let pending = Arc::new(PendingUpdates::new());
        let cache = Arc::new(SourceCache::new(Arc::clone(&loader), root.clone()));
        let installer = Installer::new(
            Arc::clone(&db),
            Arc::clone(&transport),
            loader,
            Arc::clone(&cache),
            Arc::clone(&pending),
            validator,
            config.max_artifact_bytes,
        );

        debug!(root = %root.display(), repositories = config.repositories.len(), "extension manager created");
        Ok(Self {
            reconciler: Reconciler::new(Arc::clone(&db), Arc::clone(&pending)),
            fetcher: CatalogFetcher::new(Arc::clone(&transport), lib_min, lib_max),
            icons: IconCache::new(root.join("icon"), transport),
            db,
            repositories: config.repositories.clone(),
            refresh_interval: i64::try_from(config.refresh_interval_secs)
                .ok()
                .and_then(Duration::try_seconds)
                .unwrap_or(Duration::MAX),
            installer,
            cache,
            pending,
            clock,
            last_refresh: Mutex::new(None),
        })
    }

    /// Fetch and reconcile the catalog unless the last successful fetch is
    /// within the refresh interval. Returns whether a fetch happened.
    ///
    /// The throttle lock is held across the fetch, so concurrent callers wait
    /// for one refresh instead of each fetching. A failed fetch leaves the
    /// throttle untouched and the next call retries.
    pub async fn refresh_catalog(&self, force: bool) -> Result<bool, TomeError> {
        let mut last = self.last_refresh.lock().await;
        let now = self.clock.now();
        if !force {
            if let Some(at) = *last {
                if now - at < self.refresh_interval {
                    debug!(last_refresh = %at, "catalog refresh throttled");
                    return Ok(false);
                }
            }
        }

        self.refresh_now().await?;
        *last = Some(now);
        Ok(true)
    }

    async fn refresh_now(&self) -> Result<ReconcileSummary, TomeError> {
        let catalog = self.fetcher.fetch(&self.repositories).await?;
        self.reconciler.reconcile(catalog).await
    }

    /// Every registry record, after a throttled refresh.
    ///
    /// A failed refresh is logged; the stored registry is still returned.
    pub async fn list_extensions(&self) -> Result<Vec<ExtensionView>, TomeError> {
        if let Err(e) = self.refresh_catalog(false).await {
            warn!(error = %e, "catalog refresh failed, serving stored registry");
        }
        let records = extensions::fetch_all(&self.db).await?;
        Ok(records.iter().map(ExtensionView::from).collect())
    }

    pub async fn install_extension(
        &self,
        pkg_name: &str,
        force: bool,
    ) -> Result<InstallOutcome, TomeError> {
        self.installer.install(pkg_name, force).await
    }

    /// Install an uploaded artifact.
    pub async fn install_external(
        &self,
        artifact_name: &str,
        bytes: Vec<u8>,
    ) -> Result<InstallOutcome, TomeError> {
        self.installer.install_external(artifact_name, bytes).await
    }

    pub async fn uninstall_extension(&self, pkg_name: &str) -> Result<(), TomeError> {
        self.installer.uninstall(pkg_name).await
    }

    pub async fn update_extension(&self, pkg_name: &str) -> Result<InstallOutcome, TomeError> {
        self.installer.update(pkg_name).await
    }

    pub async fn list_sources(&self) -> Result<Vec<SourceView>, TomeError> {
        let rows = sources::fetch_all_with_extensions(&self.db).await?;
        Ok(rows.iter().map(|(s, e)| SourceView::new(s, e)).collect())
    }

    pub async fn get_source(&self, source_id: SourceId) -> Result<SourceView, TomeError> {
        let (source, extension) = sources::fetch_with_extension(&self.db, source_id)
            .await?
            .ok_or(TomeError::SourceNotFound(source_id))?;
        Ok(SourceView::new(&source, &extension))
    }

    /// A live handle for `source_id`, loading its module on first use.
    pub async fn resolve_source(&self, source_id: SourceId) -> Result<Arc<dyn SourceHandle>, TomeError> {
        if let Some(handle) = self.cache.cached(source_id) {
            return Ok(handle);
        }
        // Taken before the read so an uninstall racing it cannot leave a
        // handle for the removed module in the cache.
        let generation = self.cache.generation();
        let (source, extension) = sources::fetch_with_extension(&self.db, source_id)
            .await?
            .ok_or(TomeError::SourceNotFound(source_id))?;
        self.cache.resolve(&source, &extension, generation).await
    }

    /// Icon bytes and content type for the extension published as
    /// `artifact_name`.
    pub async fn get_extension_icon(
        &self,
        artifact_name: &str,
    ) -> Result<(Vec<u8>, &'static str), TomeError> {
        let record = extensions::fetch_by_artifact(&self.db, artifact_name)
            .await?
            .ok_or_else(|| TomeError::ExtensionNotFound(artifact_name.to_string()))?;
        self.icons.get(artifact_name, &record.icon_url).await
    }

    /// Staged updates, sorted by package id.
    pub fn pending_updates(&self) -> Vec<CatalogEntry> {
        self.pending.snapshot()
    }

    pub fn cache(&self) -> &SourceCache {
        &self.cache
    }

    pub fn installer(&self) -> &Installer {
        &self.installer
    }

    /// Drop every cached module and resolved source.
    pub fn clear_cache(&self) {
        self.cache.clear();
        info!("source cache cleared");
    }
}
