// SPDX-FileCopyrightText: 2026 Tome Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Two-level cache of loaded plugin modules and resolved sources.
//!
//! Level one maps a module path to its [`LoadedUnit`], loaded at most once per
//! path under a per-path async lock. Level two maps a source id straight to
//! its handle. Both levels are rebuilt on demand from the registry, so either
//! can be dropped at any time.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::Mutex;
use tome_core::{
    ExtensionRecord, LoadedModule, ModuleLoader, SourceHandle, SourceId, SourceRecord, TomeError,
};
use tracing::{debug, info};

/// A loaded module with every source it exposes, in declaration order.
pub struct LoadedUnit {
    pub module: Arc<dyn LoadedModule>,
    pub sources: Vec<Arc<dyn SourceHandle>>,
    pub grouped: bool,
}

struct ResolvedSource {
    handle: Arc<dyn SourceHandle>,
    module_path: PathBuf,
}

type UnitSlot = Arc<Mutex<Option<Arc<LoadedUnit>>>>;

pub struct SourceCache {
    loader: Arc<dyn ModuleLoader>,
    modules_dir: PathBuf,
    units: DashMap<PathBuf, UnitSlot>,
    resolved: DashMap<SourceId, ResolvedSource>,
    /// Bumped on every eviction; resolves that started earlier must not
    /// repopulate the resolved map.
    generation: AtomicU64,
}

impl SourceCache {
    pub fn new(loader: Arc<dyn ModuleLoader>, modules_dir: impl Into<PathBuf>) -> Self {
        Self {
            loader,
            modules_dir: modules_dir.into(),
            units: DashMap::new(),
            resolved: DashMap::new(),
            generation: AtomicU64::new(0),
        }
    }

    /// Where the module of `extension` lives on disk.
    pub fn module_path(&self, extension: &ExtensionRecord) -> PathBuf {
        self.modules_dir.join(extension.module_file_name())
    }

    pub fn modules_dir(&self) -> &Path {
        &self.modules_dir
    }

    /// Handle for `source_id` if it is already resolved.
    pub fn cached(&self, source_id: SourceId) -> Option<Arc<dyn SourceHandle>> {
        self.resolved.get(&source_id).map(|r| Arc::clone(&r.handle))
    }

    /// Current eviction generation. Take it before reading the records passed
    /// to [`resolve`](Self::resolve).
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Resolve `source`, loading its module if no unit is cached.
    ///
    /// `generation` is the value of [`generation`](Self::generation) from
    /// before `source` and `extension` were read. If any eviction happened
    /// since, the handle is returned but not cached, as the records may
    /// describe a module that is already gone.
    ///
    /// Concurrent callers for the same module wait on one load. Failures are
    /// returned as `SourceUnavailable` and are not cached.
    pub async fn resolve(
        &self,
        source: &SourceRecord,
        extension: &ExtensionRecord,
        generation: u64,
    ) -> Result<Arc<dyn SourceHandle>, TomeError> {
        if let Some(handle) = self.cached(source.id) {
            return Ok(handle);
        }

        let source_id = source.id;
        let unavailable = |message: String| TomeError::SourceUnavailable { source_id, message };

        let Some(entry_point) = extension.entry_point.clone() else {
            return Err(unavailable(format!(
                "extension {} is not installed",
                extension.pkg_name
            )));
        };

        let path = self.module_path(extension);
        let unit = self
            .load_unit(&path, &entry_point)
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        let handle = select_source(&unit, source).ok_or_else(|| {
            unavailable(format!(
                "module {} does not provide source {source_id}",
                path.display()
            ))
        })?;

        self.resolved.insert(
            source_id,
            ResolvedSource {
                handle: Arc::clone(&handle),
                module_path: path,
            },
        );
        if self.generation() != generation {
            // Evicted since the records were read; drop what we just inserted.
            self.resolved
                .remove_if(&source_id, |_, r| Arc::ptr_eq(&r.handle, &handle));
        }
        Ok(handle)
    }

    async fn load_unit(&self, path: &Path, entry_point: &str) -> Result<Arc<LoadedUnit>, TomeError> {
        let slot: UnitSlot = Arc::clone(
            self.units
                .entry(path.to_path_buf())
                .or_insert_with(|| Arc::new(Mutex::new(None)))
                .value(),
        );

        let mut guard = slot.lock().await;
        if let Some(unit) = guard.as_ref() {
            return Ok(Arc::clone(unit));
        }

        let loader = Arc::clone(&self.loader);
        let owned_path = path.to_path_buf();
        let entry_point = entry_point.to_string();
        let unit = tokio::task::spawn_blocking(move || -> Result<LoadedUnit, TomeError> {
            let module = loader.load(&owned_path, &entry_point)?;
            let capability = module.instantiate()?;
            let grouped = capability.is_group();
            Ok(LoadedUnit {
                module,
                sources: capability.into_sources(),
                grouped,
            })
        })
        .await
        .map_err(|e| TomeError::Internal(format!("module load task panicked: {e}")))??;

        let unit = Arc::new(unit);
        *guard = Some(Arc::clone(&unit));
        info!(path = %path.display(), sources = unit.sources.len(), "module loaded into cache");
        Ok(unit)
    }

    /// Drop the unit for `path` and every source resolved from it.
    pub fn evict_module(&self, path: &Path) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        let had_unit = self.units.remove(path).is_some();
        let before = self.resolved.len();
        self.resolved.retain(|_, r| r.module_path != path);
        debug!(
            path = %path.display(),
            had_unit,
            resolved_dropped = before.saturating_sub(self.resolved.len()),
            "evicted module from cache"
        );
    }

    /// Drop everything.
    pub fn clear(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.units.clear();
        self.resolved.clear();
    }

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    pub fn resolved_count(&self) -> usize {
        self.resolved.len()
    }
}

/// Grouped sources are selected by position, falling back to id.
fn select_source(unit: &LoadedUnit, source: &SourceRecord) -> Option<Arc<dyn SourceHandle>> {
    let by_position = source
        .group_position
        .filter(|_| source.is_grouped)
        .and_then(|pos| unit.sources.get(pos as usize))
        .filter(|h| h.descriptor().id == source.id);
    by_position
        .or_else(|| unit.sources.iter().find(|h| h.descriptor().id == source.id))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tome_core::SourceDescriptor;
    use tome_test_utils::loader::MockModuleLoader;

    fn extension(pkg: &str) -> ExtensionRecord {
        ExtensionRecord {
            id: 1,
            pkg_name: pkg.into(),
            name: pkg.into(),
            version_code: 1,
            version_name: "1.4.1".into(),
            lang: "en".into(),
            is_nsfw: false,
            repo_url: None,
            icon_url: String::new(),
            artifact_name: format!("{pkg}.tar.gz"),
            entry_point: Some("tome_entry".into()),
            is_installed: true,
            has_update: false,
            is_obsolete: false,
        }
    }

    fn source(id: SourceId, position: Option<u32>) -> SourceRecord {
        SourceRecord {
            id,
            name: format!("S{id}"),
            lang: "en".into(),
            is_nsfw: false,
            extension_id: 1,
            is_grouped: position.is_some(),
            group_position: position,
        }
    }

    fn descriptor(id: SourceId) -> SourceDescriptor {
        SourceDescriptor {
            id,
            name: format!("S{id}"),
            lang: "en".into(),
            nsfw: false,
        }
    }

    fn setup(group: Vec<SourceDescriptor>) -> (Arc<MockModuleLoader>, SourceCache, ExtensionRecord) {
        let loader = Arc::new(MockModuleLoader::new());
        let cache = SourceCache::new(loader.clone(), "/modules");
        let ext = extension("p.a");
        loader.register(cache.module_path(&ext), group);
        (loader, cache, ext)
    }

    #[tokio::test]
    async fn resolve_loads_once_and_caches_handle() {
        let (loader, cache, ext) = setup(vec![descriptor(1), descriptor(2)]);

        let a = cache.resolve(&source(1, Some(0)), &ext, cache.generation()).await.unwrap();
        let b = cache.resolve(&source(2, Some(1)), &ext, cache.generation()).await.unwrap();
        assert_eq!(a.descriptor().id, 1);
        assert_eq!(b.descriptor().id, 2);
        assert_eq!(loader.load_count(), 1);
        assert_eq!(cache.unit_count(), 1);
        assert_eq!(cache.resolved_count(), 2);

        let again = cache.resolve(&source(1, Some(0)), &ext, cache.generation()).await.unwrap();
        assert!(Arc::ptr_eq(&a, &again));
        assert_eq!(loader.load_count(), 1);

        let echoed = again.invoke("latest", json!([1])).await.unwrap();
        assert_eq!(echoed["source_id"], 1);
    }

    #[tokio::test]
    async fn stale_group_position_falls_back_to_id() {
        let (_loader, cache, ext) = setup(vec![descriptor(10), descriptor(20)]);
        let handle = cache.resolve(&source(20, Some(0)), &ext, cache.generation()).await.unwrap();
        assert_eq!(handle.descriptor().id, 20);
    }

    #[tokio::test]
    async fn unknown_source_is_unavailable() {
        let (_loader, cache, ext) = setup(vec![descriptor(1)]);
        let err = cache.resolve(&source(9, None), &ext, cache.generation()).await.err().unwrap();
        assert!(matches!(err, TomeError::SourceUnavailable { source_id: 9, .. }));
        assert_eq!(cache.resolved_count(), 0);
    }

    #[tokio::test]
    async fn failed_load_is_not_cached() {
        let loader = Arc::new(MockModuleLoader::new());
        let cache = SourceCache::new(loader.clone(), "/modules");
        let ext = extension("p.missing");

        let err = cache.resolve(&source(1, None), &ext, cache.generation()).await.err().unwrap();
        assert!(matches!(err, TomeError::SourceUnavailable { .. }));

        loader.register(cache.module_path(&ext), vec![descriptor(1)]);
        cache.resolve(&source(1, None), &ext, cache.generation()).await.unwrap();
        assert_eq!(loader.load_count(), 2);
    }

    #[tokio::test]
    async fn evict_drops_both_levels() {
        let (loader, cache, ext) = setup(vec![descriptor(1)]);
        cache.resolve(&source(1, None), &ext, cache.generation()).await.unwrap();

        cache.evict_module(&cache.module_path(&ext));
        assert_eq!(cache.unit_count(), 0);
        assert!(cache.cached(1).is_none());

        cache.resolve(&source(1, None), &ext, cache.generation()).await.unwrap();
        assert_eq!(loader.load_count(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_resolves_share_one_load() {
        let (loader, cache, ext) = setup(vec![descriptor(1), descriptor(2)]);
        loader.set_load_delay(std::time::Duration::from_millis(50));
        let cache = Arc::new(cache);

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let cache = Arc::clone(&cache);
                let ext = ext.clone();
                tokio::spawn(async move {
                    let id = if i % 2 == 0 { 1 } else { 2 };
                    cache.resolve(&source(id, None), &ext, cache.generation()).await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(loader.load_count(), 1);
    }

    #[tokio::test]
    async fn eviction_after_records_were_read_is_not_cached() {
        let (loader, cache, ext) = setup(vec![descriptor(1)]);
        let generation = cache.generation();

        // An uninstall lands between the registry read and the load.
        cache.evict_module(&cache.module_path(&ext));

        let handle = cache.resolve(&source(1, None), &ext, generation).await.unwrap();
        assert_eq!(handle.descriptor().id, 1);
        assert!(cache.cached(1).is_none());
        assert_eq!(cache.resolved_count(), 0);
        assert_eq!(loader.load_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn eviction_during_load_is_not_cached() {
        let (loader, cache, ext) = setup(vec![descriptor(1)]);
        loader.set_load_delay(std::time::Duration::from_millis(100));
        let cache = Arc::new(cache);

        let task = {
            let cache = Arc::clone(&cache);
            let ext = ext.clone();
            let generation = cache.generation();
            tokio::spawn(async move { cache.resolve(&source(1, None), &ext, generation).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        cache.evict_module(&cache.module_path(&ext));

        task.await.unwrap().unwrap();
        assert!(cache.cached(1).is_none());
        assert_eq!(cache.resolved_count(), 0);
    }

    #[tokio::test]
    async fn not_installed_extension_is_unavailable() {
        let (_loader, cache, mut ext) = setup(vec![descriptor(1)]);
        ext.entry_point = None;
        let err = cache.resolve(&source(1, None), &ext, cache.generation()).await.err().unwrap();
        assert!(matches!(err, TomeError::SourceUnavailable { .. }));
    }
}
