// SPDX-FileCopyrightText: 2026 Tome Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end extension lifecycle tests.
//!
//! `TestHarness` assembles an [`ExtensionManager`] over a temp SQLite
//! registry, a temp extensions directory, a [`MockTransport`] standing in for
//! the repositories, the real WASM loader wrapped in a [`CountingLoader`], and
//! a [`ManualClock`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tome_config::model::ExtensionsConfig;
use tome_core::{TomeError, module_file_name};
use tome_extension::catalog::{artifact_url, index_url};
use tome_extension::{ExtensionManager, WasmModuleLoader};
use tome_storage::Database;

use crate::artifact::{ArtifactBuilder, test_public_key_hex};
use crate::catalog::{CatalogBuilder, TEST_REPO, artifact_name};
use crate::clock::ManualClock;
use crate::loader::CountingLoader;
use crate::transport::MockTransport;
use crate::wat::source_module_wat;

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    repositories: Vec<String>,
    refresh_interval_secs: u64,
    trusted_keys: Vec<String>,
    fuel: u64,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            repositories: vec![TEST_REPO.to_string()],
            refresh_interval_secs: 60,
            trusted_keys: vec![test_public_key_hex()],
            fuel: 10_000_000,
        }
    }

    pub fn with_repositories(mut self, repositories: Vec<String>) -> Self {
        self.repositories = repositories;
        self
    }

    pub fn with_refresh_interval(mut self, secs: u64) -> Self {
        self.refresh_interval_secs = secs;
        self
    }

    pub fn with_trusted_keys(mut self, keys: Vec<String>) -> Self {
        self.trusted_keys = keys;
        self
    }

    pub async fn build(self) -> Result<TestHarness, TomeError> {
        let temp_dir = tempfile::TempDir::new()?;
        let db = Arc::new(Database::open(temp_dir.path().join("tome.db"), true).await?);

        let config = ExtensionsConfig {
            root: temp_dir.path().join("extensions").to_string_lossy().into_owned(),
            repositories: self.repositories,
            refresh_interval_secs: self.refresh_interval_secs,
            trusted_keys: self.trusted_keys,
            ..ExtensionsConfig::default()
        };

        let transport = Arc::new(MockTransport::new());
        let loader = Arc::new(CountingLoader::new(Arc::new(WasmModuleLoader::new(self.fuel)?)));
        let clock = Arc::new(ManualClock::default());

        let manager = ExtensionManager::with_components(
            Arc::clone(&db),
            &config,
            transport.clone(),
            loader.clone(),
            clock.clone(),
        )?;

        Ok(TestHarness {
            manager: Arc::new(manager),
            db,
            transport,
            loader,
            clock,
            config,
            catalogs: Mutex::new(HashMap::new()),
            _temp_dir: temp_dir,
        })
    }
}

/// A complete extension environment over temp storage.
pub struct TestHarness {
    pub manager: Arc<ExtensionManager>,
    /// Registry database (temp file, removed on drop).
    pub db: Arc<Database>,
    pub transport: Arc<MockTransport>,
    pub loader: Arc<CountingLoader>,
    pub clock: Arc<ManualClock>,
    pub config: ExtensionsConfig,
    catalogs: Mutex<HashMap<String, CatalogBuilder>>,
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Default harness with [`TEST_REPO`] configured.
    pub async fn new() -> TestHarness {
        Self::builder().build().await.expect("test harness")
    }

    pub fn modules_dir(&self) -> PathBuf {
        PathBuf::from(&self.config.root)
    }

    /// Where the module of `pkg` at `version_code` is written.
    pub fn module_path(&self, pkg: &str, version_code: i64) -> PathBuf {
        self.modules_dir()
            .join(module_file_name(&artifact_name(pkg, version_code)))
    }

    /// Publish `pkg` to [`TEST_REPO`] with a module describing `shape_json`.
    pub fn publish(&self, pkg: &str, version_code: i64, shape_json: &str) {
        let artifact = ArtifactBuilder::new(
            pkg,
            version_code,
            &source_module_wat("tome_entry", shape_json),
        );
        self.publish_artifact(TEST_REPO, pkg, version_code, artifact.build());
    }

    /// Serve `bytes` as the artifact of `pkg` and list it in `repo`'s catalog,
    /// replacing any earlier listing of `pkg`.
    pub fn publish_artifact(&self, repo: &str, pkg: &str, version_code: i64, bytes: Vec<u8>) {
        self.transport
            .insert(artifact_url(repo, &artifact_name(pkg, version_code)), bytes);
        self.edit_catalog(repo, |c| c.without(pkg).package(pkg, version_code));
    }

    /// List `pkg` in `repo`'s catalog without serving an artifact.
    pub fn list_only(&self, repo: &str, pkg: &str, version_code: i64) {
        self.edit_catalog(repo, |c| c.without(pkg).package(pkg, version_code));
    }

    /// Remove `pkg` from `repo`'s catalog.
    pub fn unpublish(&self, repo: &str, pkg: &str) {
        self.edit_catalog(repo, |c| c.without(pkg));
    }

    fn edit_catalog(&self, repo: &str, edit: impl FnOnce(CatalogBuilder) -> CatalogBuilder) {
        let mut catalogs = self.catalogs.lock().unwrap();
        let current = catalogs.remove(repo).unwrap_or_default();
        let next = edit(current);
        self.transport.insert(index_url(repo), next.build());
        catalogs.insert(repo.to_string(), next);
    }

    /// Serve an empty catalog for `repo`.
    pub fn publish_empty(&self, repo: &str) {
        self.edit_catalog(repo, |_| CatalogBuilder::new());
    }
}
