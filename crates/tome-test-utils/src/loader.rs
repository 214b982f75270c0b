// SPDX-FileCopyrightText: 2026 Tome Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Module loaders for cache and installer tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tome_core::{Capability, LoadedModule, ModuleLoader, SourceDescriptor, SourceHandle, TomeError};

/// A source that answers every call with `{"source_id", "method", "args"}`.
pub struct EchoSource {
    descriptor: SourceDescriptor,
}

impl EchoSource {
    pub fn new(descriptor: SourceDescriptor) -> Self {
        Self { descriptor }
    }
}

#[async_trait]
impl SourceHandle for EchoSource {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, method: &str, args: Value) -> Result<Value, TomeError> {
        Ok(json!({
            "source_id": self.descriptor.id,
            "method": method,
            "args": args,
        }))
    }
}

struct MockModule {
    path: PathBuf,
    descriptors: Vec<SourceDescriptor>,
}

impl LoadedModule for MockModule {
    fn path(&self) -> &Path {
        &self.path
    }

    fn instantiate(&self) -> Result<Capability, TomeError> {
        let mut handles: Vec<Arc<dyn SourceHandle>> = self
            .descriptors
            .iter()
            .cloned()
            .map(|d| Arc::new(EchoSource::new(d)) as Arc<dyn SourceHandle>)
            .collect();
        if handles.len() == 1 {
            Ok(Capability::Single(handles.remove(0)))
        } else {
            Ok(Capability::Group(handles))
        }
    }
}

/// Loader serving registered paths with [`EchoSource`]s.
///
/// A path registered with one descriptor yields `Capability::Single`; any
/// other count yields a group. Unregistered paths fail with `ModuleLoad`.
#[derive(Default)]
pub struct MockModuleLoader {
    modules: Mutex<HashMap<PathBuf, Vec<SourceDescriptor>>>,
    loads: AtomicUsize,
    delay: Mutex<Option<Duration>>,
}

impl MockModuleLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, path: impl Into<PathBuf>, descriptors: Vec<SourceDescriptor>) {
        self.modules.lock().unwrap().insert(path.into(), descriptors);
    }

    /// Sleep this long inside every load, to widen race windows.
    pub fn set_load_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl ModuleLoader for MockModuleLoader {
    fn load(&self, path: &Path, _entry_point: &str) -> Result<Arc<dyn LoadedModule>, TomeError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        let descriptors = self
            .modules
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| TomeError::ModuleLoad {
                path: path.display().to_string(),
                message: "no such module (mock)".into(),
            })?;
        Ok(Arc::new(MockModule {
            path: path.to_path_buf(),
            descriptors,
        }))
    }
}

/// Wraps a real loader and counts calls to `load`.
pub struct CountingLoader {
    inner: Arc<dyn ModuleLoader>,
    loads: AtomicUsize,
}

impl CountingLoader {
    pub fn new(inner: Arc<dyn ModuleLoader>) -> Self {
        Self {
            inner,
            loads: AtomicUsize::new(0),
        }
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl ModuleLoader for CountingLoader {
    fn load(&self, path: &Path, entry_point: &str) -> Result<Arc<dyn LoadedModule>, TomeError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.inner.load(path, entry_point)
    }
}
