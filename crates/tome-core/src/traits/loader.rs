// SPDX-FileCopyrightText: 2026 Tome Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Module loading and capability discovery.
//!
//! A [`ModuleLoader`] turns a module file into a [`LoadedModule`]; instantiating
//! the module's entry point yields a [`Capability`], either one source or an
//! ordered group of sources.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::TomeError;
use crate::types::SourceDescriptor;

/// A live, callable source instance.
#[async_trait]
pub trait SourceHandle: Send + Sync {
    /// Identity reported by the plugin at instantiation.
    fn descriptor(&self) -> &SourceDescriptor;

    /// Call a plugin method with JSON arguments and return its JSON result.
    async fn invoke(
        &self,
        method: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, TomeError>;
}

/// Shape of what an entry point exposes.
#[derive(Clone)]
pub enum Capability {
    Single(Arc<dyn SourceHandle>),
    /// Sources in declaration order; order defines group positions.
    Group(Vec<Arc<dyn SourceHandle>>),
}

impl Capability {
    pub fn is_group(&self) -> bool {
        matches!(self, Capability::Group(_))
    }

    /// Flatten into the ordered list of source handles.
    pub fn into_sources(self) -> Vec<Arc<dyn SourceHandle>> {
        match self {
            Capability::Single(source) => vec![source],
            Capability::Group(sources) => sources,
        }
    }

    pub fn descriptors(&self) -> Vec<SourceDescriptor> {
        match self {
            Capability::Single(source) => vec![source.descriptor().clone()],
            Capability::Group(sources) => {
                sources.iter().map(|s| s.descriptor().clone()).collect()
            }
        }
    }
}

impl std::fmt::Debug for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = if self.is_group() { "Group" } else { "Single" };
        f.debug_struct("Capability")
            .field("kind", &kind)
            .field("sources", &self.descriptors())
            .finish()
    }
}

/// A module that has been loaded and can be instantiated repeatedly.
///
/// Instantiation is blocking work; async callers run it on the blocking pool.
pub trait LoadedModule: Send + Sync {
    fn path(&self) -> &Path;

    fn instantiate(&self) -> Result<Capability, TomeError>;
}

/// Loads module files produced by the artifact installer.
pub trait ModuleLoader: Send + Sync {
    /// Load the module at `path`, checking that it exports `entry_point`.
    fn load(&self, path: &Path, entry_point: &str) -> Result<Arc<dyn LoadedModule>, TomeError>;
}
