// SPDX-FileCopyrightText: 2026 Tome Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Extension lifecycle for Tome.
//!
//! This crate keeps the registry in step with remote catalogs, installs and
//! removes signed WASM extension packages, and resolves source ids to live
//! plugin handles. [`ExtensionManager`] ties the pieces together:
//!
//! - [`catalog::CatalogFetcher`] -- fetch and merge repository catalogs
//! - [`reconcile::Reconciler`] -- apply a catalog to the registry
//! - [`installer::Installer`] -- install, uninstall, and update packages
//! - [`cache::SourceCache`] -- loaded modules and resolved sources
//! - [`loader::WasmModuleLoader`] -- wasmtime-backed module loading

pub mod artifact;
pub mod cache;
pub mod catalog;
pub mod icon;
pub mod installer;
pub mod loader;
pub mod manager;
pub mod reconcile;
pub mod transport;

pub use cache::SourceCache;
pub use catalog::CatalogFetcher;
pub use loader::WasmModuleLoader;
pub use manager::ExtensionManager;
pub use reconcile::{PendingUpdates, ReconcilePlan, ReconcileSummary, Reconciler, plan_reconcile};
pub use transport::HttpTransport;
