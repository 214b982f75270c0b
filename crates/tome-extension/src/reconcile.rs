// SPDX-FileCopyrightText: 2026 Tome Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Catalog reconciliation.
//!
//! [`plan_reconcile`] decides, without touching storage, how a fetched
//! catalog changes the registry. [`Reconciler::reconcile`] applies the plan in
//! one transaction and then stages pending updates.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use tokio::sync::Mutex;
use tome_core::{CatalogEntry, ExtensionRecord, TomeError};
use tome_storage::queries::extensions;
use tome_storage::{Database, ExtensionFlag};
use tracing::{debug, info};

/// Catalog entries staged for `update`, keyed by package id.
///
/// In memory only; a restart forgets staged updates until the next refresh.
#[derive(Debug, Default)]
pub struct PendingUpdates {
    entries: DashMap<String, CatalogEntry>,
}

impl PendingUpdates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage `entry` unless an update is already staged for its package.
    pub fn stage(&self, entry: CatalogEntry) -> bool {
        match self.entries.entry(entry.pkg_name.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(entry);
                true
            }
        }
    }

    pub fn get(&self, pkg_name: &str) -> Option<CatalogEntry> {
        self.entries.get(pkg_name).map(|e| e.value().clone())
    }

    /// Remove and return the staged entry.
    pub fn take(&self, pkg_name: &str) -> Option<CatalogEntry> {
        self.entries.remove(pkg_name).map(|(_, entry)| entry)
    }

    pub fn discard(&self, pkg_name: &str) {
        self.entries.remove(pkg_name);
    }

    /// All staged entries sorted by package id.
    pub fn snapshot(&self) -> Vec<CatalogEntry> {
        let mut all: Vec<_> = self.entries.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.pkg_name.cmp(&b.pkg_name));
        all
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Registry changes implied by one catalog.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcilePlan {
    /// Packages new to the registry.
    pub inserts: Vec<CatalogEntry>,
    /// Not-installed packages whose fields are replaced from the catalog.
    pub overwrites: Vec<CatalogEntry>,
    /// Installed packages whose icon and repository URLs are refreshed.
    pub link_refreshes: Vec<CatalogEntry>,
    pub clear_obsolete: Vec<String>,
    pub mark_obsolete: Vec<String>,
    pub mark_has_update: Vec<String>,
    pub deletes: Vec<String>,
    /// Newer catalog entries of installed packages.
    pub updates: Vec<CatalogEntry>,
}

/// Counts of what a reconcile changed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    pub inserted: usize,
    pub refreshed: usize,
    pub overwritten: usize,
    pub restored: usize,
    pub obsoleted: usize,
    pub updates_found: usize,
    pub deleted: usize,
    pub staged: usize,
}

/// Decide how `catalog` changes the registry `records`.
///
/// `catalog` must already be deduplicated by package id.
pub fn plan_reconcile(records: &[ExtensionRecord], catalog: &[CatalogEntry]) -> ReconcilePlan {
    let by_pkg: HashMap<&str, &ExtensionRecord> =
        records.iter().map(|r| (r.pkg_name.as_str(), r)).collect();
    let mut plan = ReconcilePlan::default();

    for entry in catalog {
        let Some(record) = by_pkg.get(entry.pkg_name.as_str()) else {
            plan.inserts.push(entry.clone());
            continue;
        };

        if !record.is_installed {
            plan.overwrites.push(entry.clone());
            continue;
        }

        plan.link_refreshes.push(entry.clone());
        if record.is_obsolete && entry.version_code >= record.version_code {
            plan.clear_obsolete.push(entry.pkg_name.clone());
        }
        if entry.version_code > record.version_code {
            plan.mark_has_update.push(entry.pkg_name.clone());
            plan.updates.push(entry.clone());
        } else if entry.version_code < record.version_code {
            // Catalog regressed below the installed version.
            plan.mark_obsolete.push(entry.pkg_name.clone());
        }
    }

    let in_catalog: HashSet<&str> = catalog.iter().map(|e| e.pkg_name.as_str()).collect();
    for record in records {
        if in_catalog.contains(record.pkg_name.as_str()) {
            continue;
        }
        if record.is_installed {
            if !record.is_obsolete {
                plan.mark_obsolete.push(record.pkg_name.clone());
            }
        } else {
            plan.deletes.push(record.pkg_name.clone());
        }
    }

    plan
}

fn apply_plan(tx: &rusqlite::Transaction<'_>, plan: &ReconcilePlan) -> rusqlite::Result<ReconcileSummary> {
    Ok(ReconcileSummary {
        refreshed: extensions::refresh_links(tx, &plan.link_refreshes)?,
        restored: extensions::set_flag(tx, ExtensionFlag::Obsolete, false, &plan.clear_obsolete)?,
        updates_found: extensions::set_flag(tx, ExtensionFlag::HasUpdate, true, &plan.mark_has_update)?,
        obsoleted: extensions::set_flag(tx, ExtensionFlag::Obsolete, true, &plan.mark_obsolete)?,
        overwritten: extensions::overwrite_entries(tx, &plan.overwrites)?,
        inserted: extensions::insert_entries(tx, &plan.inserts)?,
        deleted: extensions::delete_by_pkg(tx, &plan.deletes)?,
        staged: 0,
    })
}

/// Applies catalogs to the registry, one at a time.
pub struct Reconciler {
    db: Arc<Database>,
    pending: Arc<PendingUpdates>,
    lock: Mutex<()>,
}

impl Reconciler {
    pub fn new(db: Arc<Database>, pending: Arc<PendingUpdates>) -> Self {
        Self {
            db,
            pending,
            lock: Mutex::new(()),
        }
    }

    /// Merge a deduplicated catalog into the registry.
    ///
    /// Serialized across callers. Either the whole plan is committed or
    /// nothing is; pending updates are staged only after commit.
    pub async fn reconcile(&self, catalog: Vec<CatalogEntry>) -> Result<ReconcileSummary, TomeError> {
        let _guard = self.lock.lock().await;

        let (mut summary, updates) = self
            .db
            .with_transaction(move |tx| {
                let records = extensions::list_all(tx)?;
                let plan = plan_reconcile(&records, &catalog);
                let summary = apply_plan(tx, &plan)?;
                Ok((summary, plan.updates))
            })
            .await?;

        for entry in updates {
            let pkg = entry.pkg_name.clone();
            if self.pending.stage(entry) {
                debug!(pkg = %pkg, "staged pending update");
                summary.staged += 1;
            }
        }

        info!(
            inserted = summary.inserted,
            refreshed = summary.refreshed,
            overwritten = summary.overwritten,
            restored = summary.restored,
            obsoleted = summary.obsoleted,
            updates_found = summary.updates_found,
            deleted = summary.deleted,
            staged = summary.staged,
            "catalog reconciled"
        );
        Ok(summary)
    }
}
