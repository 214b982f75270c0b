// SPDX-FileCopyrightText: 2026 Tome Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite registry store for the Tome extension registry.
//!
//! Provides WAL-mode SQLite storage with embedded migrations, a single-writer
//! concurrency model via `tokio-rusqlite`, [`Database::with_transaction`] for
//! atomic multi-statement work, and typed queries for extension and source
//! records.

pub mod database;
mod migrations;
pub mod models;
pub mod queries;

pub use database::Database;
pub use models::{ExtensionFlag, InstalledExtension};
