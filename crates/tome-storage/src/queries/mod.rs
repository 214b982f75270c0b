// SPDX-FileCopyrightText: 2026 Tome Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed queries for the registry tables.
//!
//! Synchronous functions take a `rusqlite::Connection` (a transaction derefs
//! to one) so they compose inside [`crate::Database::with_transaction`].
//! The `fetch_*` functions are async read shortcuts over a [`crate::Database`].

pub mod extensions;
pub mod sources;

/// Maximum number of values bound into one `IN (...)` list.
pub(crate) const IN_CHUNK: usize = 500;

/// `?, ?, ?` with `n` placeholders.
pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}
