// SPDX-FileCopyrightText: 2026 Tome Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedded registry migrations.
//!
//! SQL files under `migrations/` are compiled in with `embed_migrations!` and
//! applied every time a database is opened.

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

/// Apply pending migrations.
///
/// The outer error is a SQLite failure; the inner one is a refinery failure
/// rendered as text so the result can cross the connection thread.
pub(crate) fn run_migrations(
    conn: &mut rusqlite::Connection,
) -> Result<Result<usize, String>, rusqlite::Error> {
    Ok(embedded::migrations::runner()
        .run(conn)
        .map(|report| report.applied_migrations().len())
        .map_err(|e| e.to_string()))
}
