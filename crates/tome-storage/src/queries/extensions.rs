// SPDX-FileCopyrightText: 2026 Tome Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queries over the `extensions` table.

use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use tome_core::{CatalogEntry, ExtensionRecord, TomeError};

use crate::database::Database;
use crate::models::{ExtensionFlag, InstalledExtension};
use crate::queries::{IN_CHUNK, placeholders};

const COLUMNS: &str = "id, pkg_name, name, version_code, version_name, lang, is_nsfw, \
                       repo_url, icon_url, artifact_name, entry_point, is_installed, \
                       has_update, is_obsolete";

const NOW: &str = "strftime('%Y-%m-%dT%H:%M:%fZ', 'now')";

fn from_row(row: &Row<'_>) -> rusqlite::Result<ExtensionRecord> {
    Ok(ExtensionRecord {
        id: row.get(0)?,
        pkg_name: row.get(1)?,
        name: row.get(2)?,
        version_code: row.get(3)?,
        version_name: row.get(4)?,
        lang: row.get(5)?,
        is_nsfw: row.get(6)?,
        repo_url: row.get(7)?,
        icon_url: row.get(8)?,
        artifact_name: row.get(9)?,
        entry_point: row.get(10)?,
        is_installed: row.get(11)?,
        has_update: row.get(12)?,
        is_obsolete: row.get(13)?,
    })
}

/// Every record, ordered by name.
pub fn list_all(conn: &Connection) -> rusqlite::Result<Vec<ExtensionRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM extensions ORDER BY name COLLATE NOCASE, pkg_name"
    ))?;
    let rows = stmt.query_map([], from_row)?;
    rows.collect()
}

pub fn find_by_pkg(conn: &Connection, pkg_name: &str) -> rusqlite::Result<Option<ExtensionRecord>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM extensions WHERE pkg_name = ?1"),
        params![pkg_name],
        from_row,
    )
    .optional()
}

pub fn find_by_id(conn: &Connection, id: i64) -> rusqlite::Result<Option<ExtensionRecord>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM extensions WHERE id = ?1"),
        params![id],
        from_row,
    )
    .optional()
}

/// Insert catalog entries as new, not-installed records.
pub fn insert_entries<'a>(
    conn: &Connection,
    entries: impl IntoIterator<Item = &'a CatalogEntry>,
) -> rusqlite::Result<usize> {
    let mut stmt = conn.prepare(
        "INSERT INTO extensions
         (pkg_name, name, version_code, version_name, lang, is_nsfw, repo_url, icon_url,
          artifact_name, is_installed, has_update, is_obsolete)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, 0, 0)",
    )?;
    let mut count = 0;
    for e in entries {
        count += stmt.execute(params![
            e.pkg_name,
            e.name,
            e.version_code,
            e.version_name,
            e.lang,
            e.is_nsfw,
            e.repo_url,
            e.icon_url,
            e.artifact_name,
        ])?;
    }
    Ok(count)
}

/// Overwrite every descriptive field of not-installed records from the catalog.
pub fn overwrite_entries<'a>(
    conn: &Connection,
    entries: impl IntoIterator<Item = &'a CatalogEntry>,
) -> rusqlite::Result<usize> {
    let mut stmt = conn.prepare(&format!(
        "UPDATE extensions
         SET name = ?2, version_code = ?3, version_name = ?4, lang = ?5, is_nsfw = ?6,
             repo_url = ?7, icon_url = ?8, artifact_name = ?9, updated_at = {NOW}
         WHERE pkg_name = ?1"
    ))?;
    let mut count = 0;
    for e in entries {
        count += stmt.execute(params![
            e.pkg_name,
            e.name,
            e.version_code,
            e.version_name,
            e.lang,
            e.is_nsfw,
            e.repo_url,
            e.icon_url,
            e.artifact_name,
        ])?;
    }
    Ok(count)
}

/// Refresh the icon and repository URL of installed records.
pub fn refresh_links<'a>(
    conn: &Connection,
    entries: impl IntoIterator<Item = &'a CatalogEntry>,
) -> rusqlite::Result<usize> {
    let mut stmt = conn.prepare(&format!(
        "UPDATE extensions SET icon_url = ?2, repo_url = ?3, updated_at = {NOW}
         WHERE pkg_name = ?1"
    ))?;
    let mut count = 0;
    for e in entries {
        count += stmt.execute(params![e.pkg_name, e.icon_url, e.repo_url])?;
    }
    Ok(count)
}

/// Set `flag` to `value` on every listed package.
pub fn set_flag(
    conn: &Connection,
    flag: ExtensionFlag,
    value: bool,
    pkg_names: &[String],
) -> rusqlite::Result<usize> {
    let mut count = 0;
    for chunk in pkg_names.chunks(IN_CHUNK) {
        let sql = format!(
            "UPDATE extensions SET {col} = {v}, updated_at = {NOW} WHERE pkg_name IN ({ph})",
            col = flag.column(),
            v = i32::from(value),
            ph = placeholders(chunk.len()),
        );
        count += conn.execute(&sql, params_from_iter(chunk))?;
    }
    Ok(count)
}

/// Delete every listed package.
pub fn delete_by_pkg(conn: &Connection, pkg_names: &[String]) -> rusqlite::Result<usize> {
    let mut count = 0;
    for chunk in pkg_names.chunks(IN_CHUNK) {
        let sql = format!(
            "DELETE FROM extensions WHERE pkg_name IN ({})",
            placeholders(chunk.len())
        );
        count += conn.execute(&sql, params_from_iter(chunk))?;
    }
    Ok(count)
}

pub fn delete_by_id(conn: &Connection, id: i64) -> rusqlite::Result<usize> {
    conn.execute("DELETE FROM extensions WHERE id = ?1", params![id])
}

/// Record a successful install, inserting the row if the package is unknown.
///
/// On an existing row only the artifact, entry point, and version fields are
/// replaced; the catalog's name and language stay, so an uninstall returns the
/// row to its pre-install state. A new row takes every field from `ext`.
/// Returns the row id.
pub fn upsert_installed(conn: &Connection, ext: &InstalledExtension) -> rusqlite::Result<i64> {
    conn.execute(
        &format!(
            "INSERT INTO extensions
             (pkg_name, name, version_code, version_name, lang, is_nsfw, repo_url, icon_url,
              artifact_name, entry_point, is_installed, has_update, is_obsolete)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 1, 0, 0)
             ON CONFLICT(pkg_name) DO UPDATE SET
                 artifact_name = excluded.artifact_name,
                 entry_point = excluded.entry_point,
                 version_code = excluded.version_code,
                 version_name = excluded.version_name,
                 is_installed = 1,
                 updated_at = {NOW}"
        ),
        params![
            ext.pkg_name,
            ext.name,
            ext.version_code,
            ext.version_name,
            ext.lang,
            ext.is_nsfw,
            ext.repo_url,
            ext.icon_url,
            ext.artifact_name,
            ext.entry_point,
        ],
    )?;
    conn.query_row(
        "SELECT id FROM extensions WHERE pkg_name = ?1",
        params![ext.pkg_name],
        |row| row.get(0),
    )
}

/// Return a record to the not-installed state.
pub fn mark_uninstalled(conn: &Connection, id: i64) -> rusqlite::Result<usize> {
    conn.execute(
        &format!(
            "UPDATE extensions
             SET is_installed = 0, has_update = 0, entry_point = NULL, updated_at = {NOW}
             WHERE id = ?1"
        ),
        params![id],
    )
}

/// Overwrite descriptive fields from a staged update and clear `has_update`.
pub fn apply_update(conn: &Connection, entry: &CatalogEntry) -> rusqlite::Result<usize> {
    conn.execute(
        &format!(
            "UPDATE extensions
             SET name = ?2, version_code = ?3, version_name = ?4, lang = ?5, is_nsfw = ?6,
                 repo_url = ?7, icon_url = ?8, artifact_name = ?9, has_update = 0,
                 updated_at = {NOW}
             WHERE pkg_name = ?1"
        ),
        params![
            entry.pkg_name,
            entry.name,
            entry.version_code,
            entry.version_name,
            entry.lang,
            entry.is_nsfw,
            entry.repo_url,
            entry.icon_url,
            entry.artifact_name,
        ],
    )
}

pub async fn fetch_all(db: &Database) -> Result<Vec<ExtensionRecord>, TomeError> {
    db.call(|conn| list_all(conn)).await
}

pub async fn fetch_by_pkg(db: &Database, pkg_name: &str) -> Result<Option<ExtensionRecord>, TomeError> {
    let pkg_name = pkg_name.to_string();
    db.call(move |conn| find_by_pkg(conn, &pkg_name)).await
}

pub async fn fetch_by_artifact(
    db: &Database,
    artifact_name: &str,
) -> Result<Option<ExtensionRecord>, TomeError> {
    let artifact_name = artifact_name.to_string();
    db.call(move |conn| {
        conn.query_row(
            &format!("SELECT {COLUMNS} FROM extensions WHERE artifact_name = ?1"),
            params![artifact_name],
            from_row,
        )
        .optional()
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(pkg: &str, code: i64) -> CatalogEntry {
        CatalogEntry {
            pkg_name: pkg.into(),
            name: format!("Name {pkg}"),
            version_code: code,
            version_name: format!("1.4.{code}"),
            lang: "en".into(),
            is_nsfw: false,
            artifact_name: format!("{pkg}-v1.4.{code}.tar.gz"),
            icon_url: format!("https://repo.example/icon/{pkg}.png"),
            repo_url: "https://repo.example".into(),
        }
    }

    fn installed(pkg: &str, code: i64) -> InstalledExtension {
        InstalledExtension {
            pkg_name: pkg.into(),
            name: "Installed".into(),
            version_code: code,
            version_name: format!("1.4.{code}"),
            lang: "all".into(),
            is_nsfw: false,
            artifact_name: format!("{pkg}-v1.4.{code}.tar.gz"),
            entry_point: "tome_entry".into(),
            icon_url: String::new(),
            repo_url: None,
        }
    }

    async fn db() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    #[tokio::test]
    async fn insert_and_list() {
        let db = db().await;
        let entries = vec![entry("b", 1), entry("a", 2)];
        let n = db
            .with_transaction(move |tx| insert_entries(tx, &entries))
            .await
            .unwrap();
        assert_eq!(n, 2);

        let all = fetch_all(&db).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].pkg_name, "a");
        assert!(!all[0].is_installed && !all[0].has_update && !all[0].is_obsolete);
        assert_eq!(all[0].entry_point, None);
    }

    #[tokio::test]
    async fn set_flag_and_delete_span_chunks() {
        let db = db().await;
        let entries: Vec<_> = (0..(IN_CHUNK + 7))
            .map(|i| entry(&format!("pkg{i}"), 1))
            .collect();
        let pkgs: Vec<String> = entries.iter().map(|e| e.pkg_name.clone()).collect();
        let pkgs2 = pkgs.clone();

        let flagged = db
            .with_transaction(move |tx| {
                insert_entries(tx, &entries)?;
                set_flag(tx, ExtensionFlag::Obsolete, true, &pkgs)
            })
            .await
            .unwrap();
        assert_eq!(flagged, IN_CHUNK + 7);

        let deleted = db
            .with_transaction(move |tx| delete_by_pkg(tx, &pkgs2))
            .await
            .unwrap();
        assert_eq!(deleted, IN_CHUNK + 7);
        assert!(fetch_all(&db).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn upsert_installed_keeps_catalog_fields_on_existing_row() {
        let db = db().await;
        let seed = vec![entry("a", 3)];
        db.with_transaction(move |tx| insert_entries(tx, &seed))
            .await
            .unwrap();

        let id = db
            .with_transaction(|tx| upsert_installed(tx, &installed("a", 3)))
            .await
            .unwrap();
        let rec = fetch_by_pkg(&db, "a").await.unwrap().unwrap();
        assert_eq!(rec.id, id);
        assert!(rec.is_installed);
        assert_eq!(rec.name, "Name a");
        assert_eq!(rec.lang, "en");
        assert_eq!(rec.entry_point.as_deref(), Some("tome_entry"));

        db.with_transaction(move |tx| mark_uninstalled(tx, id))
            .await
            .unwrap();
        let rec = fetch_by_pkg(&db, "a").await.unwrap().unwrap();
        assert!(!rec.is_installed);
        assert_eq!(rec.entry_point, None);
        assert_eq!(rec.version_code, 3);
    }

    #[tokio::test]
    async fn upsert_installed_inserts_unknown_package() {
        let db = db().await;
        db.with_transaction(|tx| upsert_installed(tx, &installed("ext", 5)))
            .await
            .unwrap();
        let rec = fetch_by_artifact(&db, "ext-v1.4.5.tar.gz")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rec.pkg_name, "ext");
        assert_eq!(rec.repo_url, None);
        assert_eq!(rec.lang, "all");
    }

    #[tokio::test]
    async fn apply_update_clears_has_update() {
        let db = db().await;
        db.with_transaction(|tx| {
            upsert_installed(tx, &installed("a", 3))?;
            set_flag(tx, ExtensionFlag::HasUpdate, true, &["a".to_string()])
        })
        .await
        .unwrap();
        assert!(fetch_by_pkg(&db, "a").await.unwrap().unwrap().has_update);

        let next = entry("a", 4);
        db.with_transaction(move |tx| apply_update(tx, &next))
            .await
            .unwrap();
        let rec = fetch_by_pkg(&db, "a").await.unwrap().unwrap();
        assert!(!rec.has_update);
        assert_eq!(rec.version_code, 4);
        assert_eq!(rec.artifact_name, "a-v1.4.4.tar.gz");
    }
}
