// SPDX-FileCopyrightText: 2026 Tome Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queries over the `sources` table.

use rusqlite::{Connection, OptionalExtension, Row, params};
use tome_core::{ExtensionRecord, SourceId, SourceRecord, TomeError};

use crate::database::Database;
use crate::queries::extensions;

const COLUMNS: &str = "id, name, lang, is_nsfw, extension_id, is_grouped, group_position";

fn from_row(row: &Row<'_>) -> rusqlite::Result<SourceRecord> {
    Ok(SourceRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        lang: row.get(2)?,
        is_nsfw: row.get(3)?,
        extension_id: row.get(4)?,
        is_grouped: row.get(5)?,
        group_position: row.get(6)?,
    })
}

/// Insert all sources of one install. A duplicate id fails the statement.
pub fn insert_all(conn: &Connection, sources: &[SourceRecord]) -> rusqlite::Result<usize> {
    let mut stmt = conn.prepare(
        "INSERT INTO sources (id, name, lang, is_nsfw, extension_id, is_grouped, group_position)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;
    let mut count = 0;
    for s in sources {
        count += stmt.execute(params![
            s.id,
            s.name,
            s.lang,
            s.is_nsfw,
            s.extension_id,
            s.is_grouped,
            s.group_position,
        ])?;
    }
    Ok(count)
}

pub fn delete_for_extension(conn: &Connection, extension_id: i64) -> rusqlite::Result<usize> {
    conn.execute(
        "DELETE FROM sources WHERE extension_id = ?1",
        params![extension_id],
    )
}

pub fn list_all(conn: &Connection) -> rusqlite::Result<Vec<SourceRecord>> {
    let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM sources ORDER BY id"))?;
    let rows = stmt.query_map([], from_row)?;
    rows.collect()
}

/// Sources of one extension in group order.
pub fn list_for_extension(
    conn: &Connection,
    extension_id: i64,
) -> rusqlite::Result<Vec<SourceRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM sources WHERE extension_id = ?1
         ORDER BY group_position, id"
    ))?;
    let rows = stmt.query_map(params![extension_id], from_row)?;
    rows.collect()
}

pub fn find(conn: &Connection, id: SourceId) -> rusqlite::Result<Option<SourceRecord>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM sources WHERE id = ?1"),
        params![id],
        from_row,
    )
    .optional()
}

/// A source together with its owning extension.
pub fn find_with_extension(
    conn: &Connection,
    id: SourceId,
) -> rusqlite::Result<Option<(SourceRecord, ExtensionRecord)>> {
    let Some(source) = find(conn, id)? else {
        return Ok(None);
    };
    Ok(extensions::find_by_id(conn, source.extension_id)?.map(|ext| (source, ext)))
}

pub async fn fetch_all(db: &Database) -> Result<Vec<SourceRecord>, TomeError> {
    db.call(|conn| list_all(conn)).await
}

/// Every source paired with its owning extension.
pub async fn fetch_all_with_extensions(
    db: &Database,
) -> Result<Vec<(SourceRecord, ExtensionRecord)>, TomeError> {
    db.call(|conn| {
        let owners = extensions::list_all(conn)?;
        let sources = list_all(conn)?;
        Ok(sources
            .into_iter()
            .filter_map(|s| {
                owners
                    .iter()
                    .find(|e| e.id == s.extension_id)
                    .cloned()
                    .map(|e| (s, e))
            })
            .collect())
    })
    .await
}

pub async fn fetch_with_extension(
    db: &Database,
    id: SourceId,
) -> Result<Option<(SourceRecord, ExtensionRecord)>, TomeError> {
    db.call(move |conn| find_with_extension(conn, id)).await
}

pub async fn fetch_for_extension(
    db: &Database,
    extension_id: i64,
) -> Result<Vec<SourceRecord>, TomeError> {
    db.call(move |conn| list_for_extension(conn, extension_id))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::InstalledExtension;

    fn installed(pkg: &str) -> InstalledExtension {
        InstalledExtension {
            pkg_name: pkg.into(),
            name: pkg.into(),
            version_code: 1,
            version_name: "1.4.1".into(),
            lang: "en".into(),
            is_nsfw: false,
            artifact_name: format!("{pkg}.tar.gz"),
            entry_point: "tome_entry".into(),
            icon_url: String::new(),
            repo_url: None,
        }
    }

    fn source(id: SourceId, extension_id: i64, position: Option<u32>) -> SourceRecord {
        SourceRecord {
            id,
            name: format!("S{id}"),
            lang: "en".into(),
            is_nsfw: false,
            extension_id,
            is_grouped: position.is_some(),
            group_position: position,
        }
    }

    #[tokio::test]
    async fn insert_and_find_with_extension() {
        let db = Database::open_in_memory().await.unwrap();
        let ext_id = db
            .with_transaction(|tx| {
                let id = extensions::upsert_installed(tx, &installed("a"))?;
                insert_all(tx, &[source(20, id, Some(1)), source(10, id, Some(0))])?;
                Ok(id)
            })
            .await
            .unwrap();

        let ordered = fetch_for_extension(&db, ext_id).await.unwrap();
        assert_eq!(
            ordered.iter().map(|s| s.id).collect::<Vec<_>>(),
            vec![10, 20]
        );

        let (src, ext) = fetch_with_extension(&db, 20).await.unwrap().unwrap();
        assert_eq!(src.group_position, Some(1));
        assert_eq!(ext.pkg_name, "a");
        assert!(fetch_with_extension(&db, 99).await.unwrap().is_none());
        assert_eq!(fetch_all_with_extensions(&db).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn duplicate_source_id_rolls_back_install() {
        let db = Database::open_in_memory().await.unwrap();
        let result = db
            .with_transaction(|tx| {
                let id = extensions::upsert_installed(tx, &installed("a"))?;
                insert_all(tx, &[source(1, id, None), source(1, id, None)])
            })
            .await;
        assert!(result.is_err());
        assert!(fetch_all(&db).await.unwrap().is_empty());
        assert!(
            extensions::fetch_by_pkg(&db, "a")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn deleting_extension_cascades_to_sources() {
        let db = Database::open_in_memory().await.unwrap();
        let (a, b) = db
            .with_transaction(|tx| {
                let a = extensions::upsert_installed(tx, &installed("a"))?;
                let b = extensions::upsert_installed(tx, &installed("b"))?;
                insert_all(tx, &[source(1, a, Some(0)), source(2, a, Some(1)), source(3, b, None)])?;
                Ok((a, b))
            })
            .await
            .unwrap();

        let deleted = db
            .with_transaction(move |tx| extensions::delete_by_id(tx, a))
            .await
            .unwrap();
        assert_eq!(deleted, 1);

        let left = fetch_all(&db).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].extension_id, b);
        assert!(fetch_with_extension(&db, 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn foreign_key_rejects_orphan_source() {
        let db = Database::open_in_memory().await.unwrap();
        let result = db
            .with_transaction(|tx| insert_all(tx, &[source(1, 404, None)]))
            .await;
        assert!(result.is_err());
    }
}
