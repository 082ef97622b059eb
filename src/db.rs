use log::debug;
use rusqlite::{params, Connection};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("{0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Malformed document: {0}")]
    Document(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DbError>;

/// Opens the document store and creates any missing collections.
pub fn open<P: AsRef<Path>>(path: P, busy_timeout: Duration, collections: &[&str]) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(busy_timeout)?;
    for name in collections {
        create_collection(&conn, name)?;
    }
    Ok(conn)
}

/// Collection names are validated by the config loader; they are spliced
/// into SQL as identifiers.
pub fn create_collection(conn: &Connection, name: &str) -> Result<()> {
    conn.execute(
        &format!(
            "CREATE TABLE IF NOT EXISTS {} (id INTEGER PRIMARY KEY AUTOINCREMENT, document TEXT NOT NULL)",
            name
        ),
        [],
    )?;
    Ok(())
}

/// Appends a document; returns its storage id.
pub fn insert_document<T: Serialize>(conn: &Connection, collection: &str, document: &T) -> Result<i64> {
    let json = serde_json::to_string(document)?;
    conn.execute(
        &format!("INSERT INTO {} (document) VALUES (?1)", collection),
        params![json],
    )?;
    let id = conn.last_insert_rowid();
    debug!("Inserted document {} into {}", id, collection);
    Ok(id)
}

/// Every document in a collection, oldest first. Storage ids are not part
/// of the returned documents.
pub fn all_documents(conn: &Connection, collection: &str) -> Result<Vec<Value>> {
    let mut stmt = conn.prepare(&format!("SELECT document FROM {} ORDER BY id", collection))?;
    let mut rows = stmt.query([])?;
    let mut documents = Vec::new();
    while let Some(row) = rows.next()? {
        let json: String = row.get(0)?;
        documents.push(serde_json::from_str(&json)?);
    }
    Ok(documents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn memory_store() -> Connection {
        open(":memory:", Duration::from_secs(1), &["plates_data", "sensors_data"]).unwrap()
    }

    #[test]
    fn documents_come_back_in_insertion_order() {
        let conn = memory_store();
        insert_document(&conn, "plates_data", &json!({"plate": "ABC-123"})).unwrap();
        insert_document(&conn, "plates_data", &json!({"plate": null})).unwrap();

        assert_eq!(
            all_documents(&conn, "plates_data").unwrap(),
            vec![json!({"plate": "ABC-123"}), json!({"plate": null})]
        );
    }

    #[test]
    fn collections_are_independent() {
        let conn = memory_store();
        insert_document(&conn, "sensors_data", &json!({"CO": 1})).unwrap();

        assert!(all_documents(&conn, "plates_data").unwrap().is_empty());
        assert_eq!(all_documents(&conn, "sensors_data").unwrap().len(), 1);
    }

    #[test]
    fn insert_returns_increasing_ids() {
        let conn = memory_store();
        let first = insert_document(&conn, "sensors_data", &json!({})).unwrap();
        let second = insert_document(&conn, "sensors_data", &json!({})).unwrap();
        assert!(second > first);
    }

    #[test]
    fn missing_collection_is_an_error() {
        let conn = memory_store();
        assert!(matches!(
            insert_document(&conn, "nowhere", &json!({})),
            Err(DbError::Sqlite(_))
        ));
        assert!(all_documents(&conn, "nowhere").is_err());
    }

    #[test]
    fn reopening_keeps_existing_documents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plates.db");
        {
            let conn = open(&path, Duration::from_secs(1), &["plates_data"]).unwrap();
            insert_document(&conn, "plates_data", &json!({"plate": "XYZ-789"})).unwrap();
        }
        let conn = open(&path, Duration::from_secs(1), &["plates_data"]).unwrap();
        assert_eq!(
            all_documents(&conn, "plates_data").unwrap(),
            vec![json!({"plate": "XYZ-789"})]
        );
    }
}
