use crate::Database;
use anyhow::Result;
use rusqlite::OptionalExtension;

impl Database {
    pub fn read_document(&self, store_id: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            let content = conn
                .query_row(
                    "SELECT content FROM documents WHERE store_id = ?1",
                    [store_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(content)
        })
    }

    pub fn write_document(&self, store_id: &str, content: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO documents (store_id, content) VALUES (?1, ?2)
                 ON CONFLICT(store_id) DO UPDATE SET content = excluded.content, updated_at = datetime('now')",
                (store_id, content),
            )?;
            Ok(())
        })
    }

    /// Returns true if a document was removed.
    pub fn delete_document(&self, store_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute("DELETE FROM documents WHERE store_id = ?1", [store_id])?;
            Ok(removed > 0)
        })
    }

    pub fn document_ids(&self) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT store_id FROM documents ORDER BY store_id")?;
            let ids = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(ids)
        })
    }
}
