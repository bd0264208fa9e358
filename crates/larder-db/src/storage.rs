//! Durable backends a persister can write a store's content to.
//!
//! Both implementations are blocking; the persister calls them from
//! `spawn_blocking`.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use uuid::Uuid;

use crate::Database;

/// One store's serialized content under a fixed key.
pub trait Storage: Send + Sync {
    /// Human-readable location, for logs.
    fn describe(&self) -> String;

    fn read(&self) -> Result<Option<String>>;

    fn write(&self, content: &str) -> Result<()>;

    /// Remove the persisted copy. Missing content is not an error.
    fn clear(&self) -> Result<()>;
}

/// A row in a SQLite `documents` table (embedded database).
pub struct SqliteStorage {
    db: Arc<Database>,
    key: String,
}

impl SqliteStorage {
    pub fn new(db: Arc<Database>, key: impl Into<String>) -> Self {
        Self { db, key: key.into() }
    }
}

impl Storage for SqliteStorage {
    fn describe(&self) -> String {
        format!("sqlite:{}", self.key)
    }

    fn read(&self) -> Result<Option<String>> {
        self.db.read_document(&self.key)
    }

    fn write(&self, content: &str) -> Result<()> {
        self.db.write_document(&self.key, content)
    }

    fn clear(&self) -> Result<()> {
        self.db.delete_document(&self.key)?;
        Ok(())
    }
}

/// Browser-style local storage: one file per key under a directory.
pub struct LocalStorage {
    path: PathBuf,
}

impl LocalStorage {
    pub fn new(dir: &Path, key: &str) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("creating local storage dir {}", dir.display()))?;
        Ok(Self {
            path: dir.join(format!("{key}.json")),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Storage for LocalStorage {
    fn describe(&self) -> String {
        format!("local:{}", self.path.display())
    }

    fn read(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("reading {}", self.path.display())),
        }
    }

    fn write(&self, content: &str) -> Result<()> {
        // Write-then-rename so a crash never leaves a half-written file.
        let tmp = self.path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
        fs::write(&tmp, content).with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("removing {}", self.path.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir() -> PathBuf {
        std::env::temp_dir().join(format!("larder-db-test-{}", Uuid::new_v4().simple()))
    }

    #[test]
    fn local_storage_round_trip() {
        let dir = scratch_dir();
        let storage = LocalStorage::new(&dir, "shoppingListsStore-u1").unwrap();

        assert_eq!(storage.read().unwrap(), None);
        storage.write(r#"{"tables":{}}"#).unwrap();
        assert_eq!(storage.read().unwrap().as_deref(), Some(r#"{"tables":{}}"#));

        storage.clear().unwrap();
        storage.clear().unwrap();
        assert_eq!(storage.read().unwrap(), None);

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn sqlite_storage_keys_are_isolated() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let a = SqliteStorage::new(db.clone(), "a");
        let b = SqliteStorage::new(db, "b");

        a.write("1").unwrap();
        assert_eq!(b.read().unwrap(), None);
        assert_eq!(a.read().unwrap().as_deref(), Some("1"));
        assert_eq!(a.describe(), "sqlite:a");
    }
}
