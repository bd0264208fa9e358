use std::sync::Arc;

use anyhow::Result;

use larder_db::{Database, LocalStorage, SqliteStorage, Storage};

use crate::config::{ClientConfig, PersistenceKind};

/// Local storage for one store id, on the configured backend.
pub fn open_storage(config: &ClientConfig, store_id: &str) -> Result<Arc<dyn Storage>> {
    match config.persistence {
        PersistenceKind::Sqlite => {
            let path = config.data_dir.join(format!("{store_id}.db"));
            let db = Arc::new(Database::open(&path)?);
            Ok(Arc::new(SqliteStorage::new(db, store_id)))
        }
        PersistenceKind::LocalStorage => Ok(Arc::new(LocalStorage::new(&config.data_dir, store_id)?)),
    }
}
