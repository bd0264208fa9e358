use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use larder_db::Persister;
use larder_store::{CellValue, MergeableStore, Row};
use larder_types::models::{ListSnapshot, ListValues, User, now_rfc3339};
use larder_types::store_id::{index_store_id, is_valid_store_id, list_store_id};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::persistence::open_storage;
use crate::schema::{LIST_ID_CELL, LISTS_TABLE, SNAPSHOT_CELL, index_schema};
use crate::synchronizer::Synchronizer;

/// A user's registry of lists: one row per list they created or joined.
///
/// Each row caches a snapshot of the list's metadata so the lists can be
/// shown without mounting every list document. Only the list's own
/// propagator writes that snapshot after creation.
pub struct IndexStore {
    store_id: String,
    store: Arc<MergeableStore>,
    persister: Persister,
    sync: Option<Synchronizer>,
}

impl IndexStore {
    /// Load the user's index from local storage and start syncing it.
    pub async fn open(config: &ClientConfig, user: Option<&User>) -> Result<Self> {
        let store_id = index_store_id(user);
        let store = Arc::new(MergeableStore::new(index_schema()));

        let storage = open_storage(config, &store_id)?;
        let persister =
            Persister::new(store.clone(), storage).with_auto_save_delay(config.auto_save_delay);
        let outcome = persister.load(None).await?;
        persister.start_auto_save();
        debug!("Index {} opened ({:?})", store_id, outcome);

        let sync = config
            .sync_options()
            .map(|options| Synchronizer::start(store.clone(), &store_id, options));

        Ok(Self {
            store_id,
            store,
            persister,
            sync,
        })
    }

    pub fn store_id(&self) -> &str {
        &self.store_id
    }

    pub fn store(&self) -> &Arc<MergeableStore> {
        &self.store
    }

    pub fn synchronizer(&self) -> Option<&Synchronizer> {
        self.sync.as_ref()
    }

    /// Add a new list with a fully formed snapshot. Returns its id.
    pub fn create_list(&self, name: &str, description: &str, emoji: &str, color: &str) -> Result<String> {
        let list_id = Uuid::new_v4().to_string();
        let now = now_rfc3339();
        let values = ListValues {
            list_id: list_id.clone(),
            name: name.to_string(),
            description: description.to_string(),
            emoji: emoji.to_string(),
            color: color.to_string(),
            created_at: now.clone(),
            updated_at: now,
        };
        let snapshot = ListSnapshot::from_values(values).to_flat_json()?;

        self.store.set_row(LISTS_TABLE, &list_id, index_row(&list_id, snapshot))?;
        info!("Created list {} ({})", list_id, name);
        Ok(list_id)
    }

    /// Add a row for a list created elsewhere, with an empty snapshot that
    /// the list's first sync fills in. Returns false if the row was already
    /// there; an existing snapshot is left alone.
    pub fn join_list(&self, list_id: &str) -> Result<bool> {
        if !is_valid_store_id(&list_store_id(list_id)) {
            return Err(ClientError::InvalidListId(list_id.to_string()));
        }
        if self.has_list(list_id) {
            return Ok(false);
        }
        self.store
            .set_row(LISTS_TABLE, list_id, index_row(list_id, ListSnapshot::EMPTY.to_string()))?;
        info!("Joined list {}", list_id);
        Ok(true)
    }

    /// Remove the list's row. Returns false if there was none.
    pub fn delete_list(&self, list_id: &str) -> Result<bool> {
        if !self.has_list(list_id) {
            return Ok(false);
        }
        self.store.del_row(LISTS_TABLE, list_id)?;
        info!("Deleted list {}", list_id);
        Ok(true)
    }

    pub fn has_list(&self, list_id: &str) -> bool {
        self.store.has_row(LISTS_TABLE, list_id)
    }

    pub fn list_ids(&self) -> Vec<String> {
        self.store.row_ids(LISTS_TABLE)
    }

    pub fn list_count(&self) -> usize {
        self.store.row_count(LISTS_TABLE)
    }

    /// The cached snapshot string, exactly as stored.
    pub fn raw_snapshot(&self, list_id: &str) -> Option<String> {
        self.store
            .get_cell(LISTS_TABLE, list_id, SNAPSHOT_CELL)
            .and_then(|v| v.as_str().map(str::to_string))
    }

    /// The cached snapshot, parsed; malformed snapshots read as empty.
    pub fn snapshot(&self, list_id: &str) -> Option<ListSnapshot> {
        self.raw_snapshot(list_id)
            .map(|raw| ListSnapshot::parse_or_default(&raw))
    }

    /// Metadata of every list, for an overview screen.
    pub fn lists_values(&self) -> BTreeMap<String, ListValues> {
        self.list_ids()
            .into_iter()
            .map(|list_id| {
                let mut values = self.snapshot(&list_id).unwrap_or_default().values;
                if values.list_id.is_empty() {
                    values.list_id = list_id.clone();
                }
                (list_id, values)
            })
            .collect()
    }

    /// Replace a row's snapshot. A row deleted in the meantime is not brought
    /// back; returns whether the write happened.
    pub fn write_snapshot(&self, list_id: &str, snapshot: &str) -> Result<bool> {
        if !self.has_list(list_id) {
            return Ok(false);
        }
        self.store.set_cell(LISTS_TABLE, list_id, SNAPSHOT_CELL, snapshot)?;
        Ok(true)
    }

    pub async fn close(&self) {
        if let Some(sync) = &self.sync {
            sync.stop().await;
        }
        self.persister.stop().await;
        debug!("Index {} closed", self.store_id);
    }
}

fn index_row(list_id: &str, snapshot: String) -> Row {
    Row::from([
        (LIST_ID_CELL.to_string(), CellValue::from(list_id)),
        (SNAPSHOT_CELL.to_string(), CellValue::from(snapshot)),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_config() -> ClientConfig {
        ClientConfig::local(std::env::temp_dir().join(format!("larder-index-{}", Uuid::new_v4().simple())))
    }

    #[tokio::test]
    async fn creating_n_lists_yields_n_rows() {
        let config = scratch_config();
        let index = IndexStore::open(&config, Some(&User::new("u1", "ana"))).await.unwrap();
        assert_eq!(index.store_id(), "shoppingListsStore-u1");

        for n in 0..5 {
            index.create_list(&format!("List {n}"), "", "🛒", "#fff").unwrap();
        }
        assert_eq!(index.list_count(), 5);
        assert_eq!(index.lists_values().len(), 5);

        index.close().await;
        std::fs::remove_dir_all(config.data_dir).ok();
    }

    #[tokio::test]
    async fn create_writes_flat_snapshot() {
        let config = scratch_config();
        let index = IndexStore::open(&config, None).await.unwrap();
        let id = index.create_list("Groceries", "weekly", "🛒", "#0f0").unwrap();

        let raw = index.raw_snapshot(&id).unwrap();
        let flat: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(flat["listId"], id.as_str());
        assert_eq!(flat["name"], "Groceries");
        assert_eq!(index.snapshot(&id).unwrap().values.emoji, "🛒");

        index.close().await;
        std::fs::remove_dir_all(config.data_dir).ok();
    }

    #[tokio::test]
    async fn join_is_idempotent_and_delete_never_resurrects() {
        let config = scratch_config();
        let index = IndexStore::open(&config, None).await.unwrap();

        assert!(index.join_list("shared-1").unwrap());
        assert_eq!(index.raw_snapshot("shared-1").as_deref(), Some("{}"));
        assert!(index.write_snapshot("shared-1", r#"{"name":"Shared"}"#).unwrap());
        assert!(!index.join_list("shared-1").unwrap());
        assert_eq!(index.snapshot("shared-1").unwrap().values.name, "Shared");

        assert!(index.delete_list("shared-1").unwrap());
        assert!(!index.delete_list("shared-1").unwrap());
        assert!(!index.write_snapshot("shared-1", "{}").unwrap());
        assert_eq!(index.list_count(), 0);

        assert!(matches!(index.join_list("../x"), Err(ClientError::InvalidListId(_))));

        index.close().await;
        std::fs::remove_dir_all(config.data_dir).ok();
    }

    #[tokio::test]
    async fn malformed_snapshot_reads_as_empty() {
        let config = scratch_config();
        let index = IndexStore::open(&config, None).await.unwrap();
        index.join_list("l1").unwrap();
        index.write_snapshot("l1", "{not json").unwrap();

        let values = index.lists_values();
        assert_eq!(values["l1"].list_id, "l1");
        assert_eq!(values["l1"].name, "");

        index.close().await;
        std::fs::remove_dir_all(config.data_dir).ok();
    }
}
