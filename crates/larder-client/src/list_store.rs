use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, info};
use uuid::Uuid;

use larder_db::{LoadOutcome, Persister};
use larder_store::{CellValue, Content, MergeableStore, Relationships, Row, Values};
use larder_types::models::{Collaborator, Item, ListValues, User, now_rfc3339};
use larder_types::store_id::list_store_id;

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::index_store::IndexStore;
use crate::persistence::open_storage;
use crate::propagator::SnapshotPropagator;
use crate::schema::{COLLABORATORS_TABLE, CREATED_BY_NICKNAME, ITEMS_TABLE, created_by_nickname, list_schema};
use crate::synchronizer::Synchronizer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListState {
    Unmounted,
    /// Local copy loaded; waiting for the first sync handshake.
    Hydrating,
    Synced,
    Disposed,
}

/// One mounted list document: its items, collaborators and metadata.
pub struct ListStore {
    list_id: String,
    store_id: String,
    user: User,
    store: Arc<MergeableStore>,
    relationships: Relationships,
    persister: Persister,
    propagator: SnapshotPropagator,
    sync: Option<Synchronizer>,
    disposed: AtomicBool,
}

impl ListStore {
    /// Mount a list: load the local copy (seeded from the index snapshot when
    /// there is none), register the user as a collaborator, then start
    /// propagating snapshots and syncing.
    pub async fn mount(
        config: &ClientConfig,
        index: Arc<IndexStore>,
        list_id: &str,
        user: &User,
    ) -> Result<Self> {
        let store_id = list_store_id(list_id);
        let store = Arc::new(MergeableStore::new(list_schema()));
        let relationships = Relationships::new(store.clone()).define(created_by_nickname());

        // Values only: item rows arrive through sync with their own stamps.
        let seed = index
            .snapshot(list_id)
            .filter(|snapshot| snapshot.is_named())
            .map(|snapshot| {
                let mut values = snapshot.values;
                values.list_id = list_id.to_string();
                Content {
                    tables: Default::default(),
                    values: values.to_values(),
                }
            });

        let storage = open_storage(config, &store_id)?;
        let persister =
            Persister::new(store.clone(), storage).with_auto_save_delay(config.auto_save_delay);
        let outcome = persister.load(seed).await?;
        if outcome == LoadOutcome::Discarded {
            return Err(ClientError::Disposed(list_id.to_string()));
        }
        debug!("List {} loaded ({:?})", list_id, outcome);

        let propagator =
            SnapshotPropagator::start(store.clone(), list_id, index, config.snapshot_debounce);

        let me = Collaborator::for_user(user);
        store.set_row(COLLABORATORS_TABLE, &me.user_id, me.to_row())?;

        persister.start_auto_save();
        let sync = config
            .sync_options()
            .map(|options| Synchronizer::start(store.clone(), &store_id, options));

        info!("Mounted list {}", list_id);
        Ok(Self {
            list_id: list_id.to_string(),
            store_id,
            user: user.clone(),
            store,
            relationships,
            persister,
            propagator,
            sync,
            disposed: AtomicBool::new(false),
        })
    }

    pub fn list_id(&self) -> &str {
        &self.list_id
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

    pub fn state(&self) -> ListState {
        if self.disposed.load(Ordering::Acquire) {
            return ListState::Disposed;
        }
        match &self.sync {
            Some(sync) if sync.handshakes() == 0 => ListState::Hydrating,
            _ => ListState::Synced,
        }
    }

    /// Wait for the first sync handshake. Local-only lists are always synced.
    pub async fn wait_until_synced(&self, timeout: Duration) -> bool {
        match &self.sync {
            Some(sync) => sync.wait_for_first_sync(timeout).await,
            None => true,
        }
    }

    // -- Items --

    /// Add an item created by the current user. Returns its id.
    pub fn add_item(&self, name: &str, quantity: f64, units: &str, notes: &str) -> Result<String> {
        self.ensure_mounted()?;
        let id = Uuid::new_v4().to_string();
        let now = now_rfc3339();
        let row = Row::from([
            (Item::ID.to_string(), CellValue::from(&id)),
            (Item::NAME.to_string(), CellValue::from(name)),
            (Item::QUANTITY.to_string(), CellValue::from(quantity)),
            (Item::UNITS.to_string(), CellValue::from(units)),
            (Item::NOTES.to_string(), CellValue::from(notes)),
            (Item::CREATED_BY.to_string(), CellValue::from(&self.user.id)),
            (Item::CREATED_AT.to_string(), CellValue::from(&now)),
            (Item::UPDATED_AT.to_string(), CellValue::from(now)),
        ]);
        self.store.set_row(ITEMS_TABLE, &id, row)?;
        Ok(id)
    }

    pub fn delete_item(&self, item_id: &str) -> Result<()> {
        self.ensure_item(item_id)?;
        self.store.del_row(ITEMS_TABLE, item_id)?;
        Ok(())
    }

    /// Set one cell of an item and bump its `updatedAt`.
    pub fn set_item_cell(&self, item_id: &str, cell_id: &str, value: impl Into<CellValue>) -> Result<()> {
        self.ensure_item(item_id)?;
        let mut row = Row::from([(cell_id.to_string(), value.into())]);
        if cell_id != Item::UPDATED_AT {
            row.insert(Item::UPDATED_AT.to_string(), CellValue::from(now_rfc3339()));
        }
        self.store.set_partial_row(ITEMS_TABLE, item_id, row)?;
        Ok(())
    }

    pub fn item_cell(&self, item_id: &str, cell_id: &str) -> Option<CellValue> {
        self.store.get_cell(ITEMS_TABLE, item_id, cell_id)
    }

    pub fn item(&self, item_id: &str) -> Option<Item> {
        let row = self.store.get_row(ITEMS_TABLE, item_id);
        (!row.is_empty()).then(|| Item::from_row(item_id, &row))
    }

    /// Item ids sorted by `cell_id` (`createdAt` when `None`).
    pub fn item_ids_sorted(
        &self,
        cell_id: Option<&str>,
        descending: bool,
        offset: usize,
        limit: Option<usize>,
    ) -> Vec<String> {
        let cell_id = cell_id.unwrap_or(Item::CREATED_AT);
        self.store
            .sorted_row_ids(ITEMS_TABLE, cell_id, descending, offset, limit)
    }

    pub fn item_count(&self) -> usize {
        self.store.row_count(ITEMS_TABLE)
    }

    // -- Metadata --

    pub fn value(&self, value_id: &str) -> Option<CellValue> {
        self.store.get_value(value_id)
    }

    /// Set a metadata value; anything but `updatedAt` itself also bumps `updatedAt`.
    pub fn set_value(&self, value_id: &str, value: impl Into<CellValue>) -> Result<()> {
        self.ensure_mounted()?;
        let mut values = Values::from([(value_id.to_string(), value.into())]);
        if value_id != ListValues::UPDATED_AT {
            values.insert(ListValues::UPDATED_AT.to_string(), CellValue::from(now_rfc3339()));
        }
        self.store.set_partial_values(values)?;
        Ok(())
    }

    pub fn values(&self) -> ListValues {
        ListValues::from_values(&self.store.get_values())
    }

    // -- Collaborators --

    /// Everyone who has opened this list, in user id order.
    pub fn collaborators(&self) -> Vec<Collaborator> {
        self.store
            .get_table(COLLABORATORS_TABLE)
            .iter()
            .map(|(user_id, row)| Collaborator::from_row(user_id, row))
            .collect()
    }

    pub fn nicknames(&self) -> Vec<String> {
        self.collaborators()
            .into_iter()
            .map(|collaborator| collaborator.nickname)
            .collect()
    }

    /// Nickname of the collaborator who created `item_id`.
    pub fn created_by_nickname(&self, item_id: &str) -> Option<String> {
        let user_id = self.relationships.remote_row_id(CREATED_BY_NICKNAME, item_id)?;
        self.store
            .get_cell(COLLABORATORS_TABLE, &user_id, Collaborator::NICKNAME)
            .and_then(|v| v.as_str().map(str::to_string))
    }

    // -- Lifecycle --

    /// Stop propagating, syncing and auto-saving. Later writes fail with
    /// `Disposed`; reads keep working on the last state.
    pub async fn close(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.propagator.stop();
        if let Some(sync) = &self.sync {
            sync.stop().await;
        }
        self.persister.stop().await;
        info!("Unmounted list {}", self.list_id);
    }

    /// Close and remove the local copy. Server state is left alone.
    pub async fn delete(&self) -> Result<()> {
        self.close().await;
        self.persister.clear().await?;
        debug!("Cleared local copy of {}", self.list_id);
        Ok(())
    }

    fn ensure_mounted(&self) -> Result<()> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(ClientError::Disposed(self.list_id.clone()));
        }
        Ok(())
    }

    fn ensure_item(&self, item_id: &str) -> Result<()> {
        self.ensure_mounted()?;
        if !self.store.has_row(ITEMS_TABLE, item_id) {
            return Err(ClientError::UnknownItem(item_id.to_string()));
        }
        Ok(())
    }
}
