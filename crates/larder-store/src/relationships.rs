//! Derived, read-only links from rows of one table to rows of another.
//!
//! A relationship maps each local row to the remote row id held in one of
//! its cells (e.g. an item's `createdBy` to a collaborator row). The index
//! subscribes to the store's events and catches up on every read, so it is
//! never persisted and never stale.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::debug;

use crate::events::StoreEvent;
use crate::store::MergeableStore;

#[derive(Debug, Clone)]
pub struct RelationshipDefinition {
    pub name: String,
    pub local_table: String,
    pub remote_table: String,
    pub local_cell: String,
}

impl RelationshipDefinition {
    pub fn new(name: &str, local_table: &str, remote_table: &str, local_cell: &str) -> Self {
        Self {
            name: name.to_string(),
            local_table: local_table.to_string(),
            remote_table: remote_table.to_string(),
            local_cell: local_cell.to_string(),
        }
    }
}

struct Index {
    events: broadcast::Receiver<StoreEvent>,
    /// relationship name -> local row id -> remote row id
    links: BTreeMap<String, BTreeMap<String, String>>,
}

pub struct Relationships {
    store: Arc<MergeableStore>,
    definitions: BTreeMap<String, RelationshipDefinition>,
    index: Mutex<Index>,
}

impl Relationships {
    pub fn new(store: Arc<MergeableStore>) -> Self {
        let events = store.subscribe();
        Self {
            store,
            definitions: BTreeMap::new(),
            index: Mutex::new(Index {
                events,
                links: BTreeMap::new(),
            }),
        }
    }

    pub fn define(mut self, definition: RelationshipDefinition) -> Self {
        let links = self.compute(&definition);
        self.index
            .get_mut()
            .expect("relationship lock poisoned")
            .links
            .insert(definition.name.clone(), links);
        self.definitions.insert(definition.name.clone(), definition);
        self
    }

    /// Remote row a local row points at, if the relationship and link exist.
    pub fn remote_row_id(&self, name: &str, local_row_id: &str) -> Option<String> {
        let mut index = self.index.lock().expect("relationship lock poisoned");
        self.catch_up(&mut index);
        index.links.get(name)?.get(local_row_id).cloned()
    }

    /// Every local row pointing at `remote_row_id`, in row id order.
    pub fn local_row_ids(&self, name: &str, remote_row_id: &str) -> Vec<String> {
        let mut index = self.index.lock().expect("relationship lock poisoned");
        self.catch_up(&mut index);
        index
            .links
            .get(name)
            .map(|links| {
                links
                    .iter()
                    .filter(|(_, remote)| remote.as_str() == remote_row_id)
                    .map(|(local, _)| local.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn catch_up(&self, index: &mut Index) {
        loop {
            match index.events.try_recv() {
                Ok(event) => {
                    for definition in self.definitions.values() {
                        let links = index.links.entry(definition.name.clone()).or_default();
                        for row_id in event.changed_rows(&definition.local_table) {
                            self.relink(definition, links, row_id);
                        }
                    }
                }
                Err(TryRecvError::Lagged(skipped)) => {
                    debug!("Relationship index lagged by {} events, rebuilding", skipped);
                    for definition in self.definitions.values() {
                        index.links.insert(definition.name.clone(), self.compute(definition));
                    }
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
    }

    fn relink(
        &self,
        definition: &RelationshipDefinition,
        links: &mut BTreeMap<String, String>,
        row_id: &str,
    ) {
        let target = self
            .store
            .get_cell(&definition.local_table, row_id, &definition.local_cell)
            .and_then(|v| v.as_str().map(str::to_string));
        match target {
            Some(remote) => {
                links.insert(row_id.to_string(), remote);
            }
            None => {
                links.remove(row_id);
            }
        }
    }

    fn compute(&self, definition: &RelationshipDefinition) -> BTreeMap<String, String> {
        self.store
            .get_table(&definition.local_table)
            .into_iter()
            .filter_map(|(row_id, row)| {
                let remote = row.get(&definition.local_cell)?.as_str()?.to_string();
                Some((row_id, remote))
            })
            .collect()
    }
}
