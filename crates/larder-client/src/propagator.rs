use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use larder_store::{Debouncer, MergeableStore, StoreEvent};
use larder_types::models::{ListSnapshot, ListValues, SnapshotTables};

use crate::index_store::IndexStore;
use crate::schema::{COLLABORATORS_TABLE, ITEMS_TABLE};

/// Copies a list's values and tables into its index row, debounced.
///
/// After a burst of edits settles for the debounce window, the index row's
/// snapshot reflects the latest state. Nothing is written after `stop`.
pub struct SnapshotPropagator {
    debouncer: Arc<Debouncer<String>>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SnapshotPropagator {
    pub fn start(list: Arc<MergeableStore>, list_id: &str, index: Arc<IndexStore>, window: Duration) -> Self {
        let target = list_id.to_string();
        let debouncer = Arc::new(Debouncer::new(window, move |snapshot: String| {
            let index = index.clone();
            let list_id = target.clone();
            async move {
                match index.write_snapshot(&list_id, &snapshot) {
                    Ok(true) => trace!("Snapshot of {} propagated", list_id),
                    Ok(false) => debug!("Index row of {} is gone, dropping snapshot", list_id),
                    Err(e) => warn!("Failed to propagate snapshot of {}: {}", list_id, e),
                }
            }
        }));

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let pending = debouncer.clone();
        let list_id = list_id.to_string();
        let mut events = list.subscribe();

        let task = tokio::spawn(async move {
            loop {
                let relevant = tokio::select! {
                    _ = token.cancelled() => break,
                    event = events.recv() => match event {
                        Ok(event) => affects_snapshot(&event),
                        Err(RecvError::Lagged(_)) => true,
                        Err(RecvError::Closed) => break,
                    },
                };
                if !relevant {
                    continue;
                }
                match build_snapshot(&list, &list_id) {
                    Ok(snapshot) => pending.call(snapshot),
                    Err(e) => warn!("Failed to encode snapshot of {}: {}", list_id, e),
                }
            }
        });

        Self {
            debouncer,
            cancel,
            task: Mutex::new(Some(task)),
        }
    }

    /// Discard any pending snapshot and stop listening.
    pub fn stop(&self) {
        self.debouncer.cancel();
        self.cancel.cancel();
        if let Some(task) = self.task.lock().expect("propagator lock poisoned").take() {
            task.abort();
        }
    }
}

impl Drop for SnapshotPropagator {
    fn drop(&mut self) {
        self.stop();
    }
}

fn affects_snapshot(event: &StoreEvent) -> bool {
    event.touches_values() || event.touches_table(ITEMS_TABLE) || event.touches_table(COLLABORATORS_TABLE)
}

/// `{tables: {items, collaborators}, values: {..., listId}}` of a list.
pub fn build_snapshot(list: &MergeableStore, list_id: &str) -> serde_json::Result<String> {
    let mut values = ListValues::from_values(&list.get_values());
    values.list_id = list_id.to_string();
    ListSnapshot {
        tables: SnapshotTables {
            items: list.get_table(ITEMS_TABLE),
            collaborators: list.get_table(COLLABORATORS_TABLE),
        },
        values,
    }
    .to_json()
}
