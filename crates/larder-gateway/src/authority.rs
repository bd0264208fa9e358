use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

use larder_db::{Database, LoadOutcome, PersistError, Persister, SqliteStorage};
use larder_store::{Content, MergeableContent, MergeableStore, Origin, Schema};

/// Changes one connection applied, for every other connection of the store.
#[derive(Debug, Clone)]
pub struct Relay {
    pub from: Uuid,
    pub content: Arc<MergeableContent>,
}

/// The single server-side replica of one store id.
///
/// Schemaless: the server merges whatever cells clients send and leaves
/// validation to the replicas that declared the schema.
pub struct Authority {
    store_id: String,
    store: Arc<MergeableStore>,
    persister: Persister,
    relay_tx: broadcast::Sender<Relay>,
}

impl Authority {
    /// Load the persisted copy (or start empty) and begin auto-saving.
    pub async fn load(db: Arc<Database>, store_id: &str) -> Result<Self, PersistError> {
        let store = Arc::new(MergeableStore::new(Schema::schemaless()));
        let storage = Arc::new(SqliteStorage::new(db, store_id));
        let persister = Persister::new(store.clone(), storage).with_auto_save_delay(Duration::ZERO);

        match persister.load(None).await? {
            LoadOutcome::Loaded => info!("Authority {} loaded from storage", store_id),
            outcome => debug!("Authority {} starting fresh ({:?})", store_id, outcome),
        }
        persister.start_auto_save();

        let (relay_tx, _) = broadcast::channel(256);
        Ok(Self {
            store_id: store_id.to_string(),
            store,
            persister,
            relay_tx,
        })
    }

    pub fn store_id(&self) -> &str {
        &self.store_id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Relay> {
        self.relay_tx.subscribe()
    }

    /// Full mergeable state, for a `GetContent` reply.
    pub fn mergeable_content(&self) -> MergeableContent {
        self.store.mergeable_content()
    }

    /// Live tables and values, for the read endpoint.
    pub fn snapshot(&self) -> Content {
        self.store.content()
    }

    /// Merge content from connection `from` and relay what won to the others.
    /// Returns the number of winning cells.
    pub fn apply(&self, from: Uuid, content: &MergeableContent) -> usize {
        let won = self.store.absorb_changes(content, Origin::Remote);
        let count = won.cell_count();
        if count > 0 {
            debug!("{}: {} cells from {}", self.store_id, count, from);
            let _ = self.relay_tx.send(Relay { from, content: won });
        }
        count
    }

    /// Stop auto-saving after a final save.
    pub async fn shutdown(&self) {
        self.persister.stop().await;
    }
}

#[cfg(test)]
mod tests {
    use larder_store::{MergeableStore, Schema};

    use super::*;

    fn changes(name: &str) -> MergeableContent {
        let peer = MergeableStore::new(Schema::schemaless());
        peer.set_cell("items", "i1", "name", name).unwrap();
        peer.mergeable_content()
    }

    #[tokio::test]
    async fn relays_winners_and_persists() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let authority = Authority::load(db.clone(), "shoppingListStore-a").await.unwrap();
        let mut relay = authority.subscribe();

        let from = Uuid::new_v4();
        let content = changes("Milk");
        assert_eq!(authority.apply(from, &content), 1);
        assert_eq!(authority.apply(from, &content), 0);

        let relayed = relay.recv().await.unwrap();
        assert_eq!(relayed.from, from);
        assert_eq!(relayed.content.cell_count(), 1);
        assert!(relay.try_recv().is_err());

        authority.shutdown().await;
        let reloaded = Authority::load(db, "shoppingListStore-a").await.unwrap();
        assert_eq!(
            reloaded.snapshot().tables["items"]["i1"]["name"],
            larder_store::CellValue::from("Milk")
        );
    }
}
