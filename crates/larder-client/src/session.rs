//! A signed-in user's running stores.
//!
//! The session owns the index store and one mounted list store per index
//! row. Lists are mounted and unmounted explicitly (`open_list`,
//! `close_list`) and a background reconcile task keeps the mounted set
//! equal to the index rows as rows arrive from, or vanish on, other devices.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use larder_store::StoreEvent;
use larder_types::models::User;

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::index_store::IndexStore;
use crate::list_store::{ListState, ListStore};
use crate::schema::LISTS_TABLE;

#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    config: ClientConfig,
    user: User,
    index: Arc<IndexStore>,

    /// list_id -> mounted list store
    lists: AsyncMutex<HashMap<String, Arc<ListStore>>>,

    closed: CancellationToken,
    reconcile_task: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    /// Open the user's index (the `guest` index without a user), mount a
    /// list store for every row and start following index changes.
    pub async fn start(config: ClientConfig, user: Option<User>) -> Result<Self> {
        let index = Arc::new(IndexStore::open(&config, user.as_ref()).await?);
        let user = user.unwrap_or_else(User::guest);
        info!("Session started for {} ({})", user.id, index.store_id());

        let inner = Arc::new(SessionInner {
            config,
            user,
            index,
            lists: AsyncMutex::new(HashMap::new()),
            closed: CancellationToken::new(),
            reconcile_task: Mutex::new(None),
        });

        // Subscribe first so rows arriving during the initial reconcile are seen.
        let events = inner.index.store().subscribe();
        inner.reconcile().await?;

        let task = tokio::spawn(follow_index(Arc::downgrade(&inner), events, inner.closed.clone()));
        *inner.reconcile_task.lock().expect("reconcile lock poisoned") = Some(task);

        Ok(Self { inner })
    }

    pub fn user(&self) -> &User {
        &self.inner.user
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn index(&self) -> &Arc<IndexStore> {
        &self.inner.index
    }

    /// Create a list and mount it. Returns the new list id.
    pub async fn create_list(&self, name: &str, description: &str, emoji: &str, color: &str) -> Result<String> {
        self.ensure_open()?;
        let list_id = self.inner.index.create_list(name, description, emoji, color)?;
        self.open_list(&list_id).await?;
        Ok(list_id)
    }

    /// Add a list shared by someone else and mount it; its content arrives
    /// through sync.
    pub async fn join_list(&self, list_id: &str) -> Result<Arc<ListStore>> {
        self.ensure_open()?;
        self.inner.index.join_list(list_id)?;
        self.open_list(list_id).await
    }

    /// Remove a list from the index, unmount it and clear its local copy.
    /// Returns false if the list was not in the index.
    pub async fn delete_list(&self, list_id: &str) -> Result<bool> {
        self.ensure_open()?;
        let removed = self.inner.index.delete_list(list_id)?;
        let mounted = self.inner.lists.lock().await.remove(list_id);
        if let Some(list) = mounted {
            list.delete().await?;
        }
        Ok(removed)
    }

    /// The mounted store of a list in the index, mounting it if needed.
    pub async fn open_list(&self, list_id: &str) -> Result<Arc<ListStore>> {
        self.ensure_open()?;
        self.inner.open_list(list_id).await
    }

    /// Unmount a list without touching its index row or local copy.
    pub async fn close_list(&self, list_id: &str) -> bool {
        let mounted = self.inner.lists.lock().await.remove(list_id);
        match mounted {
            Some(list) => {
                list.close().await;
                true
            }
            None => false,
        }
    }

    pub async fn list(&self, list_id: &str) -> Option<Arc<ListStore>> {
        self.inner.lists.lock().await.get(list_id).cloned()
    }

    pub async fn mounted_list_ids(&self) -> BTreeSet<String> {
        self.inner.lists.lock().await.keys().cloned().collect()
    }

    pub async fn list_state(&self, list_id: &str) -> ListState {
        match self.list(list_id).await {
            Some(list) => list.state(),
            None => ListState::Unmounted,
        }
    }

    /// Mount lists whose rows appeared and unmount lists whose rows vanished.
    pub async fn reconcile(&self) -> Result<()> {
        self.ensure_open()?;
        self.inner.reconcile().await
    }

    /// Unmount every list and close the index.
    pub async fn shutdown(&self) {
        if self.inner.closed.is_cancelled() {
            return;
        }
        self.inner.closed.cancel();
        if let Some(task) = self.inner.reconcile_task.lock().expect("reconcile lock poisoned").take() {
            task.abort();
        }

        let lists: Vec<_> = self.inner.lists.lock().await.drain().collect();
        for (_, list) in lists {
            list.close().await;
        }
        self.inner.index.close().await;
        info!("Session for {} shut down", self.inner.user.id);
    }

    fn ensure_open(&self) -> Result<()> {
        if self.inner.closed.is_cancelled() {
            return Err(ClientError::SessionClosed);
        }
        Ok(())
    }
}

impl SessionInner {
    async fn open_list(&self, list_id: &str) -> Result<Arc<ListStore>> {
        let mut lists = self.lists.lock().await;
        if let Some(list) = lists.get(list_id) {
            return Ok(list.clone());
        }
        if !self.index.has_list(list_id) {
            return Err(ClientError::UnknownList(list_id.to_string()));
        }

        let list = Arc::new(ListStore::mount(&self.config, self.index.clone(), list_id, &self.user).await?);
        lists.insert(list_id.to_string(), list.clone());
        Ok(list)
    }

    async fn reconcile(&self) -> Result<()> {
        let wanted: BTreeSet<String> = self.index.list_ids().into_iter().collect();

        let mut lists = self.lists.lock().await;
        let vanished: Vec<String> = lists
            .keys()
            .filter(|id| !wanted.contains(*id))
            .cloned()
            .collect();
        for list_id in vanished {
            if let Some(list) = lists.remove(&list_id) {
                debug!("Index row of {} vanished, unmounting", list_id);
                list.delete().await?;
            }
        }

        for list_id in wanted {
            if lists.contains_key(&list_id) {
                continue;
            }
            debug!("Index row of {} appeared, mounting", list_id);
            let list = ListStore::mount(&self.config, self.index.clone(), &list_id, &self.user).await?;
            lists.insert(list_id, Arc::new(list));
        }
        Ok(())
    }
}

/// Reconcile whenever the index's `lists` table changes, until the session
/// shuts down or is dropped.
async fn follow_index(
    session: Weak<SessionInner>,
    mut events: broadcast::Receiver<StoreEvent>,
    closed: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = closed.cancelled() => break,
            event = events.recv() => match event {
                Ok(event) if !event.touches_table(LISTS_TABLE) => continue,
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
        }

        let Some(inner) = session.upgrade() else { break };
        if let Err(e) = inner.reconcile().await {
            warn!("Failed to reconcile mounted lists: {}", e);
        }
    }
}
