use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use larder_store::{Content, Debouncer, MergeableContent, MergeableStore, Origin};

use crate::error::Result;
use crate::storage::Storage;

/// Default quiet period between a change and the auto-save that follows it.
pub const DEFAULT_AUTO_SAVE_DELAY: Duration = Duration::from_millis(50);

/// What `load` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// A persisted copy existed and was merged into the store.
    Loaded,
    /// No persisted copy; the initial content seeded the store below every
    /// real write and was saved.
    Seeded,
    /// No persisted copy and no initial content.
    Empty,
    /// The persister was stopped while the read was in flight.
    Discarded,
}

struct AutoSave {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Loads a store from durable storage and keeps it saved.
///
/// Save failures never reach the write path: the in-memory store stays
/// correct and the next successful save catches storage up.
pub struct Persister {
    store: Arc<MergeableStore>,
    storage: Arc<dyn Storage>,
    auto_save_delay: Duration,
    stopped: CancellationToken,
    auto_save: Mutex<Option<AutoSave>>,
    save_lock: Arc<tokio::sync::Mutex<()>>,
}

impl Persister {
    pub fn new(store: Arc<MergeableStore>, storage: Arc<dyn Storage>) -> Self {
        Self {
            store,
            storage,
            auto_save_delay: DEFAULT_AUTO_SAVE_DELAY,
            stopped: CancellationToken::new(),
            auto_save: Mutex::new(None),
            save_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn with_auto_save_delay(mut self, delay: Duration) -> Self {
        self.auto_save_delay = delay;
        self
    }

    pub fn store(&self) -> &Arc<MergeableStore> {
        &self.store
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.is_cancelled()
    }

    /// Hydrate the store from storage. `initial` seeds the store only when
    /// nothing is persisted yet; a malformed persisted copy counts as absent.
    pub async fn load(&self, initial: Option<Content>) -> Result<LoadOutcome> {
        let storage = self.storage.clone();
        let raw = tokio::task::spawn_blocking(move || storage.read()).await??;

        if self.is_stopped() {
            debug!("Discarding load of {} after stop", self.storage.describe());
            return Ok(LoadOutcome::Discarded);
        }

        let persisted = raw.and_then(|raw| match serde_json::from_str::<MergeableContent>(&raw) {
            Ok(content) => Some(content),
            Err(e) => {
                warn!("Malformed content in {}, ignoring: {}", self.storage.describe(), e);
                None
            }
        });

        match (persisted, initial) {
            (Some(content), _) => {
                let merged = self.store.apply_changes(&content, Origin::Persisted);
                debug!("Loaded {} cells from {}", merged, self.storage.describe());
                Ok(LoadOutcome::Loaded)
            }
            (None, Some(initial)) => {
                self.store.seed_content(initial)?;
                self.save().await?;
                debug!("Seeded {} with initial content", self.storage.describe());
                Ok(LoadOutcome::Seeded)
            }
            (None, None) => Ok(LoadOutcome::Empty),
        }
    }

    pub async fn save(&self) -> Result<()> {
        save_to(&self.store, &self.storage, &self.save_lock).await
    }

    /// Save after every burst of changes, `auto_save_delay` after it settles.
    /// Calling it again while running is a no-op.
    pub fn start_auto_save(&self) {
        let mut slot = self.auto_save.lock().expect("auto-save lock poisoned");
        if slot.is_some() || self.is_stopped() {
            return;
        }

        let mut events = self.store.subscribe();
        let store = self.store.clone();
        let storage = self.storage.clone();
        let save_lock = self.save_lock.clone();
        let delay = self.auto_save_delay;
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            let debouncer = Debouncer::new(delay, move |()| {
                let store = store.clone();
                let storage = storage.clone();
                let save_lock = save_lock.clone();
                async move {
                    if let Err(e) = save_to(&store, &storage, &save_lock).await {
                        warn!("Auto-save to {} failed: {}", storage.describe(), e);
                    }
                }
            });

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    event = events.recv() => match event {
                        Ok(_) | Err(RecvError::Lagged(_)) => debouncer.call(()),
                        Err(RecvError::Closed) => break,
                    },
                }
            }
        });

        info!("Auto-save started for {}", self.storage.describe());
        *slot = Some(AutoSave { cancel, task });
    }

    pub fn is_auto_saving(&self) -> bool {
        self.auto_save
            .lock()
            .expect("auto-save lock poisoned")
            .is_some()
    }

    /// Stop auto-saving and write a final copy. Loads still in flight are
    /// discarded when they complete.
    pub async fn stop(&self) {
        self.stopped.cancel();
        let auto_save = self.auto_save.lock().expect("auto-save lock poisoned").take();
        if let Some(auto_save) = auto_save {
            auto_save.cancel.cancel();
            let _ = auto_save.task.await;
            if let Err(e) = self.save().await {
                warn!("Final save to {} failed: {}", self.storage.describe(), e);
            }
        }
    }

    /// Remove the persisted copy.
    pub async fn clear(&self) -> Result<()> {
        let storage = self.storage.clone();
        let _guard = self.save_lock.lock().await;
        tokio::task::spawn_blocking(move || storage.clear()).await??;
        Ok(())
    }
}

impl Drop for Persister {
    fn drop(&mut self) {
        if let Ok(slot) = self.auto_save.get_mut() {
            if let Some(auto_save) = slot.take() {
                auto_save.cancel.cancel();
            }
        }
    }
}

async fn save_to(
    store: &MergeableStore,
    storage: &Arc<dyn Storage>,
    save_lock: &tokio::sync::Mutex<()>,
) -> Result<()> {
    // Serialize under the lock so saves land on disk in the order they read the store.
    let _guard = save_lock.lock().await;
    let json = serde_json::to_string(&store.mergeable_content())?;
    let storage = storage.clone();
    tokio::task::spawn_blocking(move || storage.write(&json)).await??;
    Ok(())
}
