use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use larder_db::{Database, PersistError};

use crate::authority::Authority;

/// Lazily activated authorities, one per store id.
#[derive(Clone)]
pub struct Authorities {
    inner: Arc<AuthoritiesInner>,
}

struct AuthoritiesInner {
    db: Arc<Database>,

    /// store_id -> authority. Held across the first load so concurrent
    /// first connections share one instance.
    loaded: Mutex<HashMap<String, Arc<Authority>>>,
}

impl Authorities {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            inner: Arc::new(AuthoritiesInner {
                db,
                loaded: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// The authority for `store_id`, loading it from storage on first use.
    pub async fn get_or_load(&self, store_id: &str) -> Result<Arc<Authority>, PersistError> {
        let mut loaded = self.inner.loaded.lock().await;
        if let Some(authority) = loaded.get(store_id) {
            return Ok(authority.clone());
        }

        let authority = Arc::new(Authority::load(self.inner.db.clone(), store_id).await?);
        loaded.insert(store_id.to_string(), authority.clone());
        Ok(authority)
    }

    pub async fn loaded_count(&self) -> usize {
        self.inner.loaded.lock().await.len()
    }

    /// Final-save and drop every loaded authority.
    pub async fn shutdown(&self) {
        let drained: Vec<_> = self.inner.loaded.lock().await.drain().collect();
        info!("Shutting down {} authorities", drained.len());
        for (_, authority) in drained {
            authority.shutdown().await;
        }
    }
}
