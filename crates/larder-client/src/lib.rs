//! Local-first client for shared shopping lists.
//!
//! Every store (a user's index and each list document) lives in memory,
//! is persisted locally and syncs with the server independently. Writes
//! never wait on the network; replicas converge by merging.

pub mod config;
pub mod error;
pub mod index_store;
pub mod list_store;
pub mod persistence;
pub mod propagator;
pub mod schema;
pub mod session;
pub mod synchronizer;

pub use config::{ClientConfig, PersistenceKind};
pub use error::{ClientError, Result};
pub use index_store::IndexStore;
pub use list_store::{ListState, ListStore};
pub use propagator::SnapshotPropagator;
pub use session::Session;
pub use synchronizer::{SyncOptions, SyncStatus, Synchronizer, fetch_index_data};
