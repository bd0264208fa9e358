//! In-memory mergeable table/value store.
//!
//! Every cell carries a hybrid-logical-clock stamp, so two replicas that
//! diverged from a common ancestor can be merged in any order, any number of
//! times, and still land on the same state. There is no locking discipline
//! across replicas and no linearizability guarantee: only eventual
//! convergence.

pub mod clock;
pub mod content;
pub mod debounce;
pub mod error;
pub mod events;
pub mod relationships;
pub mod schema;
pub mod store;
pub mod value;

pub use clock::{Clock, Stamp};
pub use content::{Content, MergeableCell, MergeableContent, Row, Table, Tables, Values};
pub use debounce::Debouncer;
pub use error::{Result, StoreError};
pub use events::{Origin, StoreEvent};
pub use relationships::{RelationshipDefinition, Relationships};
pub use schema::{CellSchema, Schema};
pub use store::MergeableStore;
pub use value::{CellKind, CellValue};
