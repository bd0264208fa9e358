use std::sync::Arc;

use crate::content::MergeableContent;

/// Where a committed change came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// A write issued through this replica's API.
    Local,
    /// A merge of content received from a sync peer.
    Remote,
    /// Content hydrated from durable storage.
    Persisted,
}

/// Published after every committed change, once the store lock is released.
///
/// `delta` holds exactly the cells whose value (or stamp) changed, in
/// mergeable form, so subscribers can forward it to peers unchanged.
#[derive(Debug, Clone)]
pub struct StoreEvent {
    pub origin: Origin,
    pub delta: Arc<MergeableContent>,
}

impl StoreEvent {
    pub fn touches_values(&self) -> bool {
        !self.delta.values.is_empty()
    }

    pub fn touches_table(&self, table_id: &str) -> bool {
        self.delta.tables.contains_key(table_id)
    }

    /// Row ids of `table_id` with at least one changed cell.
    pub fn changed_rows<'a>(&'a self, table_id: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.delta
            .tables
            .get(table_id)
            .into_iter()
            .flat_map(|table| table.keys().map(String::as_str))
    }
}
