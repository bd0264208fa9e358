use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::broadcast;
use tracing::{trace, warn};
use uuid::Uuid;

use crate::clock::{Clock, Stamp};
use crate::content::{
    Content, MergeableCell, MergeableContent, Row, Table, Tables, Values, live_row, live_table,
};
use crate::error::Result;
use crate::events::{Origin, StoreEvent};
use crate::schema::Schema;
use crate::value::CellValue;

const EVENT_CAPACITY: usize = 1024;

/// One pending cell or value write, validated but not yet stamped.
enum Write {
    Cell {
        table: String,
        row: String,
        cell: String,
        value: Option<CellValue>,
    },
    Value {
        id: String,
        value: Option<CellValue>,
    },
}

struct Inner {
    content: MergeableContent,
    clock: Clock,
}

/// A replica of one table/value document.
///
/// Local writes are validated against the schema, stamped with the replica's
/// hybrid clock and published as a `StoreEvent`. Remote content is folded in
/// with [`MergeableStore::apply_changes`]; concurrent writes to the same cell
/// resolve to the higher stamp, writes to different cells are all retained.
pub struct MergeableStore {
    schema: Schema,
    inner: RwLock<Inner>,
    events: broadcast::Sender<StoreEvent>,
}

impl MergeableStore {
    pub fn new(schema: Schema) -> Self {
        Self::with_clock(schema, Clock::new(Uuid::new_v4().simple().to_string()))
    }

    pub fn with_clock(schema: Schema, clock: Clock) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            schema,
            inner: RwLock::new(Inner {
                content: MergeableContent::default(),
                clock,
            }),
            events,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn replica(&self) -> String {
        self.read().clock.replica().to_string()
    }

    /// Receive every change committed after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    // -- Reads --

    pub fn get_cell(&self, table_id: &str, row_id: &str, cell_id: &str) -> Option<CellValue> {
        self.read()
            .content
            .cell(table_id, row_id, cell_id)
            .and_then(|c| c.value.clone())
    }

    pub fn get_row(&self, table_id: &str, row_id: &str) -> Row {
        self.read()
            .content
            .tables
            .get(table_id)
            .and_then(|t| t.get(row_id))
            .map(live_row)
            .unwrap_or_default()
    }

    pub fn has_row(&self, table_id: &str, row_id: &str) -> bool {
        !self.get_row(table_id, row_id).is_empty()
    }

    pub fn get_table(&self, table_id: &str) -> Table {
        self.read()
            .content
            .tables
            .get(table_id)
            .map(live_table)
            .unwrap_or_default()
    }

    pub fn get_tables(&self) -> Tables {
        self.read().content.to_content().tables
    }

    pub fn row_ids(&self, table_id: &str) -> Vec<String> {
        self.get_table(table_id).into_keys().collect()
    }

    pub fn row_count(&self, table_id: &str) -> usize {
        self.get_table(table_id).len()
    }

    /// Row ids ordered by one cell. Rows missing the cell sort first; ties
    /// fall back to row id order.
    pub fn sorted_row_ids(
        &self,
        table_id: &str,
        cell_id: &str,
        descending: bool,
        offset: usize,
        limit: Option<usize>,
    ) -> Vec<String> {
        let table = self.get_table(table_id);
        let mut rows: Vec<(&String, Option<&CellValue>)> =
            table.iter().map(|(id, row)| (id, row.get(cell_id))).collect();

        rows.sort_by(|(a_id, a), (b_id, b)| {
            let by_cell = match (a, b) {
                (Some(a), Some(b)) => a.sort_cmp(b),
                (None, Some(_)) => std::cmp::Ordering::Less,
                (Some(_), None) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            };
            by_cell.then_with(|| a_id.cmp(b_id))
        });
        if descending {
            rows.reverse();
        }

        rows.into_iter()
            .skip(offset)
            .take(limit.unwrap_or(usize::MAX))
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn get_value(&self, value_id: &str) -> Option<CellValue> {
        self.read()
            .content
            .values
            .get(value_id)
            .and_then(|c| c.value.clone())
    }

    pub fn get_values(&self) -> Values {
        self.read().content.to_content().values
    }

    /// Plain `{tables, values}` view of the current state.
    pub fn content(&self) -> Content {
        self.read().content.to_content()
    }

    /// Full stamped state, including tombstones.
    pub fn mergeable_content(&self) -> MergeableContent {
        self.read().content.clone()
    }

    // -- Local writes --

    pub fn set_cell(
        &self,
        table_id: &str,
        row_id: &str,
        cell_id: &str,
        value: impl Into<CellValue>,
    ) -> Result<()> {
        let value = value.into();
        self.schema.check_cell(table_id, cell_id, &value)?;
        self.commit(vec![Write::Cell {
            table: table_id.to_string(),
            row: row_id.to_string(),
            cell: cell_id.to_string(),
            value: Some(value),
        }]);
        Ok(())
    }

    /// Replace a row: given cells are written, schema defaults fill missing
    /// defaulted cells, and any other live cell is deleted.
    pub fn set_row(&self, table_id: &str, row_id: &str, row: Row) -> Result<()> {
        let mut row = row;
        for (cell_id, default) in self.schema.row_defaults(table_id) {
            row.entry(cell_id.to_string()).or_insert_with(|| default.clone());
        }
        let mut writes = self.row_writes(table_id, row_id, &row)?;
        for stale in self.get_row(table_id, row_id).into_keys() {
            if !row.contains_key(&stale) {
                writes.push(Write::Cell {
                    table: table_id.to_string(),
                    row: row_id.to_string(),
                    cell: stale,
                    value: None,
                });
            }
        }
        self.commit(writes);
        Ok(())
    }

    /// Write only the given cells of a row.
    pub fn set_partial_row(&self, table_id: &str, row_id: &str, row: Row) -> Result<()> {
        let writes = self.row_writes(table_id, row_id, &row)?;
        self.commit(writes);
        Ok(())
    }

    pub fn del_cell(&self, table_id: &str, row_id: &str, cell_id: &str) -> Result<()> {
        self.schema.check_table(table_id)?;
        self.commit(vec![Write::Cell {
            table: table_id.to_string(),
            row: row_id.to_string(),
            cell: cell_id.to_string(),
            value: None,
        }]);
        Ok(())
    }

    /// Tombstone every live cell of a row.
    pub fn del_row(&self, table_id: &str, row_id: &str) -> Result<()> {
        self.schema.check_table(table_id)?;
        let writes = self
            .get_row(table_id, row_id)
            .into_keys()
            .map(|cell| Write::Cell {
                table: table_id.to_string(),
                row: row_id.to_string(),
                cell,
                value: None,
            })
            .collect();
        self.commit(writes);
        Ok(())
    }

    pub fn set_value(&self, value_id: &str, value: impl Into<CellValue>) -> Result<()> {
        let value = value.into();
        self.schema.check_value(value_id, &value)?;
        self.commit(vec![Write::Value {
            id: value_id.to_string(),
            value: Some(value),
        }]);
        Ok(())
    }

    /// Write the given values, leaving others untouched.
    pub fn set_partial_values(&self, values: Values) -> Result<()> {
        for (id, value) in &values {
            self.schema.check_value(id, value)?;
        }
        let writes = values
            .into_iter()
            .map(|(id, value)| Write::Value { id, value: Some(value) })
            .collect();
        self.commit(writes);
        Ok(())
    }

    /// Replace all values.
    pub fn set_values(&self, values: Values) -> Result<()> {
        let stale: Vec<String> = self
            .get_values()
            .into_keys()
            .filter(|id| !values.contains_key(id))
            .collect();
        for (id, value) in &values {
            self.schema.check_value(id, value)?;
        }
        let writes = values
            .into_iter()
            .map(|(id, value)| Write::Value { id, value: Some(value) })
            .chain(stale.into_iter().map(|id| Write::Value { id, value: None }))
            .collect();
        self.commit(writes);
        Ok(())
    }

    pub fn del_value(&self, value_id: &str) -> Result<()> {
        self.commit(vec![Write::Value {
            id: value_id.to_string(),
            value: None,
        }]);
        Ok(())
    }

    /// Replace the whole document with plain content, as one batch.
    pub fn set_content(&self, content: Content) -> Result<()> {
        let mut writes = Vec::new();
        for (table_id, table) in &content.tables {
            self.schema.check_table(table_id)?;
            for (row_id, row) in table {
                writes.extend(self.row_writes(table_id, row_id, row)?);
            }
        }
        for (id, value) in &content.values {
            self.schema.check_value(id, value)?;
            writes.push(Write::Value {
                id: id.clone(),
                value: Some(value.clone()),
            });
        }

        let current = self.content();
        for (table_id, table) in &current.tables {
            for (row_id, row) in table {
                for cell_id in row.keys() {
                    let kept = content
                        .tables
                        .get(table_id)
                        .and_then(|t| t.get(row_id))
                        .is_some_and(|r| r.contains_key(cell_id));
                    if !kept {
                        writes.push(Write::Cell {
                            table: table_id.clone(),
                            row: row_id.clone(),
                            cell: cell_id.clone(),
                            value: None,
                        });
                    }
                }
            }
        }
        for id in current.values.keys() {
            if !content.values.contains_key(id) {
                writes.push(Write::Value { id: id.clone(), value: None });
            }
        }

        self.commit(writes);
        Ok(())
    }

    /// Fold plain content in below every real write. Each cell gets the zero
    /// stamp, so any stamped write, local or from a peer, wins over it.
    /// Returns the number of cells that took.
    pub fn seed_content(&self, content: Content) -> Result<usize> {
        let floor = Stamp::new(0, 0, self.replica());
        let mut seed = MergeableContent::default();
        for (table_id, table) in &content.tables {
            self.schema.check_table(table_id)?;
            for (row_id, row) in table {
                for (cell_id, value) in row {
                    self.schema.check_cell(table_id, cell_id, value)?;
                    seed.insert_cell(
                        table_id,
                        row_id,
                        cell_id,
                        MergeableCell::new(floor.clone(), Some(value.clone())),
                    );
                }
            }
        }
        for (id, value) in &content.values {
            self.schema.check_value(id, value)?;
            seed.insert_value(id, MergeableCell::new(floor.clone(), Some(value.clone())));
        }
        Ok(self.apply_changes(&seed, Origin::Persisted))
    }

    // -- Merge --

    /// Fold stamped content from a peer (or from storage) into this replica.
    ///
    /// Cells that violate a strict schema are dropped with a warning rather
    /// than failing the whole merge. Returns the number of cells that won.
    pub fn apply_changes(&self, incoming: &MergeableContent, origin: Origin) -> usize {
        self.absorb_changes(incoming, origin).cell_count()
    }

    /// Like [`MergeableStore::apply_changes`], but returns the cells that won.
    pub fn absorb_changes(&self, incoming: &MergeableContent, origin: Origin) -> Arc<MergeableContent> {
        let incoming = self.conforming(incoming);
        let won = {
            let mut inner = self.write();
            if let Some(stamp) = incoming.max_stamp() {
                inner.clock.receive(stamp);
            }
            Arc::new(inner.content.absorb(&incoming))
        };

        if !won.is_empty() {
            trace!("Merged {} cells ({:?})", won.cell_count(), origin);
            self.publish(origin, won.clone());
        }
        won
    }

    /// Merge another replica's full state into this one.
    pub fn merge(&self, other: &MergeableStore) -> usize {
        let theirs = other.mergeable_content();
        self.apply_changes(&theirs, Origin::Remote)
    }

    // -- Internals --

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().expect("store lock poisoned")
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().expect("store lock poisoned")
    }

    fn row_writes(&self, table_id: &str, row_id: &str, row: &Row) -> Result<Vec<Write>> {
        self.schema.check_table(table_id)?;
        row.iter()
            .map(|(cell_id, value)| {
                self.schema.check_cell(table_id, cell_id, value)?;
                Ok(Write::Cell {
                    table: table_id.to_string(),
                    row: row_id.to_string(),
                    cell: cell_id.clone(),
                    value: Some(value.clone()),
                })
            })
            .collect()
    }

    /// Stamp and apply a validated batch. Writes that would not change the
    /// live value are skipped so no-op writes neither publish nor sync.
    fn commit(&self, writes: Vec<Write>) {
        let delta = {
            let mut inner = self.write();
            let mut delta = MergeableContent::default();
            for write in writes {
                match write {
                    Write::Cell { table, row, cell, value } => {
                        let current = inner.content.cell(&table, &row, &cell).and_then(|c| c.value.as_ref());
                        if current == value.as_ref() {
                            continue;
                        }
                        let stamped = MergeableCell::new(inner.clock.tick(), value);
                        inner.content.insert_cell(&table, &row, &cell, stamped.clone());
                        delta.insert_cell(&table, &row, &cell, stamped);
                    }
                    Write::Value { id, value } => {
                        let current = inner.content.values.get(&id).and_then(|c| c.value.as_ref());
                        if current == value.as_ref() {
                            continue;
                        }
                        let stamped = MergeableCell::new(inner.clock.tick(), value);
                        inner.content.insert_value(&id, stamped.clone());
                        delta.insert_value(&id, stamped);
                    }
                }
            }
            delta
        };

        if !delta.is_empty() {
            self.publish(Origin::Local, Arc::new(delta));
        }
    }

    fn publish(&self, origin: Origin, delta: Arc<MergeableContent>) {
        // No receivers is fine: nothing is listening yet.
        let _ = self.events.send(StoreEvent { origin, delta });
    }

    fn conforming(&self, incoming: &MergeableContent) -> MergeableContent {
        if !self.schema.is_strict() {
            return incoming.clone();
        }
        let mut kept = MergeableContent::default();
        for (table_id, table) in &incoming.tables {
            for (row_id, row) in table {
                for (cell_id, cell) in row {
                    let valid = match &cell.value {
                        Some(v) => self.schema.check_cell(table_id, cell_id, v),
                        None => self.schema.check_table(table_id),
                    };
                    match valid {
                        Ok(()) => kept.insert_cell(table_id, row_id, cell_id, cell.clone()),
                        Err(e) => warn!("Dropping incoming cell {}/{}/{}: {}", table_id, row_id, cell_id, e),
                    }
                }
            }
        }
        for (value_id, cell) in &incoming.values {
            let valid = match &cell.value {
                Some(v) => self.schema.check_value(value_id, v),
                None => Ok(()),
            };
            match valid {
                Ok(()) => kept.insert_value(value_id, cell.clone()),
                Err(e) => warn!("Dropping incoming value {}: {}", value_id, e),
            }
        }
        kept
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::*;
    use crate::error::StoreError;
    use crate::schema::CellSchema;

    fn schema() -> Schema {
        Schema::new()
            .table(
                "items",
                [
                    ("name", CellSchema::string()),
                    ("quantity", CellSchema::number()),
                    ("notes", CellSchema::string()),
                    ("isPurchased", CellSchema::boolean().with_default(false)),
                    ("category", CellSchema::string().with_default("")),
                ],
            )
            .value("name", CellSchema::string())
            .value("emoji", CellSchema::string())
    }

    fn replica(name: &str, time: &Arc<AtomicU64>) -> MergeableStore {
        let time = time.clone();
        let clock = Clock::with_time_source(name, Arc::new(move || time.load(Ordering::SeqCst)));
        MergeableStore::with_clock(schema(), clock)
    }

    fn row(cells: &[(&str, CellValue)]) -> Row {
        cells.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    /// Two replicas sharing a base row `milk`, forked at t=100.
    fn forked() -> (MergeableStore, MergeableStore, Arc<AtomicU64>) {
        let time = Arc::new(AtomicU64::new(100));
        let a = replica("a", &time);
        a.set_row("items", "milk", row(&[("name", "Milk".into()), ("quantity", 1.into())]))
            .unwrap();
        let b = replica("b", &time);
        b.merge(&a);
        (a, b, time)
    }

    #[test]
    fn set_row_applies_defaults() {
        let time = Arc::new(AtomicU64::new(1));
        let store = replica("a", &time);
        store
            .set_row("items", "1", row(&[("name", "Bread".into())]))
            .unwrap();

        assert_eq!(store.row_count("items"), 1);
        assert_eq!(store.get_cell("items", "1", "isPurchased"), Some(false.into()));
        assert_eq!(store.get_cell("items", "1", "category"), Some("".into()));
    }

    #[test]
    fn schema_violation_is_rejected_and_not_published() {
        let time = Arc::new(AtomicU64::new(1));
        let store = replica("a", &time);
        let mut events = store.subscribe();

        let err = store.set_cell("items", "1", "quantity", "lots").unwrap_err();
        assert!(matches!(err, StoreError::TypeMismatch { .. }));
        assert!(store.set_value("colour", "red").is_err());
        assert!(store.get_table("items").is_empty());
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn round_trip_through_json() {
        let (a, _, _) = forked();
        a.set_value("name", "Groceries").unwrap();
        a.del_cell("items", "milk", "quantity").unwrap();

        let json = serde_json::to_string(&a.mergeable_content()).unwrap();
        let fresh = MergeableStore::new(schema());
        fresh.apply_changes(&serde_json::from_str(&json).unwrap(), Origin::Persisted);

        assert_eq!(fresh.mergeable_content(), a.mergeable_content());
        assert_eq!(fresh.content(), a.content());
    }

    #[test]
    fn merge_is_commutative() {
        let (a, b, time) = forked();
        time.store(200, Ordering::SeqCst);
        a.set_cell("items", "milk", "notes", "2 litres").unwrap();
        b.set_cell("items", "milk", "quantity", 3).unwrap();
        b.set_row("items", "eggs", row(&[("name", "Eggs".into())])).unwrap();

        let ab = replica("x", &time);
        ab.merge(&a);
        ab.merge(&b);
        let ba = replica("y", &time);
        ba.merge(&b);
        ba.merge(&a);

        assert_eq!(
            serde_json::to_string(&ab.mergeable_content()).unwrap(),
            serde_json::to_string(&ba.mergeable_content()).unwrap()
        );
    }

    #[test]
    fn merge_is_idempotent() {
        let (a, b, time) = forked();
        time.store(300, Ordering::SeqCst);
        b.set_cell("items", "milk", "name", "Skim").unwrap();

        a.merge(&b);
        let once = a.mergeable_content();
        assert_eq!(a.merge(&b), 0);
        assert_eq!(a.mergeable_content(), once);
    }

    #[test]
    fn disjoint_writes_are_both_kept() {
        let (a, b, time) = forked();
        time.store(200, Ordering::SeqCst);
        a.set_cell("items", "milk", "isPurchased", true).unwrap();
        b.set_cell("items", "milk", "notes", "low-fat").unwrap();

        a.merge(&b);
        b.merge(&a);

        for replica in [&a, &b] {
            assert_eq!(replica.get_cell("items", "milk", "isPurchased"), Some(true.into()));
            assert_eq!(replica.get_cell("items", "milk", "notes"), Some("low-fat".into()));
        }
    }

    #[test]
    fn later_write_to_same_cell_wins() {
        let (a, b, time) = forked();
        time.store(200, Ordering::SeqCst);
        a.set_cell("items", "milk", "name", "Milk 2%").unwrap();
        time.store(250, Ordering::SeqCst);
        b.set_cell("items", "milk", "name", "Whole milk").unwrap();

        a.merge(&b);
        b.merge(&a);

        assert_eq!(a.get_cell("items", "milk", "name"), Some("Whole milk".into()));
        assert_eq!(b.get_cell("items", "milk", "name"), Some("Whole milk".into()));
    }

    #[test]
    fn delete_merges_like_a_write() {
        let (a, b, time) = forked();
        time.store(200, Ordering::SeqCst);
        a.del_row("items", "milk").unwrap();

        b.merge(&a);
        assert!(!b.has_row("items", "milk"));
        assert_eq!(b.row_count("items"), 0);
    }

    #[test]
    fn noop_writes_do_not_publish() {
        let (a, _, _) = forked();
        let mut events = a.subscribe();
        a.set_cell("items", "milk", "name", "Milk").unwrap();
        assert!(events.try_recv().is_err());

        a.set_cell("items", "milk", "name", "Oat").unwrap();
        let event = events.try_recv().unwrap();
        assert_eq!(event.origin, Origin::Local);
        assert_eq!(event.changed_rows("items").collect::<Vec<_>>(), vec!["milk"]);
    }

    #[test]
    fn remote_merge_publishes_only_winners() {
        let (a, b, time) = forked();
        time.store(200, Ordering::SeqCst);
        b.set_cell("items", "milk", "notes", "fresh").unwrap();

        let mut events = a.subscribe();
        a.merge(&b);
        let event = events.try_recv().unwrap();
        assert_eq!(event.origin, Origin::Remote);
        assert_eq!(event.delta.cell_count(), 1);
    }

    #[test]
    fn incoming_cells_violating_schema_are_dropped() {
        let time = Arc::new(AtomicU64::new(1));
        let loose = MergeableStore::with_clock(
            Schema::schemaless(),
            Clock::with_time_source("s", Arc::new(|| 5)),
        );
        loose.set_cell("items", "1", "name", "Tea").unwrap();
        loose.set_cell("items", "1", "quantity", "many").unwrap();
        loose.set_cell("secrets", "1", "x", 1).unwrap();

        let strict = replica("a", &time);
        strict.merge(&loose);

        assert_eq!(strict.get_row("items", "1"), row(&[("name", "Tea".into())]));
        assert!(strict.get_table("secrets").is_empty());
    }

    #[test]
    fn sorted_row_ids_with_paging() {
        let time = Arc::new(AtomicU64::new(1));
        let store = replica("a", &time);
        for (id, qty) in [("a", 3), ("b", 1), ("c", 2)] {
            store.set_cell("items", id, "quantity", qty).unwrap();
        }
        store.set_cell("items", "d", "name", "no quantity").unwrap();

        assert_eq!(store.sorted_row_ids("items", "quantity", false, 0, None), vec!["d", "b", "c", "a"]);
        assert_eq!(store.sorted_row_ids("items", "quantity", true, 1, Some(2)), vec!["c", "b"]);
    }

    #[test]
    fn set_content_replaces_document() {
        let (a, _, _) = forked();
        let mut tables = BTreeMap::new();
        tables.insert(
            "items".to_string(),
            BTreeMap::from([("tea".to_string(), row(&[("name", "Tea".into())]))]),
        );
        let values = BTreeMap::from([("name".to_string(), CellValue::from("Weekly"))]);
        a.set_content(Content { tables, values }).unwrap();

        assert_eq!(a.row_ids("items"), vec!["tea"]);
        assert_eq!(a.get_value("name"), Some("Weekly".into()));
        assert_eq!(a.get_tables().len(), 1);
    }

    #[test]
    fn seeded_content_loses_to_any_stamped_write() {
        let time = Arc::new(AtomicU64::new(100));
        let writer = replica("w", &time);
        writer.set_value("name", "Renamed").unwrap();

        let fresh = replica("f", &time);
        time.store(9_000, Ordering::SeqCst);
        let values = BTreeMap::from([
            ("name".to_string(), CellValue::from("Stale")),
            ("emoji".to_string(), CellValue::from("🛒")),
        ]);
        assert_eq!(fresh.seed_content(Content { tables: Tables::new(), values }).unwrap(), 2);
        assert_eq!(fresh.get_value("name"), Some("Stale".into()));

        // The older real write still beats the newer-looking seed, both ways.
        fresh.merge(&writer);
        writer.merge(&fresh);
        assert_eq!(fresh.get_value("name"), Some("Renamed".into()));
        assert_eq!(writer.get_value("name"), Some("Renamed".into()));
        assert_eq!(writer.get_value("emoji"), Some("🛒".into()));

        let bad = BTreeMap::from([("name".to_string(), CellValue::from(3))]);
        assert!(fresh.seed_content(Content { tables: Tables::new(), values: bad }).is_err());
    }

    #[test]
    fn set_values_replaces_and_deletes_stale() {
        let (a, b, time) = forked();
        a.set_partial_values(Values::from([
            ("name".to_string(), CellValue::from("Groceries")),
            ("emoji".to_string(), CellValue::from("🛒")),
        ]))
        .unwrap();
        time.fetch_add(1, Ordering::SeqCst);
        a.set_values(Values::from([("name".to_string(), CellValue::from("Camping"))]))
            .unwrap();
        assert_eq!(a.get_values().len(), 1);
        assert_eq!(a.get_value("emoji"), None);

        b.merge(&a);
        assert_eq!(b.get_values(), a.get_values());

        a.del_value("name").unwrap();
        assert!(a.get_values().is_empty());
        assert!(a.set_values(Values::from([("name".to_string(), CellValue::from(1))])).is_err());
    }
}
