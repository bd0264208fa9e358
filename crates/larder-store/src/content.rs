//! Plain and mergeable content.
//!
//! `MergeableContent` is both the persisted form of a store and the payload
//! exchanged with sync peers. Ordered maps keep its JSON deterministic, so two
//! converged replicas serialize to identical bytes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::clock::Stamp;
use crate::value::CellValue;

pub type Row = BTreeMap<String, CellValue>;
pub type Table = BTreeMap<String, Row>;
pub type Tables = BTreeMap<String, Table>;
pub type Values = BTreeMap<String, CellValue>;

/// Plain `{tables, values}` content without stamps or tombstones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub tables: Tables,
    #[serde(default)]
    pub values: Values,
}

/// One stamped cell. `value: None` is a tombstone left by a delete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeableCell {
    pub stamp: Stamp,
    pub value: Option<CellValue>,
}

impl MergeableCell {
    pub fn new(stamp: Stamp, value: Option<CellValue>) -> Self {
        Self { stamp, value }
    }

    fn loses_to(&self, incoming: &MergeableCell) -> bool {
        incoming.stamp > self.stamp
    }
}

pub type MergeableRow = BTreeMap<String, MergeableCell>;
pub type MergeableTable = BTreeMap<String, MergeableRow>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergeableContent {
    #[serde(default)]
    pub tables: BTreeMap<String, MergeableTable>,
    #[serde(default)]
    pub values: BTreeMap<String, MergeableCell>,
}

impl MergeableContent {
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.values.is_empty()
    }

    pub fn cell(&self, table_id: &str, row_id: &str, cell_id: &str) -> Option<&MergeableCell> {
        self.tables.get(table_id)?.get(row_id)?.get(cell_id)
    }

    pub fn insert_cell(&mut self, table_id: &str, row_id: &str, cell_id: &str, cell: MergeableCell) {
        self.tables
            .entry(table_id.to_string())
            .or_default()
            .entry(row_id.to_string())
            .or_default()
            .insert(cell_id.to_string(), cell);
    }

    pub fn insert_value(&mut self, value_id: &str, cell: MergeableCell) {
        self.values.insert(value_id.to_string(), cell);
    }

    /// Highest stamp anywhere in the content.
    pub fn max_stamp(&self) -> Option<&Stamp> {
        let cells = self
            .tables
            .values()
            .flat_map(|t| t.values())
            .flat_map(|r| r.values())
            .chain(self.values.values());
        cells.map(|c| &c.stamp).max()
    }

    pub fn cell_count(&self) -> usize {
        let table_cells: usize = self
            .tables
            .values()
            .flat_map(|t| t.values())
            .map(|r| r.len())
            .sum();
        table_cells + self.values.len()
    }

    /// Fold `incoming` into `self`, keeping the higher stamp for every cell.
    ///
    /// Returns exactly the cells whose winner changed. Commutative,
    /// associative and idempotent: absorbing the same content twice changes
    /// nothing the second time.
    pub fn absorb(&mut self, incoming: &MergeableContent) -> MergeableContent {
        let mut won = MergeableContent::default();

        for (table_id, table) in &incoming.tables {
            for (row_id, row) in table {
                for (cell_id, cell) in row {
                    let wins = self
                        .cell(table_id, row_id, cell_id)
                        .is_none_or(|current| current.loses_to(cell));
                    if wins {
                        self.insert_cell(table_id, row_id, cell_id, cell.clone());
                        won.insert_cell(table_id, row_id, cell_id, cell.clone());
                    }
                }
            }
        }

        for (value_id, cell) in &incoming.values {
            let wins = self
                .values
                .get(value_id)
                .is_none_or(|current| current.loses_to(cell));
            if wins {
                self.insert_value(value_id, cell.clone());
                won.insert_value(value_id, cell.clone());
            }
        }

        won
    }

    /// Live cells only, with tombstones and emptied rows dropped.
    pub fn to_content(&self) -> Content {
        let mut tables = Tables::new();
        for (table_id, table) in &self.tables {
            let live = live_table(table);
            if !live.is_empty() {
                tables.insert(table_id.clone(), live);
            }
        }
        let values = self
            .values
            .iter()
            .filter_map(|(id, cell)| cell.value.clone().map(|v| (id.clone(), v)))
            .collect();
        Content { tables, values }
    }
}

pub(crate) fn live_row(row: &MergeableRow) -> Row {
    row.iter()
        .filter_map(|(id, cell)| cell.value.clone().map(|v| (id.clone(), v)))
        .collect()
}

pub(crate) fn live_table(table: &MergeableTable) -> Table {
    table
        .iter()
        .map(|(id, row)| (id.clone(), live_row(row)))
        .filter(|(_, row)| !row.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(wall_ms: u64, replica: &str, value: Option<&str>) -> MergeableCell {
        MergeableCell::new(Stamp::new(wall_ms, 0, replica), value.map(CellValue::from))
    }

    #[test]
    fn absorb_reports_only_winners() {
        let mut local = MergeableContent::default();
        local.insert_cell("items", "1", "name", cell(5, "a", Some("Milk")));
        local.insert_cell("items", "1", "notes", cell(9, "a", Some("cold")));

        let mut remote = MergeableContent::default();
        remote.insert_cell("items", "1", "name", cell(7, "b", Some("Oat milk")));
        remote.insert_cell("items", "1", "notes", cell(3, "b", Some("stale")));

        let won = local.absorb(&remote);

        assert_eq!(won.cell_count(), 1);
        assert_eq!(
            local.cell("items", "1", "name").unwrap().value,
            Some(CellValue::from("Oat milk"))
        );
        assert_eq!(
            local.cell("items", "1", "notes").unwrap().value,
            Some(CellValue::from("cold"))
        );
        assert!(local.absorb(&remote).is_empty());
    }

    #[test]
    fn tombstones_hide_rows() {
        let mut content = MergeableContent::default();
        content.insert_cell("items", "1", "name", cell(1, "a", None));
        content.insert_cell("items", "2", "name", cell(1, "a", Some("Eggs")));
        content.insert_value("name", cell(1, "a", None));

        let plain = content.to_content();
        assert_eq!(plain.tables["items"].len(), 1);
        assert!(plain.tables["items"].contains_key("2"));
        assert!(plain.values.is_empty());
    }

    #[test]
    fn max_stamp_spans_tables_and_values() {
        let mut content = MergeableContent::default();
        content.insert_cell("items", "1", "name", cell(4, "a", Some("x")));
        content.insert_value("name", cell(8, "b", Some("y")));
        assert_eq!(content.max_stamp(), Some(&Stamp::new(8, 0, "b")));
        assert_eq!(MergeableContent::default().max_stamp(), None);
    }
}
