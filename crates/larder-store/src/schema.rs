use std::collections::BTreeMap;

use crate::error::{Result, StoreError};
use crate::value::{CellKind, CellValue};

/// Declared type (and optional default) of one cell or value.
#[derive(Debug, Clone, PartialEq)]
pub struct CellSchema {
    pub kind: CellKind,
    pub default: Option<CellValue>,
}

impl CellSchema {
    pub fn string() -> Self {
        Self { kind: CellKind::String, default: None }
    }

    pub fn number() -> Self {
        Self { kind: CellKind::Number, default: None }
    }

    pub fn boolean() -> Self {
        Self { kind: CellKind::Boolean, default: None }
    }

    pub fn with_default(mut self, default: impl Into<CellValue>) -> Self {
        self.default = Some(default.into());
        self
    }

    fn check(&self, target: &str, value: &CellValue) -> Result<()> {
        if value.kind() != self.kind {
            return Err(StoreError::TypeMismatch {
                target: target.to_string(),
                expected: self.kind,
                received: value.kind(),
            });
        }
        Ok(())
    }
}

/// Tables and values schema for a store.
///
/// A schemaless store (the server-side replica) accepts any table, cell or
/// value id with any type.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    tables: BTreeMap<String, BTreeMap<String, CellSchema>>,
    values: BTreeMap<String, CellSchema>,
    strict: bool,
}

impl Schema {
    /// An empty strict schema; add tables and values with the builders.
    pub fn new() -> Self {
        Self {
            strict: true,
            ..Self::default()
        }
    }

    pub fn schemaless() -> Self {
        Self::default()
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn table<'a>(
        mut self,
        table_id: &str,
        cells: impl IntoIterator<Item = (&'a str, CellSchema)>,
    ) -> Self {
        let cells = cells
            .into_iter()
            .map(|(id, schema)| (id.to_string(), schema))
            .collect();
        self.tables.insert(table_id.to_string(), cells);
        self
    }

    pub fn value(mut self, value_id: &str, schema: CellSchema) -> Self {
        self.values.insert(value_id.to_string(), schema);
        self
    }

    pub fn check_table(&self, table_id: &str) -> Result<()> {
        if self.strict && !self.tables.contains_key(table_id) {
            return Err(StoreError::UnknownTable(table_id.to_string()));
        }
        Ok(())
    }

    pub fn check_cell(&self, table_id: &str, cell_id: &str, value: &CellValue) -> Result<()> {
        check_finite(cell_id, value)?;
        if !self.strict {
            return Ok(());
        }
        let cells = self
            .tables
            .get(table_id)
            .ok_or_else(|| StoreError::UnknownTable(table_id.to_string()))?;
        let schema = cells.get(cell_id).ok_or_else(|| StoreError::UnknownCell {
            table: table_id.to_string(),
            cell: cell_id.to_string(),
        })?;
        schema.check(&format!("{table_id}.{cell_id}"), value)
    }

    pub fn check_value(&self, value_id: &str, value: &CellValue) -> Result<()> {
        check_finite(value_id, value)?;
        if !self.strict {
            return Ok(());
        }
        let schema = self
            .values
            .get(value_id)
            .ok_or_else(|| StoreError::UnknownValue(value_id.to_string()))?;
        schema.check(value_id, value)
    }

    /// Defaulted cells of a table, applied when a row is written without them.
    pub fn row_defaults(&self, table_id: &str) -> impl Iterator<Item = (&str, &CellValue)> {
        self.tables
            .get(table_id)
            .into_iter()
            .flat_map(|cells| cells.iter())
            .filter_map(|(id, schema)| schema.default.as_ref().map(|d| (id.as_str(), d)))
    }
}

fn check_finite(target: &str, value: &CellValue) -> Result<()> {
    match value {
        CellValue::Number(n) if !n.is_finite() => Err(StoreError::NonFinite(target.to_string())),
        _ => Ok(()),
    }
}
