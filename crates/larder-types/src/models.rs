use serde::{Deserialize, Serialize};
use tracing::warn;

use larder_store::{CellValue, Row, Table, Values};

// -- Identity --

/// Signed-in user, handed over by the identity provider. Stable for a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub display_name: String,
}

impl User {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }

    pub fn guest() -> Self {
        Self::new("guest", "guest")
    }

    /// Name shown to collaborators: the local part when the display name is
    /// an e-mail address.
    pub fn nickname(&self) -> &str {
        match self.display_name.split_once('@') {
            Some((local, _)) if !local.is_empty() => local,
            _ => &self.display_name,
        }
    }
}

// -- List metadata --

/// Singleton values of a list document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListValues {
    #[serde(alias = "id")]
    pub list_id: String,
    pub name: String,
    pub description: String,
    pub emoji: String,
    pub color: String,
    pub created_at: String,
    pub updated_at: String,
}

impl ListValues {
    pub const LIST_ID: &'static str = "listId";
    pub const NAME: &'static str = "name";
    pub const DESCRIPTION: &'static str = "description";
    pub const EMOJI: &'static str = "emoji";
    pub const COLOR: &'static str = "color";
    pub const CREATED_AT: &'static str = "createdAt";
    pub const UPDATED_AT: &'static str = "updatedAt";

    /// Store values, skipping empty strings so an unset field never
    /// overwrites a populated one on merge.
    pub fn to_values(&self) -> Values {
        [
            (Self::LIST_ID, &self.list_id),
            (Self::NAME, &self.name),
            (Self::DESCRIPTION, &self.description),
            (Self::EMOJI, &self.emoji),
            (Self::COLOR, &self.color),
            (Self::CREATED_AT, &self.created_at),
            (Self::UPDATED_AT, &self.updated_at),
        ]
        .into_iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, v)| (k.to_string(), CellValue::from(v)))
        .collect()
    }

    pub fn from_values(values: &Values) -> Self {
        let get = |key: &str| {
            values
                .get(key)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };
        Self {
            list_id: get(Self::LIST_ID),
            name: get(Self::NAME),
            description: get(Self::DESCRIPTION),
            emoji: get(Self::EMOJI),
            color: get(Self::COLOR),
            created_at: get(Self::CREATED_AT),
            updated_at: get(Self::UPDATED_AT),
        }
    }
}

// -- Snapshot --

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotTables {
    pub items: Table,
    pub collaborators: Table,
}

/// Cached copy of a list document kept in its index row.
///
/// Two encodings exist: the flat `{listId, name, ...}` blob written when a
/// list is created, and the `{tables, values}` blob written by the
/// propagator. `parse` accepts both; `"{}"` parses to an empty snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListSnapshot {
    #[serde(default)]
    pub tables: SnapshotTables,
    pub values: ListValues,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SnapshotEncoding {
    Nested {
        #[serde(default)]
        tables: SnapshotTables,
        values: ListValues,
    },
    Flat(ListValues),
}

impl ListSnapshot {
    pub const EMPTY: &'static str = "{}";

    pub fn from_values(values: ListValues) -> Self {
        Self {
            tables: SnapshotTables::default(),
            values,
        }
    }

    pub fn parse(raw: &str) -> serde_json::Result<Self> {
        Ok(match serde_json::from_str::<SnapshotEncoding>(raw)? {
            SnapshotEncoding::Nested { tables, values } => Self { tables, values },
            SnapshotEncoding::Flat(values) => Self::from_values(values),
        })
    }

    /// Parse, logging and falling back to an empty snapshot on malformed input.
    pub fn parse_or_default(raw: &str) -> Self {
        Self::parse(raw).unwrap_or_else(|e| {
            warn!("Malformed list snapshot, treating as empty: {}", e);
            Self::default()
        })
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Flat `{listId, name, ...}` encoding.
    pub fn to_flat_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.values)
    }

    pub fn is_named(&self) -> bool {
        !self.values.name.is_empty()
    }
}

// -- Items & collaborators --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    pub name: String,
    pub quantity: f64,
    pub units: String,
    pub is_purchased: bool,
    pub category: String,
    pub notes: String,
    pub created_by: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Item {
    pub const ID: &'static str = "id";
    pub const NAME: &'static str = "name";
    pub const QUANTITY: &'static str = "quantity";
    pub const UNITS: &'static str = "units";
    pub const IS_PURCHASED: &'static str = "isPurchased";
    pub const CATEGORY: &'static str = "category";
    pub const NOTES: &'static str = "notes";
    pub const CREATED_BY: &'static str = "createdBy";
    pub const CREATED_AT: &'static str = "createdAt";
    pub const UPDATED_AT: &'static str = "updatedAt";

    /// Read an item from its row. Missing cells fall back to defaults.
    pub fn from_row(row_id: &str, row: &Row) -> Self {
        let text = |key: &str| {
            row.get(key)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };
        let id = text(Self::ID);
        Self {
            id: if id.is_empty() { row_id.to_string() } else { id },
            name: text(Self::NAME),
            quantity: row.get(Self::QUANTITY).and_then(|v| v.as_f64()).unwrap_or_default(),
            units: text(Self::UNITS),
            is_purchased: row.get(Self::IS_PURCHASED).and_then(|v| v.as_bool()).unwrap_or(false),
            category: text(Self::CATEGORY),
            notes: text(Self::NOTES),
            created_by: text(Self::CREATED_BY),
            created_at: text(Self::CREATED_AT),
            updated_at: text(Self::UPDATED_AT),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collaborator {
    pub user_id: String,
    pub nickname: String,
}

impl Collaborator {
    pub const NICKNAME: &'static str = "nickname";

    /// The collaborator row for `user`, keyed by user id.
    pub fn for_user(user: &User) -> Self {
        Self {
            user_id: user.id.clone(),
            nickname: user.nickname().to_string(),
        }
    }

    pub fn from_row(user_id: &str, row: &Row) -> Self {
        Self {
            user_id: user_id.to_string(),
            nickname: row
                .get(Self::NICKNAME)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
        }
    }

    pub fn to_row(&self) -> Row {
        Row::from([(Self::NICKNAME.to_string(), CellValue::from(&self.nickname))])
    }
}

pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nickname_from_email() {
        assert_eq!(User::new("u1", "ana@example.com").nickname(), "ana");
        assert_eq!(User::new("u2", "Bo").nickname(), "Bo");
    }

    #[test]
    fn parses_flat_snapshot() {
        let snap = ListSnapshot::parse(r#"{"listId":"L1","name":"Groceries","emoji":"🛒"}"#).unwrap();
        assert_eq!(snap.values.name, "Groceries");
        assert_eq!(snap.values.list_id, "L1");
        assert!(snap.tables.items.is_empty());
    }

    #[test]
    fn parses_nested_snapshot() {
        let raw = r#"{
            "tables": {"items": {"i1": {"name": "Milk", "quantity": 1}}, "collaborators": {}},
            "values": {"listId": "L1", "name": "Weekly"}
        }"#;
        let snap = ListSnapshot::parse(raw).unwrap();
        assert_eq!(snap.values.name, "Weekly");
        assert_eq!(snap.tables.items["i1"]["name"], CellValue::from("Milk"));
    }

    #[test]
    fn empty_and_malformed_snapshots() {
        let empty = ListSnapshot::parse(ListSnapshot::EMPTY).unwrap();
        assert!(!empty.is_named());
        assert_eq!(ListSnapshot::parse_or_default("{not json"), ListSnapshot::default());
    }

    #[test]
    fn values_round_trip_skips_empty() {
        let values = ListValues {
            list_id: "L1".into(),
            name: "Groceries".into(),
            ..Default::default()
        };
        let stored = values.to_values();
        assert_eq!(stored.len(), 2);
        assert_eq!(ListValues::from_values(&stored), values);
    }

    #[test]
    fn item_defaults_from_sparse_row() {
        let row = Row::from([("name".to_string(), CellValue::from("Eggs"))]);
        let item = Item::from_row("i9", &row);
        assert_eq!(item.id, "i9");
        assert!(!item.is_purchased);
        assert_eq!(item.quantity, 0.0);
    }
}
