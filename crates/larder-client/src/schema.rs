//! Schemas of the two kinds of client store.

use larder_store::{CellSchema, RelationshipDefinition, Schema};
use larder_types::models::{Collaborator, Item, ListValues};

pub const LISTS_TABLE: &str = "lists";
pub const ITEMS_TABLE: &str = "items";
pub const COLLABORATORS_TABLE: &str = "collaborators";

/// Index row cells.
pub const LIST_ID_CELL: &str = "id";
pub const SNAPSHOT_CELL: &str = "snapshot";

/// Item -> collaborator who created it.
pub const CREATED_BY_NICKNAME: &str = "createdByNickname";

pub fn index_schema() -> Schema {
    Schema::new().table(
        LISTS_TABLE,
        [
            (LIST_ID_CELL, CellSchema::string()),
            (SNAPSHOT_CELL, CellSchema::string().with_default("{}")),
        ],
    )
}

pub fn list_schema() -> Schema {
    Schema::new()
        .table(
            ITEMS_TABLE,
            [
                (Item::ID, CellSchema::string()),
                (Item::NAME, CellSchema::string()),
                (Item::QUANTITY, CellSchema::number()),
                (Item::UNITS, CellSchema::string()),
                (Item::IS_PURCHASED, CellSchema::boolean().with_default(false)),
                (Item::CATEGORY, CellSchema::string().with_default("")),
                (Item::NOTES, CellSchema::string()),
                (Item::CREATED_BY, CellSchema::string()),
                (Item::CREATED_AT, CellSchema::string()),
                (Item::UPDATED_AT, CellSchema::string()),
            ],
        )
        .table(COLLABORATORS_TABLE, [(Collaborator::NICKNAME, CellSchema::string())])
        .value(ListValues::LIST_ID, CellSchema::string())
        .value(ListValues::NAME, CellSchema::string())
        .value(ListValues::DESCRIPTION, CellSchema::string())
        .value(ListValues::EMOJI, CellSchema::string())
        .value(ListValues::COLOR, CellSchema::string())
        .value(ListValues::CREATED_AT, CellSchema::string())
        .value(ListValues::UPDATED_AT, CellSchema::string())
}

pub fn created_by_nickname() -> RelationshipDefinition {
    RelationshipDefinition::new(CREATED_BY_NICKNAME, ITEMS_TABLE, COLLABORATORS_TABLE, Item::CREATED_BY)
}
