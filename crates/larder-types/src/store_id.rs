//! Store identifiers: `prefix + ownerOrListId`.
//!
//! The same string names the local persisted copy and addresses the remote
//! authority (`{base}/{store_id}`).

use crate::models::User;

pub const INDEX_STORE_PREFIX: &str = "shoppingListsStore-";
pub const LIST_STORE_PREFIX: &str = "shoppingListStore-";

const MAX_STORE_ID_LEN: usize = 200;

/// Index store of a user; `guest` when nobody is signed in yet.
pub fn index_store_id(user: Option<&User>) -> String {
    let owner = user.map(|u| u.id.as_str()).unwrap_or("guest");
    format!("{INDEX_STORE_PREFIX}{owner}")
}

pub fn list_store_id(list_id: &str) -> String {
    format!("{LIST_STORE_PREFIX}{list_id}")
}

/// Store ids must be safe as a URL path segment and as a file name.
pub fn is_valid_store_id(store_id: &str) -> bool {
    !store_id.is_empty()
        && store_id.len() <= MAX_STORE_ID_LEN
        && !store_id.starts_with('.')
        && store_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}
