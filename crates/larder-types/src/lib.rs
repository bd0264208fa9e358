pub mod models;
pub mod protocol;
pub mod store_id;
