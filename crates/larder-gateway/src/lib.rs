//! Remote authority: one server-side replica per store id, reached over a
//! websocket at `/{store_id}` and readable as a plain snapshot at
//! `/{store_id}/index-data`.

pub mod authority;
pub mod connection;
pub mod registry;
pub mod routes;

pub use authority::Authority;
pub use registry::Authorities;
pub use routes::router;
