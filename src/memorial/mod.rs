//! Memorial records: types and the SQLite-backed store.

pub mod store;
pub mod types;
