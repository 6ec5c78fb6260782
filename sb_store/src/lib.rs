//! ABOUTME: Embedded document store with generic collection accessors
//! ABOUTME: One redb-backed collection per entity kind, JSON document values

pub mod collection;
pub mod error;
pub mod query;

pub use collection::{Collection, UpdateOutcome};
pub use error::{StoreError, StoreResult};
pub use query::Query;
