//! Store module
//!
//! Persistence for the economy document. Backends implement
//! [`AggregateStore`] with a compare-and-swap on the document version;
//! [`EconomyRepository`] runs read-modify-write cycles on top of it.

mod error;
mod memory;
mod postgres;
mod repository;

pub use error::StoreError;
pub use memory::MemoryAggregateStore;
pub use postgres::PgAggregateStore;
pub use repository::{AggregateStore, EconomyRepository};
