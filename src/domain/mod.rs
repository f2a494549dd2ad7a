//! Domain module
//!
//! Core domain types and business logic.

pub mod amount;
pub mod context;
pub mod dates;
pub mod error;

pub use amount::{AmountError, Balance, ExchangeRate, Points, PointsDelta};
pub use context::OperationContext;
pub use dates::parse_timestamp;
pub use error::DomainError;
