//! Domain Error Types
//!
//! Pure domain errors that don't depend on infrastructure.

use rust_decimal::Decimal;
use thiserror::Error;

use super::AmountError;

/// Business rule violations and domain invariant failures.
///
/// These are always returned to the caller as structured failures; none of
/// them is fatal to the process.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// Malformed, missing or out-of-range input
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Auction not found: {0}")]
    AuctionNotFound(String),

    #[error("Exchange request not found: {0}")]
    RequestNotFound(String),

    /// Auction is no longer accepting bids
    #[error("Auction {0} is closed")]
    AuctionClosed(String),

    /// Bid does not beat the current highest bid
    #[error("Bid too low: must exceed {highest}, got {offered}")]
    BidTooLow { highest: Decimal, offered: Decimal },

    /// Insufficient balance for the requested operation
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: Decimal, available: Decimal },

    /// Attempt to leave a terminal state
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// Entity already exists
    #[error("Conflict: {0}")]
    Conflict(String),

    /// System is in maintenance mode
    #[error("System is in maintenance mode")]
    Maintenance,

    /// Missing or invalid actor
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn insufficient_balance(required: Decimal, available: Decimal) -> Self {
        Self::InsufficientBalance { required, available }
    }

    /// Check if this is a client error (caller's fault)
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Maintenance)
    }

    /// Check if this error refers to a missing entity
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::UserNotFound(_) | Self::AuctionNotFound(_) | Self::RequestNotFound(_)
        )
    }
}

impl From<AmountError> for DomainError {
    fn from(err: AmountError) -> Self {
        Self::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_insufficient_balance_error() {
        let err = DomainError::insufficient_balance(dec!(600), dec!(500));

        assert!(err.is_client_error());
        assert!(!err.is_not_found());
        assert!(err.to_string().contains("600"));
        assert!(err.to_string().contains("500"));
    }

    #[test]
    fn test_not_found_classification() {
        assert!(DomainError::AuctionNotFound("a1".into()).is_not_found());
        assert!(DomainError::RequestNotFound("r1".into()).is_not_found());
        assert!(!DomainError::Maintenance.is_client_error());
    }

    #[test]
    fn test_amount_error_becomes_validation() {
        let err: DomainError = AmountError::Zero.into();
        assert!(matches!(err, DomainError::Validation(_)));
    }
}
