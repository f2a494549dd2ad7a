//! Command definitions
//!
//! Commands represent intentions to change the system state.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::{AuctionStatus, ExchangeStatus};

/// Register a user awaiting approval
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterUserCommand {
    pub user_id: String,
    pub first_name: String,
    pub last_name: String,
}

impl RegisterUserCommand {
    pub fn new(
        user_id: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
        }
    }
}

/// Admin grant or deduction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignPointsCommand {
    pub user_id: String,
    /// Signed, non-zero
    pub amount: Decimal,
    pub observation: Option<String>,
}

impl AssignPointsCommand {
    pub fn new(user_id: impl Into<String>, amount: Decimal) -> Self {
        Self {
            user_id: user_id.into(),
            amount,
            observation: None,
        }
    }

    pub fn with_observation(mut self, observation: impl Into<String>) -> Self {
        self.observation = Some(observation.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAuctionCommand {
    pub title: String,
    pub description: Option<String>,
    pub base_price: Decimal,
    pub start_date: String,
    pub end_date: String,
    /// Defaults to the acting identity
    pub created_by: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceBidCommand {
    pub auction_id: Uuid,
    pub user_id: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub amount: Decimal,
}

impl PlaceBidCommand {
    pub fn new(auction_id: Uuid, user_id: impl Into<String>, amount: Decimal) -> Self {
        Self {
            auction_id,
            user_id: user_id.into(),
            first_name: None,
            last_name: None,
            amount,
        }
    }

    pub fn with_names(
        mut self,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
    ) -> Self {
        self.first_name = Some(first_name.into());
        self.last_name = Some(last_name.into());
        self
    }
}

/// Finalize or cancel an auction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeAuctionStatusCommand {
    pub auction_id: Uuid,
    pub status: AuctionStatus,
}

/// Exchange request by the acting user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestExchangeCommand {
    pub kind: String,
    pub amount: Decimal,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewExchangeCommand {
    pub request_id: Uuid,
    pub status: ExchangeStatus,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwardBadgeCommand {
    pub user_id: String,
    pub badge: String,
}
