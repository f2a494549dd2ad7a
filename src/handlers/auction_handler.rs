//! Auction Handlers
//!
//! Auction creation, bidding and closing.

use chrono::Utc;

use crate::aggregate::{Auction, AuctionStatus, AuctionTransition, Bidder, NewAuction};
use crate::audit::{AuditAction, AuditLogBuilder};
use crate::domain::{DomainError, OperationContext, Points};
use crate::error::{AppError, AppResult};
use crate::store::EconomyRepository;

use super::{ChangeAuctionStatusCommand, CreateAuctionCommand, PlaceBidCommand};

/// Handler for auction creation
pub struct CreateAuctionHandler {
    repository: EconomyRepository,
}

impl CreateAuctionHandler {
    pub fn new(repository: EconomyRepository) -> Self {
        Self { repository }
    }

    pub async fn execute(
        &self,
        command: CreateAuctionCommand,
        context: &OperationContext,
    ) -> AppResult<Auction> {
        context.require_admin()?;

        let input = NewAuction {
            title: command.title,
            description: command.description.unwrap_or_default(),
            base_price: command.base_price,
            start_date: command.start_date,
            end_date: command.end_date,
            created_by: command
                .created_by
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| context.actor()),
        };

        let auction = self
            .repository
            .mutate(|economy| -> AppResult<Auction> {
                let auction = economy.create_auction(input.clone())?;
                economy.record_audit(
                    AuditLogBuilder::new(AuditAction::AuctionCreated)
                        .resource_type("auction")
                        .resource_id(auction.id)
                        .details(&auction),
                    context,
                    Utc::now(),
                );
                Ok(auction)
            })
            .await?;

        tracing::info!(
            auction_id = %auction.id,
            base_price = %auction.base_price,
            "Auction created"
        );
        Ok(auction)
    }
}

/// Handler for bids
pub struct PlaceBidHandler {
    repository: EconomyRepository,
}

impl PlaceBidHandler {
    pub fn new(repository: EconomyRepository) -> Self {
        Self { repository }
    }

    /// Bid on behalf of `command.user_id`. A non-admin caller may only bid
    /// as the user named in its request context.
    pub async fn execute(
        &self,
        command: PlaceBidCommand,
        context: &OperationContext,
    ) -> AppResult<Auction> {
        if !context.is_admin && context.require_user()? != command.user_id {
            return Err(AppError::PermissionDenied);
        }
        let amount = Points::new(command.amount)
            .map_err(|e| AppError::InvalidRequest(format!("Invalid amount: {}", e)))?;

        self.repository
            .mutate(|economy| -> AppResult<Auction> {
                let bidder = resolve_bidder(economy, &command)?;
                let now = Utc::now();
                let auction = economy.place_bid(command.auction_id, &bidder, amount, now)?;
                economy.record_audit(
                    AuditLogBuilder::new(AuditAction::BidPlaced)
                        .resource_type("auction")
                        .resource_id(auction.id)
                        .details(&serde_json::json!({
                            "userId": bidder.user_id,
                            "amount": amount,
                        })),
                    context,
                    now,
                );
                Ok(auction)
            })
            .await
    }
}

/// Names from the request, falling back to the registered user
fn resolve_bidder(
    economy: &crate::aggregate::Economy,
    command: &PlaceBidCommand,
) -> Result<Bidder, DomainError> {
    let given = |name: &Option<String>| {
        name.as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
    };

    match (given(&command.first_name), economy.find_user(&command.user_id)) {
        (Some(first), _) => Ok(Bidder::new(
            command.user_id.as_str(),
            first,
            given(&command.last_name).unwrap_or_default(),
        )),
        (None, Some(user)) => Ok(Bidder::new(
            command.user_id.as_str(),
            user.first_name.as_str(),
            user.last_name.as_str(),
        )),
        (None, None) => Err(DomainError::validation("firstName is required")),
    }
}

/// Handler for finalizing or cancelling auctions
pub struct ChangeAuctionStatusHandler {
    repository: EconomyRepository,
}

impl ChangeAuctionStatusHandler {
    pub fn new(repository: EconomyRepository) -> Self {
        Self { repository }
    }

    /// Idempotent: repeating the same target returns the closed auction
    /// unchanged
    pub async fn execute(
        &self,
        command: ChangeAuctionStatusCommand,
        context: &OperationContext,
    ) -> AppResult<AuctionTransition> {
        context.require_admin()?;

        let action = match command.status {
            AuctionStatus::Finalized => AuditAction::AuctionFinalized,
            AuctionStatus::Cancelled => AuditAction::AuctionCancelled,
            AuctionStatus::Active => {
                return Err(AppError::InvalidRequest(
                    "status must be Finalizada or Cancelada".to_string(),
                ))
            }
        };

        let transition = self
            .repository
            .mutate(|economy| -> AppResult<AuctionTransition> {
                let now = Utc::now();
                let transition = match command.status {
                    AuctionStatus::Finalized => economy.finalize_auction(command.auction_id, now)?,
                    _ => economy.cancel_auction(command.auction_id, now)?,
                };
                if transition.changed {
                    economy.record_audit(
                        AuditLogBuilder::new(action)
                            .resource_type("auction")
                            .resource_id(command.auction_id)
                            .details(&serde_json::json!({
                                "status": transition.auction.status,
                                "winner": transition.winner.as_ref().map(|b| &b.user_id),
                                "highestBid": transition.auction.highest_bid,
                            })),
                        context,
                        now,
                    );
                }
                Ok(transition)
            })
            .await?;

        if transition.changed {
            tracing::info!(
                auction_id = %command.auction_id,
                status = %transition.auction.status,
                winner = ?transition.winner.as_ref().map(|b| &b.user_id),
                "Auction closed"
            );
        }
        Ok(transition)
    }
}
