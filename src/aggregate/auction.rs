//! Auction Engine
//!
//! Timed bidding rounds. Status only moves forward:
//! `Activa -> Finalizada | Cancelada`, both terminal.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{parse_timestamp, DomainError, Points};

use super::{Economy, Record};

/// Auction status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuctionStatus {
    #[serde(rename = "Activa")]
    Active,
    #[serde(rename = "Finalizada")]
    Finalized,
    #[serde(rename = "Cancelada")]
    Cancelled,
}

impl AuctionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuctionStatus::Active => "Activa",
            AuctionStatus::Finalized => "Finalizada",
            AuctionStatus::Cancelled => "Cancelada",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, AuctionStatus::Active)
    }
}

impl std::fmt::Display for AuctionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An accepted bid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bid {
    pub user_id: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub amount: Points,
    pub timestamp: DateTime<Utc>,
}

/// Who is bidding
#[derive(Debug, Clone, PartialEq)]
pub struct Bidder {
    pub user_id: String,
    pub first_name: String,
    pub last_name: String,
}

impl Bidder {
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

/// Unvalidated auction input as received from an admin
#[derive(Debug, Clone)]
pub struct NewAuction {
    pub title: String,
    pub description: String,
    pub base_price: Decimal,
    pub start_date: String,
    pub end_date: String,
    pub created_by: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Auction {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub base_price: Points,
    /// Always `max(base_price, max(bid.amount))`
    pub highest_bid: Points,
    pub status: AuctionStatus,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[serde(default)]
    pub bids: Vec<Bid>,
    #[serde(default)]
    pub created_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
}

impl Record for Auction {
    const KIND: &'static str = "auction";

    fn check(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("missing title".to_string());
        }
        if self.end_date <= self.start_date {
            return Err("endDate is not after startDate".to_string());
        }
        let top_bid = self.bids.iter().map(|b| b.amount).max();
        let expected = top_bid.map_or(self.base_price, |b| b.max(self.base_price));
        if self.highest_bid != expected {
            return Err(format!(
                "highestBid {} does not match bids ({})",
                self.highest_bid, expected
            ));
        }
        Ok(())
    }
}

impl Auction {
    /// Validate admin input into a fresh active auction
    pub fn create(input: NewAuction) -> Result<Self, DomainError> {
        let title = input.title.trim();
        if title.is_empty() {
            return Err(DomainError::validation("title is required"));
        }
        let base_price = Points::new(input.base_price)
            .map_err(|e| DomainError::validation(format!("basePrice: {}", e)))?;
        let start_date = parse_timestamp(&input.start_date).ok_or_else(|| {
            DomainError::validation(format!("invalid startDate: {}", input.start_date))
        })?;
        let end_date = parse_timestamp(&input.end_date).ok_or_else(|| {
            DomainError::validation(format!("invalid endDate: {}", input.end_date))
        })?;
        if end_date <= start_date {
            return Err(DomainError::validation("endDate must be after startDate"));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            title: title.to_string(),
            description: input.description.trim().to_string(),
            base_price,
            highest_bid: base_price,
            status: AuctionStatus::Active,
            start_date,
            end_date,
            bids: Vec::new(),
            created_by: input.created_by,
            closed_at: None,
        })
    }

    /// Open for bids at `now`
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.status == AuctionStatus::Active && now <= self.end_date
    }

    /// The user's own highest bid in this auction
    pub fn highest_bid_of(&self, user_id: &str) -> Option<Decimal> {
        self.bids
            .iter()
            .filter(|b| b.user_id == user_id)
            .map(|b| b.amount.value())
            .max()
    }

    /// The bid currently holding `highest_bid`, if any
    pub fn winning_bid(&self) -> Option<&Bid> {
        self.bids.iter().rev().find(|b| b.amount == self.highest_bid)
    }

    fn accept_bid(
        &mut self,
        bidder: &Bidder,
        amount: Points,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if !self.is_open(now) {
            return Err(DomainError::AuctionClosed(self.id.to_string()));
        }
        if amount <= self.highest_bid {
            return Err(DomainError::BidTooLow {
                highest: self.highest_bid.value(),
                offered: amount.value(),
            });
        }

        self.bids.push(Bid {
            user_id: bidder.user_id.clone(),
            first_name: bidder.first_name.clone(),
            last_name: bidder.last_name.clone(),
            amount,
            timestamp: now,
        });
        self.highest_bid = amount;
        Ok(())
    }

    /// Move to a terminal state. Returns `false` when already there.
    fn close(&mut self, target: AuctionStatus, now: DateTime<Utc>) -> Result<bool, DomainError> {
        if self.status == target {
            return Ok(false);
        }
        if self.status.is_terminal() {
            return Err(DomainError::InvalidTransition {
                from: self.status.to_string(),
                to: target.to_string(),
            });
        }
        self.status = target;
        self.closed_at = Some(now);
        Ok(true)
    }
}

/// Result of finalize/cancel
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuctionTransition {
    pub auction: Auction,
    /// False when the auction was already in the requested state
    pub changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<Bid>,
}

impl Economy {
    pub fn find_auction(&self, auction_id: Uuid) -> Result<&Auction, DomainError> {
        self.auctions
            .iter()
            .find(|a| a.id == auction_id)
            .ok_or_else(|| DomainError::AuctionNotFound(auction_id.to_string()))
    }

    fn auction_mut(&mut self, auction_id: Uuid) -> Result<&mut Auction, DomainError> {
        self.auctions
            .iter_mut()
            .find(|a| a.id == auction_id)
            .ok_or_else(|| DomainError::AuctionNotFound(auction_id.to_string()))
    }

    pub fn create_auction(&mut self, input: NewAuction) -> Result<Auction, DomainError> {
        let auction = Auction::create(input)?;
        self.auctions.push(auction.clone());
        self.touch();
        Ok(auction)
    }

    /// Accept a bid strictly above the current highest bid.
    ///
    /// Cross-auction coverage against the bidder's balance is only checked
    /// when `enforce_bid_coverage` is set in the system configuration.
    pub fn place_bid(
        &mut self,
        auction_id: Uuid,
        bidder: &Bidder,
        amount: Points,
        now: DateTime<Utc>,
    ) -> Result<Auction, DomainError> {
        self.ensure_accepting_user_operations()?;
        self.find_auction(auction_id)?;

        if self.system_config.enforce_bid_coverage {
            let user = self.user(&bidder.user_id)?;
            let available = user.points.value()
                - self.committed_in_auctions_except(&bidder.user_id, Some(auction_id))
                - self.committed_in_exchanges(&bidder.user_id);
            if amount.value() > available {
                return Err(DomainError::insufficient_balance(amount.value(), available));
            }
        }

        let auction = self.auction_mut(auction_id)?;
        auction.accept_bid(bidder, amount, now)?;
        let updated = auction.clone();
        self.touch();

        tracing::info!(
            auction_id = %auction_id,
            user_id = %bidder.user_id,
            amount = %amount,
            "Bid accepted"
        );
        Ok(updated)
    }

    /// Active and not yet past their end date, oldest first
    pub fn list_active(&self, now: DateTime<Utc>) -> Vec<&Auction> {
        self.auctions
            .iter()
            .filter(|a| a.status == AuctionStatus::Active && a.end_date > now)
            .collect()
    }

    /// Active auctions whose end date has passed
    pub fn expired_auctions(&self, now: DateTime<Utc>) -> Vec<Uuid> {
        self.auctions
            .iter()
            .filter(|a| a.status == AuctionStatus::Active && a.end_date <= now)
            .map(|a| a.id)
            .collect()
    }

    /// Close with the highest bidder as winner. Only the status changes; no
    /// balance is debited or credited.
    pub fn finalize_auction(
        &mut self,
        auction_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<AuctionTransition, DomainError> {
        self.transition_auction(auction_id, AuctionStatus::Finalized, now)
    }

    /// Cancel without touching balances; bids were never debited.
    pub fn cancel_auction(
        &mut self,
        auction_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<AuctionTransition, DomainError> {
        self.transition_auction(auction_id, AuctionStatus::Cancelled, now)
    }

    fn transition_auction(
        &mut self,
        auction_id: Uuid,
        target: AuctionStatus,
        now: DateTime<Utc>,
    ) -> Result<AuctionTransition, DomainError> {
        let auction = self.auction_mut(auction_id)?;
        let changed = auction.close(target, now)?;
        let auction = auction.clone();
        if changed {
            self.touch();
        }

        let winner = match target {
            AuctionStatus::Finalized => auction.winning_bid().cloned(),
            _ => None,
        };
        Ok(AuctionTransition { auction, changed, winner })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn new_auction(base_price: Decimal, start: DateTime<Utc>, end: DateTime<Utc>) -> NewAuction {
        NewAuction {
            title: "Enchanted cloak".into(),
            description: "Worn once".into(),
            base_price,
            start_date: start.to_rfc3339(),
            end_date: end.to_rfc3339(),
            created_by: "admin".into(),
        }
    }

    fn open_auction(economy: &mut Economy, base_price: Decimal) -> Auction {
        let now = Utc::now();
        let input = new_auction(base_price, now - Duration::hours(1), now + Duration::days(1));
        economy.create_auction(input).unwrap()
    }

    fn points(value: i64) -> Points {
        Points::from_integer(value).unwrap()
    }

    #[test]
    fn test_create_auction_initial_state() {
        let mut economy = Economy::default();
        let auction = open_auction(&mut economy, dec!(100));

        assert_eq!(auction.status, AuctionStatus::Active);
        assert_eq!(auction.highest_bid, auction.base_price);
        assert!(auction.bids.is_empty());
        assert_eq!(economy.auctions().len(), 1);
    }

    #[test]
    fn test_create_auction_validation() {
        let now = Utc::now();
        let later = now + Duration::hours(2);

        assert!(Auction::create(new_auction(Decimal::ZERO, now, later)).is_err());
        assert!(Auction::create(new_auction(dec!(-1), now, later)).is_err());
        assert!(Auction::create(new_auction(dec!(10), later, now)).is_err());
        assert!(Auction::create(new_auction(dec!(10), now, now)).is_err());

        let mut bad_date = new_auction(dec!(10), now, later);
        bad_date.end_date = "next friday".into();
        assert!(matches!(Auction::create(bad_date), Err(DomainError::Validation(_))));
    }

    #[test]
    fn test_bidding_scenario() {
        let mut economy = Economy::default();
        let auction = open_auction(&mut economy, dec!(100));
        let bidder = Bidder::new("u1", "Ana", "Ruiz");
        let now = Utc::now();

        let low = economy.place_bid(auction.id, &bidder, points(90), now);
        assert!(matches!(low, Err(DomainError::BidTooLow { .. })));

        let equal = economy.place_bid(auction.id, &bidder, points(100), now);
        assert!(matches!(equal, Err(DomainError::BidTooLow { .. })));

        let accepted = economy.place_bid(auction.id, &bidder, points(150), now).unwrap();
        assert_eq!(accepted.highest_bid, points(150));
        assert_eq!(accepted.bids.len(), 1);

        let rival = Bidder::new("u2", "Leo", "Paz");
        let lower = economy.place_bid(auction.id, &rival, points(120), now);
        assert!(matches!(lower, Err(DomainError::BidTooLow { .. })));
        assert_eq!(economy.find_auction(auction.id).unwrap().bids.len(), 1);

        let first = economy.finalize_auction(auction.id, now).unwrap();
        let second = economy.finalize_auction(auction.id, now).unwrap();
        assert!(first.changed);
        assert!(!second.changed);
        assert_eq!(first.auction, second.auction);
        assert_eq!(second.auction.status, AuctionStatus::Finalized);
        assert_eq!(first.winner.unwrap().user_id, "u1");
    }

    #[test]
    fn test_highest_bid_is_monotonic() {
        let mut economy = Economy::default();
        let auction = open_auction(&mut economy, dec!(10));
        let bidder = Bidder::new("u1", "Ana", "Ruiz");
        let now = Utc::now();

        let mut last = economy.find_auction(auction.id).unwrap().highest_bid;
        for offer in [5, 11, 11, 30, 12, 31, 100, 99] {
            let _ = economy.place_bid(auction.id, &bidder, points(offer), now);
            let current = economy.find_auction(auction.id).unwrap();
            assert!(current.highest_bid >= last);
            assert!(current.check().is_ok());
            last = current.highest_bid;
        }
        assert_eq!(last, points(100));
    }

    #[test]
    fn test_bid_on_closed_auction() {
        let mut economy = Economy::default();
        let auction = open_auction(&mut economy, dec!(10));
        let bidder = Bidder::new("u1", "Ana", "Ruiz");

        let after_end = auction.end_date + Duration::seconds(1);
        let result = economy.place_bid(auction.id, &bidder, points(20), after_end);
        assert!(matches!(result, Err(DomainError::AuctionClosed(_))));

        economy.cancel_auction(auction.id, Utc::now()).unwrap();
        let result = economy.place_bid(auction.id, &bidder, points(20), Utc::now());
        assert!(matches!(result, Err(DomainError::AuctionClosed(_))));
    }

    #[test]
    fn test_bid_on_missing_auction() {
        let mut economy = Economy::default();
        let bidder = Bidder::new("u1", "A", "B");
        let result = economy.place_bid(Uuid::new_v4(), &bidder, points(20), Utc::now());
        assert!(matches!(result, Err(DomainError::AuctionNotFound(_))));
    }

    #[test]
    fn test_terminal_states_do_not_cross() {
        let mut economy = Economy::default();
        let auction = open_auction(&mut economy, dec!(10));
        let now = Utc::now();

        let cancelled = economy.cancel_auction(auction.id, now).unwrap();
        assert!(cancelled.changed);
        assert!(cancelled.winner.is_none());
        assert!(!economy.cancel_auction(auction.id, now).unwrap().changed);

        let result = economy.finalize_auction(auction.id, now);
        assert!(matches!(result, Err(DomainError::InvalidTransition { .. })));
    }

    #[test]
    fn test_list_active_and_expired() {
        let mut economy = Economy::default();
        let now = Utc::now();
        let running = open_auction(&mut economy, dec!(10));
        let ended = economy
            .create_auction(new_auction(dec!(10), now - Duration::days(2), now - Duration::days(1)))
            .unwrap();
        let cancelled = open_auction(&mut economy, dec!(10));
        economy.cancel_auction(cancelled.id, now).unwrap();

        let active: Vec<Uuid> = economy.list_active(now).iter().map(|a| a.id).collect();
        assert_eq!(active, vec![running.id]);
        assert_eq!(economy.expired_auctions(now), vec![ended.id]);
    }

    #[test]
    fn test_bid_coverage_enforced_when_enabled() {
        let mut economy = Economy::default();
        let now = Utc::now();
        economy.register_user("u1", "Ana", "Ruiz", now).unwrap();
        let grant = crate::domain::PointsDelta::new(dec!(100)).unwrap();
        economy.assign_points("u1", grant, None, "admin", now).unwrap();
        economy.system_config.enforce_bid_coverage = true;

        let a = open_auction(&mut economy, dec!(10));
        let b = open_auction(&mut economy, dec!(10));
        let bidder = Bidder::new("u1", "Ana", "Ruiz");

        economy.place_bid(a.id, &bidder, points(80), now).unwrap();
        // raising in the same auction replaces the earlier commitment
        economy.place_bid(a.id, &bidder, points(90), now).unwrap();

        let over = economy.place_bid(b.id, &bidder, points(20), now);
        assert!(matches!(over, Err(DomainError::InsufficientBalance { .. })));
        economy.place_bid(b.id, &bidder, points(11), now).unwrap_err();
        economy.place_bid(b.id, &bidder, Points::new(dec!(10.5)).unwrap(), now).unwrap_err();
    }

    #[test]
    fn test_bid_coverage_off_allows_overcommit() {
        let mut economy = Economy::default();
        let a = open_auction(&mut economy, dec!(10));
        let b = open_auction(&mut economy, dec!(10));
        let bidder = Bidder::new("nobody", "No", "Balance");
        let now = Utc::now();

        economy.place_bid(a.id, &bidder, points(500), now).unwrap();
        economy.place_bid(b.id, &bidder, points(500), now).unwrap();
    }

    #[test]
    fn test_maintenance_blocks_bids() {
        let mut economy = Economy::default();
        let auction = open_auction(&mut economy, dec!(10));
        economy.system_config.maintenance_mode = true;
        let bidder = Bidder::new("u1", "A", "B");
        let result = economy.place_bid(auction.id, &bidder, points(20), Utc::now());
        assert_eq!(result, Err(DomainError::Maintenance));
    }
}
