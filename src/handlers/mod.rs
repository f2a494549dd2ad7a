//! Command Handlers module
//!
//! Handlers orchestrate business operations: each runs one read-modify-write
//! cycle on the economy document and appends the matching audit entry in the
//! same write.

mod admin_handler;
mod auction_handler;
mod commands;
mod exchange_handler;
mod points_handler;
mod user_handler;


pub use admin_handler::{AnnouncementHandler, AwardBadgeHandler, ConfigHandler, RateChange};
pub use auction_handler::{ChangeAuctionStatusHandler, CreateAuctionHandler, PlaceBidHandler};
pub use commands::*;
pub use exchange_handler::{RequestExchangeHandler, ReviewExchangeHandler};
pub use points_handler::{AssignPointsHandler, RecomputeBalancesHandler};
pub use user_handler::{ApproveUserHandler, ApproveUserResult, RegisterUserHandler};
