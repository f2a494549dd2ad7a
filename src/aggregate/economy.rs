//! Economy Aggregate
//!
//! The whole points economy as one document: users, ledger history,
//! auctions, exchange requests, badges, announcements, audit trail and
//! system configuration. Every mutating operation works on an in-memory copy
//! and the store persists the whole document with a version check.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::audit::{AuditLogBuilder, AuditLogEntry};
use crate::domain::{Balance, DomainError, ExchangeRate, OperationContext, PointsDelta};

use super::{
    AssignmentKind, AssignmentRecord, Auction, BadgeSet, ExchangeRequest, Record, RecordList, User,
    UserStatus,
};

/// Global settings, mutated only by explicit admin operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemConfig {
    /// MB per academic point
    pub exchange_rate: ExchangeRate,
    /// Granted to users when their registration is approved
    pub default_points: Balance,
    /// Blocks user-initiated mutations while set
    #[serde(default)]
    pub maintenance_mode: bool,
    /// Validate a bid against the bidder's available balance
    #[serde(default)]
    pub enforce_bid_coverage: bool,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            exchange_rate: ExchangeRate::default(),
            default_points: Balance::zero(),
            maintenance_mode: false,
            enforce_bid_coverage: false,
        }
    }
}

/// Partial update of [`SystemConfig`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigUpdate {
    #[serde(default)]
    pub exchange_rate: Option<ExchangeRate>,
    #[serde(default)]
    pub default_points: Option<Balance>,
    #[serde(default)]
    pub maintenance_mode: Option<bool>,
    #[serde(default)]
    pub enforce_bid_coverage: Option<bool>,
}

impl ConfigUpdate {
    pub fn is_empty(&self) -> bool {
        self.exchange_rate.is_none()
            && self.default_points.is_none()
            && self.maintenance_mode.is_none()
            && self.enforce_bid_coverage.is_none()
    }
}

/// Community announcement posted by an admin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Announcement {
    pub id: Uuid,
    pub message: String,
    pub author: String,
    pub date: DateTime<Utc>,
}

impl Record for Announcement {
    const KIND: &'static str = "announcement";
}

/// The economy document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Economy {
    /// Stored version; 0 means never persisted. Kept outside the JSON body.
    #[serde(skip)]
    version: i64,

    /// Set by every mutation so no-op operations skip the write
    #[serde(skip)]
    dirty: bool,

    /// Insertion ordered
    #[serde(default)]
    pub(crate) users: Vec<User>,

    #[serde(default)]
    pub(crate) assign_history: RecordList<AssignmentRecord>,

    #[serde(default)]
    pub(crate) auctions: RecordList<Auction>,

    #[serde(default)]
    pub(crate) exchange_requests: RecordList<ExchangeRequest>,

    #[serde(default)]
    pub(crate) badges: BadgeSet,

    #[serde(default)]
    pub(crate) announcements: RecordList<Announcement>,

    #[serde(default)]
    pub(crate) audit_logs: Vec<AuditLogEntry>,

    #[serde(default)]
    pub(crate) system_config: SystemConfig,
}

impl Economy {
    /// Fresh document seeded with the given configuration
    pub fn seeded(system_config: SystemConfig) -> Self {
        Self {
            system_config,
            ..Self::default()
        }
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    pub(crate) fn set_version(&mut self, version: i64) {
        self.version = version;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn touch(&mut self) {
        self.dirty = true;
    }

    // =========================================================================
    // Read accessors
    // =========================================================================

    pub fn users(&self) -> &[User] {
        &self.users
    }

    pub fn assign_history(&self) -> &[AssignmentRecord] {
        &self.assign_history
    }

    pub fn auctions(&self) -> &[Auction] {
        &self.auctions
    }

    pub fn exchange_requests(&self) -> &[ExchangeRequest] {
        &self.exchange_requests
    }

    pub fn badges(&self) -> &BadgeSet {
        &self.badges
    }

    pub fn audit_logs(&self) -> &[AuditLogEntry] {
        &self.audit_logs
    }

    pub fn system_config(&self) -> &SystemConfig {
        &self.system_config
    }

    /// Newest first
    pub fn announcements(&self) -> Vec<&Announcement> {
        self.announcements.iter().rev().collect()
    }

    /// Newest first, at most `limit`
    pub fn recent_audit_logs(&self, limit: usize) -> Vec<&AuditLogEntry> {
        self.audit_logs.iter().rev().take(limit).collect()
    }

    pub fn find_user(&self, user_id: &str) -> Option<&User> {
        self.users.iter().find(|u| u.id == user_id)
    }

    pub fn user(&self, user_id: &str) -> Result<&User, DomainError> {
        self.find_user(user_id)
            .ok_or_else(|| DomainError::UserNotFound(user_id.to_string()))
    }

    pub(crate) fn user_mut(&mut self, user_id: &str) -> Result<&mut User, DomainError> {
        self.users
            .iter_mut()
            .find(|u| u.id == user_id)
            .ok_or_else(|| DomainError::UserNotFound(user_id.to_string()))
    }

    /// Assignment records of one user, newest first
    pub fn user_history(&self, user_id: &str) -> Result<Vec<&AssignmentRecord>, DomainError> {
        self.user(user_id)?;
        Ok(self
            .assign_history
            .iter()
            .rev()
            .filter(|r| r.user_id == user_id)
            .collect())
    }

    /// User-initiated mutations are refused during maintenance
    pub(crate) fn ensure_accepting_user_operations(&self) -> Result<(), DomainError> {
        if self.system_config.maintenance_mode {
            return Err(DomainError::Maintenance);
        }
        Ok(())
    }

    // =========================================================================
    // Users
    // =========================================================================

    /// Register a user awaiting approval
    pub fn register_user(
        &mut self,
        user_id: &str,
        first_name: &str,
        last_name: &str,
        now: DateTime<Utc>,
    ) -> Result<User, DomainError> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(DomainError::validation("user id is required"));
        }
        if first_name.trim().is_empty() {
            return Err(DomainError::validation("firstName is required"));
        }
        if self.find_user(user_id).is_some() {
            return Err(DomainError::Conflict(format!("user {} already exists", user_id)));
        }

        let user = User::new(
            user_id.to_string(),
            first_name.trim().to_string(),
            last_name.trim().to_string(),
            now,
        );
        self.users.push(user.clone());
        self.touch();
        Ok(user)
    }

    /// Approve a pending registration, granting the configured default points.
    /// Returns `None` when the user was already active.
    pub fn approve_user(
        &mut self,
        user_id: &str,
        approved_by: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, DomainError> {
        if self.user(user_id)?.status == UserStatus::Active {
            return Ok(None);
        }

        let default_points = self.system_config.default_points.value();
        if default_points > Decimal::ZERO {
            let delta = PointsDelta::new(default_points)?;
            self.append_assignment(
                user_id,
                delta,
                "Puntos iniciales",
                AssignmentKind::Assignment,
                Some(approved_by),
                now,
            )?;
        }

        let user = self.user_mut(user_id)?;
        user.status = UserStatus::Active;
        let approved = user.clone();
        self.touch();
        Ok(Some(approved))
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    pub fn set_exchange_rate(&mut self, rate: ExchangeRate) -> ExchangeRate {
        let previous = self.system_config.exchange_rate;
        self.system_config.exchange_rate = rate;
        self.touch();
        previous
    }

    pub fn update_config(&mut self, update: &ConfigUpdate) -> Result<SystemConfig, DomainError> {
        if update.is_empty() {
            return Err(DomainError::validation("no configuration fields supplied"));
        }
        if let Some(rate) = update.exchange_rate {
            self.system_config.exchange_rate = rate;
        }
        if let Some(points) = update.default_points {
            self.system_config.default_points = points;
        }
        if let Some(flag) = update.maintenance_mode {
            self.system_config.maintenance_mode = flag;
        }
        if let Some(flag) = update.enforce_bid_coverage {
            self.system_config.enforce_bid_coverage = flag;
        }
        self.touch();
        Ok(self.system_config.clone())
    }

    // =========================================================================
    // Announcements
    // =========================================================================

    pub fn post_announcement(
        &mut self,
        message: &str,
        author: &str,
        now: DateTime<Utc>,
    ) -> Result<Announcement, DomainError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(DomainError::validation("message is required"));
        }
        let announcement = Announcement {
            id: Uuid::new_v4(),
            message: message.to_string(),
            author: author.to_string(),
            date: now,
        };
        self.announcements.push(announcement.clone());
        self.touch();
        Ok(announcement)
    }

    // =========================================================================
    // Audit
    // =========================================================================

    /// Append an audit entry to the hash chain
    pub fn record_audit(
        &mut self,
        builder: AuditLogBuilder,
        context: &OperationContext,
        now: DateTime<Utc>,
    ) -> &AuditLogEntry {
        let entry = builder.build(self.audit_logs.last(), context, now);
        self.audit_logs.push(entry);
        self.touch();
        &self.audit_logs[self.audit_logs.len() - 1]
    }
}
