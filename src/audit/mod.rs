//! Audit Log
//!
//! Tamper-evident audit logging with hash chain verification.
//! Entries live inside the economy document and are appended in the same
//! write as the change they describe, so an operation and its audit entry
//! commit or fail together.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::OperationContext;

/// Previous hash of the first entry in the chain
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Audit log entry stored in the economy document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub sequence_number: i64,
    pub action: String,
    pub actor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    pub previous_hash: String,
    pub current_hash: String,
    pub created_at: DateTime<Utc>,
}

impl AuditLogEntry {
    fn compute_hash(
        id: &Uuid,
        sequence_number: i64,
        action: &str,
        actor: &str,
        details: Option<&serde_json::Value>,
        previous_hash: &str,
    ) -> String {
        let hash_input = format!(
            "{}{}{}{}{}{}",
            id,
            sequence_number,
            action,
            actor,
            details.map(|v| v.to_string()).unwrap_or_default(),
            previous_hash
        );
        sha256_hex(&hash_input)
    }

    fn expected_hash(&self) -> String {
        Self::compute_hash(
            &self.id,
            self.sequence_number,
            &self.action,
            &self.actor,
            self.details.as_ref(),
            &self.previous_hash,
        )
    }
}

/// Audit action types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    UserRegistered,
    UserApproved,
    PointsAssigned,
    PointsRecomputed,
    AuctionCreated,
    BidPlaced,
    AuctionFinalized,
    AuctionCancelled,
    ExchangeRequested,
    ExchangeApproved,
    ExchangeRejected,
    BadgeAwarded,
    ConfigUpdated,
    AnnouncementPosted,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::UserRegistered => "user.registered",
            AuditAction::UserApproved => "user.approved",
            AuditAction::PointsAssigned => "points.assigned",
            AuditAction::PointsRecomputed => "points.recomputed",
            AuditAction::AuctionCreated => "auction.created",
            AuditAction::BidPlaced => "auction.bid_placed",
            AuditAction::AuctionFinalized => "auction.finalized",
            AuditAction::AuctionCancelled => "auction.cancelled",
            AuditAction::ExchangeRequested => "exchange.requested",
            AuditAction::ExchangeApproved => "exchange.approved",
            AuditAction::ExchangeRejected => "exchange.rejected",
            AuditAction::BadgeAwarded => "badge.awarded",
            AuditAction::ConfigUpdated => "config.updated",
            AuditAction::AnnouncementPosted => "announcement.posted",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Builder for creating audit log entries
#[derive(Debug, Clone)]
pub struct AuditLogBuilder {
    action: String,
    resource_type: Option<String>,
    resource_id: Option<String>,
    details: Option<serde_json::Value>,
}

impl AuditLogBuilder {
    pub fn new(action: AuditAction) -> Self {
        Self {
            action: action.as_str().to_string(),
            resource_type: None,
            resource_id: None,
            details: None,
        }
    }

    pub fn resource_type(mut self, resource_type: &str) -> Self {
        self.resource_type = Some(resource_type.to_string());
        self
    }

    pub fn resource_id(mut self, resource_id: impl ToString) -> Self {
        self.resource_id = Some(resource_id.to_string());
        self
    }

    /// Attach a serializable payload describing the change
    pub fn details<T: Serialize>(mut self, details: &T) -> Self {
        self.details = serde_json::to_value(details).ok();
        self
    }

    /// Seal the entry onto the end of the chain
    pub fn build(
        self,
        previous: Option<&AuditLogEntry>,
        context: &OperationContext,
        now: DateTime<Utc>,
    ) -> AuditLogEntry {
        let id = Uuid::new_v4();
        let sequence_number = previous.map(|p| p.sequence_number + 1).unwrap_or(1);
        let previous_hash = previous
            .map(|p| p.current_hash.clone())
            .unwrap_or_else(|| GENESIS_HASH.to_string());
        let actor = context.actor();
        let current_hash = AuditLogEntry::compute_hash(
            &id,
            sequence_number,
            &self.action,
            &actor,
            self.details.as_ref(),
            &previous_hash,
        );

        tracing::debug!(
            audit_id = %id,
            action = %self.action,
            sequence_number,
            "Audit log entry created"
        );

        AuditLogEntry {
            id,
            sequence_number,
            action: self.action,
            actor,
            correlation_id: context.correlation_id,
            resource_type: self.resource_type,
            resource_id: self.resource_id,
            details: self.details,
            previous_hash,
            current_hash,
            created_at: now,
        }
    }
}

/// Result of hash chain verification
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainVerificationResult {
    pub is_valid: bool,
    pub entries_checked: u64,
    pub first_invalid_entry: Option<Uuid>,
    pub expected_hash: Option<String>,
    pub actual_hash: Option<String>,
}

impl ChainVerificationResult {
    fn valid(entries_checked: u64) -> Self {
        Self {
            is_valid: true,
            entries_checked,
            first_invalid_entry: None,
            expected_hash: None,
            actual_hash: None,
        }
    }
}

/// Verify the integrity of the audit log hash chain
pub fn verify_hash_chain(entries: &[AuditLogEntry]) -> ChainVerificationResult {
    let mut previous_hash = GENESIS_HASH.to_string();

    for (checked, entry) in entries.iter().enumerate() {
        if entry.previous_hash != previous_hash {
            return ChainVerificationResult {
                is_valid: false,
                entries_checked: checked as u64 + 1,
                first_invalid_entry: Some(entry.id),
                expected_hash: Some(previous_hash),
                actual_hash: Some(entry.previous_hash.clone()),
            };
        }

        let calculated_hash = entry.expected_hash();
        if calculated_hash != entry.current_hash {
            return ChainVerificationResult {
                is_valid: false,
                entries_checked: checked as u64 + 1,
                first_invalid_entry: Some(entry.id),
                expected_hash: Some(calculated_hash),
                actual_hash: Some(entry.current_hash.clone()),
            };
        }

        previous_hash = entry.current_hash.clone();
    }

    ChainVerificationResult::valid(entries.len() as u64)
}

/// Calculate SHA-256 hash and return as hex string
pub fn sha256_hex(input: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}
