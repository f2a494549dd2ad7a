//! Users and assignment records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::Balance;

use super::Record;

/// User status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserStatus {
    #[serde(rename = "Pendiente")]
    Pending,
    #[serde(rename = "Activo")]
    Active,
}

impl Default for UserStatus {
    fn default() -> Self {
        Self::Pending
    }
}

/// A community member holding an MB balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    /// Current balance, never negative at rest
    #[serde(default)]
    pub points: Balance,
    #[serde(default)]
    pub status: UserStatus,
    pub registration_date: DateTime<Utc>,
}

impl User {
    pub fn new(id: String, first_name: String, last_name: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            first_name,
            last_name,
            points: Balance::zero(),
            status: UserStatus::Pending,
            registration_date: now,
        }
    }
}

/// Kind of ledger movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignmentKind {
    /// Manual grant or deduction by an admin
    #[serde(rename = "Asignación")]
    Assignment,
    /// Debit produced by an approved exchange
    #[serde(rename = "Canje")]
    Exchange,
}

impl Default for AssignmentKind {
    fn default() -> Self {
        Self::Assignment
    }
}

/// Append-only ledger line. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentRecord {
    pub id: Uuid,
    pub user_id: String,
    /// Signed delta applied to the user's balance
    pub amount: rust_decimal::Decimal,
    #[serde(default)]
    pub observation: String,
    pub date: DateTime<Utc>,
    #[serde(rename = "type", default)]
    pub kind: AssignmentKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_by: Option<String>,
}

impl Record for AssignmentRecord {
    const KIND: &'static str = "assignment";

    fn check(&self) -> Result<(), String> {
        if self.user_id.trim().is_empty() {
            return Err("missing userId".to_string());
        }
        Ok(())
    }
}
