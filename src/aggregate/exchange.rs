//! Exchange Workflow
//!
//! Users trade MB for external rewards. Requests move
//! `Pendiente -> Aprobado | Rechazado`, both terminal. A pending request
//! reserves its amount from the user's available balance.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{DomainError, ExchangeRate, Points, PointsDelta};

use super::{AssignmentKind, BadgeTrigger, Economy, Record};

/// Exchange request status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExchangeStatus {
    #[serde(rename = "Pendiente")]
    Pending,
    #[serde(rename = "Aprobado")]
    Approved,
    #[serde(rename = "Rechazado")]
    Rejected,
}

impl ExchangeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeStatus::Pending => "Pendiente",
            ExchangeStatus::Approved => "Aprobado",
            ExchangeStatus::Rejected => "Rechazado",
        }
    }
}

impl std::fmt::Display for ExchangeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Admin decision on a pending request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewDecision {
    Approve,
    Reject,
}

impl TryFrom<ExchangeStatus> for ReviewDecision {
    type Error = DomainError;

    fn try_from(status: ExchangeStatus) -> Result<Self, Self::Error> {
        match status {
            ExchangeStatus::Approved => Ok(ReviewDecision::Approve),
            ExchangeStatus::Rejected => Ok(ReviewDecision::Reject),
            ExchangeStatus::Pending => Err(DomainError::validation(
                "status must be Aprobado or Rechazado",
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeRequest {
    pub id: Uuid,
    pub user_id: String,
    /// Reward type, e.g. academic credit
    #[serde(rename = "type")]
    pub kind: String,
    pub amount: Points,
    #[serde(default)]
    pub description: String,
    pub status: ExchangeStatus,
    pub date: DateTime<Utc>,
    /// Rate quoted when the request was created; approval converts at this rate
    pub exchange_rate: ExchangeRate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub academic_points: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Record for ExchangeRequest {
    const KIND: &'static str = "exchange_request";

    fn check(&self) -> Result<(), String> {
        if self.status == ExchangeStatus::Approved && self.academic_points.is_none() {
            return Err("approved request without academicPoints".to_string());
        }
        Ok(())
    }
}

/// Result of reviewing a request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewOutcome {
    pub request: ExchangeRequest,
    /// Badge keys granted as a consequence of the approval
    pub badges_awarded: Vec<String>,
}

impl Economy {
    pub fn find_exchange_request(&self, request_id: Uuid) -> Result<&ExchangeRequest, DomainError> {
        self.exchange_requests
            .iter()
            .find(|r| r.id == request_id)
            .ok_or_else(|| DomainError::RequestNotFound(request_id.to_string()))
    }

    /// Requests filtered by user and/or status, newest first
    pub fn exchange_requests_where(
        &self,
        user_id: Option<&str>,
        status: Option<ExchangeStatus>,
    ) -> Vec<&ExchangeRequest> {
        self.exchange_requests
            .iter()
            .rev()
            .filter(|r| user_id.map_or(true, |u| r.user_id == u))
            .filter(|r| status.map_or(true, |s| r.status == s))
            .collect()
    }

    pub fn approved_exchange_count(&self, user_id: &str) -> usize {
        self.exchange_requests
            .iter()
            .filter(|r| r.user_id == user_id && r.status == ExchangeStatus::Approved)
            .count()
    }

    /// Open a request. Fails when the amount exceeds the user's available
    /// balance, which already nets out pending requests and active bids.
    pub fn request_exchange(
        &mut self,
        user_id: &str,
        kind: &str,
        amount: Points,
        description: &str,
        now: DateTime<Utc>,
    ) -> Result<ExchangeRequest, DomainError> {
        self.ensure_accepting_user_operations()?;
        let kind = kind.trim();
        if kind.is_empty() {
            return Err(DomainError::validation("type is required"));
        }

        let available = self.available_balance(user_id)?;
        if amount.value() > available {
            return Err(DomainError::insufficient_balance(amount.value(), available));
        }

        let request = ExchangeRequest {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            kind: kind.to_string(),
            amount,
            description: description.trim().to_string(),
            status: ExchangeStatus::Pending,
            date: now,
            exchange_rate: self.system_config.exchange_rate,
            academic_points: None,
            reviewed_by: None,
            reviewed_date: None,
            notes: None,
        };
        self.exchange_requests.push(request.clone());
        self.touch();

        tracing::info!(
            request_id = %request.id,
            user_id = %user_id,
            amount = %amount,
            "Exchange requested"
        );
        Ok(request)
    }

    /// Approve or reject a pending request.
    ///
    /// Approval debits the user through a `Canje` assignment record and
    /// grants any exchange milestone badges in the same mutation.
    pub fn review_exchange(
        &mut self,
        request_id: Uuid,
        decision: ReviewDecision,
        reviewer: &str,
        notes: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<ReviewOutcome, DomainError> {
        let index = self
            .exchange_requests
            .iter()
            .position(|r| r.id == request_id && r.status == ExchangeStatus::Pending)
            .ok_or_else(|| DomainError::RequestNotFound(request_id.to_string()))?;

        let pending = self.exchange_requests[index].clone();
        let mut badges_awarded = Vec::new();

        let status = match decision {
            ReviewDecision::Approve => {
                let debit = PointsDelta::new(-pending.amount.value())?;
                let observation = format!("Canje: {}", pending.kind);
                self.append_assignment(
                    &pending.user_id,
                    debit,
                    &observation,
                    AssignmentKind::Exchange,
                    Some(reviewer),
                    now,
                )?;
                ExchangeStatus::Approved
            }
            ReviewDecision::Reject => ExchangeStatus::Rejected,
        };

        let request = &mut self.exchange_requests[index];
        request.status = status;
        request.reviewed_by = Some(reviewer.to_string());
        request.reviewed_date = Some(now);
        request.notes = notes.map(str::trim).filter(|n| !n.is_empty()).map(str::to_string);
        if status == ExchangeStatus::Approved {
            request.academic_points = Some(request.exchange_rate.convert(&request.amount));
        }
        let request = request.clone();
        self.touch();

        if status == ExchangeStatus::Approved {
            for trigger in BadgeTrigger::exchange_milestones() {
                let outcome = self.award_if_eligible(&request.user_id, &trigger)?;
                if let Some(key) = outcome.newly_awarded() {
                    badges_awarded.push(key.to_string());
                }
            }
        }

        tracing::info!(
            request_id = %request_id,
            user_id = %request.user_id,
            status = %status,
            reviewer = %reviewer,
            "Exchange reviewed"
        );
        Ok(ReviewOutcome { request, badges_awarded })
    }
}
