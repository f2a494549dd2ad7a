//! Points Ledger
//!
//! Balance mutations driven by assignment records, and the committed vs
//! available split used by bids and exchange requests.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::{AmountError, Balance, DomainError, PointsDelta};

use super::{AssignmentKind, AssignmentRecord, AuctionStatus, Economy, ExchangeStatus};

/// Balance split reported to users
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PointsSummary {
    pub user_id: String,
    pub points: Decimal,
    pub committed_points: Decimal,
    pub available_points: Decimal,
}

/// Outcome of a history reconciliation
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecomputeReport {
    pub users_checked: usize,
    pub users_changed: usize,
    pub records_skipped: usize,
    /// Stored records that could not be decoded
    pub records_quarantined: usize,
}

impl Economy {
    /// Append a ledger line and move the user's balance by `delta`.
    /// Nothing is written if the balance would go negative.
    pub(crate) fn append_assignment(
        &mut self,
        user_id: &str,
        delta: PointsDelta,
        observation: &str,
        kind: AssignmentKind,
        assigned_by: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<AssignmentRecord, DomainError> {
        let user = self.user_mut(user_id)?;
        let new_balance = user.points.apply(&delta).map_err(|err| match err {
            AmountError::Negative(_) => {
                DomainError::insufficient_balance(-delta.value(), user.points.value())
            }
            other => DomainError::from(other),
        })?;
        user.points = new_balance;

        let record = AssignmentRecord {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            amount: delta.value(),
            observation: observation.to_string(),
            date: now,
            kind,
            assigned_by: assigned_by.map(str::to_string),
        };
        self.assign_history.push(record.clone());
        self.touch();
        Ok(record)
    }

    /// Admin grant or deduction of points
    pub fn assign_points(
        &mut self,
        user_id: &str,
        delta: PointsDelta,
        observation: Option<&str>,
        assigned_by: &str,
        now: DateTime<Utc>,
    ) -> Result<AssignmentRecord, DomainError> {
        let observation = observation.map(str::trim).unwrap_or_default();
        let record = self.append_assignment(
            user_id,
            delta,
            observation,
            AssignmentKind::Assignment,
            Some(assigned_by),
            now,
        )?;

        tracing::info!(
            user_id = %user_id,
            amount = %delta,
            record_id = %record.id,
            "Points assigned"
        );
        Ok(record)
    }

    /// Points held by the user's bids: per active auction only the user's own
    /// highest bid counts, bids in the same auction do not stack.
    pub fn committed_in_auctions(&self, user_id: &str) -> Decimal {
        self.committed_in_auctions_except(user_id, None)
    }

    pub(crate) fn committed_in_auctions_except(
        &self,
        user_id: &str,
        excluded: Option<Uuid>,
    ) -> Decimal {
        self.auctions
            .iter()
            .filter(|a| a.status == AuctionStatus::Active && Some(a.id) != excluded)
            .filter_map(|a| a.highest_bid_of(user_id))
            .sum()
    }

    /// Points reserved by the user's pending exchange requests
    pub fn committed_in_exchanges(&self, user_id: &str) -> Decimal {
        self.exchange_requests
            .iter()
            .filter(|r| r.user_id == user_id && r.status == ExchangeStatus::Pending)
            .map(|r| r.amount.value())
            .sum()
    }

    pub fn committed_points(&self, user_id: &str) -> Decimal {
        self.committed_in_auctions(user_id) + self.committed_in_exchanges(user_id)
    }

    /// Balance minus everything currently committed. May be negative when an
    /// admin deduction lands after points were committed.
    pub fn available_balance(&self, user_id: &str) -> Result<Decimal, DomainError> {
        let user = self.user(user_id)?;
        Ok(user.points.value() - self.committed_points(user_id))
    }

    pub fn points_summary(&self, user_id: &str) -> Result<PointsSummary, DomainError> {
        let user = self.user(user_id)?;
        let committed = self.committed_points(user_id);
        Ok(PointsSummary {
            user_id: user.id.clone(),
            points: user.points.value(),
            committed_points: committed,
            available_points: user.points.value() - committed,
        })
    }

    /// Net sum of assignment records per known user, considering only records
    /// dated before `cutoff` when one is given. Users keep insertion order.
    pub fn balances_from_history(
        &self,
        cutoff: Option<DateTime<Utc>>,
    ) -> (Vec<(String, Decimal)>, usize) {
        let mut totals: HashMap<&str, Decimal> = HashMap::with_capacity(self.users.len());
        for user in &self.users {
            totals.insert(user.id.as_str(), Decimal::ZERO);
        }

        let mut skipped = 0;
        for record in &self.assign_history {
            if cutoff.is_some_and(|c| record.date >= c) {
                continue;
            }
            match totals.get_mut(record.user_id.as_str()) {
                Some(total) => *total += record.amount,
                None => {
                    tracing::warn!(
                        record_id = %record.id,
                        user_id = %record.user_id,
                        "Assignment record references unknown user"
                    );
                    skipped += 1;
                }
            }
        }

        let balances = self
            .users
            .iter()
            .map(|u| (u.id.clone(), totals.get(u.id.as_str()).copied().unwrap_or_default()))
            .collect();
        (balances, skipped)
    }

    /// Rebuild every balance from the assignment history. Repair tool, not
    /// used on the hot path. Applying it twice gives the same result.
    ///
    /// Balances are left alone while part of the history could not be
    /// decoded, since the readable records no longer sum to the truth.
    pub fn recompute_from_history(&mut self) -> RecomputeReport {
        let quarantined = self.assign_history.quarantined();
        if quarantined > 0 {
            tracing::warn!(
                quarantined,
                "Assignment history has unreadable records, balances left unchanged"
            );
            return RecomputeReport {
                users_checked: self.users.len(),
                records_quarantined: quarantined,
                ..RecomputeReport::default()
            };
        }

        let (balances, skipped) = self.balances_from_history(None);
        let mut report = RecomputeReport {
            users_checked: balances.len(),
            records_skipped: skipped,
            ..RecomputeReport::default()
        };

        for (user_id, total) in balances {
            let rebuilt = match Balance::new(total) {
                Ok(balance) => balance,
                Err(AmountError::Negative(_)) => {
                    tracing::warn!(
                        user_id = %user_id,
                        total = %total,
                        "History sums to a negative balance, clamping to zero"
                    );
                    Balance::zero()
                }
                Err(err) => {
                    tracing::warn!(
                        user_id = %user_id,
                        total = %total,
                        error = %err,
                        "History total is out of range, keeping stored balance"
                    );
                    continue;
                }
            };
            if let Ok(user) = self.user_mut(&user_id) {
                if user.points != rebuilt {
                    tracing::info!(
                        user_id = %user_id,
                        stored = %user.points,
                        rebuilt = %rebuilt,
                        "Balance corrected from history"
                    );
                    user.points = rebuilt;
                    report.users_changed += 1;
                }
            }
        }

        if report.users_changed > 0 {
            self.touch();
        }
        report
    }
}
