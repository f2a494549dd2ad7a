//! Audit & Stats
//!
//! Read-side totals and rankings derived from users, assignment history and
//! approved exchange requests. Nothing here mutates the economy.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::aggregate::{AssignmentKind, Economy, ExchangeStatus, User};
use crate::domain::DomainError;

/// Per-user totals
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub user_id: String,
    pub first_name: String,
    pub last_name: String,
    pub points: Decimal,
    pub academic_points: Decimal,
    /// Approved exchanges
    pub exchanges: usize,
}

/// Global totals plus the full ranking
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditStats {
    /// Number of `Asignación` records
    pub total_assignments: usize,
    /// Number of approved exchanges
    pub total_exchanges: usize,
    /// MB ever issued: sum of positive assignment amounts
    pub total_bills: Decimal,
    /// Sum of current balances
    pub total_points: Decimal,
    pub ranking: Vec<UserStats>,
}

#[derive(Default)]
struct ExchangeTotals {
    academic_points: Decimal,
    count: usize,
}

fn exchange_totals(economy: &Economy) -> HashMap<&str, ExchangeTotals> {
    let mut totals: HashMap<&str, ExchangeTotals> = HashMap::new();
    for request in economy.exchange_requests() {
        if request.status != ExchangeStatus::Approved {
            continue;
        }
        if economy.find_user(&request.user_id).is_none() {
            tracing::warn!(
                request_id = %request.id,
                user_id = %request.user_id,
                "Exchange request references unknown user"
            );
            continue;
        }
        let entry = totals.entry(request.user_id.as_str()).or_default();
        entry.academic_points += request.academic_points.unwrap_or_default();
        entry.count += 1;
    }
    totals
}

fn stats_for(user: &User, totals: Option<&ExchangeTotals>) -> UserStats {
    UserStats {
        user_id: user.id.clone(),
        first_name: user.first_name.clone(),
        last_name: user.last_name.clone(),
        points: user.points.value(),
        academic_points: totals.map(|t| t.academic_points).unwrap_or_default(),
        exchanges: totals.map_or(0, |t| t.count),
    }
}

impl AuditStats {
    pub fn compute(economy: &Economy) -> Self {
        let exchanges = exchange_totals(economy);

        let mut total_assignments = 0;
        let mut total_bills = Decimal::ZERO;
        for record in economy.assign_history() {
            if record.kind != AssignmentKind::Assignment {
                continue;
            }
            if economy.find_user(&record.user_id).is_none() {
                tracing::warn!(
                    record_id = %record.id,
                    user_id = %record.user_id,
                    "Assignment record references unknown user"
                );
                continue;
            }
            total_assignments += 1;
            if record.amount > Decimal::ZERO {
                total_bills += record.amount;
            }
        }

        let ranking = rank(
            economy
                .users()
                .iter()
                .map(|u| stats_for(u, exchanges.get(u.id.as_str())))
                .collect(),
        );

        Self {
            total_assignments,
            total_exchanges: exchanges.values().map(|t| t.count).sum(),
            total_bills,
            total_points: ranking.iter().map(|s| s.points).sum(),
            ranking,
        }
    }
}

/// Sort descending by balance. The sort is stable, so equal balances keep
/// user insertion order.
fn rank(mut stats: Vec<UserStats>) -> Vec<UserStats> {
    stats.sort_by(|a, b| b.points.cmp(&a.points));
    stats
}

/// Top `limit` users, or everyone when `limit` is `None`
pub fn ranking(economy: &Economy, limit: Option<usize>) -> Vec<UserStats> {
    let mut ranking = AuditStats::compute(economy).ranking;
    if let Some(limit) = limit {
        ranking.truncate(limit);
    }
    ranking
}

pub fn user_stats(economy: &Economy, user_id: &str) -> Result<UserStats, DomainError> {
    let user = economy.user(user_id)?;
    let exchanges = exchange_totals(economy);
    Ok(stats_for(user, exchanges.get(user_id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{AssignmentRecord, ReviewDecision};
    use crate::domain::{ExchangeRate, Points, PointsDelta};
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn economy() -> Economy {
        let mut economy = Economy::default();
        let now = Utc::now();
        for (id, first) in [("u1", "Ana"), ("u2", "Luis"), ("u3", "Marta")] {
            economy.register_user(id, first, "Test", now).unwrap();
            economy.approve_user(id, "admin", now).unwrap();
        }
        economy
    }

    fn assign(economy: &mut Economy, user_id: &str, amount: Decimal) {
        economy
            .assign_points(user_id, PointsDelta::new(amount).unwrap(), None, "admin", Utc::now())
            .unwrap();
    }

    #[test]
    fn test_totals_and_ranking() {
        let mut economy = economy();
        assign(&mut economy, "u1", dec!(500));
        assign(&mut economy, "u2", dec!(800));
        assign(&mut economy, "u2", dec!(-100));
        assign(&mut economy, "u3", dec!(50));

        let request = economy
            .request_exchange("u1", "academic", Points::from_integer(300).unwrap(), "", Utc::now())
            .unwrap();
        economy
            .review_exchange(request.id, ReviewDecision::Approve, "admin", None, Utc::now())
            .unwrap();

        let stats = AuditStats::compute(&economy);
        assert_eq!(stats.total_assignments, 4);
        assert_eq!(stats.total_exchanges, 1);
        assert_eq!(stats.total_bills, dec!(1350));
        assert_eq!(stats.total_points, dec!(200) + dec!(700) + dec!(50));

        let order: Vec<&str> = stats.ranking.iter().map(|s| s.user_id.as_str()).collect();
        assert_eq!(order, vec!["u2", "u1", "u3"]);
        assert_eq!(stats.ranking[1].academic_points, dec!(3));
        assert_eq!(stats.ranking[1].exchanges, 1);
    }

    #[test]
    fn test_ranking_ties_keep_insertion_order() {
        let mut economy = economy();
        assign(&mut economy, "u3", dec!(10));
        assign(&mut economy, "u1", dec!(10));

        let top = ranking(&economy, Some(2));
        let order: Vec<&str> = top.iter().map(|s| s.user_id.as_str()).collect();
        assert_eq!(order, vec!["u1", "u3"]);
    }

    #[test]
    fn test_unknown_users_are_skipped() {
        let mut economy = economy();
        assign(&mut economy, "u1", dec!(10));
        economy.assign_history.push(AssignmentRecord {
            id: Uuid::new_v4(),
            user_id: "ghost".into(),
            amount: dec!(1000),
            observation: String::new(),
            date: Utc::now(),
            kind: AssignmentKind::Assignment,
            assigned_by: None,
        });

        let stats = AuditStats::compute(&economy);
        assert_eq!(stats.total_assignments, 1);
        assert_eq!(stats.total_bills, dec!(10));
        assert_eq!(stats.ranking.len(), 3);
    }

    #[test]
    fn test_academic_points_use_rate_at_request_time() {
        let mut economy = economy();
        assign(&mut economy, "u1", dec!(500));
        let request = economy
            .request_exchange("u1", "academic", Points::from_integer(300).unwrap(), "", Utc::now())
            .unwrap();
        economy.set_exchange_rate(ExchangeRate::new(dec!(50)).unwrap());
        economy
            .review_exchange(request.id, ReviewDecision::Approve, "admin", None, Utc::now())
            .unwrap();

        let before = user_stats(&economy, "u1").unwrap();
        economy.set_exchange_rate(ExchangeRate::new(dec!(10)).unwrap());
        let after = user_stats(&economy, "u1").unwrap();

        assert_eq!(before.academic_points, dec!(3));
        assert_eq!(after, before);
    }

    #[test]
    fn test_user_stats_unknown_user() {
        assert!(matches!(
            user_stats(&economy(), "ghost"),
            Err(DomainError::UserNotFound(_))
        ));
    }
}
