//! Badge Awarder
//!
//! Badges are keyed by `(user_id, badge_key)` and stored with set semantics,
//! so granting an existing badge never changes the set.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

use super::Economy;

pub const FIRST_EXCHANGE: &str = "first_exchange";
const EXCHANGE_MILESTONES: &[usize] = &[5, 10];
const TOP_OF_MONTH_PREFIX: &str = "top_of_month";

/// userId -> set of badge keys
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BadgeSet(BTreeMap<String, BTreeSet<String>>);

impl BadgeSet {
    /// Insert a key. Returns `true` only when it was not already held.
    pub fn insert(&mut self, user_id: &str, key: &str) -> bool {
        self.0
            .entry(user_id.to_string())
            .or_default()
            .insert(key.to_string())
    }

    pub fn has(&self, user_id: &str, key: &str) -> bool {
        self.0.get(user_id).is_some_and(|keys| keys.contains(key))
    }

    pub fn for_user(&self, user_id: &str) -> Vec<String> {
        self.0
            .get(user_id)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn count_for(&self, user_id: &str) -> usize {
        self.0.get(user_id).map_or(0, BTreeSet::len)
    }
}

/// What prompted a badge check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BadgeTrigger {
    /// At least one approved exchange
    FirstExchange,
    /// At least `n` approved exchanges
    ExchangeMilestone(usize),
    /// Leader of the ranking built from history recorded before `cutoff`
    TopOfPeriod { period: String, cutoff: DateTime<Utc> },
    /// Explicit admin grant
    Manual(String),
}

impl BadgeTrigger {
    pub fn exchange_milestones() -> Vec<BadgeTrigger> {
        std::iter::once(BadgeTrigger::FirstExchange)
            .chain(EXCHANGE_MILESTONES.iter().map(|n| BadgeTrigger::ExchangeMilestone(*n)))
            .collect()
    }

    pub fn badge_key(&self) -> String {
        match self {
            BadgeTrigger::FirstExchange => FIRST_EXCHANGE.to_string(),
            BadgeTrigger::ExchangeMilestone(n) => format!("exchanges_{}", n),
            BadgeTrigger::TopOfPeriod { period, .. } => {
                format!("{}:{}", TOP_OF_MONTH_PREFIX, period)
            }
            BadgeTrigger::Manual(key) => key.trim().to_string(),
        }
    }
}

/// Result of an award attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "badge", rename_all = "snake_case")]
pub enum AwardOutcome {
    Awarded(String),
    AlreadyHeld(String),
    NotEligible,
}

impl AwardOutcome {
    pub fn newly_awarded(&self) -> Option<&str> {
        match self {
            AwardOutcome::Awarded(key) => Some(key),
            _ => None,
        }
    }
}

impl Economy {
    /// Leader of the ranking rebuilt from history before `cutoff`. Ties keep
    /// user insertion order; nobody leads with a zero or negative total.
    pub fn period_leader(&self, cutoff: DateTime<Utc>) -> Option<String> {
        let (balances, _) = self.balances_from_history(Some(cutoff));
        let mut leader: Option<(String, Decimal)> = None;
        for (user_id, total) in balances {
            if total <= Decimal::ZERO {
                continue;
            }
            if leader.as_ref().map_or(true, |(_, best)| total > *best) {
                leader = Some((user_id, total));
            }
        }
        leader.map(|(user_id, _)| user_id)
    }

    fn is_eligible(&self, user_id: &str, trigger: &BadgeTrigger) -> bool {
        match trigger {
            BadgeTrigger::FirstExchange => self.approved_exchange_count(user_id) >= 1,
            BadgeTrigger::ExchangeMilestone(n) => self.approved_exchange_count(user_id) >= *n,
            BadgeTrigger::TopOfPeriod { cutoff, .. } => {
                self.period_leader(*cutoff).as_deref() == Some(user_id)
            }
            BadgeTrigger::Manual(_) => true,
        }
    }

    /// Grant the trigger's badge if the user qualifies right now. Idempotent.
    pub fn award_if_eligible(
        &mut self,
        user_id: &str,
        trigger: &BadgeTrigger,
    ) -> Result<AwardOutcome, DomainError> {
        self.user(user_id)?;
        let key = trigger.badge_key();
        if key.is_empty() {
            return Err(DomainError::validation("badge key is required"));
        }

        if self.badges.has(user_id, &key) {
            return Ok(AwardOutcome::AlreadyHeld(key));
        }
        if !self.is_eligible(user_id, trigger) {
            return Ok(AwardOutcome::NotEligible);
        }

        self.badges.insert(user_id, &key);
        self.touch();
        tracing::info!(user_id = %user_id, badge = %key, "Badge awarded");
        Ok(AwardOutcome::Awarded(key))
    }
}
