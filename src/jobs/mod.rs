//! Scheduled Jobs
//!
//! Background jobs driven by the clock: closing auctions past their end date
//! and awarding the monthly ranking badge. Both compute their result from the
//! time they are given, so a late or repeated run yields the same outcome.

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use serde::Serialize;
use std::time::Duration;
use tokio::time::interval;
use uuid::Uuid;

use crate::aggregate::{AuctionTransition, BadgeTrigger};
use crate::audit::{AuditAction, AuditLogBuilder};
use crate::domain::{DomainError, OperationContext};
use crate::store::{EconomyRepository, StoreError};

// =========================================================================
// Expired auction closing
// =========================================================================

/// Finalize every active auction whose end date is at or before `now`
pub async fn close_expired_auctions(
    repository: &EconomyRepository,
    now: DateTime<Utc>,
) -> Result<Vec<AuctionTransition>, JobError> {
    let context = OperationContext::system();

    let closed = repository
        .mutate(|economy| -> Result<Vec<AuctionTransition>, JobError> {
            let mut closed = Vec::new();
            for auction_id in economy.expired_auctions(now) {
                let transition = economy.finalize_auction(auction_id, now)?;
                economy.record_audit(
                    AuditLogBuilder::new(AuditAction::AuctionFinalized)
                        .resource_type("auction")
                        .resource_id(auction_id)
                        .details(&serde_json::json!({
                            "reason": "expired",
                            "winner": transition.winner.as_ref().map(|b| &b.user_id),
                            "highestBid": transition.auction.highest_bid,
                        })),
                    &context,
                    now,
                );
                closed.push(transition);
            }
            Ok(closed)
        })
        .await?;

    if !closed.is_empty() {
        tracing::info!(count = closed.len(), "Closed expired auctions");
    }
    Ok(closed)
}

// =========================================================================
// Monthly champion badge
// =========================================================================

/// Period label (`YYYY-MM`) of the month before `now`, and the instant that
/// month ended
pub fn previous_period(now: DateTime<Utc>) -> (String, DateTime<Utc>) {
    let (year, month) = if now.month() == 1 {
        (now.year() - 1, 12)
    } else {
        (now.year(), now.month() - 1)
    };
    let period = format!("{}-{:02}", year, month);

    let month_start = NaiveDate::from_ymd_opt(now.year(), now.month(), 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| Utc.from_utc_datetime(&dt))
        .unwrap_or(now);

    (period, month_start)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChampionAward {
    pub user_id: String,
    pub badge: String,
}

/// Grant `top_of_month:YYYY-MM` for the month before `now` to the leader of
/// the ranking rebuilt from history recorded before that month ended.
/// Returns `None` when there is no leader or the badge was already granted.
pub async fn award_period_champion(
    repository: &EconomyRepository,
    now: DateTime<Utc>,
) -> Result<Option<ChampionAward>, JobError> {
    let (period, cutoff) = previous_period(now);
    let trigger = BadgeTrigger::TopOfPeriod { period, cutoff };
    let context = OperationContext::system();

    let award = repository
        .mutate(|economy| -> Result<Option<ChampionAward>, JobError> {
            let Some(leader) = economy.period_leader(cutoff) else {
                return Ok(None);
            };
            let outcome = economy.award_if_eligible(&leader, &trigger)?;
            let Some(badge) = outcome.newly_awarded() else {
                return Ok(None);
            };
            let award = ChampionAward {
                user_id: leader,
                badge: badge.to_string(),
            };
            economy.record_audit(
                AuditLogBuilder::new(AuditAction::BadgeAwarded)
                    .resource_type("user")
                    .resource_id(&award.user_id)
                    .details(&award),
                &context,
                now,
            );
            Ok(Some(award))
        })
        .await?;

    if let Some(award) = &award {
        tracing::info!(user_id = %award.user_id, badge = %award.badge, "Period champion awarded");
    }
    Ok(award)
}

// =========================================================================
// Job Scheduler
// =========================================================================

/// Configuration for job scheduler
#[derive(Debug, Clone)]
pub struct JobSchedulerConfig {
    /// Interval for closing expired auctions (default: 1 minute)
    pub auction_close_interval: Duration,
    /// Interval for the monthly champion check (default: 1 hour)
    pub champion_check_interval: Duration,
}

impl Default for JobSchedulerConfig {
    fn default() -> Self {
        Self {
            auction_close_interval: Duration::from_secs(60),
            champion_check_interval: Duration::from_secs(3600),
        }
    }
}

/// Job Scheduler - runs periodic maintenance tasks
pub struct JobScheduler {
    repository: EconomyRepository,
    config: JobSchedulerConfig,
}

impl JobScheduler {
    /// Create a new job scheduler
    pub fn new(repository: EconomyRepository) -> Self {
        Self {
            repository,
            config: JobSchedulerConfig::default(),
        }
    }

    /// Create with custom configuration
    pub fn with_config(repository: EconomyRepository, config: JobSchedulerConfig) -> Self {
        Self { repository, config }
    }

    /// Start the job scheduler in the background
    /// Returns a handle that can be used to abort the scheduler
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    /// Run the scheduler loop
    async fn run(&self) {
        tracing::info!(
            auction_close_secs = self.config.auction_close_interval.as_secs(),
            champion_check_secs = self.config.champion_check_interval.as_secs(),
            "Job scheduler started"
        );

        let mut auction_interval = interval(self.config.auction_close_interval);
        let mut champion_interval = interval(self.config.champion_check_interval);

        loop {
            tokio::select! {
                _ = auction_interval.tick() => {
                    if let Err(e) = close_expired_auctions(&self.repository, Utc::now()).await {
                        tracing::error!(error = %e, "Closing expired auctions failed");
                    }
                }
                _ = champion_interval.tick() => {
                    if let Err(e) = award_period_champion(&self.repository, Utc::now()).await {
                        tracing::error!(error = %e, "Period champion award failed");
                    }
                }
            }
        }
    }

    /// Run all jobs once (for manual trigger or testing)
    pub async fn run_all_once(&self, now: DateTime<Utc>) -> MaintenanceReport {
        run_jobs(&self.repository, now).await
    }
}

/// Run every job once against `repository`
pub async fn run_jobs(repository: &EconomyRepository, now: DateTime<Utc>) -> MaintenanceReport {
    let mut report = MaintenanceReport::new(now);

    match close_expired_auctions(repository, now).await {
        Ok(closed) => report.auctions_closed = closed.iter().map(|t| t.auction.id).collect(),
        Err(e) => report.errors.push(format!("Auction closing: {}", e)),
    }

    match award_period_champion(repository, now).await {
        Ok(award) => report.champion = award,
        Err(e) => report.errors.push(format!("Champion award: {}", e)),
    }

    report.completed_at = Utc::now();
    report
}

/// Report from running maintenance jobs
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceReport {
    /// Clock the jobs were evaluated against
    pub evaluated_at: DateTime<Utc>,
    pub auctions_closed: Vec<Uuid>,
    pub champion: Option<ChampionAward>,
    pub errors: Vec<String>,
    pub completed_at: DateTime<Utc>,
}

impl MaintenanceReport {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            evaluated_at: now,
            auctions_closed: Vec::new(),
            champion: None,
            errors: Vec::new(),
            completed_at: now,
        }
    }
}

/// Job execution errors
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{AuctionStatus, NewAuction, SystemConfig};
    use crate::domain::{Points, PointsDelta};
    use crate::store::MemoryAggregateStore;
    use chrono::Duration as ChronoDuration;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn repository() -> EconomyRepository {
        EconomyRepository::new(Arc::new(MemoryAggregateStore::new()), SystemConfig::default())
    }

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_previous_period() {
        let (period, cutoff) = previous_period(at(2026, 10, 16));
        assert_eq!(period, "2026-09");
        assert_eq!(cutoff, Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap());

        let (period, cutoff) = previous_period(at(2026, 1, 3));
        assert_eq!(period, "2025-12");
        assert_eq!(cutoff, Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_job_scheduler_config_default() {
        let config = JobSchedulerConfig::default();
        assert_eq!(config.auction_close_interval, Duration::from_secs(60));
        assert_eq!(config.champion_check_interval, Duration::from_secs(3600));
    }

    #[tokio::test]
    async fn test_close_expired_auctions() {
        let repo = repository();
        let now = Utc::now();
        let (expired, open) = repo
            .mutate(|economy| -> Result<_, JobError> {
                let mut create = |end: DateTime<Utc>| {
                    economy.create_auction(NewAuction {
                        title: "Lamp".into(),
                        description: String::new(),
                        base_price: dec!(10),
                        start_date: (now - ChronoDuration::days(2)).to_rfc3339(),
                        end_date: end.to_rfc3339(),
                        created_by: "admin".into(),
                    })
                };
                let expired = create(now - ChronoDuration::minutes(5))?;
                let open = create(now + ChronoDuration::days(1))?;
                Ok((expired.id, open.id))
            })
            .await
            .unwrap();

        let closed = close_expired_auctions(&repo, now).await.unwrap();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].auction.id, expired);

        let economy = repo.load().await.unwrap();
        assert_eq!(economy.find_auction(expired).unwrap().status, AuctionStatus::Finalized);
        assert_eq!(economy.find_auction(open).unwrap().status, AuctionStatus::Active);

        // nothing left to close
        assert!(close_expired_auctions(&repo, now).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_champion_uses_snapshot_at_period_end() {
        let repo = repository();
        let september = at(2026, 9, 10);
        let october = at(2026, 10, 2);

        repo.mutate(|economy| -> Result<(), JobError> {
            economy.register_user("u1", "Ana", "Ruiz", september)?;
            economy.register_user("u2", "Luis", "Mora", september)?;
            let grant = |amount| PointsDelta::new(amount).unwrap();
            economy.assign_points("u1", grant(dec!(80)), None, "admin", september)?;
            economy.assign_points("u2", grant(dec!(50)), None, "admin", september)?;
            // after the period closed
            economy.assign_points("u2", grant(dec!(500)), None, "admin", october)?;
            Ok(())
        })
        .await
        .unwrap();

        let now = at(2026, 10, 5);
        let award = award_period_champion(&repo, now).await.unwrap().unwrap();
        assert_eq!(award.user_id, "u1");
        assert_eq!(award.badge, "top_of_month:2026-09");

        // second run is a no-op
        assert!(award_period_champion(&repo, now).await.unwrap().is_none());
        let economy = repo.load().await.unwrap();
        assert_eq!(economy.badges().for_user("u1"), vec!["top_of_month:2026-09".to_string()]);
        assert!(economy.badges().for_user("u2").is_empty());
    }

    #[tokio::test]
    async fn test_run_all_once_on_empty_economy() {
        let scheduler = JobScheduler::new(repository());
        let report = scheduler.run_all_once(Utc::now()).await;
        assert!(report.auctions_closed.is_empty());
        assert!(report.champion.is_none());
        assert!(report.errors.is_empty());
    }

    #[tokio::test]
    async fn test_bids_survive_expiry_close() {
        let repo = repository();
        let now = Utc::now();
        let auction_id = repo
            .mutate(|economy| -> Result<Uuid, JobError> {
                let auction = economy.create_auction(NewAuction {
                    title: "Cloak".into(),
                    description: String::new(),
                    base_price: dec!(10),
                    start_date: (now - ChronoDuration::days(1)).to_rfc3339(),
                    end_date: (now + ChronoDuration::seconds(1)).to_rfc3339(),
                    created_by: "admin".into(),
                })?;
                let bidder = crate::aggregate::Bidder::new("u1", "Ana", "Ruiz");
                economy.place_bid(auction.id, &bidder, Points::from_integer(25).unwrap(), now)?;
                Ok(auction.id)
            })
            .await
            .unwrap();

        let closed = close_expired_auctions(&repo, now + ChronoDuration::minutes(1)).await.unwrap();
        assert_eq!(closed[0].auction.id, auction_id);
        assert_eq!(closed[0].winner.as_ref().unwrap().user_id, "u1");
    }
}
