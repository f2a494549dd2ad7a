//! Admin Handlers
//!
//! System configuration, announcements and manual badge grants.

use chrono::Utc;
use serde::Serialize;

use crate::aggregate::{Announcement, AwardOutcome, BadgeTrigger, ConfigUpdate, SystemConfig};
use crate::audit::{AuditAction, AuditLogBuilder};
use crate::domain::{ExchangeRate, OperationContext};
use crate::error::AppResult;
use crate::store::EconomyRepository;

use super::AwardBadgeCommand;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateChange {
    pub previous: ExchangeRate,
    pub rate: ExchangeRate,
}

/// Handler for system configuration changes
pub struct ConfigHandler {
    repository: EconomyRepository,
}

impl ConfigHandler {
    pub fn new(repository: EconomyRepository) -> Self {
        Self { repository }
    }

    /// Change the rate for new exchange requests. Existing requests keep the
    /// rate quoted when they were created.
    pub async fn set_exchange_rate(
        &self,
        rate: ExchangeRate,
        context: &OperationContext,
    ) -> AppResult<RateChange> {
        context.require_admin()?;

        let change = self
            .repository
            .mutate(|economy| -> AppResult<RateChange> {
                let previous = economy.set_exchange_rate(rate);
                let change = RateChange { previous, rate };
                economy.record_audit(
                    AuditLogBuilder::new(AuditAction::ConfigUpdated)
                        .resource_type("system_config")
                        .resource_id("exchangeRate")
                        .details(&change),
                    context,
                    Utc::now(),
                );
                Ok(change)
            })
            .await?;

        tracing::info!(previous = %change.previous, rate = %change.rate, "Exchange rate updated");
        Ok(change)
    }

    pub async fn update(
        &self,
        update: ConfigUpdate,
        context: &OperationContext,
    ) -> AppResult<SystemConfig> {
        context.require_admin()?;

        let config = self
            .repository
            .mutate(|economy| -> AppResult<SystemConfig> {
                let config = economy.update_config(&update)?;
                economy.record_audit(
                    AuditLogBuilder::new(AuditAction::ConfigUpdated)
                        .resource_type("system_config")
                        .details(&update),
                    context,
                    Utc::now(),
                );
                Ok(config)
            })
            .await?;

        tracing::info!(
            maintenance_mode = config.maintenance_mode,
            enforce_bid_coverage = config.enforce_bid_coverage,
            "System configuration updated"
        );
        Ok(config)
    }
}

/// Handler for announcements
pub struct AnnouncementHandler {
    repository: EconomyRepository,
}

impl AnnouncementHandler {
    pub fn new(repository: EconomyRepository) -> Self {
        Self { repository }
    }

    pub async fn post(&self, message: &str, context: &OperationContext) -> AppResult<Announcement> {
        context.require_admin()?;

        self.repository
            .mutate(|economy| -> AppResult<Announcement> {
                let now = Utc::now();
                let announcement = economy.post_announcement(message, &context.actor(), now)?;
                economy.record_audit(
                    AuditLogBuilder::new(AuditAction::AnnouncementPosted)
                        .resource_type("announcement")
                        .resource_id(announcement.id)
                        .details(&announcement),
                    context,
                    now,
                );
                Ok(announcement)
            })
            .await
    }
}

/// Handler for explicit badge grants
pub struct AwardBadgeHandler {
    repository: EconomyRepository,
}

impl AwardBadgeHandler {
    pub fn new(repository: EconomyRepository) -> Self {
        Self { repository }
    }

    pub async fn execute(
        &self,
        command: AwardBadgeCommand,
        context: &OperationContext,
    ) -> AppResult<AwardOutcome> {
        context.require_admin()?;
        let trigger = BadgeTrigger::Manual(command.badge);

        self.repository
            .mutate(|economy| -> AppResult<AwardOutcome> {
                let outcome = economy.award_if_eligible(&command.user_id, &trigger)?;
                if let Some(badge) = outcome.newly_awarded() {
                    economy.record_audit(
                        AuditLogBuilder::new(AuditAction::BadgeAwarded)
                            .resource_type("user")
                            .resource_id(&command.user_id)
                            .details(&serde_json::json!({ "badge": badge })),
                        context,
                        Utc::now(),
                    );
                }
                Ok(outcome)
            })
            .await
    }
}
