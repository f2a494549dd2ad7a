//! Points Handlers
//!
//! Admin point assignments and history reconciliation.

use chrono::Utc;

use crate::aggregate::{AssignmentRecord, RecomputeReport};
use crate::audit::{AuditAction, AuditLogBuilder};
use crate::domain::{OperationContext, PointsDelta};
use crate::error::{AppError, AppResult};
use crate::store::EconomyRepository;

use super::AssignPointsCommand;

/// Handler for point assignments
pub struct AssignPointsHandler {
    repository: EconomyRepository,
}

impl AssignPointsHandler {
    pub fn new(repository: EconomyRepository) -> Self {
        Self { repository }
    }

    /// Execute the assignment. The balance never goes below zero; a deduction
    /// larger than the balance fails without writing anything.
    pub async fn execute(
        &self,
        command: AssignPointsCommand,
        context: &OperationContext,
    ) -> AppResult<AssignmentRecord> {
        context.require_admin()?;

        let delta = PointsDelta::new(command.amount)
            .map_err(|e| AppError::InvalidRequest(format!("Invalid amount: {}", e)))?;

        self.repository
            .mutate(|economy| -> AppResult<AssignmentRecord> {
                let now = Utc::now();
                let record = economy.assign_points(
                    &command.user_id,
                    delta,
                    command.observation.as_deref(),
                    &context.actor(),
                    now,
                )?;
                economy.record_audit(
                    AuditLogBuilder::new(AuditAction::PointsAssigned)
                        .resource_type("user")
                        .resource_id(&record.user_id)
                        .details(&record),
                    context,
                    now,
                );
                Ok(record)
            })
            .await
    }
}

/// Handler for rebuilding balances from the assignment history
pub struct RecomputeBalancesHandler {
    repository: EconomyRepository,
}

impl RecomputeBalancesHandler {
    pub fn new(repository: EconomyRepository) -> Self {
        Self { repository }
    }

    pub async fn execute(&self, context: &OperationContext) -> AppResult<RecomputeReport> {
        context.require_admin()?;

        let report = self
            .repository
            .mutate(|economy| -> AppResult<RecomputeReport> {
                let report = economy.recompute_from_history();
                if report.users_changed > 0 {
                    economy.record_audit(
                        AuditLogBuilder::new(AuditAction::PointsRecomputed)
                            .resource_type("economy")
                            .details(&report),
                        context,
                        Utc::now(),
                    );
                }
                Ok(report)
            })
            .await?;

        tracing::info!(
            users_checked = report.users_checked,
            users_changed = report.users_changed,
            records_skipped = report.records_skipped,
            records_quarantined = report.records_quarantined,
            "Balances recomputed from history"
        );
        Ok(report)
    }
}
