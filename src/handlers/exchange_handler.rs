//! Exchange Handlers
//!
//! Users request rewards; admins approve or reject.

use chrono::Utc;

use crate::aggregate::{ExchangeRequest, ReviewDecision, ReviewOutcome};
use crate::audit::{AuditAction, AuditLogBuilder};
use crate::domain::{OperationContext, Points};
use crate::error::{AppError, AppResult};
use crate::store::EconomyRepository;

use super::{RequestExchangeCommand, ReviewExchangeCommand};

/// Handler for new exchange requests
pub struct RequestExchangeHandler {
    repository: EconomyRepository,
}

impl RequestExchangeHandler {
    pub fn new(repository: EconomyRepository) -> Self {
        Self { repository }
    }

    /// The requesting user comes from the context, never from the body
    pub async fn execute(
        &self,
        command: RequestExchangeCommand,
        context: &OperationContext,
    ) -> AppResult<ExchangeRequest> {
        let user_id = context.require_user()?;
        let amount = Points::new(command.amount)
            .map_err(|e| AppError::InvalidRequest(format!("Invalid amount: {}", e)))?;
        let description = command.description.unwrap_or_default();

        self.repository
            .mutate(|economy| -> AppResult<ExchangeRequest> {
                let now = Utc::now();
                let request =
                    economy.request_exchange(user_id, &command.kind, amount, &description, now)?;
                economy.record_audit(
                    AuditLogBuilder::new(AuditAction::ExchangeRequested)
                        .resource_type("exchange_request")
                        .resource_id(request.id)
                        .details(&request),
                    context,
                    now,
                );
                Ok(request)
            })
            .await
    }
}

/// Handler for admin review of pending requests
pub struct ReviewExchangeHandler {
    repository: EconomyRepository,
}

impl ReviewExchangeHandler {
    pub fn new(repository: EconomyRepository) -> Self {
        Self { repository }
    }

    pub async fn execute(
        &self,
        command: ReviewExchangeCommand,
        context: &OperationContext,
    ) -> AppResult<ReviewOutcome> {
        context.require_admin()?;
        let decision = ReviewDecision::try_from(command.status)?;
        let action = match decision {
            ReviewDecision::Approve => AuditAction::ExchangeApproved,
            ReviewDecision::Reject => AuditAction::ExchangeRejected,
        };

        self.repository
            .mutate(|economy| -> AppResult<ReviewOutcome> {
                let now = Utc::now();
                let outcome = economy.review_exchange(
                    command.request_id,
                    decision,
                    &context.actor(),
                    command.notes.as_deref(),
                    now,
                )?;
                economy.record_audit(
                    AuditLogBuilder::new(action)
                        .resource_type("exchange_request")
                        .resource_id(command.request_id)
                        .details(&outcome.request),
                    context,
                    now,
                );
                for badge in &outcome.badges_awarded {
                    economy.record_audit(
                        AuditLogBuilder::new(AuditAction::BadgeAwarded)
                            .resource_type("user")
                            .resource_id(&outcome.request.user_id)
                            .details(&serde_json::json!({ "badge": badge })),
                        context,
                        now,
                    );
                }
                Ok(outcome)
            })
            .await
    }
}
