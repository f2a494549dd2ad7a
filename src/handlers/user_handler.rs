//! User Handlers
//!
//! Registration and approval of community members.

use chrono::Utc;
use serde::Serialize;

use crate::aggregate::User;
use crate::audit::{AuditAction, AuditLogBuilder};
use crate::domain::OperationContext;
use crate::error::AppResult;
use crate::store::EconomyRepository;

use super::RegisterUserCommand;

/// Handler for user registration
pub struct RegisterUserHandler {
    repository: EconomyRepository,
}

impl RegisterUserHandler {
    pub fn new(repository: EconomyRepository) -> Self {
        Self { repository }
    }

    pub async fn execute(
        &self,
        command: RegisterUserCommand,
        context: &OperationContext,
    ) -> AppResult<User> {
        let user = self
            .repository
            .mutate(|economy| -> AppResult<User> {
                let now = Utc::now();
                let user = economy.register_user(
                    &command.user_id,
                    &command.first_name,
                    &command.last_name,
                    now,
                )?;
                economy.record_audit(
                    AuditLogBuilder::new(AuditAction::UserRegistered)
                        .resource_type("user")
                        .resource_id(&user.id)
                        .details(&user),
                    context,
                    now,
                );
                Ok(user)
            })
            .await?;

        tracing::info!(user_id = %user.id, "User registered");
        Ok(user)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveUserResult {
    pub user: User,
    /// False when the user was already active
    pub changed: bool,
}

/// Handler for approving pending registrations
pub struct ApproveUserHandler {
    repository: EconomyRepository,
}

impl ApproveUserHandler {
    pub fn new(repository: EconomyRepository) -> Self {
        Self { repository }
    }

    pub async fn execute(
        &self,
        user_id: &str,
        context: &OperationContext,
    ) -> AppResult<ApproveUserResult> {
        context.require_admin()?;

        let result = self
            .repository
            .mutate(|economy| -> AppResult<ApproveUserResult> {
                let now = Utc::now();
                match economy.approve_user(user_id, &context.actor(), now)? {
                    Some(user) => {
                        economy.record_audit(
                            AuditLogBuilder::new(AuditAction::UserApproved)
                                .resource_type("user")
                                .resource_id(&user.id)
                                .details(&user),
                            context,
                            now,
                        );
                        Ok(ApproveUserResult { user, changed: true })
                    }
                    None => Ok(ApproveUserResult {
                        user: economy.user(user_id)?.clone(),
                        changed: false,
                    }),
                }
            })
            .await?;

        if result.changed {
            tracing::info!(user_id = %user_id, points = %result.user.points, "User approved");
        }
        Ok(result)
    }
}
