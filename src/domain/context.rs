//! Operation Context
//!
//! Contains metadata about the current operation for audit and tracing.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::DomainError;

/// Context for an operation, used for auditing and tracing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationContext {
    /// Name of the API key used for this request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_name: Option<String>,

    /// User ID from X-Request-User-Id header
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_user_id: Option<String>,

    /// Whether the caller holds the admin permission
    #[serde(default)]
    pub is_admin: bool,

    /// Correlation ID for request tracing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,
}

impl OperationContext {
    /// Create a new empty context
    pub fn new() -> Self {
        Self {
            api_key_name: None,
            request_user_id: None,
            is_admin: false,
            correlation_id: None,
        }
    }

    /// Context used by background jobs
    pub fn system() -> Self {
        Self::new()
            .with_api_key_name("scheduler")
            .as_admin()
            .with_correlation_id(Uuid::new_v4())
    }

    pub fn with_api_key_name(mut self, name: impl Into<String>) -> Self {
        self.api_key_name = Some(name.into());
        self
    }

    pub fn with_request_user(mut self, user_id: impl Into<String>) -> Self {
        self.request_user_id = Some(user_id.into());
        self
    }

    pub fn as_admin(mut self) -> Self {
        self.is_admin = true;
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// Generate a new correlation ID if not present
    pub fn ensure_correlation_id(&mut self) -> Uuid {
        *self.correlation_id.get_or_insert_with(Uuid::new_v4)
    }

    /// Identity recorded in audit entries
    pub fn actor(&self) -> String {
        match (&self.request_user_id, &self.api_key_name) {
            (Some(user), _) => user.clone(),
            (None, Some(key)) => format!("key:{}", key),
            (None, None) => "anonymous".to_string(),
        }
    }

    /// The acting user, required for user-initiated operations
    pub fn require_user(&self) -> Result<&str, DomainError> {
        self.request_user_id
            .as_deref()
            .ok_or_else(|| DomainError::Unauthorized("missing acting user".to_string()))
    }

    pub fn require_admin(&self) -> Result<(), DomainError> {
        if self.is_admin {
            Ok(())
        } else {
            Err(DomainError::Unauthorized("admin permission required".to_string()))
        }
    }
}

impl Default for OperationContext {
    fn default() -> Self {
        Self::new()
    }
}
