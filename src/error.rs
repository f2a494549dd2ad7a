//! Error handling module
//!
//! Centralized error types and HTTP response conversion.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::domain::DomainError;
use crate::store::StoreError;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("Permission denied")]
    PermissionDenied,

    // Domain errors
    #[error(transparent)]
    Domain(#[from] DomainError),

    // Server errors (5xx)
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<crate::domain::AmountError> for AppError {
    fn from(e: crate::domain::AmountError) -> Self {
        AppError::Domain(e.into())
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

fn domain_status(err: &DomainError) -> (StatusCode, &'static str, Option<String>) {
    match err {
        DomainError::Validation(msg) => {
            (StatusCode::BAD_REQUEST, "validation_error", Some(msg.clone()))
        }
        DomainError::UserNotFound(id) => {
            (StatusCode::NOT_FOUND, "user_not_found", Some(id.clone()))
        }
        DomainError::AuctionNotFound(id) => {
            (StatusCode::NOT_FOUND, "auction_not_found", Some(id.clone()))
        }
        DomainError::RequestNotFound(id) => {
            (StatusCode::NOT_FOUND, "request_not_found", Some(id.clone()))
        }
        DomainError::AuctionClosed(id) => {
            (StatusCode::BAD_REQUEST, "auction_closed", Some(id.clone()))
        }
        DomainError::BidTooLow { .. } => {
            (StatusCode::BAD_REQUEST, "bid_too_low", Some(err.to_string()))
        }
        DomainError::InsufficientBalance { .. } => {
            (StatusCode::BAD_REQUEST, "insufficient_balance", Some(err.to_string()))
        }
        DomainError::InvalidTransition { .. } => {
            (StatusCode::CONFLICT, "invalid_transition", Some(err.to_string()))
        }
        DomainError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", Some(msg.clone())),
        DomainError::Maintenance => (StatusCode::SERVICE_UNAVAILABLE, "maintenance", None),
        DomainError::Unauthorized(msg) => {
            (StatusCode::UNAUTHORIZED, "unauthorized", Some(msg.clone()))
        }
    }
}

fn store_status(err: &StoreError) -> (StatusCode, &'static str) {
    match err {
        StoreError::ConcurrencyConflict { .. } | StoreError::MaxRetriesExceeded => {
            tracing::warn!("Store contention: {}", err);
            (StatusCode::SERVICE_UNAVAILABLE, "store_contention")
        }
        StoreError::Unavailable(_) => {
            tracing::error!("Store unavailable: {:?}", err);
            (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable")
        }
        StoreError::Database(_) | StoreError::Serialization(_) => {
            tracing::error!("Stored document could not be processed: {:?}", err);
            (StatusCode::INTERNAL_SERVER_ERROR, "store_error")
        }
    }
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidApiKey => StatusCode::UNAUTHORIZED,
            AppError::PermissionDenied => StatusCode::FORBIDDEN,
            AppError::Domain(e) => domain_status(e).0,
            AppError::Store(StoreError::Database(_) | StoreError::Serialization(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, details) = match &self {
            // 400 Bad Request
            AppError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", Some(msg.clone()))
            }

            // 401 Unauthorized
            AppError::InvalidApiKey => {
                (StatusCode::UNAUTHORIZED, "invalid_api_key", None)
            }

            // 403 Forbidden
            AppError::PermissionDenied => {
                (StatusCode::FORBIDDEN, "permission_denied", None)
            }

            AppError::Domain(domain_err) => domain_status(domain_err),

            AppError::Store(store_err) => {
                let (status, code) = store_status(store_err);
                (status, code, None)
            }
        };

        let body = ErrorResponse {
            error: self.to_string(),
            error_code: error_code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_domain_status_codes() {
        let cases = [
            (DomainError::validation("x"), StatusCode::BAD_REQUEST),
            (DomainError::UserNotFound("u".into()), StatusCode::NOT_FOUND),
            (DomainError::insufficient_balance(dec!(600), dec!(500)), StatusCode::BAD_REQUEST),
            (
                DomainError::BidTooLow { highest: dec!(100), offered: dec!(90) },
                StatusCode::BAD_REQUEST,
            ),
            (
                DomainError::InvalidTransition {
                    from: "Cancelada".into(),
                    to: "Finalizada".into(),
                },
                StatusCode::CONFLICT,
            ),
            (DomainError::Maintenance, StatusCode::SERVICE_UNAVAILABLE),
            (DomainError::Unauthorized("no user".into()), StatusCode::UNAUTHORIZED),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::Domain(err).status_code(), status);
        }
    }

    #[test]
    fn test_store_status_codes() {
        assert_eq!(
            AppError::Store(StoreError::Unavailable("down".into())).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::Store(StoreError::MaxRetriesExceeded).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::Store(sqlx::Error::PoolTimedOut.into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::Store(sqlx::Error::RowNotFound.into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(AppError::PermissionDenied.status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_response_status_matches() {
        let response = AppError::Domain(DomainError::RequestNotFound("r".into())).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
