//! API Middleware
//!
//! Authentication, permission checks and request logging.

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use uuid::Uuid;

use crate::audit::sha256_hex;
use crate::config::Config;
use crate::domain::OperationContext;
use crate::error::AppError;

use super::AppState;

/// Hashes of the accepted API keys
#[derive(Debug, Clone)]
pub struct ApiKeys {
    admin_key_hash: String,
    service_key_hash: String,
}

impl ApiKeys {
    /// Build from plaintext keys
    pub fn new(admin_key: &str, service_key: &str) -> Self {
        Self {
            admin_key_hash: sha256_hex(admin_key),
            service_key_hash: sha256_hex(service_key),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            admin_key_hash: config.admin_key_hash.clone(),
            service_key_hash: config.service_key_hash.clone(),
        }
    }

    fn authenticate(&self, key: &str) -> Option<KeyRole> {
        let hash = sha256_hex(key);
        if hash == self.admin_key_hash {
            Some(KeyRole::Admin)
        } else if hash == self.service_key_hash {
            Some(KeyRole::Service)
        } else {
            None
        }
    }
}

/// Which configured key authenticated the request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRole {
    /// Full access, including `/admin` routes
    Admin,
    /// Acts for the user named in `X-Request-User-Id`
    Service,
}

impl KeyRole {
    pub fn name(&self) -> &'static str {
        match self {
            KeyRole::Admin => "admin",
            KeyRole::Service => "service",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, KeyRole::Admin)
    }
}

fn reject(status: StatusCode, error: &str, error_code: &str) -> Response {
    (
        status,
        Json(json!({
            "error": error,
            "error_code": error_code
        })),
    )
        .into_response()
}

// =========================================================================
// API Key Authentication Middleware
// =========================================================================

/// Validate `X-API-Key` and build the request's [`OperationContext`]
pub async fn auth_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, Response> {
    let api_key = match headers.get("X-API-Key").and_then(|v| v.to_str().ok()) {
        Some(key) => key,
        None => {
            return Err(reject(
                StatusCode::UNAUTHORIZED,
                "Missing X-API-Key header",
                "missing_api_key",
            ));
        }
    };

    let role = match state.keys.authenticate(api_key) {
        Some(role) => role,
        None => {
            tracing::warn!("Rejected request with unknown API key");
            return Err(AppError::InvalidApiKey.into_response());
        }
    };

    let mut context = OperationContext::new().with_api_key_name(role.name());
    if role.is_admin() {
        context = context.as_admin();
    }

    // Some endpoints require the acting user; they read it from the context
    if let Some(raw) = headers.get("X-Request-User-Id") {
        match raw.to_str().map(str::trim) {
            Ok(user_id) if !user_id.is_empty() => {
                context = context.with_request_user(user_id);
            }
            _ => {
                return Err(AppError::InvalidRequest(
                    "X-Request-User-Id must be a non-empty string".to_string(),
                )
                .into_response());
            }
        }
    }

    // Unparseable correlation ids are replaced rather than rejected
    match correlation_id(&headers) {
        Some(id) => context = context.with_correlation_id(id),
        None => {
            context.ensure_correlation_id();
        }
    }

    request.extensions_mut().insert(role);
    request.extensions_mut().insert(context);

    Ok(next.run(request).await)
}

// =========================================================================
// Admin permission check
// =========================================================================

/// Reject keys without the admin permission. Must run after
/// [`auth_middleware`].
pub async fn require_admin_middleware(
    request: Request<Body>,
    next: Next,
) -> Result<Response, Response> {
    let is_admin = request
        .extensions()
        .get::<KeyRole>()
        .is_some_and(KeyRole::is_admin);

    if !is_admin {
        return Err(AppError::PermissionDenied.into_response());
    }

    Ok(next.run(request).await)
}

fn correlation_id(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get("X-Correlation-Id")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s.trim()).ok())
}

// =========================================================================
// Request logging
// =========================================================================

/// Never logged in clear
const REDACTED_HEADERS: &[&str] = &["x-api-key", "authorization", "cookie", "set-cookie"];

/// Header pairs safe to log; credentials are replaced by `[REDACTED]`
pub fn mask_headers_for_logging(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let shown = if REDACTED_HEADERS.contains(&name.as_str()) {
                "[REDACTED]"
            } else {
                value.to_str().unwrap_or("[non-ascii]")
            };
            (name.as_str().to_string(), shown.to_string())
        })
        .collect()
}

/// Log every request with its outcome and latency
pub async fn logging_middleware(request: Request<Body>, next: Next) -> Response {
    let started = std::time::Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let correlation = correlation_id(request.headers());
    let acting_user = request
        .headers()
        .get("X-Request-User-Id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    tracing::debug!(
        method = %method,
        path = %path,
        headers = ?mask_headers_for_logging(request.headers()),
        "Request received"
    );

    let response = next.run(request).await;
    let status = response.status();
    let elapsed_ms = started.elapsed().as_millis() as u64;

    if status.is_server_error() {
        tracing::warn!(
            method = %method,
            path = %path,
            status = %status,
            elapsed_ms,
            correlation_id = ?correlation,
            user = ?acting_user,
            "Request failed"
        );
    } else {
        tracing::info!(
            method = %method,
            path = %path,
            status = %status,
            elapsed_ms,
            correlation_id = ?correlation,
            user = ?acting_user,
            "Request handled"
        );
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_are_masked() {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", "admin-secret".parse().unwrap());
        headers.insert("x-request-user-id", "estudiante-7".parse().unwrap());

        let masked = mask_headers_for_logging(&headers);
        let value_of = |name: &str| masked.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str());

        assert_eq!(value_of("x-api-key"), Some("[REDACTED]"));
        assert_eq!(value_of("x-request-user-id"), Some("estudiante-7"));
    }

    #[test]
    fn test_keys_resolve_to_roles() {
        let keys = ApiKeys::new("admin-secret", "service-secret");

        assert_eq!(keys.authenticate("admin-secret"), Some(KeyRole::Admin));
        assert_eq!(keys.authenticate("service-secret"), Some(KeyRole::Service));
        assert_eq!(keys.authenticate("guess"), None);
        assert!(KeyRole::Admin.is_admin());
        assert!(!KeyRole::Service.is_admin());
    }

    #[test]
    fn test_correlation_id_parsing() {
        let id = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        headers.insert("x-correlation-id", id.to_string().parse().unwrap());
        assert_eq!(correlation_id(&headers), Some(id));

        headers.insert("x-correlation-id", "not-a-uuid".parse().unwrap());
        assert_eq!(correlation_id(&headers), None);
    }
}
