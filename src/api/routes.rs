//! API Routes
//!
//! HTTP endpoint definitions.

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    middleware,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::{
    Announcement, AssignmentRecord, Auction, AuctionStatus, AwardOutcome, Bid, ConfigUpdate,
    ExchangeRequest, ExchangeStatus, PointsSummary, RecomputeReport, SystemConfig, User,
};
use crate::audit::{verify_hash_chain, AuditLogEntry, ChainVerificationResult};
use crate::domain::{DomainError, ExchangeRate, OperationContext};
use crate::error::{AppError, AppResult};
use crate::handlers::{
    AnnouncementHandler, ApproveUserHandler, ApproveUserResult, AssignPointsCommand,
    AssignPointsHandler, AwardBadgeCommand, AwardBadgeHandler, ChangeAuctionStatusCommand,
    ChangeAuctionStatusHandler, ConfigHandler, CreateAuctionCommand, CreateAuctionHandler,
    PlaceBidCommand, PlaceBidHandler, RecomputeBalancesHandler, RegisterUserCommand,
    RegisterUserHandler, RequestExchangeCommand, RequestExchangeHandler, ReviewExchangeCommand,
    ReviewExchangeHandler,
};
use crate::jobs::{self, MaintenanceReport};
use crate::stats::{self, AuditStats, UserStats};

use super::extract::ApiJson;
use super::middleware::require_admin_middleware;
use super::AppState;

// =========================================================================
// Request/Response types
// =========================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterUserRequest {
    pub id: String,
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub success: bool,
    pub user: User,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignPointsRequest {
    /// Target user id
    pub id: String,
    pub amount: Decimal,
    #[serde(default)]
    pub observation: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AssignPointsResponse {
    pub success: bool,
    pub record: AssignmentRecord,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointsQuery {
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RateRequest {
    pub rate: Decimal,
}

#[derive(Debug, Serialize)]
pub struct RateResponse {
    pub rate: ExchangeRate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<ExchangeRate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAuctionRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub base_price: Decimal,
    pub start_date: String,
    pub end_date: String,
    #[serde(default)]
    pub created_by: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AuctionResponse {
    pub success: bool,
    pub auction: Auction,
}

#[derive(Debug, Deserialize)]
pub struct AuctionsQuery {
    /// Include closed and expired auctions
    #[serde(default)]
    pub all: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceBidRequest {
    pub auction_id: Uuid,
    pub user_id: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    pub amount: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct AuctionStatusRequest {
    pub id: Uuid,
    pub status: AuctionStatus,
}

#[derive(Debug, Serialize)]
pub struct AuctionStatusResponse {
    pub success: bool,
    pub auction: Auction,
    pub changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<Bid>,
}

#[derive(Debug, Deserialize)]
pub struct ExchangeRequestBody {
    #[serde(rename = "type")]
    pub kind: String,
    pub amount: Decimal,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ExchangeCreatedResponse {
    pub success: bool,
    pub request: ExchangeRequest,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangesQuery {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub status: Option<ExchangeStatus>,
}

#[derive(Debug, Deserialize)]
pub struct ReviewExchangeRequest {
    pub id: Uuid,
    pub status: ExchangeStatus,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewExchangeResponse {
    pub success: bool,
    pub updated: ExchangeRequest,
    pub badges_awarded: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BadgesResponse {
    pub user_id: String,
    pub badges: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwardBadgeRequest {
    pub user_id: String,
    pub badge: String,
}

#[derive(Debug, Deserialize)]
pub struct AnnouncementRequest {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

#[derive(Debug, Serialize)]
pub struct AuditLogResponse {
    pub entries: Vec<AuditLogEntry>,
    pub total: usize,
}

// =========================================================================
// API Router
// =========================================================================

/// Create the API router
pub fn create_router() -> Router<AppState> {
    let admin = Router::new()
        .route("/admin/points", post(assign_points))
        .route("/admin/points/recompute", post(recompute_points))
        .route("/admin/exchange-rate", get(get_exchange_rate).put(set_exchange_rate))
        .route("/admin/config", get(get_config).put(update_config))
        .route("/admin/auctions", post(create_auction))
        .route("/admin/auctions/status", post(change_auction_status))
        .route("/admin/exchanges/review", post(review_exchange))
        .route("/admin/badges", post(award_badge))
        .route("/admin/audit", get(get_audit_logs))
        .route("/admin/audit/verify", get(verify_audit_chain))
        .route("/admin/jobs/run", post(run_jobs))
        .route_layer(middleware::from_fn(require_admin_middleware));

    Router::new()
        // Users
        .route("/users", post(register_user).get(list_users))
        .route("/users/:user_id", get(get_user))
        .route("/users/:user_id/approve", post(approve_user))
        .route("/users/:user_id/history", get(get_user_history))
        // Ledger
        .route("/points", get(get_points))
        // Auctions
        .route("/auctions", get(list_auctions))
        .route("/auctions/bid", post(place_bid))
        .route("/auctions/:auction_id", get(get_auction))
        // Exchanges
        .route("/exchanges", post(request_exchange).get(list_exchanges))
        // Stats and badges
        .route("/stats", get(get_stats))
        .route("/stats/users/:user_id", get(get_user_stats))
        .route("/badges/:user_id", get(get_badges))
        // Announcements
        .route("/announcements", get(list_announcements).post(post_announcement))
        .merge(admin)
}

/// Admin-only operations outside the `/admin` prefix
fn ensure_admin(context: &OperationContext) -> AppResult<()> {
    if context.is_admin {
        Ok(())
    } else {
        Err(AppError::PermissionDenied)
    }
}

// =========================================================================
// Users
// =========================================================================

async fn register_user(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    ApiJson(request): ApiJson<RegisterUserRequest>,
) -> AppResult<(StatusCode, Json<UserResponse>)> {
    let handler = RegisterUserHandler::new(state.repository);
    let command = RegisterUserCommand::new(request.id, request.first_name, request.last_name);
    let user = handler.execute(command, &context).await?;

    Ok((StatusCode::CREATED, Json(UserResponse { success: true, user })))
}

async fn approve_user(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(user_id): Path<String>,
) -> AppResult<Json<ApproveUserResult>> {
    ensure_admin(&context)?;
    let handler = ApproveUserHandler::new(state.repository);
    Ok(Json(handler.execute(&user_id, &context).await?))
}

async fn list_users(State(state): State<AppState>) -> AppResult<Json<Vec<User>>> {
    let economy = state.repository.load().await?;
    Ok(Json(economy.users().to_vec()))
}

async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<Json<User>> {
    let economy = state.repository.load().await?;
    Ok(Json(economy.user(&user_id)?.clone()))
}

async fn get_user_history(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<Json<Vec<AssignmentRecord>>> {
    let economy = state.repository.load().await?;
    let history = economy.user_history(&user_id)?.into_iter().cloned().collect();
    Ok(Json(history))
}

// =========================================================================
// Ledger
// =========================================================================

/// Balance split for `userId`, or for the acting user when omitted
async fn get_points(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Query(query): Query<PointsQuery>,
) -> AppResult<Json<PointsSummary>> {
    let user_id = match query.user_id.filter(|u| !u.trim().is_empty()) {
        Some(user_id) => user_id,
        None => context
            .request_user_id
            .clone()
            .ok_or_else(|| DomainError::validation("userId is required"))?,
    };

    let economy = state.repository.load().await?;
    Ok(Json(economy.points_summary(&user_id)?))
}

async fn assign_points(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    ApiJson(request): ApiJson<AssignPointsRequest>,
) -> AppResult<Json<AssignPointsResponse>> {
    let handler = AssignPointsHandler::new(state.repository);
    let mut command = AssignPointsCommand::new(request.id, request.amount);
    if let Some(observation) = request.observation {
        command = command.with_observation(observation);
    }

    let record = handler.execute(command, &context).await?;
    Ok(Json(AssignPointsResponse { success: true, record }))
}

async fn recompute_points(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
) -> AppResult<Json<RecomputeReport>> {
    let handler = RecomputeBalancesHandler::new(state.repository);
    Ok(Json(handler.execute(&context).await?))
}

// =========================================================================
// Configuration
// =========================================================================

async fn get_exchange_rate(State(state): State<AppState>) -> AppResult<Json<RateResponse>> {
    let economy = state.repository.load().await?;
    Ok(Json(RateResponse {
        rate: economy.system_config().exchange_rate,
        previous: None,
    }))
}

async fn set_exchange_rate(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    ApiJson(request): ApiJson<RateRequest>,
) -> AppResult<Json<RateResponse>> {
    let rate = ExchangeRate::new(request.rate)
        .map_err(|e| AppError::InvalidRequest(format!("Invalid rate: {}", e)))?;

    let change = ConfigHandler::new(state.repository)
        .set_exchange_rate(rate, &context)
        .await?;
    Ok(Json(RateResponse {
        rate: change.rate,
        previous: Some(change.previous),
    }))
}

async fn get_config(State(state): State<AppState>) -> AppResult<Json<SystemConfig>> {
    let economy = state.repository.load().await?;
    Ok(Json(economy.system_config().clone()))
}

async fn update_config(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    ApiJson(update): ApiJson<ConfigUpdate>,
) -> AppResult<Json<SystemConfig>> {
    let config = ConfigHandler::new(state.repository).update(update, &context).await?;
    Ok(Json(config))
}

// =========================================================================
// Auctions
// =========================================================================

/// Open auctions, or every auction with `?all=true`
async fn list_auctions(
    State(state): State<AppState>,
    Query(query): Query<AuctionsQuery>,
) -> AppResult<Json<Vec<Auction>>> {
    let economy = state.repository.load().await?;
    let auctions = if query.all {
        economy.auctions().to_vec()
    } else {
        economy.list_active(Utc::now()).into_iter().cloned().collect()
    };
    Ok(Json(auctions))
}

async fn get_auction(
    State(state): State<AppState>,
    Path(auction_id): Path<Uuid>,
) -> AppResult<Json<Auction>> {
    let economy = state.repository.load().await?;
    Ok(Json(economy.find_auction(auction_id)?.clone()))
}

async fn create_auction(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    ApiJson(request): ApiJson<CreateAuctionRequest>,
) -> AppResult<(StatusCode, Json<AuctionResponse>)> {
    let handler = CreateAuctionHandler::new(state.repository);
    let command = CreateAuctionCommand {
        title: request.title,
        description: request.description,
        base_price: request.base_price,
        start_date: request.start_date,
        end_date: request.end_date,
        created_by: request.created_by,
    };

    let auction = handler.execute(command, &context).await?;
    Ok((StatusCode::CREATED, Json(AuctionResponse { success: true, auction })))
}

async fn place_bid(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    ApiJson(request): ApiJson<PlaceBidRequest>,
) -> AppResult<Json<AuctionResponse>> {
    let handler = PlaceBidHandler::new(state.repository);
    let mut command = PlaceBidCommand::new(request.auction_id, request.user_id, request.amount);
    command.first_name = request.first_name;
    command.last_name = request.last_name;

    let auction = handler.execute(command, &context).await?;
    Ok(Json(AuctionResponse { success: true, auction }))
}

async fn change_auction_status(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    ApiJson(request): ApiJson<AuctionStatusRequest>,
) -> AppResult<Json<AuctionStatusResponse>> {
    let handler = ChangeAuctionStatusHandler::new(state.repository);
    let command = ChangeAuctionStatusCommand {
        auction_id: request.id,
        status: request.status,
    };

    let transition = handler.execute(command, &context).await?;
    Ok(Json(AuctionStatusResponse {
        success: true,
        auction: transition.auction,
        changed: transition.changed,
        winner: transition.winner,
    }))
}

// =========================================================================
// Exchanges
// =========================================================================

async fn request_exchange(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    ApiJson(request): ApiJson<ExchangeRequestBody>,
) -> AppResult<(StatusCode, Json<ExchangeCreatedResponse>)> {
    let handler = RequestExchangeHandler::new(state.repository);
    let command = RequestExchangeCommand {
        kind: request.kind,
        amount: request.amount,
        description: request.description,
    };

    let request = handler.execute(command, &context).await?;
    Ok((
        StatusCode::CREATED,
        Json(ExchangeCreatedResponse { success: true, request }),
    ))
}

/// Admins see every request; other callers only their own
async fn list_exchanges(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Query(query): Query<ExchangesQuery>,
) -> AppResult<Json<Vec<ExchangeRequest>>> {
    let user_filter = if context.is_admin {
        query.user_id
    } else {
        let acting = context.require_user()?;
        if query.user_id.as_deref().is_some_and(|u| u != acting) {
            return Err(AppError::PermissionDenied);
        }
        Some(acting.to_string())
    };

    let economy = state.repository.load().await?;
    let requests = economy
        .exchange_requests_where(user_filter.as_deref(), query.status)
        .into_iter()
        .cloned()
        .collect();
    Ok(Json(requests))
}

async fn review_exchange(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    ApiJson(request): ApiJson<ReviewExchangeRequest>,
) -> AppResult<Json<ReviewExchangeResponse>> {
    let handler = ReviewExchangeHandler::new(state.repository);
    let command = ReviewExchangeCommand {
        request_id: request.id,
        status: request.status,
        notes: request.notes,
    };

    let outcome = handler.execute(command, &context).await?;
    Ok(Json(ReviewExchangeResponse {
        success: true,
        updated: outcome.request,
        badges_awarded: outcome.badges_awarded,
    }))
}

// =========================================================================
// Stats and badges
// =========================================================================

/// Totals plus the ranking, truncated to `?limit=` when given
async fn get_stats(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> AppResult<Json<AuditStats>> {
    let economy = state.repository.load().await?;
    let mut stats = AuditStats::compute(&economy);
    if let Some(limit) = query.limit {
        stats.ranking.truncate(limit);
    }
    Ok(Json(stats))
}

async fn get_user_stats(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<Json<UserStats>> {
    let economy = state.repository.load().await?;
    Ok(Json(stats::user_stats(&economy, &user_id)?))
}

async fn get_badges(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<Json<BadgesResponse>> {
    let economy = state.repository.load().await?;
    economy.user(&user_id)?;
    Ok(Json(BadgesResponse {
        badges: economy.badges().for_user(&user_id),
        user_id,
    }))
}

async fn award_badge(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    ApiJson(request): ApiJson<AwardBadgeRequest>,
) -> AppResult<Json<AwardOutcome>> {
    let handler = AwardBadgeHandler::new(state.repository);
    let command = AwardBadgeCommand {
        user_id: request.user_id,
        badge: request.badge,
    };
    Ok(Json(handler.execute(command, &context).await?))
}

// =========================================================================
// Announcements
// =========================================================================

async fn list_announcements(State(state): State<AppState>) -> AppResult<Json<Vec<Announcement>>> {
    let economy = state.repository.load().await?;
    Ok(Json(economy.announcements().into_iter().cloned().collect()))
}

async fn post_announcement(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    ApiJson(request): ApiJson<AnnouncementRequest>,
) -> AppResult<(StatusCode, Json<Announcement>)> {
    ensure_admin(&context)?;
    let announcement = AnnouncementHandler::new(state.repository)
        .post(&request.message, &context)
        .await?;
    Ok((StatusCode::CREATED, Json(announcement)))
}

// =========================================================================
// Audit and maintenance
// =========================================================================

async fn get_audit_logs(
    State(state): State<AppState>,
    Query(query): Query<AuditQuery>,
) -> AppResult<Json<AuditLogResponse>> {
    let economy = state.repository.load().await?;
    Ok(Json(AuditLogResponse {
        entries: economy.recent_audit_logs(query.limit).into_iter().cloned().collect(),
        total: economy.audit_logs().len(),
    }))
}

async fn verify_audit_chain(
    State(state): State<AppState>,
) -> AppResult<Json<ChainVerificationResult>> {
    let economy = state.repository.load().await?;
    let result = verify_hash_chain(economy.audit_logs());
    if !result.is_valid {
        tracing::error!(
            first_invalid = ?result.first_invalid_entry,
            "Audit hash chain verification failed"
        );
    }
    Ok(Json(result))
}

async fn run_jobs(State(state): State<AppState>) -> Json<MaintenanceReport> {
    Json(jobs::run_jobs(&state.repository, Utc::now()).await)
}
