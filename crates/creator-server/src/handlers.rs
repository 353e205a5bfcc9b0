//! HTTP Handlers

use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use creator_core::account::{effective_account, provision_team};
use creator_core::{
    Account, AccountRef, CreatorError, CreditHistoryEntry, GenerationOutput, GenerationRequest,
    Notification, Plan, SubscriptionStatus, TeamId, TeamRole, UserId,
};
use creator_payments::{CheckoutRequest, CheckoutSession, VerifyOutcome, WebhookOutcome};
use creator_studio::{Charged, CreditCosts};

use crate::auth::Caller;
use crate::error::{ApiError, api_error, creator_error, payment_error, payments_disabled};
use crate::state::AppState;

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 200;

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,

    /// Payment provider name, None when payments are disabled
    pub payments: Option<String>,

    pub generation_providers: Vec<String>,
    pub email_configured: bool,
}

#[derive(Debug, Serialize)]
pub struct CreditsResponse {
    pub account: AccountRef,
    pub credits: u64,
    pub plan_id: Option<String>,
    pub subscription_status: SubscriptionStatus,
    pub current_period_end: Option<DateTime<Utc>>,
    pub subscription_active: bool,

    /// What each feature costs
    pub costs: CreditCosts,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

impl ListQuery {
    fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub session_id: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminAction {
    /// Overwrite the balance
    Reset,
    /// Add credits back
    Refund,
}

#[derive(Debug, Deserialize)]
pub struct AdminCreditsRequest {
    pub account: AccountRef,
    pub action: AdminAction,
    pub credits: u64,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TeamMemberRequest {
    pub user_id: UserId,
    pub role: TeamRole,
}

#[derive(Debug, Deserialize)]
pub struct AdminTeamRequest {
    pub team_id: TeamId,

    /// Billing contact
    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub members: Vec<TeamMemberRequest>,
}

// ============================================================================
// Handlers
// ============================================================================

fn require_admin(state: &AppState, user: &UserId, target: &str) -> Result<(), ApiError> {
    if state.is_admin(user) {
        return Ok(());
    }
    tracing::warn!(user = %user, target, "Admin action refused");
    Err(api_error(
        StatusCode::FORBIDDEN,
        "FORBIDDEN",
        "Admin access required",
    ))
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        payments: state.payments.as_ref().map(|p| p.provider.clone()),
        generation_providers: state
            .studio
            .router()
            .names()
            .into_iter()
            .map(String::from)
            .collect(),
        email_configured: state.email.is_some(),
    })
}

/// Plan and package catalog
pub async fn list_plans(State(state): State<AppState>) -> Json<Vec<Plan>> {
    Json(state.catalog.plans().to_vec())
}

/// Caller's effective balance
pub async fn get_credits(
    State(state): State<AppState>,
    Caller(user): Caller,
) -> Result<Json<CreditsResponse>, ApiError> {
    let owner = effective_account(state.accounts.as_ref(), &user).map_err(creator_error)?;
    let account = state
        .accounts
        .get(&owner)
        .map_err(creator_error)?
        .ok_or_else(|| creator_error(CreatorError::AccountNotFound(owner.to_string())))?;

    Ok(Json(CreditsResponse {
        subscription_active: account.has_active_subscription(Utc::now()),
        account: account.owner,
        credits: account.credits,
        plan_id: account.plan_id,
        subscription_status: account.subscription_status,
        current_period_end: account.current_period_end,
        costs: *state.studio.costs(),
    }))
}

/// Caller's credit history, newest first
pub async fn credit_history(
    State(state): State<AppState>,
    Caller(user): Caller,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<CreditHistoryEntry>>, ApiError> {
    let owner = effective_account(state.accounts.as_ref(), &user).map_err(creator_error)?;
    let entries = state
        .ledger
        .history(&owner, query.limit())
        .map_err(creator_error)?;
    Ok(Json(entries))
}

/// Caller's notifications, newest first
pub async fn list_notifications(
    State(state): State<AppState>,
    Caller(user): Caller,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Notification>>, ApiError> {
    let owner = effective_account(state.accounts.as_ref(), &user).map_err(creator_error)?;
    let notifications = state
        .notifications
        .list(&owner, query.limit())
        .map_err(creator_error)?;
    Ok(Json(notifications))
}

/// Create a checkout session
pub async fn create_checkout(
    State(state): State<AppState>,
    Caller(user): Caller,
    Json(payload): Json<CheckoutRequest>,
) -> Result<Json<CheckoutSession>, ApiError> {
    let payments = state.payments.as_ref().ok_or_else(payments_disabled)?;

    let session = payments
        .checkout
        .create(&user, payload)
        .await
        .map_err(payment_error)?;

    Ok(Json(session))
}

/// Confirm a checkout session after the redirect back
pub async fn verify_payment(
    State(state): State<AppState>,
    Caller(user): Caller,
    Json(payload): Json<VerifyRequest>,
) -> Result<Json<VerifyOutcome>, ApiError> {
    let payments = state.payments.as_ref().ok_or_else(payments_disabled)?;

    let outcome = payments
        .verifier
        .verify(&user, &payload.session_id)
        .await
        .map_err(payment_error)?;

    Ok(Json(outcome))
}

/// Stripe webhook handler
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<WebhookOutcome>, ApiError> {
    let payments = state.payments.as_ref().ok_or_else(payments_disabled)?;

    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            api_error(
                StatusCode::BAD_REQUEST,
                "MISSING_SIGNATURE",
                "Missing Stripe signature",
            )
        })?;

    let outcome = payments
        .webhook
        .handle(&body, signature)
        .await
        .map_err(payment_error)?;

    Ok(Json(outcome))
}

/// Credit-metered generation
pub async fn generate(
    State(state): State<AppState>,
    Caller(user): Caller,
    Json(payload): Json<GenerationRequest>,
) -> Result<Json<Charged<GenerationOutput>>, ApiError> {
    let charged = state
        .studio
        .generate(&user, payload)
        .await
        .map_err(creator_error)?;
    Ok(Json(charged))
}

/// Admin balance correction
pub async fn admin_credits(
    State(state): State<AppState>,
    Caller(user): Caller,
    Json(payload): Json<AdminCreditsRequest>,
) -> Result<Json<CreditHistoryEntry>, ApiError> {
    require_admin(&state, &user, &payload.account.to_string())?;

    let reason = payload
        .reason
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty());

    let entry = match payload.action {
        AdminAction::Reset => state.ledger.reset(
            &payload.account,
            Some(&user),
            payload.credits,
            reason.unwrap_or("Balance reset by admin"),
        ),
        AdminAction::Refund => state.ledger.refund(
            &payload.account,
            Some(&user),
            payload.credits,
            reason.unwrap_or("Refund by admin"),
        ),
    }
    .map_err(creator_error)?;

    tracing::info!(
        admin = %user,
        account = %payload.account,
        action = ?payload.action,
        credits = payload.credits,
        "Admin credit change"
    );

    Ok(Json(entry))
}

/// Admin team setup: creates the team row and attaches members
pub async fn admin_teams(
    State(state): State<AppState>,
    Caller(user): Caller,
    Json(payload): Json<AdminTeamRequest>,
) -> Result<Json<Account>, ApiError> {
    require_admin(&state, &user, payload.team_id.as_str())?;

    if payload.team_id.as_str().trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "VALIDATION", "team_id is required"));
    }
    let email = payload.email.as_deref().map(str::trim).filter(|e| !e.is_empty());
    let members: Vec<(UserId, TeamRole)> = payload
        .members
        .into_iter()
        .map(|member| (member.user_id, member.role))
        .collect();

    let team = provision_team(state.accounts.as_ref(), &payload.team_id, email, &members)
        .map_err(creator_error)?;

    tracing::info!(
        admin = %user,
        team = %payload.team_id,
        members = members.len(),
        "Admin team update"
    );

    Ok(Json(team))
}
