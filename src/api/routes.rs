//! API Routes
//!
//! HTTP endpoint definitions.

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{AccountView, OperationContext, RecipientDetails, TransferView};
use crate::error::AppError;
use crate::handlers::{
    AccountHandler, AdjustCommand, AdjustHandler, AdjustResult, AdjustmentKind, AuthCodeKind,
    CommitResult, InitiateTransferCommand, OpenAccountCommand, OtpRequested, TransferHandler,
};
use crate::ledger::LedgerEntry;

use super::middleware::{AuthenticatedApiKey, RequestAccount};
use super::AppState;

// =========================================================================
// Request/Response types
// =========================================================================

#[derive(Debug, Deserialize)]
pub struct InitiateTransferRequest {
    pub amount: String,
    pub recipient: RecipientDetails,
    #[serde(default)]
    pub description: Option<String>,
    pub pin: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyOtpRequest {
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyCodeRequest {
    pub kind: AuthCodeKind,
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct VerifiedResponse {
    pub verified: bool,
}

#[derive(Debug, Deserialize)]
pub struct AdjustRequest {
    pub kind: AdjustmentKind,
    pub amount: String,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReverseRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct OpenAccountRequest {
    pub holder_name: String,
    pub email: String,
    pub pin: String,
    #[serde(default)]
    pub daily_transfer_limit: Option<rust_decimal::Decimal>,
    #[serde(default)]
    pub daily_withdrawal_limit: Option<rust_decimal::Decimal>,
}

#[derive(Debug, Deserialize)]
pub struct LedgerQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}

#[derive(Debug, Serialize)]
pub struct LedgerResponse {
    pub account_id: Uuid,
    pub entries: Vec<LedgerEntry>,
}

// =========================================================================
// API Router
// =========================================================================

/// Create the API router
pub fn create_router() -> Router<AppState> {
    Router::new()
        // Transfer lifecycle
        .route("/transfers", post(initiate_transfer))
        .route("/transfers/:transfer_id", get(get_transfer))
        .route("/transfers/:transfer_id/send-otp", post(send_otp))
        .route("/transfers/:transfer_id/verify-otp", post(verify_otp))
        .route("/transfers/:transfer_id/verify-code", post(verify_code))
        .route("/transfers/:transfer_id/commit", post(commit_transfer))
        // Accounts
        .route("/accounts/:account_id", get(get_account))
        .route("/accounts/:account_id/ledger", get(get_ledger))
        // Admin
        .route("/admin/accounts", post(open_account))
        .route("/admin/accounts/:account_id/adjust", post(adjust_account))
        .route("/admin/ledger/:entry_id/reverse", post(reverse_entry))
}

// =========================================================================
// POST /transfers
// =========================================================================

/// Initiate a transfer; returns the pending request
async fn initiate_transfer(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    request_account: Option<Extension<RequestAccount>>,
    Json(request): Json<InitiateTransferRequest>,
) -> Result<(StatusCode, Json<TransferView>), AppError> {
    let request_account = request_account
        .ok_or_else(|| AppError::MissingHeader("X-Request-Account-Id".to_string()))?;

    let handler = TransferHandler::new(state.pool, state.notifier);

    let command = InitiateTransferCommand {
        sender_account_id: request_account.account_id,
        amount: request.amount,
        recipient: request.recipient,
        description: request.description,
        pin: request.pin,
    };

    let transfer = handler.initiate(command, &context).await?;

    Ok((StatusCode::ACCEPTED, Json(transfer.view())))
}

// =========================================================================
// GET /transfers/:transfer_id
// =========================================================================

/// Get transfer status (sanitized)
async fn get_transfer(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(transfer_id): Path<Uuid>,
) -> Result<Json<TransferView>, AppError> {
    let handler = TransferHandler::new(state.pool, state.notifier);
    let transfer = handler.load_transfer(transfer_id).await?;

    // Only the sender may inspect a transfer
    if context.request_account_id != Some(transfer.sender_account_id) {
        return Err(AppError::Forbidden(
            "acting account does not match sender".to_string(),
        ));
    }

    Ok(Json(transfer.view()))
}

// =========================================================================
// POST /transfers/:transfer_id/send-otp
// =========================================================================

/// Issue and dispatch a one-time code
async fn send_otp(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(transfer_id): Path<Uuid>,
) -> Result<Json<OtpRequested>, AppError> {
    let handler = TransferHandler::new(state.pool, state.notifier);
    let result = handler.request_otp(transfer_id, &context).await?;
    Ok(Json(result))
}

// =========================================================================
// POST /transfers/:transfer_id/verify-otp
// =========================================================================

/// Verify the one-time code
async fn verify_otp(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(transfer_id): Path<Uuid>,
    Json(request): Json<VerifyOtpRequest>,
) -> Result<Json<VerifiedResponse>, AppError> {
    let handler = TransferHandler::new(state.pool, state.notifier);
    handler
        .verify_otp(transfer_id, &request.code, &context)
        .await?;
    Ok(Json(VerifiedResponse { verified: true }))
}

// =========================================================================
// POST /transfers/:transfer_id/verify-code
// =========================================================================

/// Verify a COT/IMF prerequisite authorization code
async fn verify_code(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(transfer_id): Path<Uuid>,
    Json(request): Json<VerifyCodeRequest>,
) -> Result<Json<VerifiedResponse>, AppError> {
    let handler = TransferHandler::new(state.pool, state.notifier);
    handler
        .verify_authorization_code(transfer_id, request.kind, &request.code, &context)
        .await?;
    Ok(Json(VerifiedResponse { verified: true }))
}

// =========================================================================
// POST /transfers/:transfer_id/commit
// =========================================================================

/// Commit a verified transfer: debit sender, credit recipient
async fn commit_transfer(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(transfer_id): Path<Uuid>,
) -> Result<Json<CommitResult>, AppError> {
    let handler = TransferHandler::new(state.pool, state.notifier);
    let result = handler.commit(transfer_id, &context).await?;
    Ok(Json(result))
}

// =========================================================================
// GET /accounts/:account_id
// =========================================================================

/// Current balance and status; secrets are never serialized
async fn get_account(
    State(state): State<AppState>,
    Path(account_id): Path<Uuid>,
) -> Result<Json<AccountView>, AppError> {
    let handler = AccountHandler::new(state.pool);
    let view = handler.get(account_id).await?;
    Ok(Json(view))
}

// =========================================================================
// GET /accounts/:account_id/ledger
// =========================================================================

/// Recent ledger entries for an account
async fn get_ledger(
    State(state): State<AppState>,
    Path(account_id): Path<Uuid>,
    Query(query): Query<LedgerQuery>,
) -> Result<Json<LedgerResponse>, AppError> {
    let handler = AccountHandler::new(state.pool);
    let entries = handler.ledger(account_id, query.limit).await?;
    Ok(Json(LedgerResponse {
        account_id,
        entries,
    }))
}

// =========================================================================
// POST /admin/accounts
// =========================================================================

/// Open a new account (admin only)
async fn open_account(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Extension(api_key): Extension<AuthenticatedApiKey>,
    Json(request): Json<OpenAccountRequest>,
) -> Result<(StatusCode, Json<AccountView>), AppError> {
    if !api_key.has_permission("admin") {
        return Err(AppError::Forbidden("admin permission required".to_string()));
    }

    let handler = AccountHandler::new(state.pool);

    let command = OpenAccountCommand {
        holder_name: request.holder_name,
        email: request.email,
        pin: request.pin,
        daily_transfer_limit: request.daily_transfer_limit,
        daily_withdrawal_limit: request.daily_withdrawal_limit,
    };

    let view = handler.open(command, &context).await?;

    Ok((StatusCode::CREATED, Json(view)))
}

// =========================================================================
// POST /admin/accounts/:account_id/adjust
// =========================================================================

/// Manual credit or debit (admin only)
async fn adjust_account(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Extension(api_key): Extension<AuthenticatedApiKey>,
    Path(account_id): Path<Uuid>,
    headers: axum::http::HeaderMap,
    Json(request): Json<AdjustRequest>,
) -> Result<Json<AdjustResult>, AppError> {
    if !api_key.has_permission("adjust") {
        return Err(AppError::Forbidden(
            "adjust permission required".to_string(),
        ));
    }

    let idempotency_key = headers
        .get("Idempotency-Key")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string());

    let handler = AdjustHandler::new(state.pool, state.notifier);

    let command = AdjustCommand {
        account_id,
        kind: request.kind,
        amount: request.amount,
        note: request.note,
    };

    let result = handler.execute(command, idempotency_key, &context).await?;

    Ok(Json(result))
}

// =========================================================================
// POST /admin/ledger/:entry_id/reverse
// =========================================================================

/// Reverse a completed entry with a compensating entry (admin only)
async fn reverse_entry(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Extension(api_key): Extension<AuthenticatedApiKey>,
    Path(entry_id): Path<Uuid>,
    Json(request): Json<ReverseRequest>,
) -> Result<Json<AdjustResult>, AppError> {
    if !api_key.has_permission("adjust") {
        return Err(AppError::Forbidden(
            "adjust permission required".to_string(),
        ));
    }

    let handler = AdjustHandler::new(state.pool, state.notifier);
    let result = handler.reverse(entry_id, &request.reason, &context).await?;

    Ok(Json(result))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initiate_request_deserialize() {
        let json = r#"{
            "amount": "100.50",
            "recipient": { "method": "local", "account_number": "0099887766" },
            "pin": "1234"
        }"#;

        let request: InitiateTransferRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.amount, "100.50");
        assert!(request.description.is_none());
        assert!(matches!(
            request.recipient,
            RecipientDetails::Local { .. }
        ));
    }

    #[test]
    fn test_adjust_request_deserialize() {
        let json = r#"{ "kind": "credit", "amount": "250.00", "note": "bonus" }"#;

        let request: AdjustRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.kind, AdjustmentKind::Credit);
        assert_eq!(request.note, Some("bonus".to_string()));
    }

    #[test]
    fn test_ledger_query_default_limit() {
        let query: LedgerQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(query.limit, 50);
    }

    #[test]
    fn test_verify_code_request_deserialize() {
        let json = r#"{ "kind": "cot", "code": "COT-998877" }"#;
        let request: VerifyCodeRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.kind, AuthCodeKind::Cot);
    }
}
