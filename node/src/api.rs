//! # REST API
//!
//! Builds the axum router that exposes the vault node's HTTP interface.
//! All endpoints share application state through axum's `State` extractor.
//!
//! Every state-changing endpoint needs the authenticated caller identity in
//! the `x-vault-principal` header. The node does not authenticate; the
//! gateway in front of it does, and sets the header.
//!
//! ## Endpoints
//!
//! | Method | Path                          | Description                        |
//! |--------|-------------------------------|------------------------------------|
//! | GET    | `/health`                     | Liveness probe                     |
//! | GET    | `/status`                     | Vault and permission summary       |
//! | POST   | `/roles/grant`                | Grant a role (admin)               |
//! | POST   | `/roles/revoke`               | Revoke a role (admin)              |
//! | POST   | `/roles/renounce`             | Drop one of the caller's own roles |
//! | GET    | `/roles/:principal/:role`     | Authorization check                |
//! | GET    | `/roles/events`               | Permission history                 |
//! | POST   | `/admin/transfer`             | Hand admin authority on (admin)    |
//! | POST   | `/vault/deposit`              | Deposit (depositor)                |
//! | POST   | `/vault/withdraw`             | Withdraw (withdrawer)              |
//! | POST   | `/vault/admin-withdraw`       | Recovery withdrawal (admin)        |
//! | POST   | `/vault/pause`                | Halt the vault (admin)             |
//! | POST   | `/vault/unpause`              | Resume the vault (admin)           |
//! | GET    | `/vault/balances/:principal`  | Balance query                      |
//! | GET    | `/vault/events`               | Custody history                    |
//! | GET    | `/vault/payouts`              | Released funds                     |
//! | GET    | `/audit`                      | Replay both histories              |

use axum::{
    async_trait,
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use vault_contracts::{
    AuthorizationManager, Authorizer, CustodyAudit, GrantAudit, GrantSnapshot, Payout,
    ReleaseJournal, SecureVault,
};
use vault_protocol::config::{CALLER_HEADER, MAX_EVENT_PAGE};
use vault_protocol::{EventRecord, PausePolicy, Principal, Role, VaultError, VaultResult};

use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// The vault as the node runs it.
pub type NodeVault = SecureVault<AuthorizationManager>;

/// Shared application state available to all request handlers.
///
/// Cheap to clone; everything is behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    /// The permission ledger.
    pub auth: Arc<AuthorizationManager>,
    /// The custody ledger, bound to `auth`.
    pub vault: Arc<NodeVault>,
    /// Where released funds are recorded.
    pub journal: Arc<ReleaseJournal>,
    /// Reference to Prometheus metrics for in-handler recording.
    pub metrics: SharedMetrics,
}

impl AppState {
    /// Builds both components: the authorization manager first, then a
    /// vault bound to it.
    pub fn bootstrap(
        version: String,
        admin: Principal,
        pause_policy: PausePolicy,
        metrics: SharedMetrics,
    ) -> VaultResult<Self> {
        let auth = Arc::new(AuthorizationManager::new(admin)?);
        let journal = Arc::new(ReleaseJournal::new());
        let vault = Arc::new(SecureVault::new(
            Arc::clone(&auth),
            journal.clone(),
            pause_policy,
        ));
        Ok(Self {
            version,
            auth,
            vault,
            journal,
            metrics,
        })
    }

    fn observe(&self) {
        self.metrics
            .observe_vault(self.vault.total_balance(), self.vault.is_paused());
    }
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/roles/grant", post(grant_handler))
        .route("/roles/revoke", post(revoke_handler))
        .route("/roles/renounce", post(renounce_handler))
        .route("/roles/events", get(role_events_handler))
        .route("/roles/:principal/:role", get(authorization_handler))
        .route("/admin/transfer", post(transfer_admin_handler))
        .route("/vault/deposit", post(deposit_handler))
        .route("/vault/withdraw", post(withdraw_handler))
        .route("/vault/admin-withdraw", post(admin_withdraw_handler))
        .route("/vault/pause", post(pause_handler))
        .route("/vault/unpause", post(unpause_handler))
        .route("/vault/balances/:principal", get(balance_handler))
        .route("/vault/events", get(vault_events_handler))
        .route("/vault/payouts", get(payouts_handler))
        .route("/audit", get(audit_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Caller identity & errors
// ---------------------------------------------------------------------------

/// The authenticated caller, taken from the `x-vault-principal` header.
pub struct Caller(pub Principal);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(CALLER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| Caller(Principal::new(v)))
            .ok_or(ApiError::MissingCaller)
    }
}

/// Errors surfaced to HTTP clients.
#[derive(Debug)]
pub enum ApiError {
    /// No caller identity header.
    MissingCaller,
    /// The core rejected or faulted the request.
    Vault(VaultError),
}

impl From<VaultError> for ApiError {
    fn from(err: VaultError) -> Self {
        ApiError::Vault(err)
    }
}

/// Generic error body returned by endpoints on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
}

fn status_for(err: &VaultError) -> StatusCode {
    match err {
        VaultError::NotAdmin { .. } | VaultError::Unauthorized { .. } => StatusCode::FORBIDDEN,
        VaultError::InvalidPrincipal(_)
        | VaultError::InvalidRole(_)
        | VaultError::InvalidAmount(_) => StatusCode::BAD_REQUEST,
        VaultError::InsufficientBalance { .. } | VaultError::BalanceOverflow { .. } => {
            StatusCode::CONFLICT
        }
        VaultError::Paused => StatusCode::LOCKED,
        VaultError::ReentrantCall | VaultError::ReleaseFailed(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::MissingCaller => (
                StatusCode::UNAUTHORIZED,
                ErrorResponse {
                    error: format!("missing {CALLER_HEADER} header"),
                    kind: "missing_caller".into(),
                },
            ),
            ApiError::Vault(err) => (
                status_for(&err),
                ErrorResponse {
                    error: err.to_string(),
                    kind: err.kind().into(),
                },
            ),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

/// Body for grant and revoke.
#[derive(Debug, Serialize, Deserialize)]
pub struct RoleRequest {
    pub principal: String,
    pub role: String,
}

/// Body for renounce.
#[derive(Debug, Serialize, Deserialize)]
pub struct RenounceRequest {
    pub role: String,
}

/// Body for admin transfer.
#[derive(Debug, Serialize, Deserialize)]
pub struct TransferAdminRequest {
    pub new_admin: String,
}

/// Body for deposit and withdraw.
#[derive(Debug, Serialize, Deserialize)]
pub struct AmountRequest {
    pub amount: u64,
}

/// Body for recovery withdrawals.
#[derive(Debug, Serialize, Deserialize)]
pub struct AdminWithdrawRequest {
    pub principal: String,
    pub amount: u64,
}

/// Response for idempotent operations: `record` is absent when nothing changed.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChangeResponse {
    pub changed: bool,
    pub record: Option<EventRecord>,
}

impl From<Option<EventRecord>> for ChangeResponse {
    fn from(record: Option<EventRecord>) -> Self {
        Self {
            changed: record.is_some(),
            record,
        }
    }
}

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub admin: Principal,
    pub paused: bool,
    pub pause_policy: PausePolicy,
    pub grants_version: u64,
    pub total_balance: u128,
    pub total_released: u64,
    /// ISO-8601 timestamp of the response.
    pub timestamp: String,
}

/// Response payload for `GET /roles/:principal/:role`.
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthorizationResponse {
    pub principal: Principal,
    pub role: Role,
    pub authorized: bool,
    pub grants_version: u64,
}

/// Response payload for `GET /vault/balances/:principal`.
#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub principal: Principal,
    pub balance: u64,
}

/// Response payload for `GET /audit`.
#[derive(Debug, Serialize, Deserialize)]
pub struct AuditResponse {
    pub grants: GrantAudit,
    pub custody: CustodyAudit,
}

/// Query string for history endpoints.
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub since: u64,
    pub limit: Option<usize>,
}

impl HistoryQuery {
    fn limit(&self) -> usize {
        self.limit.unwrap_or(MAX_EVENT_PAGE).min(MAX_EVENT_PAGE)
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health`: returns 200 if the node is alive.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status`: vault and permission summary.
async fn status_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        version: state.version.clone(),
        admin: state.auth.admin(),
        paused: state.vault.is_paused(),
        pause_policy: state.vault.pause_policy(),
        grants_version: state.auth.version(),
        total_balance: state.vault.total_balance(),
        total_released: state.journal.total_released(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

fn record_permission_change(
    state: &AppState,
    operation: &str,
    outcome: VaultResult<Option<EventRecord>>,
) -> ApiResult<ChangeResponse> {
    state.metrics.record(operation, &outcome);
    let record = outcome?;
    if record.is_some() {
        state.metrics.permission_changes_total.inc();
    }
    Ok(Json(record.into()))
}

/// `POST /roles/grant`
async fn grant_handler(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Json(req): Json<RoleRequest>,
) -> ApiResult<ChangeResponse> {
    let role: Role = req.role.parse()?;
    let outcome = state
        .auth
        .grant_role(&caller, &Principal::new(req.principal), role);
    record_permission_change(&state, "grant_role", outcome)
}

/// `POST /roles/revoke`
async fn revoke_handler(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Json(req): Json<RoleRequest>,
) -> ApiResult<ChangeResponse> {
    let role: Role = req.role.parse()?;
    let outcome = state
        .auth
        .revoke_role(&caller, &Principal::new(req.principal), role);
    record_permission_change(&state, "revoke_role", outcome)
}

/// `POST /roles/renounce`
async fn renounce_handler(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Json(req): Json<RenounceRequest>,
) -> ApiResult<ChangeResponse> {
    let role: Role = req.role.parse()?;
    let outcome = state.auth.renounce_role(&caller, role);
    record_permission_change(&state, "renounce_role", outcome)
}

/// `GET /roles/:principal/:role`
async fn authorization_handler(
    State(state): State<AppState>,
    Path((principal, role)): Path<(String, String)>,
) -> ApiResult<AuthorizationResponse> {
    let role: Role = role.parse()?;
    let principal = Principal::new(principal);
    let (authorized, grants_version) = {
        let grants = state.auth.snapshot();
        (grants.is_authorized(&principal, role), grants.version())
    };
    Ok(Json(AuthorizationResponse {
        authorized,
        grants_version,
        principal,
        role,
    }))
}

/// `GET /roles/events?since=N&limit=M`
async fn role_events_handler(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Json<Vec<EventRecord>> {
    Json(state.auth.events_since(query.since, query.limit()))
}

/// `POST /admin/transfer`
async fn transfer_admin_handler(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Json(req): Json<TransferAdminRequest>,
) -> ApiResult<EventRecord> {
    let outcome = state
        .auth
        .transfer_admin(&caller, &Principal::new(req.new_admin));
    state.metrics.record("transfer_admin", &outcome);
    let record = outcome?;
    state.metrics.permission_changes_total.inc();
    Ok(Json(record))
}

fn record_vault_op(
    state: &AppState,
    operation: &str,
    outcome: VaultResult<EventRecord>,
) -> ApiResult<EventRecord> {
    state.metrics.record(operation, &outcome);
    state.observe();
    Ok(Json(outcome?))
}

/// `POST /vault/deposit`
async fn deposit_handler(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Json(req): Json<AmountRequest>,
) -> ApiResult<EventRecord> {
    let outcome = state.vault.deposit(&caller, req.amount);
    record_vault_op(&state, "deposit", outcome)
}

/// `POST /vault/withdraw`
async fn withdraw_handler(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Json(req): Json<AmountRequest>,
) -> ApiResult<EventRecord> {
    let outcome = state.vault.withdraw(&caller, req.amount);
    record_vault_op(&state, "withdraw", outcome)
}

/// `POST /vault/admin-withdraw`
async fn admin_withdraw_handler(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Json(req): Json<AdminWithdrawRequest>,
) -> ApiResult<EventRecord> {
    let outcome = state
        .vault
        .admin_withdraw(&caller, &Principal::new(req.principal), req.amount);
    record_vault_op(&state, "admin_withdraw", outcome)
}

/// `POST /vault/pause`
async fn pause_handler(
    State(state): State<AppState>,
    Caller(caller): Caller,
) -> ApiResult<ChangeResponse> {
    let outcome = state.vault.pause(&caller);
    state.metrics.record("pause", &outcome);
    state.observe();
    Ok(Json(outcome?.into()))
}

/// `POST /vault/unpause`
async fn unpause_handler(
    State(state): State<AppState>,
    Caller(caller): Caller,
) -> ApiResult<ChangeResponse> {
    let outcome = state.vault.unpause(&caller);
    state.metrics.record("unpause", &outcome);
    state.observe();
    Ok(Json(outcome?.into()))
}

/// `GET /vault/balances/:principal`
async fn balance_handler(
    State(state): State<AppState>,
    Path(principal): Path<String>,
) -> Json<BalanceResponse> {
    let principal = Principal::new(principal);
    Json(BalanceResponse {
        balance: state.vault.balance_of(&principal),
        principal,
    })
}

/// `GET /vault/events?since=N&limit=M`
async fn vault_events_handler(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Json<Vec<EventRecord>> {
    Json(state.vault.events_since(query.since, query.limit()))
}

/// `GET /vault/payouts`
async fn payouts_handler(State(state): State<AppState>) -> Json<Vec<Payout>> {
    Json(state.journal.payouts())
}

/// `GET /audit`: replays both histories against live state.
async fn audit_handler(State(state): State<AppState>) -> Json<AuditResponse> {
    Json(AuditResponse {
        grants: state.auth.audit(),
        custody: state.vault.audit(),
    })
}
