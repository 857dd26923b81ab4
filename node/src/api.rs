//! # REST API
//!
//! Builds the axum router that exposes the directory over HTTP. All
//! endpoints share application state through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path                    | Description                              |
//! |--------|-------------------------|------------------------------------------|
//! | GET    | `/health`               | Liveness probe                           |
//! | GET    | `/status`               | Committed root, backlog, settlements     |
//! | GET    | `/names/:name`          | Committed record for a name              |
//! | GET    | `/premium`              | Committed premium schedule               |
//! | GET    | `/actions`              | Pending actions, `?since=<seq>` cursor   |
//! | POST   | `/actions`              | Submit a signed action                   |
//! | GET    | `/settlements/latest`   | Receipt of the last accepted settlement  |
//!
//! Reads only ever reflect the committed root. A name registered by a
//! pending action is a 404 until it settles.

use axum::{
    extract::{Path, Query, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use nameledger_contracts::NameService;
use nameledger_protocol::actions::{LoggedAction, SignedAction};
use nameledger_protocol::config::BASE_REGISTRATION_FEE;
use nameledger_protocol::names::Name;
use nameledger_protocol::settlement::SettlementReceipt;
use nameledger_protocol::NameServiceError;

use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone: everything behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    /// The deployed directory.
    pub service: Arc<NameService>,
    /// Reference to Prometheus metrics for in-handler recording.
    pub metrics: SharedMetrics,
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
        .route("/names/:name", get(name_handler))
        .route("/premium", get(premium_handler))
        .route("/actions", get(actions_handler).post(submit_handler))
        .route("/settlements/latest", get(latest_settlement_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Response Types
// ---------------------------------------------------------------------------

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    /// Hex-encoded committed root.
    pub committed_root: String,
    pub pending_actions: usize,
    pub committed_names: usize,
    pub settlements: usize,
    pub fees_collected: u64,
    /// ISO-8601 timestamp of the response.
    pub timestamp: String,
}

/// Response payload for `GET /names/:name`.
#[derive(Debug, Serialize, Deserialize)]
pub struct NameResponse {
    pub name: String,
    pub owner: String,
    pub avatar: String,
    pub url: String,
    /// The committed root this answer was read against.
    pub root: String,
}

/// Response payload for `GET /premium`.
#[derive(Debug, Serialize, Deserialize)]
pub struct PremiumResponse {
    pub base_fee: u64,
    /// Multipliers for lengths `<=3, 4, 5, 6, 7, >=8`.
    pub multipliers: Vec<u64>,
}

/// One entry of `GET /actions`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ActionView {
    pub seq: u64,
    pub id: String,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub submitter: String,
    pub delivered_at: String,
}

impl From<&LoggedAction> for ActionView {
    fn from(logged: &LoggedAction) -> Self {
        Self {
            seq: logged.seq,
            id: logged.id.to_hex(),
            kind: logged.signed.action.kind().to_string(),
            name: logged.signed.action.name().map(|n| n.to_string()),
            submitter: logged.signed.submitter.to_hex(),
            delivered_at: logged.delivered_at.to_rfc3339(),
        }
    }
}

/// Response payload for `POST /actions`.
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub seq: u64,
    pub id: String,
    /// Root the pre-check ran against.
    pub checked_against: String,
}

/// Response payload for `GET /settlements/latest`.
#[derive(Debug, Serialize, Deserialize)]
pub struct SettlementResponse {
    pub old_root: String,
    pub new_root: String,
    pub applied: usize,
    pub dropped: Vec<DroppedView>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DroppedView {
    pub seq: u64,
    pub reason: String,
}

impl From<SettlementReceipt> for SettlementResponse {
    fn from(receipt: SettlementReceipt) -> Self {
        Self {
            old_root: receipt.old_root.to_hex(),
            new_root: receipt.new_root.to_hex(),
            applied: receipt.applied,
            dropped: receipt
                .dropped
                .into_iter()
                .map(|d| DroppedView {
                    seq: d.seq,
                    reason: d.reason.to_string(),
                })
                .collect(),
        }
    }
}

/// Error body returned by every endpoint on failure. `error` is the stable
/// error name clients match on.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Newtype so contract errors can be returned straight from handlers.
pub struct ApiError(NameServiceError);

impl From<NameServiceError> for ApiError {
    fn from(e: NameServiceError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            NameServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            NameServiceError::AlreadyRegistered(_) | NameServiceError::StaleRoot { .. } => {
                StatusCode::CONFLICT
            }
            NameServiceError::NotOwner(_) | NameServiceError::NotAdmin(_) => StatusCode::FORBIDDEN,
            NameServiceError::SubmissionRejected(_) => StatusCode::BAD_REQUEST,
            NameServiceError::InvalidProof(_) => StatusCode::UNPROCESSABLE_ENTITY,
            NameServiceError::ProofConstructionFailed(_) | NameServiceError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = ErrorResponse {
            error: self.0.code().to_string(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

fn parse_name(raw: &str) -> Result<Name, ApiError> {
    Name::parse(raw)
        .map_err(|e| ApiError(NameServiceError::SubmissionRejected(e.to_string())))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health` — returns 200 if the node is alive.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status` — committed root and backlog summary.
async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let service = &state.service;
    Json(StatusResponse {
        version: state.version.clone(),
        committed_root: service.committed_root().to_hex(),
        pending_actions: service.pending_count(),
        committed_names: service.name_count(),
        settlements: service.settlement_count(),
        fees_collected: service.fees_collected(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// `GET /names/:name` — committed record, 404 if unknown or still pending.
async fn name_handler(
    Path(raw): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<NameResponse>, ApiError> {
    let name = parse_name(&raw)?;
    let root = state.service.committed_root();
    let record = state.service.resolve_name(&name)?;
    Ok(Json(NameResponse {
        name: name.to_string(),
        owner: record.owner.to_hex(),
        avatar: record.avatar,
        url: record.url,
        root: root.to_hex(),
    }))
}

/// `GET /premium` — the premium schedule in force.
async fn premium_handler(State(state): State<AppState>) -> impl IntoResponse {
    let schedule = state.service.premium_schedule();
    Json(PremiumResponse {
        base_fee: BASE_REGISTRATION_FEE,
        multipliers: schedule.multipliers().to_vec(),
    })
}

#[derive(Debug, Deserialize)]
pub struct SinceQuery {
    pub since: Option<u64>,
}

/// `GET /actions?since=<seq>` — pending actions after the cursor.
async fn actions_handler(
    Query(query): Query<SinceQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let views: Vec<ActionView> = state
        .service
        .actions_since(query.since)
        .iter()
        .map(ActionView::from)
        .collect();
    Json(views)
}

/// `POST /actions` — submit a signed action.
async fn submit_handler(
    State(state): State<AppState>,
    Json(signed): Json<SignedAction>,
) -> Result<Json<SubmitResponse>, ApiError> {
    match state.service.submit(signed) {
        Ok(receipt) => {
            state.metrics.actions_accepted_total.inc();
            state
                .metrics
                .pending_actions
                .set(state.service.pending_count() as i64);
            Ok(Json(SubmitResponse {
                seq: receipt.seq,
                id: receipt.id.to_hex(),
                checked_against: receipt.checked_against.to_hex(),
            }))
        }
        Err(e) => {
            state.metrics.actions_rejected_total.inc();
            Err(e.into())
        }
    }
}

/// `GET /settlements/latest` — receipt of the last accepted settlement.
async fn latest_settlement_handler(State(state): State<AppState>) -> Response {
    match state.service.last_settlement() {
        Some(receipt) => Json(SettlementResponse::from(receipt)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "NotFound".into(),
                message: "no settlement yet".into(),
            }),
        )
            .into_response(),
    }
}
