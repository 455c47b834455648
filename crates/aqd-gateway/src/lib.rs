pub mod auth;
pub mod error;

use std::sync::Arc;

use aqd_billing::{FeatureGrant, SubscriptionService, SubscriptionSnapshot};
use aqd_core::{
    Account, AccountStore, Actor, Catalog, Contract, ContractDetails, ContractFilter,
    ContractStatus, ContractStore, EventStore, NewContract, NewPaymentProof, NewPlanPayment,
    Notification, NotificationStore, PaymentProof, PlanPayment, ProofStore, ReviewDecision,
    ServiceError, TransitionRecord,
};
use aqd_notify::NotificationService;
use aqd_platform::{
    ApiEnvelope, ContractListQuery, EnsureAccountRequest, MarkAllReadResponse,
    NotificationListQuery, ReviewProofRequest, TransitionRequest, UnreadCountQuery,
    UnreadCountResponse,
};
use aqd_workflow::{ContractWorkflowService, PaymentReviewService};
use axum::body::Bytes;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::auth::{CurrentUser, user_id_from_headers};
use crate::error::ApiError;

type ApiResult<T> = Result<Json<ApiEnvelope<T>>, ApiError>;
type Created<T> = Result<(StatusCode, Json<ApiEnvelope<T>>), ApiError>;

#[derive(Clone)]
pub struct AppState {
    pub contracts: ContractWorkflowService,
    pub payments: PaymentReviewService,
    pub subscriptions: SubscriptionService,
    pub notifications: NotificationService,
}

impl AppState {
    /// Wires every service to a single store implementing all storage ports.
    pub fn from_store<S>(store: Arc<S>, catalog: Arc<Catalog>) -> Self
    where
        S: EventStore + ContractStore + ProofStore + AccountStore + NotificationStore + 'static,
    {
        let notifications = NotificationService::new(store.clone());
        Self {
            contracts: ContractWorkflowService::new(
                store.clone(),
                store.clone(),
                store.clone(),
                notifications.clone(),
            ),
            payments: PaymentReviewService::new(
                store.clone(),
                store.clone(),
                store.clone(),
                notifications.clone(),
                catalog.clone(),
            ),
            subscriptions: SubscriptionService::new(store, catalog),
            notifications,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/contracts", get(list_contracts).post(create_contract))
        .route("/contracts/{contract_id}", get(get_contract))
        .route("/contracts/{contract_id}/history", get(contract_history))
        .route("/contracts/{contract_id}/transition", post(transition_contract))
        .route("/contracts/{contract_id}/proofs", post(submit_proof))
        .route("/payments/proofs/pending", get(list_pending_proofs))
        .route("/payments/proofs/{proof_id}/review", post(review_proof))
        .route("/accounts/ensure", post(ensure_account))
        .route("/accounts/{account_id}/status", get(account_status))
        .route("/accounts/{account_id}/payments", post(record_payment))
        .route(
            "/accounts/{account_id}/features/{feature}",
            get(authorize_feature),
        )
        .route("/notifications", get(list_notifications))
        .route("/notifications/unread-count", get(unread_count))
        .route("/notifications/read-all", post(mark_all_read))
        .route("/notifications/{notification_id}/read", post(mark_read))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(ApiEnvelope::ok(data)))
}

fn created<T>(data: T) -> Created<T> {
    Ok((StatusCode::CREATED, Json(ApiEnvelope::ok(data))))
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::bad_request(rejection.body_text()))
}

fn path_id(path: Result<Path<Uuid>, PathRejection>) -> Result<Uuid, ApiError> {
    path.map(|Path(id)| id)
        .map_err(|rejection| ApiError::bad_request(rejection.body_text()))
}

fn query<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, ApiError> {
    query
        .map(|Query(value)| value)
        .map_err(|rejection| ApiError::bad_request(rejection.body_text()))
}

/// Decodes an optional JSON body; an empty body yields the default value.
fn optional_body<T>(body: &Bytes) -> Result<T, ApiError>
where
    T: DeserializeOwned + Default,
{
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|err| ApiError::bad_request(format!("invalid JSON body: {err}")))
}

fn ensure_party(contract: &Contract, actor: &Actor) -> Result<(), ApiError> {
    if actor.is_admin() || contract.is_party(actor.user_id) {
        Ok(())
    } else {
        Err(ServiceError::unauthorized("not a party to this contract").into())
    }
}

fn ensure_account_owner(snapshot: &SubscriptionSnapshot, actor: &Actor) -> Result<(), ApiError> {
    if actor.is_admin() || snapshot.user_id == actor.user_id {
        Ok(())
    } else {
        Err(ServiceError::unauthorized("account belongs to another user").into())
    }
}

async fn create_contract(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    payload: Result<Json<NewContract>, JsonRejection>,
) -> Created<Contract> {
    let input = json_body(payload)?;
    created(state.contracts.create_contract(input, &actor).await?)
}

async fn list_contracts(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    params: Result<Query<ContractListQuery>, QueryRejection>,
) -> ApiResult<Vec<Contract>> {
    let params = query(params)?;
    let status = params
        .status
        .as_deref()
        .map(str::parse::<ContractStatus>)
        .transpose()
        .map_err(ServiceError::Validation)?;
    let filter = ContractFilter {
        status,
        limit: params.limit,
        ..ContractFilter::default()
    };

    ok(state.contracts.list_contracts(filter, &actor).await?)
}

async fn get_contract(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<ContractDetails> {
    let details = state.contracts.get_contract_by_id(path_id(path)?).await?;
    ensure_party(&details.contract, &actor)?;
    ok(details)
}

async fn contract_history(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Vec<TransitionRecord>> {
    let contract_id = path_id(path)?;
    let details = state.contracts.get_contract_by_id(contract_id).await?;
    ensure_party(&details.contract, &actor)?;
    ok(state.contracts.history(contract_id).await?)
}

async fn transition_contract(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<TransitionRequest>, JsonRejection>,
) -> ApiResult<Contract> {
    let contract_id = path_id(path)?;
    let target = json_body(payload)?
        .status
        .parse::<ContractStatus>()
        .map_err(ServiceError::Validation)?;

    ok(state.contracts.transition(contract_id, target, &actor).await?)
}

async fn submit_proof(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<NewPaymentProof>, JsonRejection>,
) -> Created<PaymentProof> {
    let contract_id = path_id(path)?;
    let input = json_body(payload)?;
    created(state.payments.submit_proof(contract_id, input, &actor).await?)
}

async fn list_pending_proofs(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
) -> ApiResult<Vec<PaymentProof>> {
    if !actor.is_admin() {
        return Err(ServiceError::unauthorized("only administrators see the review queue").into());
    }
    ok(state.payments.list_pending_proofs().await?)
}

async fn review_proof(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<ReviewProofRequest>, JsonRejection>,
) -> ApiResult<PaymentProof> {
    let proof_id = path_id(path)?;
    let request = json_body(payload)?;
    let decision = request
        .decision
        .parse::<ReviewDecision>()
        .map_err(ServiceError::Validation)?;

    ok(state
        .payments
        .review_proof(proof_id, decision, &actor, request.note.as_deref())
        .await?)
}

async fn ensure_account(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    body: Bytes,
) -> ApiResult<Account> {
    let request: EnsureAccountRequest = optional_body(&body)?;
    let user_id = request.user_id.unwrap_or(actor.user_id);
    if user_id != actor.user_id && !actor.is_admin() {
        return Err(
            ServiceError::unauthorized("only administrators may open accounts for others").into(),
        );
    }

    ok(state.subscriptions.ensure_account(user_id).await?)
}

async fn account_status(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<SubscriptionSnapshot> {
    let snapshot = state.subscriptions.get_status(path_id(path)?).await?;
    ensure_account_owner(&snapshot, &actor)?;
    ok(snapshot)
}

async fn record_payment(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<NewPlanPayment>, JsonRejection>,
) -> Created<PlanPayment> {
    let account_id = path_id(path)?;
    let input = json_body(payload)?;
    created(
        state
            .subscriptions
            .record_payment(account_id, input, &actor)
            .await?,
    )
}

async fn authorize_feature(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    path: Result<Path<(Uuid, String)>, PathRejection>,
) -> ApiResult<FeatureGrant> {
    let Path((account_id, feature)) =
        path.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
    let snapshot = state.subscriptions.get_status(account_id).await?;
    ensure_account_owner(&snapshot, &actor)?;

    ok(state
        .subscriptions
        .authorize_feature(account_id, &feature)
        .await?)
}

async fn list_notifications(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    params: Result<Query<NotificationListQuery>, QueryRejection>,
) -> ApiResult<Vec<Notification>> {
    let params = query(params)?;
    ok(state
        .notifications
        .list_notifications(actor.user_id, params.limit)
        .await?)
}

/// Badge endpoint: always answers 200, falling back to zero for unknown or
/// malformed users.
async fn unread_count(
    State(state): State<AppState>,
    headers: HeaderMap,
    params: Result<Query<UnreadCountQuery>, QueryRejection>,
) -> Json<UnreadCountResponse> {
    let requested = params.ok().and_then(|Query(params)| params.user_id);
    let user_id = match requested {
        Some(raw) => Uuid::parse_str(raw.trim()).ok(),
        None => user_id_from_headers(&headers).ok(),
    };

    let count = match user_id {
        Some(user_id) => state.notifications.get_unread_count(user_id).await,
        None => 0,
    };
    Json(UnreadCountResponse {
        success: true,
        count,
    })
}

async fn mark_read(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Notification> {
    ok(state
        .notifications
        .mark_read(path_id(path)?, actor.user_id)
        .await?)
}

async fn mark_all_read(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
) -> ApiResult<MarkAllReadResponse> {
    let updated = state.notifications.mark_all_read(actor.user_id).await?;
    ok(MarkAllReadResponse { updated })
}
