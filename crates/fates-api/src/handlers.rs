//! HTTP handlers
//!
//! Thin mappings from HTTP to core operations: parse, dispatch, convert.
//! All policy (halt checks, validation, authorization) lives in the
//! engine; the handlers only translate errors to statuses.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;

use fates_engine::{NotificationRequest, SubmitPetitionRequest};
use fates_types::{FatesError, KingId, PetitionId, ReasonCode};

use crate::dto::{
    AcknowledgmentResponse, CosignBody, CosignResponse, DecisionPackageQuery,
    DecisionPackageResponse, HealthResponse, KingAcknowledgeBody, PetitionStatusResponse,
    QueueQuery, QueueResponse, SubmitPetitionBody, SubmitPetitionResponse, WithdrawBody,
    WithdrawResponse,
};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

fn parse_petition_id(raw: &str) -> ApiResult<PetitionId> {
    PetitionId::parse(raw).map_err(|_| {
        ApiError::from(FatesError::validation(
            "petition_id",
            format!("not a valid petition id: {raw}"),
        ))
    })
}

/// POST /v1/petitions
pub async fn submit_petition(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SubmitPetitionBody>,
) -> ApiResult<(StatusCode, Json<SubmitPetitionResponse>)> {
    let notification = match body.notification_channel.as_deref() {
        Some("WEBHOOK") => body
            .notification_webhook_url
            .map(|url| NotificationRequest::Webhook { url }),
        Some("IN_APP") => Some(NotificationRequest::InApp),
        _ => None,
    };

    let result = state
        .submission
        .submit_petition(SubmitPetitionRequest {
            petition_type: body.petition_type,
            text: body.text,
            realm: body.realm,
            submitter_id: body.submitter_id,
            notification,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(result.into())))
}

/// POST /v1/petitions/:id/cosign
pub async fn cosign_petition(
    State(state): State<Arc<AppState>>,
    Path(petition_id): Path<String>,
    Json(body): Json<CosignBody>,
) -> ApiResult<Json<CosignResponse>> {
    let petition_id = parse_petition_id(&petition_id)?;
    let result = state.cosign.cosign(petition_id, body.signer_id).await?;

    Ok(Json(CosignResponse {
        petition_id,
        co_signer_count: result.co_signer_count,
        escalated: result
            .escalation
            .map(|e| e.triggered || e.already_escalated)
            .unwrap_or(false),
    }))
}

/// GET /v1/petitions/:id
pub async fn get_petition(
    State(state): State<Arc<AppState>>,
    Path(petition_id): Path<String>,
) -> ApiResult<Json<PetitionStatusResponse>> {
    let petition_id = parse_petition_id(&petition_id)?;
    let petition = state
        .submission
        .get_petition(petition_id)
        .await?
        .ok_or_else(|| ApiError::from(FatesError::PetitionNotFound { petition_id }))?;
    Ok(Json(petition.into()))
}

/// POST /v1/petitions/:id/withdraw
pub async fn withdraw_petition(
    State(state): State<Arc<AppState>>,
    Path(petition_id): Path<String>,
    Json(body): Json<WithdrawBody>,
) -> ApiResult<Json<WithdrawResponse>> {
    let petition_id = parse_petition_id(&petition_id)?;
    let petition = state
        .submission
        .withdraw_petition(petition_id, body.requester_id, body.reason)
        .await?;
    Ok(Json(WithdrawResponse {
        petition_id,
        state: petition.state,
        fate_reason: petition.fate_reason,
    }))
}

/// GET /v1/kings/:king_id/escalations
pub async fn get_escalation_queue(
    State(state): State<Arc<AppState>>,
    Path(king_id): Path<String>,
    Query(query): Query<QueueQuery>,
) -> ApiResult<Json<QueueResponse>> {
    let king_id = KingId::parse(&king_id).map_err(|_| {
        ApiError::from(FatesError::validation(
            "king_id",
            format!("not a valid king id: {king_id}"),
        ))
    })?;

    let page = state
        .queue
        .get_queue(king_id, &query.realm, query.cursor.as_deref(), query.limit)
        .await?;
    Ok(Json(page.into()))
}

/// GET /v1/kings/escalations/:petition_id
pub async fn get_decision_package(
    State(state): State<Arc<AppState>>,
    Path(petition_id): Path<String>,
    Query(query): Query<DecisionPackageQuery>,
) -> ApiResult<Json<DecisionPackageResponse>> {
    let petition_id = parse_petition_id(&petition_id)?;
    let package = state
        .packages
        .get_decision_package(petition_id, &query.realm)
        .await?;
    Ok(Json(package.into()))
}

/// POST /v1/kings/escalations/:petition_id/acknowledge
pub async fn king_acknowledge(
    State(state): State<Arc<AppState>>,
    Path(petition_id): Path<String>,
    Json(body): Json<KingAcknowledgeBody>,
) -> ApiResult<Json<AcknowledgmentResponse>> {
    let petition_id = parse_petition_id(&petition_id)?;
    let reason_code = ReasonCode::parse(&body.reason_code)?;

    let acknowledgment = state
        .acknowledgments
        .execute_king_acknowledge(
            petition_id,
            body.king_id,
            reason_code,
            body.rationale,
            &body.realm,
        )
        .await?;
    Ok(Json(acknowledgment.into()))
}

/// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        halted: state.halt_gate.is_halted().await,
    })
}
