//! Tender routes
//!
//! Thin wrappers over the tender lifecycle manager and award coordinator.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::DataResponse;
use crate::app::AppState;
use crate::auth::ActorContext;
use crate::domain::bids::BidResponse;
use crate::domain::evaluation::EvaluationReport;
use crate::domain::tenders::{CreateTenderRequest, TenderResponse, UpdateTenderRequest};
use crate::error::ApiError;

/// POST /tenders
pub async fn create_tender(
    actor: ActorContext,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateTenderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let tender = state.tenders.create(req, &actor).await?;
    let response: TenderResponse = tender.into();
    Ok((StatusCode::CREATED, Json(DataResponse::new(response))))
}

/// GET /tenders/:tender_id
pub async fn get_tender(
    actor: ActorContext,
    State(state): State<Arc<AppState>>,
    Path(tender_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let tender = state.tenders.get(tender_id, &actor).await?;
    let response: TenderResponse = tender.into();
    Ok(Json(DataResponse::new(response)))
}

/// PATCH /tenders/:tender_id
pub async fn update_tender(
    actor: ActorContext,
    State(state): State<Arc<AppState>>,
    Path(tender_id): Path<Uuid>,
    Json(req): Json<UpdateTenderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let tender = state.tenders.update(tender_id, req, &actor).await?;
    let response: TenderResponse = tender.into();
    Ok(Json(DataResponse::new(response)))
}

/// POST /tenders/:tender_id/publish
pub async fn publish_tender(
    actor: ActorContext,
    State(state): State<Arc<AppState>>,
    Path(tender_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let tender = state.tenders.publish(tender_id, &actor).await?;
    let response: TenderResponse = tender.into();
    Ok(Json(DataResponse::new(response)))
}

/// POST /tenders/:tender_id/close
pub async fn close_tender(
    actor: ActorContext,
    State(state): State<Arc<AppState>>,
    Path(tender_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let tender = state.tenders.close(tender_id, &actor).await?;
    let response: TenderResponse = tender.into();
    Ok(Json(DataResponse::new(response)))
}

#[derive(Debug, Deserialize)]
pub struct AwardRequest {
    pub winning_bid_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct AwardResponse {
    pub tender: TenderResponse,
    pub accepted_bid: BidResponse,
    pub rejected_bids: usize,
}

/// POST /tenders/:tender_id/award
pub async fn award_tender(
    actor: ActorContext,
    State(state): State<Arc<AppState>>,
    Path(tender_id): Path<Uuid>,
    Json(req): Json<AwardRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state
        .awards
        .award(tender_id, req.winning_bid_id, &actor)
        .await?;
    Ok(Json(DataResponse::new(AwardResponse {
        tender: outcome.tender.into(),
        accepted_bid: outcome.accepted.into(),
        rejected_bids: outcome.rejected_count,
    })))
}

/// GET /tenders/:tender_id/analysis
///
/// Read-only: recomputes and caches the evaluation report.
pub async fn analyze_tender(
    actor: ActorContext,
    State(state): State<Arc<AppState>>,
    Path(tender_id): Path<Uuid>,
) -> Result<Json<DataResponse<EvaluationReport>>, ApiError> {
    let report = state
        .tenders
        .analyze(tender_id, &actor, &state.engine)
        .await?;
    Ok(Json(DataResponse::new(report)))
}
