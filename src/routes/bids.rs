//! Bid routes
//!
//! Draft management, submission, withdrawal and the owner-side
//! administrative actions.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::{DataResponse, NoContent, Paginated, PaginationParams};
use crate::app::AppState;
use crate::auth::ActorContext;
use crate::domain::bids::{BidResponse, CreateBidRequest, ReadinessReport, UpdateBidRequest};
use crate::error::ApiError;

/// POST /tenders/:tender_id/bids
///
/// Create a draft bid for a published tender.
pub async fn create_bid(
    actor: ActorContext,
    State(state): State<Arc<AppState>>,
    Path(tender_id): Path<Uuid>,
    Json(req): Json<CreateBidRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let bid = state.bids.create_draft(tender_id, req, &actor).await?;
    let response: BidResponse = bid.into();
    Ok((StatusCode::CREATED, Json(DataResponse::new(response))))
}

/// GET /tenders/:tender_id/bids
///
/// List bids for a tender. Restricted to the tender's owning company.
pub async fn list_bids(
    actor: ActorContext,
    State(state): State<Arc<AppState>>,
    Path(tender_id): Path<Uuid>,
    Query(pagination): Query<PaginationParams>,
) -> Result<impl IntoResponse, ApiError> {
    let bids = state.bids.list_for_tender(tender_id, &actor).await?;
    let total = bids.len() as u64;
    let page: Vec<BidResponse> = bids
        .into_iter()
        .skip(pagination.offset() as usize)
        .take(pagination.per_page() as usize)
        .map(Into::into)
        .collect();
    Ok(Json(Paginated::new(page, &pagination, total)))
}

/// GET /bids/:bid_id
pub async fn get_bid(
    actor: ActorContext,
    State(state): State<Arc<AppState>>,
    Path(bid_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let bid = state.bids.get(bid_id, &actor).await?;
    let response: BidResponse = bid.into();
    Ok(Json(DataResponse::new(response)))
}

/// PATCH /bids/:bid_id
pub async fn update_bid(
    actor: ActorContext,
    State(state): State<Arc<AppState>>,
    Path(bid_id): Path<Uuid>,
    Json(req): Json<UpdateBidRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let bid = state.bids.update_draft(bid_id, req, &actor).await?;
    let response: BidResponse = bid.into();
    Ok(Json(DataResponse::new(response)))
}

/// GET /bids/:bid_id/review
///
/// Pre-submit readiness checklist; never mutates.
pub async fn review_bid(
    actor: ActorContext,
    State(state): State<Arc<AppState>>,
    Path(bid_id): Path<Uuid>,
) -> Result<Json<DataResponse<ReadinessReport>>, ApiError> {
    let report = state.bids.pre_submit_review(bid_id, &actor).await?;
    Ok(Json(DataResponse::new(report)))
}

/// POST /bids/:bid_id/submit
pub async fn submit_bid(
    actor: ActorContext,
    State(state): State<Arc<AppState>>,
    Path(bid_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let bid = state.bids.submit(bid_id, &actor).await?;
    let response: BidResponse = bid.into();
    Ok(Json(DataResponse::new(response)))
}

/// POST /bids/:bid_id/withdraw
pub async fn withdraw_bid(
    actor: ActorContext,
    State(state): State<Arc<AppState>>,
    Path(bid_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let bid = state.bids.withdraw(bid_id, &actor).await?;
    let response: BidResponse = bid.into();
    Ok(Json(DataResponse::new(response)))
}

/// DELETE /bids/:bid_id
pub async fn delete_bid(
    actor: ActorContext,
    State(state): State<Arc<AppState>>,
    Path(bid_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state.bids.delete_draft(bid_id, &actor).await?;
    Ok(NoContent)
}

/// POST /bids/:bid_id/reject
pub async fn reject_bid(
    actor: ActorContext,
    State(state): State<Arc<AppState>>,
    Path(bid_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let bid = state.bids.reject(bid_id, &actor).await?;
    let response: BidResponse = bid.into();
    Ok(Json(DataResponse::new(response)))
}

/// POST /bids/:bid_id/hold
pub async fn hold_bid(
    actor: ActorContext,
    State(state): State<Arc<AppState>>,
    Path(bid_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let bid = state.bids.hold_under_review(bid_id, &actor).await?;
    let response: BidResponse = bid.into();
    Ok(Json(DataResponse::new(response)))
}

/// POST /bids/:bid_id/accept
///
/// Accepting a bid IS awarding its tender, so this routes through the
/// award coordinator and inherits its preconditions and atomicity.
pub async fn accept_bid(
    actor: ActorContext,
    State(state): State<Arc<AppState>>,
    Path(bid_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let bid = state.bids.get(bid_id, &actor).await?;
    let outcome = state.awards.award(bid.tender_id, bid_id, &actor).await?;
    let response: BidResponse = outcome.accepted.into();
    Ok(Json(DataResponse::new(response)))
}
