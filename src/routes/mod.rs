pub mod bids;
pub mod health;
pub mod tenders;

use axum::{routing::delete, routing::get, routing::patch, routing::post, Router};
use std::sync::Arc;

use crate::app::AppState;

/// Build the API router with all routes
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        // Public routes
        .route("/health", get(health::health_check))
        // Tenders
        .route("/tenders", post(tenders::create_tender))
        .route("/tenders/:tender_id", get(tenders::get_tender))
        .route("/tenders/:tender_id", patch(tenders::update_tender))
        .route("/tenders/:tender_id/publish", post(tenders::publish_tender))
        .route("/tenders/:tender_id/close", post(tenders::close_tender))
        .route("/tenders/:tender_id/award", post(tenders::award_tender))
        .route("/tenders/:tender_id/analysis", get(tenders::analyze_tender))
        // Bids (nested under tenders)
        .route("/tenders/:tender_id/bids", post(bids::create_bid))
        .route("/tenders/:tender_id/bids", get(bids::list_bids))
        // Bids
        .route("/bids/:bid_id", get(bids::get_bid))
        .route("/bids/:bid_id", patch(bids::update_bid))
        .route("/bids/:bid_id", delete(bids::delete_bid))
        .route("/bids/:bid_id/review", get(bids::review_bid))
        .route("/bids/:bid_id/submit", post(bids::submit_bid))
        .route("/bids/:bid_id/withdraw", post(bids::withdraw_bid))
        .route("/bids/:bid_id/reject", post(bids::reject_bid))
        .route("/bids/:bid_id/hold", post(bids::hold_bid))
        .route("/bids/:bid_id/accept", post(bids::accept_bid))
}
