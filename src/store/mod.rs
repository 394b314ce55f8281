//! Persistence layer for tenders and bids.
//!
//! Every status change goes through a conditional (compare-and-set) write
//! keyed on the expected prior status, so two callers racing on the same
//! entity cannot both apply their transition. The award and expiry cascades
//! execute as one atomic unit per backend: a transaction in PostgreSQL, a
//! single locked section in memory.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::bids::{Bid, BidStatus, DocumentRef, EmdProof};
use crate::domain::evaluation::EvaluationReport;
use crate::domain::tenders::{Tender, TenderStatus};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("tender {0} not found")]
    TenderNotFound(Uuid),

    #[error("bid {0} not found")]
    BidNotFound(Uuid),

    /// A conditional write found the entity in a different status than the
    /// caller expected. The entity was left untouched.
    #[error("{entity} expected {expected}, found {actual}")]
    StaleState {
        entity: &'static str,
        expected: String,
        actual: String,
    },

    /// A draft already exists for this (tender, bidder company) pair.
    #[error("draft bid already exists for this tender and company")]
    DraftExists,

    /// The company previously withdrew a bid for this tender.
    #[error("a withdrawn bid exists for this tender and company")]
    WithdrawnBidExists,

    #[error("database error")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    pub(crate) fn stale_tender(expected: TenderStatus, actual: TenderStatus) -> Self {
        Self::StaleState {
            entity: "tender",
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    pub(crate) fn stale_bid(expected: impl Into<String>, actual: BidStatus) -> Self {
        Self::StaleState {
            entity: "bid",
            expected: expected.into(),
            actual: actual.to_string(),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Whitelisted patch applied to a draft tender.
#[derive(Debug, Clone, Default)]
pub struct TenderPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub estimated_value: Option<f64>,
    pub emd_amount: Option<f64>,
    pub abnormal_low_threshold_pct: Option<f64>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

/// Conditional tender status transition.
#[derive(Debug, Clone)]
pub struct TenderTransition {
    pub expected: TenderStatus,
    pub next: TenderStatus,
    /// Stamped only when the tender has no start date yet.
    pub default_start_date: Option<DateTime<Utc>>,
    /// Stamped only when the tender has no end date yet.
    pub default_end_date: Option<DateTime<Utc>>,
    pub now: DateTime<Utc>,
}

/// Fields replaced on a draft bid. Document lists arrive fully reconciled
/// by the lifecycle manager.
#[derive(Debug, Clone, Default)]
pub struct BidDraftUpdate {
    pub amount: Option<f64>,
    pub delivery_days: Option<i64>,
    pub emd_proof: Option<EmdProof>,
    pub technical_docs: Option<Vec<DocumentRef>>,
    pub financial_docs: Option<Vec<DocumentRef>>,
}

/// Conditional bid status transition.
#[derive(Debug, Clone)]
pub struct BidTransition {
    /// The write succeeds only if the current status is one of these.
    pub expected_any: Vec<BidStatus>,
    pub next: BidStatus,
    pub submitted_at: Option<DateTime<Utc>>,
    pub withdrawn_at: Option<DateTime<Utc>>,
    pub withdrawn_by: Option<Uuid>,
    pub anomaly_score: Option<f64>,
    pub ai_note: Option<String>,
    pub now: DateTime<Utc>,
}

impl BidTransition {
    pub fn new(expected_any: Vec<BidStatus>, next: BidStatus, now: DateTime<Utc>) -> Self {
        Self {
            expected_any,
            next,
            submitted_at: None,
            withdrawn_at: None,
            withdrawn_by: None,
            anomaly_score: None,
            ai_note: None,
            now,
        }
    }
}

/// Result of a successful award.
#[derive(Debug, Clone)]
pub struct AwardOutcome {
    pub tender: Tender,
    pub accepted: Bid,
    pub rejected_count: usize,
}

#[async_trait]
pub trait ProcurementStore: Send + Sync {
    async fn ping(&self) -> StoreResult<()>;

    // ----- tenders -----

    async fn insert_tender(&self, tender: Tender) -> StoreResult<Tender>;

    async fn get_tender(&self, id: Uuid) -> StoreResult<Tender>;

    /// Applies a whitelisted patch; conditional on the tender still being
    /// in `Draft`.
    async fn update_tender_draft(
        &self,
        id: Uuid,
        patch: TenderPatch,
        now: DateTime<Utc>,
    ) -> StoreResult<Tender>;

    /// Conditional status transition; fails `StaleState` when the expected
    /// status no longer matches at write time.
    async fn transition_tender(&self, id: Uuid, transition: TenderTransition)
        -> StoreResult<Tender>;

    /// Replaces the cached evaluation report.
    async fn attach_evaluation(&self, id: Uuid, report: EvaluationReport) -> StoreResult<()>;

    /// Idempotently adds a bid id to the tender's bid collection.
    async fn link_bid(&self, tender_id: Uuid, bid_id: Uuid, now: DateTime<Utc>) -> StoreResult<()>;

    /// Published tenders whose end date lies in the past.
    async fn list_published_past_end(&self, now: DateTime<Utc>) -> StoreResult<Vec<Tender>>;

    // ----- bids -----

    /// Inserts a draft bid, atomically enforcing both per-pair draft
    /// uniqueness (`DraftExists`) and withdrawal permanence
    /// (`WithdrawnBidExists`).
    async fn create_draft_bid(&self, bid: Bid) -> StoreResult<Bid>;

    async fn get_bid(&self, id: Uuid) -> StoreResult<Bid>;

    async fn list_bids_for_tender(&self, tender_id: Uuid) -> StoreResult<Vec<Bid>>;

    /// Replaces draft fields; conditional on the bid still being `Draft`.
    async fn update_draft_bid(
        &self,
        id: Uuid,
        update: BidDraftUpdate,
        now: DateTime<Utc>,
    ) -> StoreResult<Bid>;

    /// Conditional status transition; fails `StaleState` when the current
    /// status is not in `expected_any` at write time.
    async fn transition_bid(&self, id: Uuid, transition: BidTransition) -> StoreResult<Bid>;

    /// Removes a draft bid; conditional on it still being `Draft`.
    async fn delete_draft_bid(&self, id: Uuid) -> StoreResult<()>;

    /// The paired award write: tender `Closed → Awarded` (the race guard),
    /// winner → `Accepted`, every other pending bid → `Rejected`.
    /// All-or-nothing.
    async fn execute_award(
        &self,
        tender_id: Uuid,
        winning_bid_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<AwardOutcome>;

    /// The expiry write: tender `Published → Expired` plus cascade
    /// rejection of pending bids. Returns the number of rejected bids.
    async fn expire_tender(&self, tender_id: Uuid, now: DateTime<Utc>) -> StoreResult<usize>;
}
