//! In-memory store.
//!
//! Default backend when no `DATABASE_URL` is configured; also backs the
//! test suite. A single mutex serializes every operation, which makes the
//! check-and-insert sections (draft uniqueness, withdrawal permanence) and
//! the award/expiry cascades atomic by construction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::bids::{Bid, BidStatus};
use crate::domain::evaluation::EvaluationReport;
use crate::domain::tenders::{Tender, TenderStatus};

use super::{
    AwardOutcome, BidDraftUpdate, BidTransition, ProcurementStore, StoreError, StoreResult,
    TenderPatch, TenderTransition,
};

#[derive(Default)]
struct Inner {
    tenders: HashMap<Uuid, Tender>,
    bids: HashMap<Uuid, Bid>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn apply_bid_transition(bid: &mut Bid, transition: &BidTransition) {
    bid.status = transition.next;
    if transition.submitted_at.is_some() {
        bid.submitted_at = transition.submitted_at;
    }
    if transition.withdrawn_at.is_some() {
        bid.withdrawn_at = transition.withdrawn_at;
        bid.withdrawn_by = transition.withdrawn_by;
    }
    if transition.anomaly_score.is_some() {
        bid.anomaly_score = transition.anomaly_score;
    }
    if let Some(note) = &transition.ai_note {
        bid.ai_notes = Some(match bid.ai_notes.take() {
            Some(existing) => format!("{existing}\n{note}"),
            None => note.clone(),
        });
    }
    bid.updated_at = transition.now;
}

#[async_trait]
impl ProcurementStore for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn insert_tender(&self, tender: Tender) -> StoreResult<Tender> {
        let mut inner = self.inner.lock();
        inner.tenders.insert(tender.id, tender.clone());
        Ok(tender)
    }

    async fn get_tender(&self, id: Uuid) -> StoreResult<Tender> {
        let inner = self.inner.lock();
        inner
            .tenders
            .get(&id)
            .cloned()
            .ok_or(StoreError::TenderNotFound(id))
    }

    async fn update_tender_draft(
        &self,
        id: Uuid,
        patch: TenderPatch,
        now: DateTime<Utc>,
    ) -> StoreResult<Tender> {
        let mut inner = self.inner.lock();
        let tender = inner
            .tenders
            .get_mut(&id)
            .ok_or(StoreError::TenderNotFound(id))?;
        if tender.status != TenderStatus::Draft {
            return Err(StoreError::stale_tender(TenderStatus::Draft, tender.status));
        }
        if let Some(title) = patch.title {
            tender.title = title;
        }
        if let Some(description) = patch.description {
            tender.description = description;
        }
        if let Some(category) = patch.category {
            tender.category = category;
        }
        if let Some(estimated_value) = patch.estimated_value {
            tender.estimated_value = estimated_value;
        }
        if let Some(emd_amount) = patch.emd_amount {
            tender.emd_amount = emd_amount;
        }
        if let Some(threshold) = patch.abnormal_low_threshold_pct {
            tender.abnormal_low_threshold_pct = threshold;
        }
        if patch.start_date.is_some() {
            tender.start_date = patch.start_date;
        }
        if patch.end_date.is_some() {
            tender.end_date = patch.end_date;
        }
        tender.updated_at = now;
        Ok(tender.clone())
    }

    async fn transition_tender(
        &self,
        id: Uuid,
        transition: TenderTransition,
    ) -> StoreResult<Tender> {
        let mut inner = self.inner.lock();
        let tender = inner
            .tenders
            .get_mut(&id)
            .ok_or(StoreError::TenderNotFound(id))?;
        if tender.status != transition.expected {
            return Err(StoreError::stale_tender(transition.expected, tender.status));
        }
        tender.status = transition.next;
        if tender.start_date.is_none() {
            tender.start_date = transition.default_start_date;
        }
        if tender.end_date.is_none() {
            tender.end_date = transition.default_end_date;
        }
        tender.updated_at = transition.now;
        Ok(tender.clone())
    }

    async fn attach_evaluation(&self, id: Uuid, report: EvaluationReport) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        let tender = inner
            .tenders
            .get_mut(&id)
            .ok_or(StoreError::TenderNotFound(id))?;
        tender.evaluation = Some(report);
        Ok(())
    }

    async fn link_bid(&self, tender_id: Uuid, bid_id: Uuid, now: DateTime<Utc>) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        let tender = inner
            .tenders
            .get_mut(&tender_id)
            .ok_or(StoreError::TenderNotFound(tender_id))?;
        if !tender.bid_ids.contains(&bid_id) {
            tender.bid_ids.push(bid_id);
            tender.updated_at = now;
        }
        Ok(())
    }

    async fn list_published_past_end(&self, now: DateTime<Utc>) -> StoreResult<Vec<Tender>> {
        let inner = self.inner.lock();
        Ok(inner
            .tenders
            .values()
            .filter(|t| {
                t.status == TenderStatus::Published && t.end_date.is_some_and(|end| end < now)
            })
            .cloned()
            .collect())
    }

    async fn create_draft_bid(&self, bid: Bid) -> StoreResult<Bid> {
        let mut inner = self.inner.lock();
        for existing in inner.bids.values() {
            if existing.tender_id == bid.tender_id
                && existing.bidder_company_id == bid.bidder_company_id
            {
                match existing.status {
                    BidStatus::Withdrawn => return Err(StoreError::WithdrawnBidExists),
                    BidStatus::Draft => return Err(StoreError::DraftExists),
                    _ => {}
                }
            }
        }
        inner.bids.insert(bid.id, bid.clone());
        Ok(bid)
    }

    async fn get_bid(&self, id: Uuid) -> StoreResult<Bid> {
        let inner = self.inner.lock();
        inner
            .bids
            .get(&id)
            .cloned()
            .ok_or(StoreError::BidNotFound(id))
    }

    async fn list_bids_for_tender(&self, tender_id: Uuid) -> StoreResult<Vec<Bid>> {
        let inner = self.inner.lock();
        let mut bids: Vec<Bid> = inner
            .bids
            .values()
            .filter(|b| b.tender_id == tender_id)
            .cloned()
            .collect();
        // Stable order for the evaluation engine's tie-breaking.
        bids.sort_by_key(|b| b.created_at);
        Ok(bids)
    }

    async fn update_draft_bid(
        &self,
        id: Uuid,
        update: BidDraftUpdate,
        now: DateTime<Utc>,
    ) -> StoreResult<Bid> {
        let mut inner = self.inner.lock();
        let bid = inner.bids.get_mut(&id).ok_or(StoreError::BidNotFound(id))?;
        if bid.status != BidStatus::Draft {
            return Err(StoreError::stale_bid(BidStatus::Draft.to_string(), bid.status));
        }
        if let Some(amount) = update.amount {
            bid.amount = amount;
        }
        if let Some(delivery_days) = update.delivery_days {
            bid.delivery_days = delivery_days;
        }
        if update.emd_proof.is_some() {
            bid.emd_proof = update.emd_proof;
        }
        if let Some(technical) = update.technical_docs {
            bid.technical_docs = technical;
        }
        if let Some(financial) = update.financial_docs {
            bid.financial_docs = financial;
        }
        bid.updated_at = now;
        Ok(bid.clone())
    }

    async fn transition_bid(&self, id: Uuid, transition: BidTransition) -> StoreResult<Bid> {
        let mut inner = self.inner.lock();
        let bid = inner.bids.get_mut(&id).ok_or(StoreError::BidNotFound(id))?;
        if !transition.expected_any.contains(&bid.status) {
            let expected = transition
                .expected_any
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join("|");
            return Err(StoreError::stale_bid(expected, bid.status));
        }
        apply_bid_transition(bid, &transition);
        Ok(bid.clone())
    }

    async fn delete_draft_bid(&self, id: Uuid) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        let bid = inner.bids.get(&id).ok_or(StoreError::BidNotFound(id))?;
        if bid.status != BidStatus::Draft {
            return Err(StoreError::stale_bid(BidStatus::Draft.to_string(), bid.status));
        }
        inner.bids.remove(&id);
        Ok(())
    }

    async fn execute_award(
        &self,
        tender_id: Uuid,
        winning_bid_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<AwardOutcome> {
        let mut inner = self.inner.lock();

        // The tender transition is the race guard; everything after it is
        // applied under the same lock.
        let tender = inner
            .tenders
            .get_mut(&tender_id)
            .ok_or(StoreError::TenderNotFound(tender_id))?;
        if tender.status != TenderStatus::Closed {
            return Err(StoreError::stale_tender(TenderStatus::Closed, tender.status));
        }

        let winner = inner
            .bids
            .get(&winning_bid_id)
            .ok_or(StoreError::BidNotFound(winning_bid_id))?;
        if winner.tender_id != tender_id || !winner.status.is_pending_decision() {
            let actual = winner.status;
            return Err(StoreError::stale_bid("submitted|under_review", actual));
        }

        let tender = inner
            .tenders
            .get_mut(&tender_id)
            .ok_or(StoreError::TenderNotFound(tender_id))?;
        tender.status = TenderStatus::Awarded;
        tender.updated_at = now;
        let tender = tender.clone();

        let mut rejected_count = 0;
        for bid in inner.bids.values_mut() {
            if bid.tender_id != tender_id || !bid.status.is_pending_decision() {
                continue;
            }
            if bid.id == winning_bid_id {
                bid.status = BidStatus::Accepted;
            } else {
                bid.status = BidStatus::Rejected;
                rejected_count += 1;
            }
            bid.updated_at = now;
        }

        let accepted = inner
            .bids
            .get(&winning_bid_id)
            .cloned()
            .ok_or(StoreError::BidNotFound(winning_bid_id))?;
        Ok(AwardOutcome {
            tender,
            accepted,
            rejected_count,
        })
    }

    async fn expire_tender(&self, tender_id: Uuid, now: DateTime<Utc>) -> StoreResult<usize> {
        let mut inner = self.inner.lock();
        let tender = inner
            .tenders
            .get_mut(&tender_id)
            .ok_or(StoreError::TenderNotFound(tender_id))?;
        if tender.status != TenderStatus::Published {
            return Err(StoreError::stale_tender(
                TenderStatus::Published,
                tender.status,
            ));
        }
        tender.status = TenderStatus::Expired;
        if tender.end_date.is_none() {
            tender.end_date = Some(now);
        }
        tender.updated_at = now;

        let mut rejected_count = 0;
        for bid in inner.bids.values_mut() {
            if bid.tender_id == tender_id && bid.status.is_pending_decision() {
                bid.status = BidStatus::Rejected;
                bid.updated_at = now;
                rejected_count += 1;
            }
        }
        Ok(rejected_count)
    }
}
