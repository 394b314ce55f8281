//! Bid lifecycle manager.
//!
//! Draft creation, editing and submission are constrained by the parent
//! tender's state; withdrawal permanently disqualifies the company from the
//! tender. Acceptance is reachable only through the award coordinator.

use std::sync::Arc;
use url::Url;
use uuid::Uuid;

use crate::auth::ActorContext;
use crate::clock::SharedClock;
use crate::domain::bids::{
    Bid, BidStatus, ChecklistItem, CreateBidRequest, DocumentRef, ReadinessReport,
    UpdateBidRequest,
};
use crate::domain::tenders::{Tender, TenderStatus};
use crate::error::{ApiError, ApiResult};
use crate::store::{BidDraftUpdate, BidTransition, ProcurementStore};

/// Bids priced below this fraction of the tender estimate are stamped with
/// an anomaly score at submission.
const ANOMALY_PRICE_FACTOR: f64 = 0.7;
const ANOMALY_SCORE: f64 = 85.0;

#[derive(Clone)]
pub struct BidLifecycle {
    store: Arc<dyn ProcurementStore>,
    clock: SharedClock,
}

impl BidLifecycle {
    pub fn new(store: Arc<dyn ProcurementStore>, clock: SharedClock) -> Self {
        Self { store, clock }
    }

    fn require_bid_owner(bid: &Bid, actor: &ActorContext) -> ApiResult<()> {
        if bid.bidder_company_id == actor.company_id {
            Ok(())
        } else {
            Err(ApiError::forbidden(
                "Only the bidding company can manage this bid",
            ))
        }
    }

    fn require_tender_admin(tender: &Tender, actor: &ActorContext) -> ApiResult<()> {
        if tender.is_owned_by_company(actor.company_id) || actor.is_admin() {
            Ok(())
        } else {
            Err(ApiError::forbidden(
                "Only the tender's owning company can administer its bids",
            ))
        }
    }

    fn require_open_tender(tender: &Tender) -> ApiResult<()> {
        if tender.is_open_for_bidding() {
            Ok(())
        } else {
            Err(ApiError::state_conflict(format!(
                "Tender is not open for bidding (currently {})",
                tender.status
            )))
        }
    }

    fn validate_docs(docs: &[DocumentRef]) -> ApiResult<()> {
        for doc in docs {
            if Url::parse(&doc.url).is_err() {
                return Err(ApiError::validation(format!(
                    "Document '{}' has an invalid url",
                    doc.name
                )));
            }
            if doc.file_id.trim().is_empty() {
                return Err(ApiError::validation(format!(
                    "Document '{}' is missing its file id",
                    doc.name
                )));
            }
        }
        Ok(())
    }

    pub async fn create_draft(
        &self,
        tender_id: Uuid,
        req: CreateBidRequest,
        actor: &ActorContext,
    ) -> ApiResult<Bid> {
        let tender = self.store.get_tender(tender_id).await?;
        Self::require_open_tender(&tender)?;
        if tender.is_owned_by_company(actor.company_id) {
            return Err(ApiError::validation(
                "A company cannot bid on its own tender",
            ));
        }
        if req.amount.is_some_and(|a| a < 0.0) {
            return Err(ApiError::validation("amount must not be negative"));
        }
        Self::validate_docs(&req.technical_docs)?;
        Self::validate_docs(&req.financial_docs)?;

        let now = self.clock.now();
        let bid = Bid {
            id: Uuid::new_v4(),
            tender_id,
            bidder_company_id: actor.company_id,
            submitted_by: actor.user_id,
            amount: req.amount.unwrap_or(0.0),
            delivery_days: req.delivery_days.unwrap_or(0),
            status: BidStatus::Draft,
            technical_docs: req.technical_docs,
            financial_docs: req.financial_docs,
            emd_proof: req.emd_proof,
            anomaly_score: None,
            ai_notes: None,
            submitted_at: None,
            withdrawn_at: None,
            withdrawn_by: None,
            created_at: now,
            updated_at: now,
        };

        tracing::info!(
            bid_id = %bid.id,
            tender_id = %tender_id,
            company_id = %actor.company_id,
            "Creating draft bid"
        );
        // Eligibility (withdrawal permanence) and per-pair draft uniqueness
        // are enforced atomically inside the store.
        Ok(self.store.create_draft_bid(bid).await?)
    }

    /// Visible to the bidding company and to the tender's owning company.
    pub async fn get(&self, bid_id: Uuid, actor: &ActorContext) -> ApiResult<Bid> {
        let bid = self.store.get_bid(bid_id).await?;
        if bid.bidder_company_id == actor.company_id || actor.is_admin() {
            return Ok(bid);
        }
        let tender = self.store.get_tender(bid.tender_id).await?;
        if tender.is_owned_by_company(actor.company_id) {
            Ok(bid)
        } else {
            Err(ApiError::not_found(format!("Bid {bid_id} not found")))
        }
    }

    pub async fn list_for_tender(&self, tender_id: Uuid, actor: &ActorContext) -> ApiResult<Vec<Bid>> {
        let tender = self.store.get_tender(tender_id).await?;
        Self::require_tender_admin(&tender, actor)?;
        Ok(self.store.list_bids_for_tender(tender_id).await?)
    }

    pub async fn update_draft(
        &self,
        bid_id: Uuid,
        req: UpdateBidRequest,
        actor: &ActorContext,
    ) -> ApiResult<Bid> {
        let bid = self.store.get_bid(bid_id).await?;
        Self::require_bid_owner(&bid, actor)?;
        let tender = self.store.get_tender(bid.tender_id).await?;
        Self::require_open_tender(&tender)?;
        if bid.status != BidStatus::Draft {
            return Err(ApiError::state_conflict(format!(
                "Only draft bids can be edited (currently {})",
                bid.status
            )));
        }
        if req.amount.is_some_and(|a| a < 0.0) {
            return Err(ApiError::validation("amount must not be negative"));
        }
        Self::validate_docs(&req.new_technical)?;
        Self::validate_docs(&req.new_financial)?;

        let technical = reconcile_documents(
            &bid.technical_docs,
            req.keep_technical.as_deref(),
            req.new_technical,
        );
        let financial = reconcile_documents(
            &bid.financial_docs,
            req.keep_financial.as_deref(),
            req.new_financial,
        );

        let update = BidDraftUpdate {
            amount: req.amount,
            delivery_days: req.delivery_days,
            emd_proof: req.emd_proof,
            technical_docs: Some(technical),
            financial_docs: Some(financial),
        };
        Ok(self
            .store
            .update_draft_bid(bid_id, update, self.clock.now())
            .await?)
    }

    /// Readiness checklist for the submit call. Advisory only.
    pub async fn pre_submit_review(
        &self,
        bid_id: Uuid,
        actor: &ActorContext,
    ) -> ApiResult<ReadinessReport> {
        let bid = self.store.get_bid(bid_id).await?;
        Self::require_bid_owner(&bid, actor)?;
        let tender = self.store.get_tender(bid.tender_id).await?;

        let checklist = vec![
            ChecklistItem {
                requirement: "Bid amount greater than zero".to_string(),
                satisfied: bid.amount > 0.0,
            },
            ChecklistItem {
                requirement: "Delivery period of at least one day".to_string(),
                satisfied: bid.delivery_days >= 1,
            },
            ChecklistItem {
                requirement: "Technical envelope contains at least one document".to_string(),
                satisfied: !bid.technical_docs.is_empty(),
            },
            ChecklistItem {
                requirement: "Financial envelope contains at least one document".to_string(),
                satisfied: !bid.financial_docs.is_empty(),
            },
            ChecklistItem {
                requirement: "EMD payment proof with receipt attached".to_string(),
                satisfied: bid.has_emd_receipt(),
            },
        ];

        let mut advisories = Vec::new();
        if bid.status != BidStatus::Draft {
            advisories.push(format!(
                "Bid is {}; only draft bids can be submitted",
                bid.status
            ));
        }
        if !tender.is_open_for_bidding() {
            advisories.push(format!(
                "Tender is {}; submissions are not being accepted",
                tender.status
            ));
        }
        if tender.estimated_value > 0.0 && bid.amount > 0.0
            && bid.amount < ANOMALY_PRICE_FACTOR * tender.estimated_value
        {
            advisories.push(
                "Bid amount is far below the tender estimate and will be flagged for review"
                    .to_string(),
            );
        }

        let ready = checklist.iter().all(|item| item.satisfied)
            && bid.status == BidStatus::Draft
            && tender.is_open_for_bidding();

        Ok(ReadinessReport {
            bid_id,
            ready,
            checklist,
            advisories,
        })
    }

    pub async fn submit(&self, bid_id: Uuid, actor: &ActorContext) -> ApiResult<Bid> {
        let bid = self.store.get_bid(bid_id).await?;
        Self::require_bid_owner(&bid, actor)?;
        let tender = self.store.get_tender(bid.tender_id).await?;
        Self::require_open_tender(&tender)?;
        if bid.status != BidStatus::Draft {
            return Err(ApiError::state_conflict(format!(
                "Only draft bids can be submitted (currently {})",
                bid.status
            )));
        }

        // Full-field validation; drafts get away with less.
        if bid.amount <= 0.0 {
            return Err(ApiError::validation("amount must be greater than zero"));
        }
        if bid.delivery_days < 1 {
            return Err(ApiError::validation("delivery_days must be at least 1"));
        }
        if bid.technical_docs.is_empty() {
            return Err(ApiError::validation(
                "technical envelope must contain at least one document",
            ));
        }
        if bid.financial_docs.is_empty() {
            return Err(ApiError::validation(
                "financial envelope must contain at least one document",
            ));
        }
        if !bid.has_emd_receipt() {
            return Err(ApiError::validation(
                "EMD payment proof with receipt is required",
            ));
        }

        let now = self.clock.now();
        let mut transition = BidTransition::new(
            vec![BidStatus::Draft],
            BidStatus::Submitted,
            now,
        );
        transition.submitted_at = Some(now);
        if tender.estimated_value > 0.0
            && bid.amount < ANOMALY_PRICE_FACTOR * tender.estimated_value
        {
            transition.anomaly_score = Some(ANOMALY_SCORE);
            transition.ai_note = Some(
                "Flagged at submission: bid amount is more than 30% below the tender estimate"
                    .to_string(),
            );
        }

        let submitted = self.store.transition_bid(bid_id, transition).await?;
        self.store.link_bid(bid.tender_id, bid_id, now).await?;

        tracing::info!(
            bid_id = %bid_id,
            tender_id = %bid.tender_id,
            anomaly = submitted.anomaly_score.is_some(),
            "Bid submitted"
        );
        Ok(submitted)
    }

    /// Permanent: the company can never bid on this tender again.
    pub async fn withdraw(&self, bid_id: Uuid, actor: &ActorContext) -> ApiResult<Bid> {
        let bid = self.store.get_bid(bid_id).await?;
        Self::require_bid_owner(&bid, actor)?;

        let now = self.clock.now();
        let mut transition = BidTransition::new(
            vec![
                BidStatus::Draft,
                BidStatus::Submitted,
                BidStatus::UnderReview,
                BidStatus::Accepted,
                BidStatus::Rejected,
            ],
            BidStatus::Withdrawn,
            now,
        );
        transition.withdrawn_at = Some(now);
        transition.withdrawn_by = Some(actor.user_id);

        let withdrawn = self.store.transition_bid(bid_id, transition).await?;
        tracing::info!(
            bid_id = %bid_id,
            tender_id = %bid.tender_id,
            company_id = %bid.bidder_company_id,
            "Bid withdrawn; company permanently disqualified from this tender"
        );
        Ok(withdrawn)
    }

    /// Drafts are deleted, not withdrawn; deletion does not disqualify.
    pub async fn delete_draft(&self, bid_id: Uuid, actor: &ActorContext) -> ApiResult<()> {
        let bid = self.store.get_bid(bid_id).await?;
        Self::require_bid_owner(&bid, actor)?;
        let tender = self.store.get_tender(bid.tender_id).await?;
        Self::require_open_tender(&tender)?;
        if bid.status != BidStatus::Draft {
            return Err(ApiError::state_conflict(
                "A submitted bid must be withdrawn, not deleted",
            ));
        }
        self.store.delete_draft_bid(bid_id).await?;
        Ok(())
    }

    /// Administrative rejection by the tender owner.
    pub async fn reject(&self, bid_id: Uuid, actor: &ActorContext) -> ApiResult<Bid> {
        let bid = self.store.get_bid(bid_id).await?;
        let tender = self.store.get_tender(bid.tender_id).await?;
        Self::require_tender_admin(&tender, actor)?;
        if !matches!(tender.status, TenderStatus::Published | TenderStatus::Closed) {
            return Err(ApiError::state_conflict(format!(
                "Bids cannot be rejected while the tender is {}",
                tender.status
            )));
        }

        let transition = BidTransition::new(
            vec![BidStatus::Submitted, BidStatus::UnderReview],
            BidStatus::Rejected,
            self.clock.now(),
        );
        Ok(self.store.transition_bid(bid_id, transition).await?)
    }

    /// Administrative hold while the owner examines a submission.
    pub async fn hold_under_review(&self, bid_id: Uuid, actor: &ActorContext) -> ApiResult<Bid> {
        let bid = self.store.get_bid(bid_id).await?;
        let tender = self.store.get_tender(bid.tender_id).await?;
        Self::require_tender_admin(&tender, actor)?;

        let transition = BidTransition::new(
            vec![BidStatus::Submitted],
            BidStatus::UnderReview,
            self.clock.now(),
        );
        Ok(self.store.transition_bid(bid_id, transition).await?)
    }
}

/// Applies the client-directed keep list, then appends new uploads that are
/// not already present. `None` keeps everything stored.
fn reconcile_documents(
    stored: &[DocumentRef],
    keep: Option<&[String]>,
    new_docs: Vec<DocumentRef>,
) -> Vec<DocumentRef> {
    let mut result: Vec<DocumentRef> = match keep {
        Some(keep_ids) => stored
            .iter()
            .filter(|doc| keep_ids.contains(&doc.file_id))
            .cloned()
            .collect(),
        None => stored.to_vec(),
    };
    for doc in new_docs {
        if !result.iter().any(|existing| existing.file_id == doc.file_id) {
            result.push(doc);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str) -> DocumentRef {
        DocumentRef {
            url: format!("https://files.example.com/{id}"),
            file_id: id.to_string(),
            name: format!("{id}.pdf"),
        }
    }

    #[test]
    fn keep_list_drops_unlisted_documents() {
        let stored = vec![doc("a"), doc("b"), doc("c")];
        let kept = reconcile_documents(&stored, Some(&["a".to_string(), "c".to_string()]), vec![]);
        assert_eq!(
            kept.iter().map(|d| d.file_id.as_str()).collect::<Vec<_>>(),
            vec!["a", "c"]
        );
    }

    #[test]
    fn missing_keep_list_keeps_everything() {
        let stored = vec![doc("a"), doc("b")];
        let kept = reconcile_documents(&stored, None, vec![doc("c")]);
        assert_eq!(kept.len(), 3);
    }

    #[test]
    fn new_documents_do_not_duplicate_kept_ones() {
        let stored = vec![doc("a")];
        let kept = reconcile_documents(&stored, Some(&["a".to_string()]), vec![doc("a"), doc("b")]);
        assert_eq!(kept.len(), 2);
    }
}
