//! Lifecycle workflow tests over the in-memory store.

use chrono::{Duration, TimeZone, Utc};
use std::sync::Arc;
use uuid::Uuid;

use tenderflow_backend::auth::{ActorContext, ActorRole};
use tenderflow_backend::clock::ManualClock;
use tenderflow_backend::domain::bids::{
    BidStatus, CreateBidRequest, DocumentRef, EmdPaymentMode, EmdProof, UpdateBidRequest,
};
use tenderflow_backend::domain::tenders::{CreateTenderRequest, TenderStatus, UpdateTenderRequest};
use tenderflow_backend::error::ApiError;
use tenderflow_backend::lifecycle::{BidLifecycle, TenderLifecycle};
use tenderflow_backend::store::MemoryStore;

struct Harness {
    clock: Arc<ManualClock>,
    tenders: TenderLifecycle,
    bids: BidLifecycle,
    owner: ActorContext,
    bidder: ActorContext,
}

fn actor(role: ActorRole) -> ActorContext {
    ActorContext {
        user_id: Uuid::new_v4(),
        company_id: Uuid::new_v4(),
        role,
    }
}

fn harness() -> Harness {
    let clock = Arc::new(ManualClock::fixed(
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
    ));
    let store = Arc::new(MemoryStore::new());
    Harness {
        clock: clock.clone(),
        tenders: TenderLifecycle::new(store.clone(), clock.clone()),
        bids: BidLifecycle::new(store, clock),
        owner: actor(ActorRole::Member),
        bidder: actor(ActorRole::Member),
    }
}

fn tender_request(estimated_value: f64) -> CreateTenderRequest {
    CreateTenderRequest {
        title: "Office fit-out".to_string(),
        description: "Furniture and partitioning for the new office".to_string(),
        category: "interiors".to_string(),
        estimated_value: Some(estimated_value),
        emd_amount: Some(5000.0),
        abnormal_low_threshold_pct: None,
        start_date: None,
        end_date: Some(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()),
    }
}

fn doc(id: &str) -> DocumentRef {
    DocumentRef {
        url: format!("https://files.example.com/{id}"),
        file_id: id.to_string(),
        name: format!("{id}.pdf"),
    }
}

fn emd() -> EmdProof {
    EmdProof {
        transaction_id: "TXN-1042".to_string(),
        payment_mode: EmdPaymentMode::BankTransfer,
        receipt: Some(doc("emd-receipt")),
    }
}

fn complete_bid_request(amount: f64) -> CreateBidRequest {
    CreateBidRequest {
        amount: Some(amount),
        delivery_days: Some(30),
        technical_docs: vec![doc("tech")],
        financial_docs: vec![doc("fin")],
        emd_proof: Some(emd()),
    }
}

#[tokio::test]
async fn tender_statuses_advance_forward_only() {
    let h = harness();
    let tender = h
        .tenders
        .create(tender_request(100000.0), &h.owner)
        .await
        .unwrap();
    assert_eq!(tender.status, TenderStatus::Draft);

    let published = h.tenders.publish(tender.id, &h.owner).await.unwrap();
    assert_eq!(published.status, TenderStatus::Published);
    assert!(published.start_date.is_some());

    // No skipping and no going back.
    let err = h.tenders.publish(tender.id, &h.owner).await.unwrap_err();
    assert!(matches!(err, ApiError::StateConflict(_)));

    let closed = h.tenders.close(tender.id, &h.owner).await.unwrap();
    assert_eq!(closed.status, TenderStatus::Closed);

    let err = h.tenders.close(tender.id, &h.owner).await.unwrap_err();
    assert!(matches!(err, ApiError::StateConflict(_)));
}

#[tokio::test]
async fn publish_requires_an_end_date_in_the_future() {
    let h = harness();
    let mut req = tender_request(100000.0);
    req.end_date = None;
    let tender = h.tenders.create(req, &h.owner).await.unwrap();

    let err = h.tenders.publish(tender.id, &h.owner).await.unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));

    // Deadline in the past is equally unusable.
    let patch = UpdateTenderRequest {
        end_date: Some(Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap()),
        ..Default::default()
    };
    h.tenders.update(tender.id, patch, &h.owner).await.unwrap();
    let err = h.tenders.publish(tender.id, &h.owner).await.unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));
}

#[tokio::test]
async fn only_the_owner_can_publish_or_update() {
    let h = harness();
    let tender = h
        .tenders
        .create(tender_request(100000.0), &h.owner)
        .await
        .unwrap();

    let err = h.tenders.publish(tender.id, &h.bidder).await.unwrap_err();
    assert!(matches!(err, ApiError::Forbidden(_)));

    let err = h
        .tenders
        .update(tender.id, UpdateTenderRequest::default(), &h.bidder)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Forbidden(_)));
}

#[tokio::test]
async fn published_tenders_reject_field_updates() {
    let h = harness();
    let tender = h
        .tenders
        .create(tender_request(100000.0), &h.owner)
        .await
        .unwrap();
    h.tenders.publish(tender.id, &h.owner).await.unwrap();

    let patch = UpdateTenderRequest {
        title: Some("Changed".to_string()),
        ..Default::default()
    };
    let err = h.tenders.update(tender.id, patch, &h.owner).await.unwrap_err();
    assert!(matches!(err, ApiError::StateConflict(_)));
}

#[tokio::test]
async fn draft_bids_require_a_published_tender() {
    let h = harness();
    let tender = h
        .tenders
        .create(tender_request(100000.0), &h.owner)
        .await
        .unwrap();

    let err = h
        .bids
        .create_draft(tender.id, complete_bid_request(90000.0), &h.bidder)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::StateConflict(_)));
}

#[tokio::test]
async fn owners_cannot_bid_on_their_own_tender() {
    let h = harness();
    let tender = h
        .tenders
        .create(tender_request(100000.0), &h.owner)
        .await
        .unwrap();
    h.tenders.publish(tender.id, &h.owner).await.unwrap();

    let err = h
        .bids
        .create_draft(tender.id, complete_bid_request(90000.0), &h.owner)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));
}

#[tokio::test]
async fn one_draft_per_company_per_tender() {
    let h = harness();
    let tender = h
        .tenders
        .create(tender_request(100000.0), &h.owner)
        .await
        .unwrap();
    h.tenders.publish(tender.id, &h.owner).await.unwrap();

    h.bids
        .create_draft(tender.id, complete_bid_request(90000.0), &h.bidder)
        .await
        .unwrap();
    let err = h
        .bids
        .create_draft(tender.id, complete_bid_request(80000.0), &h.bidder)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::StateConflict(_)));
}

#[tokio::test]
async fn withdrawal_disqualifies_permanently() {
    let h = harness();
    let tender = h
        .tenders
        .create(tender_request(100000.0), &h.owner)
        .await
        .unwrap();
    h.tenders.publish(tender.id, &h.owner).await.unwrap();

    let bid = h
        .bids
        .create_draft(tender.id, complete_bid_request(90000.0), &h.bidder)
        .await
        .unwrap();
    h.bids.submit(bid.id, &h.bidder).await.unwrap();
    let withdrawn = h.bids.withdraw(bid.id, &h.bidder).await.unwrap();
    assert_eq!(withdrawn.status, BidStatus::Withdrawn);
    assert!(withdrawn.withdrawn_at.is_some());

    // Re-creation fails forever, however often it is retried.
    for _ in 0..3 {
        let err = h
            .bids
            .create_draft(tender.id, complete_bid_request(85000.0), &h.bidder)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Eligibility(_)));
    }

    // Withdrawing again is also refused.
    let err = h.bids.withdraw(bid.id, &h.bidder).await.unwrap_err();
    assert!(matches!(err, ApiError::StateConflict(_)));
}

#[tokio::test]
async fn deleting_a_draft_does_not_disqualify() {
    let h = harness();
    let tender = h
        .tenders
        .create(tender_request(100000.0), &h.owner)
        .await
        .unwrap();
    h.tenders.publish(tender.id, &h.owner).await.unwrap();

    let bid = h
        .bids
        .create_draft(tender.id, complete_bid_request(90000.0), &h.bidder)
        .await
        .unwrap();
    h.bids.delete_draft(bid.id, &h.bidder).await.unwrap();

    // A fresh draft is fine after deletion.
    h.bids
        .create_draft(tender.id, complete_bid_request(88000.0), &h.bidder)
        .await
        .unwrap();
}

#[tokio::test]
async fn submitted_bids_cannot_be_deleted() {
    let h = harness();
    let tender = h
        .tenders
        .create(tender_request(100000.0), &h.owner)
        .await
        .unwrap();
    h.tenders.publish(tender.id, &h.owner).await.unwrap();

    let bid = h
        .bids
        .create_draft(tender.id, complete_bid_request(90000.0), &h.bidder)
        .await
        .unwrap();
    h.bids.submit(bid.id, &h.bidder).await.unwrap();

    let err = h.bids.delete_draft(bid.id, &h.bidder).await.unwrap_err();
    assert!(matches!(err, ApiError::StateConflict(_)));
}

#[tokio::test]
async fn submit_applies_full_field_validation() {
    let h = harness();
    let tender = h
        .tenders
        .create(tender_request(100000.0), &h.owner)
        .await
        .unwrap();
    h.tenders.publish(tender.id, &h.owner).await.unwrap();

    // Missing financial envelope.
    let mut req = complete_bid_request(90000.0);
    req.financial_docs.clear();
    let bid = h.bids.create_draft(tender.id, req, &h.bidder).await.unwrap();
    let err = h.bids.submit(bid.id, &h.bidder).await.unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));

    // Add the envelope but drop the EMD receipt.
    let patch = UpdateBidRequest {
        new_financial: vec![doc("fin")],
        emd_proof: Some(EmdProof {
            transaction_id: "TXN-1042".to_string(),
            payment_mode: EmdPaymentMode::BankTransfer,
            receipt: None,
        }),
        ..Default::default()
    };
    h.bids.update_draft(bid.id, patch, &h.bidder).await.unwrap();
    let err = h.bids.submit(bid.id, &h.bidder).await.unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));

    // Complete the bid and it goes through.
    let patch = UpdateBidRequest {
        emd_proof: Some(emd()),
        ..Default::default()
    };
    h.bids.update_draft(bid.id, patch, &h.bidder).await.unwrap();
    let submitted = h.bids.submit(bid.id, &h.bidder).await.unwrap();
    assert_eq!(submitted.status, BidStatus::Submitted);
    assert!(submitted.submitted_at.is_some());
    assert!(submitted.anomaly_score.is_none());

    // Submission linked the bid back onto the tender.
    let tender = h.tenders.get(tender.id, &h.owner).await.unwrap();
    assert_eq!(tender.bid_ids, vec![bid.id]);
}

#[tokio::test]
async fn deeply_underpriced_bids_are_flagged_at_submission() {
    let h = harness();
    let tender = h
        .tenders
        .create(tender_request(100000.0), &h.owner)
        .await
        .unwrap();
    h.tenders.publish(tender.id, &h.owner).await.unwrap();

    // 65000 < 0.7 * 100000
    let bid = h
        .bids
        .create_draft(tender.id, complete_bid_request(65000.0), &h.bidder)
        .await
        .unwrap();
    let submitted = h.bids.submit(bid.id, &h.bidder).await.unwrap();
    assert_eq!(submitted.anomaly_score, Some(85.0));
    assert!(submitted.ai_notes.is_some());
}

#[tokio::test]
async fn document_reconciliation_is_keep_plus_new() {
    let h = harness();
    let tender = h
        .tenders
        .create(tender_request(100000.0), &h.owner)
        .await
        .unwrap();
    h.tenders.publish(tender.id, &h.owner).await.unwrap();

    let mut req = complete_bid_request(90000.0);
    req.technical_docs = vec![doc("spec-a"), doc("spec-b")];
    let bid = h.bids.create_draft(tender.id, req, &h.bidder).await.unwrap();

    let patch = UpdateBidRequest {
        keep_technical: Some(vec!["spec-b".to_string()]),
        new_technical: vec![doc("spec-c")],
        ..Default::default()
    };
    let updated = h.bids.update_draft(bid.id, patch, &h.bidder).await.unwrap();
    let ids: Vec<&str> = updated
        .technical_docs
        .iter()
        .map(|d| d.file_id.as_str())
        .collect();
    assert_eq!(ids, vec!["spec-b", "spec-c"]);
    // The untouched envelope kept its documents.
    assert_eq!(updated.financial_docs.len(), 1);
}

#[tokio::test]
async fn pre_submit_review_lists_missing_requirements() {
    let h = harness();
    let tender = h
        .tenders
        .create(tender_request(100000.0), &h.owner)
        .await
        .unwrap();
    h.tenders.publish(tender.id, &h.owner).await.unwrap();

    let req = CreateBidRequest {
        amount: Some(50000.0),
        delivery_days: None,
        technical_docs: vec![doc("tech")],
        financial_docs: Vec::new(),
        emd_proof: None,
    };
    let bid = h.bids.create_draft(tender.id, req, &h.bidder).await.unwrap();
    let report = h.bids.pre_submit_review(bid.id, &h.bidder).await.unwrap();

    assert!(!report.ready);
    let unsatisfied: Vec<&str> = report
        .checklist
        .iter()
        .filter(|i| !i.satisfied)
        .map(|i| i.requirement.as_str())
        .collect();
    assert_eq!(unsatisfied.len(), 3); // delivery, financial envelope, EMD
    // 50000 is below 70% of the estimate, so the advisory warns about it.
    assert!(report
        .advisories
        .iter()
        .any(|a| a.contains("below the tender estimate")));

    // Review never mutates.
    let bid_after = h.bids.get(bid.id, &h.bidder).await.unwrap();
    assert_eq!(bid_after.status, BidStatus::Draft);
    assert!(bid_after.anomaly_score.is_none());
}

#[tokio::test]
async fn owner_can_hold_and_reject_submitted_bids() {
    let h = harness();
    let tender = h
        .tenders
        .create(tender_request(100000.0), &h.owner)
        .await
        .unwrap();
    h.tenders.publish(tender.id, &h.owner).await.unwrap();

    let bid = h
        .bids
        .create_draft(tender.id, complete_bid_request(90000.0), &h.bidder)
        .await
        .unwrap();
    h.bids.submit(bid.id, &h.bidder).await.unwrap();

    // The bidder has no administrative powers over its own bid.
    let err = h.bids.reject(bid.id, &h.bidder).await.unwrap_err();
    assert!(matches!(err, ApiError::Forbidden(_)));

    let held = h.bids.hold_under_review(bid.id, &h.owner).await.unwrap();
    assert_eq!(held.status, BidStatus::UnderReview);

    let rejected = h.bids.reject(bid.id, &h.owner).await.unwrap();
    assert_eq!(rejected.status, BidStatus::Rejected);
}

#[tokio::test]
async fn clock_is_injected_not_ambient() {
    let h = harness();
    let tender = h
        .tenders
        .create(tender_request(100000.0), &h.owner)
        .await
        .unwrap();
    let created_at = tender.created_at;
    assert_eq!(created_at, Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap());

    h.clock.set(created_at + Duration::hours(2));
    let published = h.tenders.publish(tender.id, &h.owner).await.unwrap();
    assert_eq!(published.start_date, Some(created_at + Duration::hours(2)));
}
