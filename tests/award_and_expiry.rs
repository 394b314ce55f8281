//! Award atomicity and expiry sweep behavior.

use chrono::{Duration, TimeZone, Utc};
use std::sync::Arc;
use uuid::Uuid;

use tenderflow_backend::auth::{ActorContext, ActorRole};
use tenderflow_backend::clock::ManualClock;
use tenderflow_backend::domain::bids::{
    Bid, BidStatus, CreateBidRequest, DocumentRef, EmdPaymentMode, EmdProof,
};
use tenderflow_backend::domain::tenders::{CreateTenderRequest, Tender, TenderStatus};
use tenderflow_backend::error::ApiError;
use tenderflow_backend::lifecycle::{AwardCoordinator, BidLifecycle, TenderLifecycle};
use tenderflow_backend::store::MemoryStore;

struct Harness {
    clock: Arc<ManualClock>,
    tenders: TenderLifecycle,
    bids: BidLifecycle,
    awards: AwardCoordinator,
    owner: ActorContext,
}

fn actor() -> ActorContext {
    ActorContext {
        user_id: Uuid::new_v4(),
        company_id: Uuid::new_v4(),
        role: ActorRole::Member,
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
        bids: BidLifecycle::new(store.clone(), clock.clone()),
        awards: AwardCoordinator::new(store, clock),
        owner: actor(),
    }
}

fn doc(id: &str) -> DocumentRef {
    DocumentRef {
        url: format!("https://files.example.com/{id}"),
        file_id: id.to_string(),
        name: format!("{id}.pdf"),
    }
}

fn bid_request(amount: f64) -> CreateBidRequest {
    CreateBidRequest {
        amount: Some(amount),
        delivery_days: Some(30),
        technical_docs: vec![doc("tech")],
        financial_docs: vec![doc("fin")],
        emd_proof: Some(EmdProof {
            transaction_id: "TXN-77".to_string(),
            payment_mode: EmdPaymentMode::Online,
            receipt: Some(doc("receipt")),
        }),
    }
}

/// Published tender plus `n` submitted bids from distinct companies.
async fn published_tender_with_bids(h: &Harness, n: usize) -> (Tender, Vec<Bid>) {
    let tender = h
        .tenders
        .create(
            CreateTenderRequest {
                title: "Warehouse racking".to_string(),
                description: "Supply and install pallet racking".to_string(),
                category: "logistics".to_string(),
                estimated_value: Some(100000.0),
                emd_amount: Some(2500.0),
                abnormal_low_threshold_pct: None,
                start_date: None,
                end_date: Some(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()),
            },
            &h.owner,
        )
        .await
        .unwrap();
    h.tenders.publish(tender.id, &h.owner).await.unwrap();

    let mut bids = Vec::new();
    for i in 0..n {
        let bidder = actor();
        let bid = h
            .bids
            .create_draft(tender.id, bid_request(90000.0 + i as f64 * 1000.0), &bidder)
            .await
            .unwrap();
        bids.push(h.bids.submit(bid.id, &bidder).await.unwrap());
    }
    (tender, bids)
}

#[tokio::test]
async fn award_leaves_exactly_one_winner() {
    let h = harness();
    let (tender, bids) = published_tender_with_bids(&h, 3).await;
    h.tenders.close(tender.id, &h.owner).await.unwrap();

    let outcome = h
        .awards
        .award(tender.id, bids[1].id, &h.owner)
        .await
        .unwrap();
    assert_eq!(outcome.tender.status, TenderStatus::Awarded);
    assert_eq!(outcome.accepted.id, bids[1].id);
    assert_eq!(outcome.accepted.status, BidStatus::Accepted);
    assert_eq!(outcome.rejected_count, 2);

    let all = h.bids.list_for_tender(tender.id, &h.owner).await.unwrap();
    let accepted: Vec<&Bid> = all.iter().filter(|b| b.status == BidStatus::Accepted).collect();
    assert_eq!(accepted.len(), 1);
    assert_eq!(accepted[0].id, bids[1].id);
    assert!(all
        .iter()
        .filter(|b| b.id != bids[1].id)
        .all(|b| b.status == BidStatus::Rejected));
}

#[tokio::test]
async fn award_requires_a_closed_tender() {
    let h = harness();
    let (tender, bids) = published_tender_with_bids(&h, 1).await;

    let err = h
        .awards
        .award(tender.id, bids[0].id, &h.owner)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::StateConflict(_)));
}

#[tokio::test]
async fn award_rejects_foreign_bids() {
    let h = harness();
    let (tender_a, _) = published_tender_with_bids(&h, 1).await;
    let (_, bids_b) = published_tender_with_bids(&h, 1).await;
    h.tenders.close(tender_a.id, &h.owner).await.unwrap();

    let err = h
        .awards
        .award(tender_a.id, bids_b[0].id, &h.owner)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));
}

#[tokio::test]
async fn award_is_owner_only() {
    let h = harness();
    let (tender, bids) = published_tender_with_bids(&h, 1).await;
    h.tenders.close(tender.id, &h.owner).await.unwrap();

    let stranger = actor();
    let err = h
        .awards
        .award(tender.id, bids[0].id, &stranger)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Forbidden(_)));
}

#[tokio::test]
async fn awarding_twice_fails_with_a_state_conflict() {
    let h = harness();
    let (tender, bids) = published_tender_with_bids(&h, 2).await;
    h.tenders.close(tender.id, &h.owner).await.unwrap();

    h.awards.award(tender.id, bids[0].id, &h.owner).await.unwrap();
    let err = h
        .awards
        .award(tender.id, bids[1].id, &h.owner)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::StateConflict(_)));
}

#[tokio::test]
async fn concurrent_awards_resolve_to_one_winner() {
    let h = harness();
    let (tender, bids) = published_tender_with_bids(&h, 2).await;
    h.tenders.close(tender.id, &h.owner).await.unwrap();

    let first = h.awards.award(tender.id, bids[0].id, &h.owner);
    let second = h.awards.award(tender.id, bids[1].id, &h.owner);
    let (r1, r2) = tokio::join!(first, second);

    // Exactly one call wins the conditional tender write.
    assert_eq!(r1.is_ok() as u8 + r2.is_ok() as u8, 1);
    let loser = if r1.is_ok() { r2 } else { r1 };
    assert!(matches!(loser.unwrap_err(), ApiError::StateConflict(_)));

    let all = h.bids.list_for_tender(tender.id, &h.owner).await.unwrap();
    assert_eq!(
        all.iter().filter(|b| b.status == BidStatus::Accepted).count(),
        1
    );
    let tender = h.tenders.get(tender.id, &h.owner).await.unwrap();
    assert_eq!(tender.status, TenderStatus::Awarded);
}

#[tokio::test]
async fn expiry_sweep_expires_due_tenders_and_rejects_pending_bids() {
    let h = harness();
    let (tender, bids) = published_tender_with_bids(&h, 1).await;

    // Not yet due: nothing happens.
    assert_eq!(h.tenders.run_expiry_pass().await.unwrap(), 0);

    h.clock
        .set(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 1).unwrap());
    assert_eq!(h.tenders.run_expiry_pass().await.unwrap(), 1);

    let tender = h.tenders.get(tender.id, &h.owner).await.unwrap();
    assert_eq!(tender.status, TenderStatus::Expired);
    let bid = h.bids.get(bids[0].id, &h.owner).await.unwrap();
    assert_eq!(bid.status, BidStatus::Rejected);

    // A second pass finds nothing left to do.
    assert_eq!(h.tenders.run_expiry_pass().await.unwrap(), 0);
}

#[tokio::test]
async fn expired_tenders_cannot_be_awarded() {
    let h = harness();
    let (tender, bids) = published_tender_with_bids(&h, 1).await;
    h.clock
        .set(Utc.with_ymd_and_hms(2024, 6, 2, 0, 0, 0).unwrap());
    h.tenders.run_expiry_pass().await.unwrap();

    let err = h
        .awards
        .award(tender.id, bids[0].id, &h.owner)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::StateConflict(_)));
}

#[tokio::test]
async fn closing_does_not_reject_submitted_bids() {
    // Cascade rejection happens at award time; closing only stops new
    // submissions.
    let h = harness();
    let (tender, bids) = published_tender_with_bids(&h, 2).await;
    h.tenders.close(tender.id, &h.owner).await.unwrap();

    for bid in &bids {
        let current = h.bids.get(bid.id, &h.owner).await.unwrap();
        assert_eq!(current.status, BidStatus::Submitted);
    }
}

#[tokio::test]
async fn withdrawn_bids_survive_the_award_cascade() {
    let h = harness();
    let (tender, bids) = published_tender_with_bids(&h, 3).await;

    // One bidder pulls out before the close.
    let withdrawer = ActorContext {
        user_id: Uuid::new_v4(),
        company_id: bids[2].bidder_company_id,
        role: ActorRole::Member,
    };
    h.bids.withdraw(bids[2].id, &withdrawer).await.unwrap();

    h.tenders.close(tender.id, &h.owner).await.unwrap();
    let outcome = h
        .awards
        .award(tender.id, bids[0].id, &h.owner)
        .await
        .unwrap();
    assert_eq!(outcome.rejected_count, 1);

    let withdrawn = h.bids.get(bids[2].id, &h.owner).await.unwrap();
    assert_eq!(withdrawn.status, BidStatus::Withdrawn);
}

#[tokio::test]
async fn expiry_respects_manual_close_races() {
    let h = harness();
    let (tender, _) = published_tender_with_bids(&h, 1).await;

    // Owner closes manually just before the sweep fires.
    h.clock
        .set(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 1).unwrap());
    h.tenders.close(tender.id, &h.owner).await.unwrap();

    // The sweep's snapshot may still contain the tender, but the
    // conditional write skips it without error.
    assert_eq!(h.tenders.run_expiry_pass().await.unwrap(), 0);
    let tender = h.tenders.get(tender.id, &h.owner).await.unwrap();
    assert_eq!(tender.status, TenderStatus::Closed);

    h.clock
        .set(Utc.with_ymd_and_hms(2024, 6, 1, 1, 0, 1).unwrap() + Duration::hours(1));
    assert_eq!(h.tenders.run_expiry_pass().await.unwrap(), 0);
}
