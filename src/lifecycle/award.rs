//! Award coordinator.
//!
//! The only path to an accepted bid. Validation happens up front; the
//! store then executes the paired writes, with the conditional
//! closed -> awarded tender transition as the race guard. Two concurrent
//! award calls on the same tender resolve to exactly one winner; the loser
//! observes a state conflict.

use std::sync::Arc;
use uuid::Uuid;

use crate::auth::ActorContext;
use crate::clock::SharedClock;
use crate::domain::tenders::TenderStatus;
use crate::error::{ApiError, ApiResult};
use crate::store::{AwardOutcome, ProcurementStore};

#[derive(Clone)]
pub struct AwardCoordinator {
    store: Arc<dyn ProcurementStore>,
    clock: SharedClock,
}

impl AwardCoordinator {
    pub fn new(store: Arc<dyn ProcurementStore>, clock: SharedClock) -> Self {
        Self { store, clock }
    }

    pub async fn award(
        &self,
        tender_id: Uuid,
        winning_bid_id: Uuid,
        actor: &ActorContext,
    ) -> ApiResult<AwardOutcome> {
        let tender = self.store.get_tender(tender_id).await?;
        if !tender.is_owned_by_company(actor.company_id) && !actor.is_admin() {
            return Err(ApiError::forbidden(
                "Only the owning company can award this tender",
            ));
        }
        if tender.status != TenderStatus::Closed {
            return Err(ApiError::state_conflict(format!(
                "Tender must be closed before awarding (currently {})",
                tender.status
            )));
        }

        let winner = self.store.get_bid(winning_bid_id).await?;
        if winner.tender_id != tender_id {
            return Err(ApiError::validation(
                "winning_bid_id does not belong to this tender",
            ));
        }
        if !winner.status.is_pending_decision() {
            return Err(ApiError::state_conflict(format!(
                "Winning bid must be awaiting a decision (currently {})",
                winner.status
            )));
        }

        // The store re-checks both statuses conditionally; a lost race
        // surfaces as a stale-state error, never a double award.
        let outcome = self
            .store
            .execute_award(tender_id, winning_bid_id, self.clock.now())
            .await?;

        tracing::info!(
            tender_id = %tender_id,
            winning_bid_id = %winning_bid_id,
            rejected_bids = outcome.rejected_count,
            "Tender awarded"
        );
        Ok(outcome)
    }
}
