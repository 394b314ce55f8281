//! Tender lifecycle manager.
//!
//! Forward-only state graph: draft -> published -> closed -> awarded, with
//! the time-based published -> expired branch driven by the expiry sweep.

use std::sync::Arc;
use uuid::Uuid;

use crate::auth::ActorContext;
use crate::clock::SharedClock;
use crate::domain::evaluation::EvaluationReport;
use crate::domain::tenders::{
    CreateTenderRequest, Tender, TenderStatus, UpdateTenderRequest,
    DEFAULT_ABNORMAL_LOW_THRESHOLD_PCT,
};
use crate::error::{ApiError, ApiResult};
use crate::evaluation::EvaluationEngine;
use crate::store::{ProcurementStore, StoreError, TenderPatch, TenderTransition};

#[derive(Clone)]
pub struct TenderLifecycle {
    store: Arc<dyn ProcurementStore>,
    clock: SharedClock,
}

impl TenderLifecycle {
    pub fn new(store: Arc<dyn ProcurementStore>, clock: SharedClock) -> Self {
        Self { store, clock }
    }

    fn require_owner(tender: &Tender, actor: &ActorContext) -> ApiResult<()> {
        if tender.is_owned_by_company(actor.company_id) || actor.is_admin() {
            Ok(())
        } else {
            Err(ApiError::forbidden(
                "Only the owning company can manage this tender",
            ))
        }
    }

    pub async fn create(&self, req: CreateTenderRequest, actor: &ActorContext) -> ApiResult<Tender> {
        let title = req.title.trim();
        let description = req.description.trim();
        let category = req.category.trim();
        if title.is_empty() || description.is_empty() || category.is_empty() {
            return Err(ApiError::validation(
                "title, description and category are required",
            ));
        }
        if req.estimated_value.is_some_and(|v| v < 0.0) {
            return Err(ApiError::validation("estimated_value must not be negative"));
        }
        if req.emd_amount.is_some_and(|v| v < 0.0) {
            return Err(ApiError::validation("emd_amount must not be negative"));
        }
        if req.abnormal_low_threshold_pct.is_some_and(|v| v < 0.0) {
            return Err(ApiError::validation(
                "abnormal_low_threshold_pct must not be negative",
            ));
        }

        let now = self.clock.now();
        let tender = Tender {
            id: Uuid::new_v4(),
            company_id: actor.company_id,
            created_by: actor.user_id,
            title: title.to_string(),
            description: description.to_string(),
            category: category.to_string(),
            status: TenderStatus::Draft,
            estimated_value: req.estimated_value.unwrap_or(0.0),
            emd_amount: req.emd_amount.unwrap_or(0.0),
            abnormal_low_threshold_pct: req
                .abnormal_low_threshold_pct
                .unwrap_or(DEFAULT_ABNORMAL_LOW_THRESHOLD_PCT),
            start_date: req.start_date,
            end_date: req.end_date,
            bid_ids: Vec::new(),
            evaluation: None,
            created_at: now,
            updated_at: now,
        };

        tracing::info!(
            tender_id = %tender.id,
            company_id = %actor.company_id,
            title = %tender.title,
            "Creating tender"
        );
        Ok(self.store.insert_tender(tender).await?)
    }

    /// Drafts are visible to the owning company only; everything else is
    /// public once published.
    pub async fn get(&self, tender_id: Uuid, actor: &ActorContext) -> ApiResult<Tender> {
        let tender = self.store.get_tender(tender_id).await?;
        if tender.status == TenderStatus::Draft && !tender.is_owned_by_company(actor.company_id)
            && !actor.is_admin()
        {
            return Err(ApiError::not_found(format!("Tender {tender_id} not found")));
        }
        Ok(tender)
    }

    pub async fn update(
        &self,
        tender_id: Uuid,
        req: UpdateTenderRequest,
        actor: &ActorContext,
    ) -> ApiResult<Tender> {
        let tender = self.store.get_tender(tender_id).await?;
        Self::require_owner(&tender, actor)?;
        if req.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(ApiError::validation("title must not be blank"));
        }
        if req.estimated_value.is_some_and(|v| v < 0.0)
            || req.emd_amount.is_some_and(|v| v < 0.0)
            || req.abnormal_low_threshold_pct.is_some_and(|v| v < 0.0)
        {
            return Err(ApiError::validation("amounts must not be negative"));
        }

        let patch = TenderPatch {
            title: req.title,
            description: req.description,
            category: req.category,
            estimated_value: req.estimated_value,
            emd_amount: req.emd_amount,
            abnormal_low_threshold_pct: req.abnormal_low_threshold_pct,
            start_date: req.start_date,
            end_date: req.end_date,
        };
        Ok(self
            .store
            .update_tender_draft(tender_id, patch, self.clock.now())
            .await?)
    }

    pub async fn publish(&self, tender_id: Uuid, actor: &ActorContext) -> ApiResult<Tender> {
        let tender = self.store.get_tender(tender_id).await?;
        Self::require_owner(&tender, actor)?;

        let now = self.clock.now();
        // A tender cannot leave draft without a bidding deadline.
        let end_date = tender
            .end_date
            .ok_or_else(|| ApiError::validation("end_date must be set before publishing"))?;
        if end_date <= now {
            return Err(ApiError::validation("end_date must be in the future"));
        }

        tracing::info!(tender_id = %tender_id, "Publishing tender");
        let updated = self
            .store
            .transition_tender(
                tender_id,
                TenderTransition {
                    expected: TenderStatus::Draft,
                    next: TenderStatus::Published,
                    default_start_date: Some(now),
                    default_end_date: None,
                    now,
                },
            )
            .await?;
        Ok(updated)
    }

    /// Closing stops new submissions but leaves submitted bids intact;
    /// they are evaluated and cascade-rejected at award time.
    pub async fn close(&self, tender_id: Uuid, actor: &ActorContext) -> ApiResult<Tender> {
        let tender = self.store.get_tender(tender_id).await?;
        Self::require_owner(&tender, actor)?;

        let now = self.clock.now();
        tracing::info!(tender_id = %tender_id, "Closing tender");
        let updated = self
            .store
            .transition_tender(
                tender_id,
                TenderTransition {
                    expected: TenderStatus::Published,
                    next: TenderStatus::Closed,
                    default_start_date: None,
                    default_end_date: Some(now),
                    now,
                },
            )
            .await?;
        Ok(updated)
    }

    /// Runs the evaluation engine over the tender's bids and caches the
    /// report. Lifecycle state is never touched.
    pub async fn analyze(
        &self,
        tender_id: Uuid,
        actor: &ActorContext,
        engine: &EvaluationEngine,
    ) -> ApiResult<EvaluationReport> {
        let tender = self.store.get_tender(tender_id).await?;
        Self::require_owner(&tender, actor)?;

        let bids = self.store.list_bids_for_tender(tender_id).await?;
        let report = engine.evaluate(&tender, &bids).await;
        self.store.attach_evaluation(tender_id, report.clone()).await?;
        Ok(report)
    }

    /// One expiry pass: every published tender whose deadline has passed is
    /// moved to expired and its pending bids are rejected. Invoked by the
    /// sweep task; the only path that transitions without a human actor.
    pub async fn run_expiry_pass(&self) -> ApiResult<usize> {
        let now = self.clock.now();
        let due = self.store.list_published_past_end(now).await?;
        let mut expired = 0;
        for tender in due {
            match self.store.expire_tender(tender.id, now).await {
                Ok(rejected) => {
                    expired += 1;
                    tracing::info!(
                        tender_id = %tender.id,
                        rejected_bids = rejected,
                        "Tender expired"
                    );
                }
                // Lost a race against a manual close or award; the other
                // transition already settled the tender.
                Err(StoreError::StaleState { .. }) => {
                    tracing::debug!(tender_id = %tender.id, "Tender no longer published, skipping expiry");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(expired)
    }
}
