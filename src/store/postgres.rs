//! PostgreSQL store.
//!
//! Conditional writes are expressed as `UPDATE ... WHERE id = $1 AND
//! status = <expected>`; zero affected rows means the caller lost the race
//! and the current status is re-read to report a precise stale-state error.
//! Draft uniqueness rides on the partial unique index from the migrations;
//! withdrawal permanence is an eligibility predicate inside the insert.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::*;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::bids::{Bid, BidStatus};
use crate::domain::evaluation::EvaluationReport;
use crate::domain::tenders::{Tender, TenderStatus};

use super::{
    AwardOutcome, BidDraftUpdate, BidTransition, ProcurementStore, StoreError, StoreResult,
    TenderPatch, TenderTransition,
};

const DRAFT_UNIQUE_CONSTRAINT: &str = "bids_one_draft_per_pair";

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn dec(v: f64) -> Decimal {
    Decimal::from_f64_retain(v).unwrap_or_default()
}

fn dec_f64(d: Decimal) -> f64 {
    d.to_f64().unwrap_or(0.0)
}

#[derive(Debug, sqlx::FromRow)]
struct TenderRow {
    id: Uuid,
    company_id: Uuid,
    created_by: Uuid,
    title: String,
    description: String,
    category: String,
    status: String,
    estimated_value: Decimal,
    emd_amount: Decimal,
    abnormal_low_threshold_pct: Decimal,
    start_date: Option<DateTime<Utc>>,
    end_date: Option<DateTime<Utc>>,
    bid_ids: Vec<Uuid>,
    evaluation: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<TenderRow> for Tender {
    fn from(row: TenderRow) -> Self {
        Self {
            id: row.id,
            company_id: row.company_id,
            created_by: row.created_by,
            title: row.title,
            description: row.description,
            category: row.category,
            status: TenderStatus::from_str(&row.status),
            estimated_value: dec_f64(row.estimated_value),
            emd_amount: dec_f64(row.emd_amount),
            abnormal_low_threshold_pct: dec_f64(row.abnormal_low_threshold_pct),
            start_date: row.start_date,
            end_date: row.end_date,
            bid_ids: row.bid_ids,
            // Derived cache; a value from an older schema just means
            // the next analysis recomputes it.
            evaluation: row
                .evaluation
                .and_then(|v| serde_json::from_value::<EvaluationReport>(v).ok()),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct BidRow {
    id: Uuid,
    tender_id: Uuid,
    bidder_company_id: Uuid,
    submitted_by: Uuid,
    amount: Decimal,
    delivery_days: i64,
    status: String,
    technical_docs: serde_json::Value,
    financial_docs: serde_json::Value,
    emd_proof: Option<serde_json::Value>,
    anomaly_score: Option<f64>,
    ai_notes: Option<String>,
    submitted_at: Option<DateTime<Utc>>,
    withdrawn_at: Option<DateTime<Utc>>,
    withdrawn_by: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<BidRow> for Bid {
    fn from(row: BidRow) -> Self {
        Self {
            id: row.id,
            tender_id: row.tender_id,
            bidder_company_id: row.bidder_company_id,
            submitted_by: row.submitted_by,
            amount: dec_f64(row.amount),
            delivery_days: row.delivery_days,
            status: BidStatus::from_str(&row.status),
            technical_docs: serde_json::from_value(row.technical_docs).unwrap_or_default(),
            financial_docs: serde_json::from_value(row.financial_docs).unwrap_or_default(),
            emd_proof: row.emd_proof.and_then(|v| serde_json::from_value(v).ok()),
            anomaly_score: row.anomaly_score,
            ai_notes: row.ai_notes,
            submitted_at: row.submitted_at,
            withdrawn_at: row.withdrawn_at,
            withdrawn_by: row.withdrawn_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const TENDER_COLUMNS: &str = "id, company_id, created_by, title, description, category, status, \
     estimated_value, emd_amount, abnormal_low_threshold_pct, start_date, end_date, bid_ids, \
     evaluation, created_at, updated_at";

const BID_COLUMNS: &str = "id, tender_id, bidder_company_id, submitted_by, amount, delivery_days, \
     status, technical_docs, financial_docs, emd_proof, anomaly_score, ai_notes, submitted_at, \
     withdrawn_at, withdrawn_by, created_at, updated_at";

impl PgStore {
    async fn tender_status(&self, id: Uuid) -> StoreResult<TenderStatus> {
        let status: Option<String> = sqlx::query_scalar("SELECT status FROM tenders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        status
            .map(|s| TenderStatus::from_str(&s))
            .ok_or(StoreError::TenderNotFound(id))
    }

    async fn tender_status_tx(
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
    ) -> StoreResult<TenderStatus> {
        let status: Option<String> = sqlx::query_scalar("SELECT status FROM tenders WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?;
        status
            .map(|s| TenderStatus::from_str(&s))
            .ok_or(StoreError::TenderNotFound(id))
    }

    async fn bid_status(&self, id: Uuid) -> StoreResult<BidStatus> {
        let status: Option<String> = sqlx::query_scalar("SELECT status FROM bids WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        status
            .map(|s| BidStatus::from_str(&s))
            .ok_or(StoreError::BidNotFound(id))
    }
}

#[async_trait]
impl ProcurementStore for PgStore {
    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }

    async fn insert_tender(&self, tender: Tender) -> StoreResult<Tender> {
        let sql = format!(
            "INSERT INTO tenders ({TENDER_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16) \
             RETURNING {TENDER_COLUMNS}"
        );
        let row = sqlx::query_as::<_, TenderRow>(&sql)
            .bind(tender.id)
            .bind(tender.company_id)
            .bind(tender.created_by)
            .bind(&tender.title)
            .bind(&tender.description)
            .bind(&tender.category)
            .bind(tender.status.as_str())
            .bind(dec(tender.estimated_value))
            .bind(dec(tender.emd_amount))
            .bind(dec(tender.abnormal_low_threshold_pct))
            .bind(tender.start_date)
            .bind(tender.end_date)
            .bind(&tender.bid_ids)
            .bind(None::<serde_json::Value>)
            .bind(tender.created_at)
            .bind(tender.updated_at)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.into())
    }

    async fn get_tender(&self, id: Uuid) -> StoreResult<Tender> {
        let sql = format!("SELECT {TENDER_COLUMNS} FROM tenders WHERE id = $1");
        let row = sqlx::query_as::<_, TenderRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::TenderNotFound(id))?;
        Ok(row.into())
    }

    async fn update_tender_draft(
        &self,
        id: Uuid,
        patch: TenderPatch,
        now: DateTime<Utc>,
    ) -> StoreResult<Tender> {
        let sql = format!(
            "UPDATE tenders SET \
                title = COALESCE($2, title), \
                description = COALESCE($3, description), \
                category = COALESCE($4, category), \
                estimated_value = COALESCE($5, estimated_value), \
                emd_amount = COALESCE($6, emd_amount), \
                abnormal_low_threshold_pct = COALESCE($7, abnormal_low_threshold_pct), \
                start_date = COALESCE($8, start_date), \
                end_date = COALESCE($9, end_date), \
                updated_at = $10 \
             WHERE id = $1 AND status = 'draft' \
             RETURNING {TENDER_COLUMNS}"
        );
        let row = sqlx::query_as::<_, TenderRow>(&sql)
            .bind(id)
            .bind(patch.title)
            .bind(patch.description)
            .bind(patch.category)
            .bind(patch.estimated_value.map(dec))
            .bind(patch.emd_amount.map(dec))
            .bind(patch.abnormal_low_threshold_pct.map(dec))
            .bind(patch.start_date)
            .bind(patch.end_date)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(row.into()),
            None => {
                let actual = self.tender_status(id).await?;
                Err(StoreError::stale_tender(TenderStatus::Draft, actual))
            }
        }
    }

    async fn transition_tender(
        &self,
        id: Uuid,
        transition: TenderTransition,
    ) -> StoreResult<Tender> {
        let sql = format!(
            "UPDATE tenders SET \
                status = $3, \
                start_date = COALESCE(start_date, $4), \
                end_date = COALESCE(end_date, $5), \
                updated_at = $6 \
             WHERE id = $1 AND status = $2 \
             RETURNING {TENDER_COLUMNS}"
        );
        let row = sqlx::query_as::<_, TenderRow>(&sql)
            .bind(id)
            .bind(transition.expected.as_str())
            .bind(transition.next.as_str())
            .bind(transition.default_start_date)
            .bind(transition.default_end_date)
            .bind(transition.now)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(row.into()),
            None => {
                let actual = self.tender_status(id).await?;
                Err(StoreError::stale_tender(transition.expected, actual))
            }
        }
    }

    async fn attach_evaluation(&self, id: Uuid, report: EvaluationReport) -> StoreResult<()> {
        let value = serde_json::to_value(&report)
            .map_err(|e| StoreError::Database(sqlx::Error::Decode(Box::new(e))))?;
        let result = sqlx::query("UPDATE tenders SET evaluation = $2 WHERE id = $1")
            .bind(id)
            .bind(value)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::TenderNotFound(id));
        }
        Ok(())
    }

    async fn link_bid(&self, tender_id: Uuid, bid_id: Uuid, now: DateTime<Utc>) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE tenders SET bid_ids = array_append(bid_ids, $2), updated_at = $3 \
             WHERE id = $1 AND NOT ($2 = ANY(bid_ids))",
        )
        .bind(tender_id)
        .bind(bid_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            // Either already linked or the tender is gone; only the latter
            // is an error.
            self.tender_status(tender_id).await?;
        }
        Ok(())
    }

    async fn list_published_past_end(&self, now: DateTime<Utc>) -> StoreResult<Vec<Tender>> {
        let sql = format!(
            "SELECT {TENDER_COLUMNS} FROM tenders \
             WHERE status = 'published' AND end_date IS NOT NULL AND end_date < $1"
        );
        let rows = sqlx::query_as::<_, TenderRow>(&sql)
            .bind(now)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn create_draft_bid(&self, bid: Bid) -> StoreResult<Bid> {
        let technical = serde_json::to_value(&bid.technical_docs)
            .map_err(|e| StoreError::Database(sqlx::Error::Decode(Box::new(e))))?;
        let financial = serde_json::to_value(&bid.financial_docs)
            .map_err(|e| StoreError::Database(sqlx::Error::Decode(Box::new(e))))?;
        let emd = bid
            .emd_proof
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| StoreError::Database(sqlx::Error::Decode(Box::new(e))))?;

        // The NOT EXISTS predicate enforces withdrawal permanence inside the
        // insert itself; the partial unique index enforces one draft per pair.
        let sql = format!(
            "INSERT INTO bids ({BID_COLUMNS}) \
             SELECT $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17 \
             WHERE NOT EXISTS (\
                SELECT 1 FROM bids \
                WHERE tender_id = $2 AND bidder_company_id = $3 AND status = 'withdrawn'\
             ) \
             RETURNING {BID_COLUMNS}"
        );
        let row = sqlx::query_as::<_, BidRow>(&sql)
            .bind(bid.id)
            .bind(bid.tender_id)
            .bind(bid.bidder_company_id)
            .bind(bid.submitted_by)
            .bind(dec(bid.amount))
            .bind(bid.delivery_days)
            .bind(bid.status.as_str())
            .bind(technical)
            .bind(financial)
            .bind(emd)
            .bind(bid.anomaly_score)
            .bind(&bid.ai_notes)
            .bind(bid.submitted_at)
            .bind(bid.withdrawn_at)
            .bind(bid.withdrawn_by)
            .bind(bid.created_at)
            .bind(bid.updated_at)
            .fetch_optional(&self.pool)
            .await;

        match row {
            Ok(Some(row)) => Ok(row.into()),
            Ok(None) => Err(StoreError::WithdrawnBidExists),
            Err(sqlx::Error::Database(db)) if db.constraint() == Some(DRAFT_UNIQUE_CONSTRAINT) => {
                Err(StoreError::DraftExists)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_bid(&self, id: Uuid) -> StoreResult<Bid> {
        let sql = format!("SELECT {BID_COLUMNS} FROM bids WHERE id = $1");
        let row = sqlx::query_as::<_, BidRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::BidNotFound(id))?;
        Ok(row.into())
    }

    async fn list_bids_for_tender(&self, tender_id: Uuid) -> StoreResult<Vec<Bid>> {
        let sql = format!(
            "SELECT {BID_COLUMNS} FROM bids WHERE tender_id = $1 ORDER BY created_at ASC"
        );
        let rows = sqlx::query_as::<_, BidRow>(&sql)
            .bind(tender_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn update_draft_bid(
        &self,
        id: Uuid,
        update: BidDraftUpdate,
        now: DateTime<Utc>,
    ) -> StoreResult<Bid> {
        let technical = update
            .technical_docs
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| StoreError::Database(sqlx::Error::Decode(Box::new(e))))?;
        let financial = update
            .financial_docs
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| StoreError::Database(sqlx::Error::Decode(Box::new(e))))?;
        let emd = update
            .emd_proof
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| StoreError::Database(sqlx::Error::Decode(Box::new(e))))?;

        let sql = format!(
            "UPDATE bids SET \
                amount = COALESCE($2, amount), \
                delivery_days = COALESCE($3, delivery_days), \
                emd_proof = COALESCE($4, emd_proof), \
                technical_docs = COALESCE($5, technical_docs), \
                financial_docs = COALESCE($6, financial_docs), \
                updated_at = $7 \
             WHERE id = $1 AND status = 'draft' \
             RETURNING {BID_COLUMNS}"
        );
        let row = sqlx::query_as::<_, BidRow>(&sql)
            .bind(id)
            .bind(update.amount.map(dec))
            .bind(update.delivery_days)
            .bind(emd)
            .bind(technical)
            .bind(financial)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(row.into()),
            None => {
                let actual = self.bid_status(id).await?;
                Err(StoreError::stale_bid(BidStatus::Draft.to_string(), actual))
            }
        }
    }

    async fn transition_bid(&self, id: Uuid, transition: BidTransition) -> StoreResult<Bid> {
        let expected: Vec<String> = transition
            .expected_any
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();
        let sql = format!(
            "UPDATE bids SET \
                status = $2, \
                submitted_at = COALESCE($3, submitted_at), \
                withdrawn_at = COALESCE($4, withdrawn_at), \
                withdrawn_by = COALESCE($5, withdrawn_by), \
                anomaly_score = COALESCE($6, anomaly_score), \
                ai_notes = CASE \
                    WHEN $7::text IS NULL THEN ai_notes \
                    WHEN ai_notes IS NULL THEN $7 \
                    ELSE ai_notes || E'\\n' || $7 \
                END, \
                updated_at = $8 \
             WHERE id = $1 AND status = ANY($9) \
             RETURNING {BID_COLUMNS}"
        );
        let row = sqlx::query_as::<_, BidRow>(&sql)
            .bind(id)
            .bind(transition.next.as_str())
            .bind(transition.submitted_at)
            .bind(transition.withdrawn_at)
            .bind(transition.withdrawn_by)
            .bind(transition.anomaly_score)
            .bind(&transition.ai_note)
            .bind(transition.now)
            .bind(&expected)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(row.into()),
            None => {
                let actual = self.bid_status(id).await?;
                Err(StoreError::stale_bid(expected.join("|"), actual))
            }
        }
    }

    async fn delete_draft_bid(&self, id: Uuid) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM bids WHERE id = $1 AND status = 'draft'")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            let actual = self.bid_status(id).await?;
            return Err(StoreError::stale_bid(BidStatus::Draft.to_string(), actual));
        }
        Ok(())
    }

    async fn execute_award(
        &self,
        tender_id: Uuid,
        winning_bid_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<AwardOutcome> {
        let mut tx = self.pool.begin().await?;

        // Conditional tender write first: exactly one concurrent caller can
        // move closed -> awarded, the rest observe a stale state.
        let tender_sql = format!(
            "UPDATE tenders SET status = 'awarded', updated_at = $2 \
             WHERE id = $1 AND status = 'closed' \
             RETURNING {TENDER_COLUMNS}"
        );
        let tender_row = sqlx::query_as::<_, TenderRow>(&tender_sql)
            .bind(tender_id)
            .bind(now)
            .fetch_optional(&mut *tx)
            .await?;
        let tender: Tender = match tender_row {
            Some(row) => row.into(),
            None => {
                let actual = Self::tender_status_tx(&mut tx, tender_id).await?;
                return Err(StoreError::stale_tender(TenderStatus::Closed, actual));
            }
        };

        let winner_sql = format!(
            "UPDATE bids SET status = 'accepted', updated_at = $3 \
             WHERE id = $2 AND tender_id = $1 AND status IN ('submitted', 'under_review') \
             RETURNING {BID_COLUMNS}"
        );
        let winner_row = sqlx::query_as::<_, BidRow>(&winner_sql)
            .bind(tender_id)
            .bind(winning_bid_id)
            .bind(now)
            .fetch_optional(&mut *tx)
            .await?;
        let accepted: Bid = match winner_row {
            // Dropping tx rolls the tender write back.
            None => {
                let status: Option<String> =
                    sqlx::query_scalar("SELECT status FROM bids WHERE id = $1")
                        .bind(winning_bid_id)
                        .fetch_optional(&mut *tx)
                        .await?;
                let actual = status
                    .map(|s| BidStatus::from_str(&s))
                    .ok_or(StoreError::BidNotFound(winning_bid_id))?;
                return Err(StoreError::stale_bid("submitted|under_review", actual));
            }
            Some(row) => row.into(),
        };

        let rejected = sqlx::query(
            "UPDATE bids SET status = 'rejected', updated_at = $3 \
             WHERE tender_id = $1 AND id <> $2 AND status IN ('submitted', 'under_review')",
        )
        .bind(tender_id)
        .bind(winning_bid_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(AwardOutcome {
            tender,
            accepted,
            rejected_count: rejected.rows_affected() as usize,
        })
    }

    async fn expire_tender(&self, tender_id: Uuid, now: DateTime<Utc>) -> StoreResult<usize> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE tenders SET status = 'expired', end_date = COALESCE(end_date, $2), \
             updated_at = $2 WHERE id = $1 AND status = 'published'",
        )
        .bind(tender_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            let actual = Self::tender_status_tx(&mut tx, tender_id).await?;
            return Err(StoreError::stale_tender(TenderStatus::Published, actual));
        }

        let rejected = sqlx::query(
            "UPDATE bids SET status = 'rejected', updated_at = $2 \
             WHERE tender_id = $1 AND status IN ('submitted', 'under_review')",
        )
        .bind(tender_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(rejected.rows_affected() as usize)
    }
}
