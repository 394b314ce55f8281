use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Bid status
///
/// `Draft → Submitted → {UnderReview} → {Accepted | Rejected}`. Any
/// non-withdrawn status may move to `Withdrawn`, which permanently
/// disqualifies the company from this tender. Drafts may instead be
/// deleted, which does not disqualify.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BidStatus {
    Draft,
    Submitted,
    UnderReview,
    Accepted,
    Rejected,
    Withdrawn,
}

impl Default for BidStatus {
    fn default() -> Self {
        Self::Draft
    }
}

impl BidStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Submitted => "submitted",
            Self::UnderReview => "under_review",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Withdrawn => "withdrawn",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "submitted" => Self::Submitted,
            "under_review" => Self::UnderReview,
            "accepted" => Self::Accepted,
            "rejected" => Self::Rejected,
            "withdrawn" => Self::Withdrawn,
            _ => Self::Draft,
        }
    }

    /// Awaiting an award decision: counted by the evaluation engine's
    /// "submitted or later" filter and bulk-rejected by award/expiry cascades.
    pub fn is_pending_decision(&self) -> bool {
        matches!(self, Self::Submitted | Self::UnderReview)
    }

    /// Submitted or any later pipeline stage. Drafts and withdrawn bids
    /// never reach the evaluation engine.
    pub fn is_submitted_or_later(&self) -> bool {
        matches!(
            self,
            Self::Submitted | Self::UnderReview | Self::Accepted | Self::Rejected
        )
    }
}

impl std::fmt::Display for BidStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to a document already uploaded to blob storage.
/// Used verbatim as returned by the upload service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentRef {
    pub url: String,
    pub file_id: String,
    pub name: String,
}

/// Payment mode for the earnest money deposit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmdPaymentMode {
    BankTransfer,
    BankGuarantee,
    DemandDraft,
    Online,
}

/// Proof that the earnest money deposit was paid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmdProof {
    pub transaction_id: String,
    pub payment_mode: EmdPaymentMode,
    pub receipt: Option<DocumentRef>,
}

/// Bid entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bid {
    pub id: Uuid,
    pub tender_id: Uuid,
    pub bidder_company_id: Uuid,
    pub submitted_by: Uuid,
    pub amount: f64,
    pub delivery_days: i64,
    pub status: BidStatus,
    /// Technical envelope.
    pub technical_docs: Vec<DocumentRef>,
    /// Financial envelope.
    pub financial_docs: Vec<DocumentRef>,
    pub emd_proof: Option<EmdProof>,
    pub anomaly_score: Option<f64>,
    pub ai_notes: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub withdrawn_at: Option<DateTime<Utc>>,
    pub withdrawn_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Bid {
    pub fn has_complete_envelopes(&self) -> bool {
        !self.technical_docs.is_empty() && !self.financial_docs.is_empty()
    }

    pub fn has_emd_receipt(&self) -> bool {
        self.emd_proof
            .as_ref()
            .is_some_and(|proof| proof.receipt.is_some())
    }
}

/// Request DTO for creating a draft bid. Everything beyond the tender
/// reference is optional at draft time; submission applies full validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateBidRequest {
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub delivery_days: Option<i64>,
    #[serde(default)]
    pub technical_docs: Vec<DocumentRef>,
    #[serde(default)]
    pub financial_docs: Vec<DocumentRef>,
    #[serde(default)]
    pub emd_proof: Option<EmdProof>,
}

/// Request DTO for updating a draft bid.
///
/// Document removal is client-directed: when a `keep_*` list is present,
/// stored documents whose `file_id` is absent from it are dropped. Newly
/// uploaded references are appended after the keep filter.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateBidRequest {
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub delivery_days: Option<i64>,
    #[serde(default)]
    pub emd_proof: Option<EmdProof>,
    #[serde(default)]
    pub keep_technical: Option<Vec<String>>,
    #[serde(default)]
    pub keep_financial: Option<Vec<String>>,
    #[serde(default)]
    pub new_technical: Vec<DocumentRef>,
    #[serde(default)]
    pub new_financial: Vec<DocumentRef>,
}

/// Response DTO for bid
#[derive(Debug, Clone, Serialize)]
pub struct BidResponse {
    pub id: Uuid,
    pub tender_id: Uuid,
    pub bidder_company_id: Uuid,
    pub amount: f64,
    pub delivery_days: i64,
    pub status: BidStatus,
    pub technical_docs: Vec<DocumentRef>,
    pub financial_docs: Vec<DocumentRef>,
    pub emd_proof: Option<EmdProof>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anomaly_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_notes: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub withdrawn_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Bid> for BidResponse {
    fn from(b: Bid) -> Self {
        Self {
            id: b.id,
            tender_id: b.tender_id,
            bidder_company_id: b.bidder_company_id,
            amount: b.amount,
            delivery_days: b.delivery_days,
            status: b.status,
            technical_docs: b.technical_docs,
            financial_docs: b.financial_docs,
            emd_proof: b.emd_proof,
            anomaly_score: b.anomaly_score,
            ai_notes: b.ai_notes,
            submitted_at: b.submitted_at,
            withdrawn_at: b.withdrawn_at,
            created_at: b.created_at,
            updated_at: b.updated_at,
        }
    }
}

/// One requirement line in the pre-submit readiness checklist.
#[derive(Debug, Clone, Serialize)]
pub struct ChecklistItem {
    pub requirement: String,
    pub satisfied: bool,
}

/// Pre-submit readiness report. Advisory only; never mutates the bid.
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessReport {
    pub bid_id: Uuid,
    pub ready: bool,
    pub checklist: Vec<ChecklistItem>,
    pub advisories: Vec<String>,
}
