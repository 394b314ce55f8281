use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::evaluation::EvaluationReport;

/// Percent below estimate at which a bid is flagged abnormally low,
/// unless the tender overrides it.
pub const DEFAULT_ABNORMAL_LOW_THRESHOLD_PCT: f64 = 20.0;

/// Tender status
///
/// Forward-only: `Draft → Published → Closed → Awarded`. `Expired` is the
/// time-based exit from `Published`; no award follows it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TenderStatus {
    Draft,
    Published,
    Closed,
    Awarded,
    Expired,
}

impl Default for TenderStatus {
    fn default() -> Self {
        Self::Draft
    }
}

impl TenderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
            Self::Closed => "closed",
            Self::Awarded => "awarded",
            Self::Expired => "expired",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "published" => Self::Published,
            "closed" => Self::Closed,
            "awarded" => Self::Awarded,
            "expired" => Self::Expired,
            _ => Self::Draft,
        }
    }
}

impl std::fmt::Display for TenderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tender entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tender {
    pub id: Uuid,
    /// Owning company; only its members may publish, close or award.
    pub company_id: Uuid,
    pub created_by: Uuid,
    pub title: String,
    pub description: String,
    pub category: String,
    pub status: TenderStatus,
    pub estimated_value: f64,
    /// Required earnest money deposit.
    pub emd_amount: f64,
    pub abnormal_low_threshold_pct: f64,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub bid_ids: Vec<Uuid>,
    /// Latest evaluation report, replaced on each analysis request.
    pub evaluation: Option<EvaluationReport>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tender {
    pub fn is_owned_by_company(&self, company_id: Uuid) -> bool {
        self.company_id == company_id
    }

    /// Whether bids may currently be created, edited or submitted.
    pub fn is_open_for_bidding(&self) -> bool {
        self.status == TenderStatus::Published
    }
}

/// Request DTO for creating a tender
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTenderRequest {
    pub title: String,
    pub description: String,
    pub category: String,
    #[serde(default)]
    pub estimated_value: Option<f64>,
    #[serde(default)]
    pub emd_amount: Option<f64>,
    #[serde(default)]
    pub abnormal_low_threshold_pct: Option<f64>,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
}

/// Request DTO for updating a draft tender. Whitelisted fields only;
/// status is never patchable through this path.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTenderRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub estimated_value: Option<f64>,
    #[serde(default)]
    pub emd_amount: Option<f64>,
    #[serde(default)]
    pub abnormal_low_threshold_pct: Option<f64>,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
}

/// Response DTO for tender
#[derive(Debug, Clone, Serialize)]
pub struct TenderResponse {
    pub id: Uuid,
    pub company_id: Uuid,
    pub title: String,
    pub description: String,
    pub category: String,
    pub status: TenderStatus,
    pub estimated_value: f64,
    pub emd_amount: f64,
    pub abnormal_low_threshold_pct: f64,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub bid_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<EvaluationReport>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Tender> for TenderResponse {
    fn from(t: Tender) -> Self {
        Self {
            id: t.id,
            company_id: t.company_id,
            title: t.title,
            description: t.description,
            category: t.category,
            status: t.status,
            estimated_value: t.estimated_value,
            emd_amount: t.emd_amount,
            abnormal_low_threshold_pct: t.abnormal_low_threshold_pct,
            start_date: t.start_date,
            end_date: t.end_date,
            bid_count: t.bid_ids.len(),
            evaluation: t.evaluation,
            created_at: t.created_at,
            updated_at: t.updated_at,
        }
    }
}
