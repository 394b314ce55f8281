//! Evaluation report types.
//!
//! Derived data: recomputed on each analysis request and cached on the
//! tender. Never feeds back into lifecycle state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum RiskSeverity {
    Low,
    Medium,
    High,
}

/// Per-bid deterministic sub-scores, all on a 0-100 scale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BidScore {
    pub bid_id: Uuid,
    pub bidder_company_id: Uuid,
    pub price_score: f64,
    pub delivery_score: f64,
    pub docs_score: f64,
    pub weighted_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingEntry {
    /// 1-based position after the stable descending sort.
    pub position: usize,
    pub bid_id: Uuid,
    pub bidder_company_id: Uuid,
    pub weighted_score: f64,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskFlag {
    pub bid_id: Uuid,
    pub risk: String,
    pub severity: RiskSeverity,
}

/// Aggregate distribution metrics over the evaluated bid set.
/// All values rounded to 2 decimals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BidStatistics {
    pub bid_count: usize,
    pub min_amount: f64,
    pub max_amount: f64,
    pub average_amount: f64,
    pub median_amount: f64,
    pub amount_range: f64,
    /// Population standard deviation.
    pub std_deviation: f64,
    /// `std_deviation / average * 100`; 0 when the average is 0.
    pub coefficient_of_variation: f64,
    pub min_delivery_days: i64,
    pub max_delivery_days: i64,
    pub average_delivery_days: f64,
    /// `(average - estimated_value) / estimated_value * 100`;
    /// 0 when the estimate is 0.
    pub average_vs_estimate_pct: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub summary: String,
    pub ranking: Vec<RankingEntry>,
    pub risks: Vec<RiskFlag>,
    pub recommendation: String,
    pub scores: Vec<BidScore>,
    /// Absent when no bids were evaluated.
    pub statistics: Option<BidStatistics>,
    pub generated_at: DateTime<Utc>,
    /// Set when the narrative augmenter was unavailable and the
    /// deterministic fallback text was used instead.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
}

impl EvaluationReport {
    pub fn top_ranked(&self) -> Option<&RankingEntry> {
        self.ranking.first()
    }
}
