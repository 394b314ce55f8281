//! Narrative summarization capability.
//!
//! The evaluation engine talks to this trait, never to the AI service
//! directly. Failure here must never surface to the analysis caller: the
//! engine substitutes its deterministic fallback text and records the
//! reason on the report.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::bids::Bid;
use crate::domain::evaluation::{EvaluationReport, RiskSeverity};
use crate::domain::tenders::Tender;
use crate::services::ai_client::AiClient;

#[derive(Debug, Error)]
pub enum SummarizerError {
    #[error("narrative summarizer not configured")]
    NotConfigured,

    #[error("AI service error: {0}")]
    Service(String),

    #[error("malformed narrative response: {0}")]
    Malformed(String),
}

/// Bounded per-bid context shipped to the narrative service. Document
/// contents never leave the system, only counts.
#[derive(Debug, Clone, Serialize)]
pub struct BidBrief {
    pub bid_id: Uuid,
    pub bidder_company_id: Uuid,
    pub amount: f64,
    pub delivery_days: i64,
    pub technical_doc_count: usize,
    pub financial_doc_count: usize,
}

impl From<&Bid> for BidBrief {
    fn from(bid: &Bid) -> Self {
        Self {
            bid_id: bid.id,
            bidder_company_id: bid.bidder_company_id,
            amount: bid.amount,
            delivery_days: bid.delivery_days,
            technical_doc_count: bid.technical_docs.len(),
            financial_doc_count: bid.financial_docs.len(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NarrativeRequest<'a> {
    pub tender_id: Uuid,
    pub tender_title: &'a str,
    pub estimated_value: f64,
    pub report: &'a EvaluationReport,
    pub bids: Vec<BidBrief>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RankingReason {
    pub bid_id: Uuid,
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NarrativeRisk {
    pub bid_id: Uuid,
    pub risk: String,
    pub severity: RiskSeverity,
}

/// Natural-language augmentation of a deterministic report.
#[derive(Debug, Clone, Deserialize)]
pub struct Narrative {
    pub summary: String,
    pub recommendation: String,
    #[serde(default)]
    pub ranking_reasons: Vec<RankingReason>,
    #[serde(default)]
    pub risks: Vec<NarrativeRisk>,
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(
        &self,
        tender: &Tender,
        report: &EvaluationReport,
        bids: &[Bid],
    ) -> Result<Narrative, SummarizerError>;
}

/// Default wiring when no AI service token is configured. Every analysis
/// falls back to the deterministic text.
#[derive(Debug, Clone, Default)]
pub struct NoopSummarizer;

#[async_trait]
impl Summarizer for NoopSummarizer {
    async fn summarize(
        &self,
        _tender: &Tender,
        _report: &EvaluationReport,
        _bids: &[Bid],
    ) -> Result<Narrative, SummarizerError> {
        Err(SummarizerError::NotConfigured)
    }
}

/// Summarizer backed by the AI narrative service.
#[derive(Clone)]
pub struct AiSummarizer {
    client: AiClient,
}

impl AiSummarizer {
    pub fn new(client: AiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Summarizer for AiSummarizer {
    async fn summarize(
        &self,
        tender: &Tender,
        report: &EvaluationReport,
        bids: &[Bid],
    ) -> Result<Narrative, SummarizerError> {
        let request = NarrativeRequest {
            tender_id: tender.id,
            tender_title: &tender.title,
            estimated_value: tender.estimated_value,
            report,
            bids: bids.iter().map(BidBrief::from).collect(),
        };

        let narrative: Narrative = self
            .client
            .generate_bid_narrative(&request)
            .await
            .map_err(|e| SummarizerError::Service(e.to_string()))?;

        if narrative.summary.trim().is_empty() || narrative.recommendation.trim().is_empty() {
            return Err(SummarizerError::Malformed(
                "empty summary or recommendation".to_string(),
            ));
        }

        Ok(narrative)
    }
}
