//! Deterministic evaluation engine.
//!
//! Produces the ranked, risk-annotated report for a tender's bid set and
//! optionally augments it with narrative text. The deterministic result is
//! always complete on its own; augmentation failure only records a
//! fallback reason.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::warn;

use crate::clock::SharedClock;
use crate::domain::bids::Bid;
use crate::domain::evaluation::{
    BidScore, EvaluationReport, RankingEntry, RiskFlag, RiskSeverity,
};
use crate::domain::tenders::Tender;
use crate::evaluation::{scoring, statistics};
use crate::services::summarizer::{Narrative, Summarizer};

pub struct EvaluationEngine {
    summarizer: Arc<dyn Summarizer>,
    clock: SharedClock,
}

impl EvaluationEngine {
    pub fn new(summarizer: Arc<dyn Summarizer>, clock: SharedClock) -> Self {
        Self { summarizer, clock }
    }

    /// Evaluates the tender's bid set. Never fails and never mutates
    /// lifecycle state.
    pub async fn evaluate(&self, tender: &Tender, bids: &[Bid]) -> EvaluationReport {
        let eligible: Vec<Bid> = bids
            .iter()
            .filter(|b| b.status.is_submitted_or_later())
            .cloned()
            .collect();

        let mut report = deterministic_report(tender, &eligible, self.clock.now());
        if eligible.is_empty() {
            return report;
        }

        match self.summarizer.summarize(tender, &report, &eligible).await {
            Ok(narrative) => apply_narrative(&mut report, narrative),
            Err(e) => {
                warn!(tender_id = %tender.id, error = %e, "narrative augmentation unavailable, using deterministic fallback");
                report.fallback_reason = Some(e.to_string());
            }
        }
        report
    }
}

/// Builds the full deterministic report: scores, risks, ranking,
/// statistics and synthesized summary/recommendation text.
pub fn deterministic_report(tender: &Tender, eligible: &[Bid], now: DateTime<Utc>) -> EvaluationReport {
    if eligible.is_empty() {
        return EvaluationReport {
            summary: format!("No submitted bids to evaluate for \"{}\".", tender.title),
            ranking: Vec::new(),
            risks: Vec::new(),
            recommendation: "No recommendation: the tender has no submitted bids.".to_string(),
            scores: Vec::new(),
            statistics: None,
            generated_at: now,
            fallback_reason: None,
        };
    }

    let min_amount = eligible
        .iter()
        .map(|b| b.amount)
        .fold(f64::INFINITY, f64::min);

    let scores: Vec<BidScore> = eligible
        .iter()
        .map(|bid| {
            let price = scoring::price_score(min_amount, bid.amount);
            let delivery = scoring::delivery_score(bid.delivery_days);
            let docs = scoring::docs_score(
                !bid.technical_docs.is_empty(),
                !bid.financial_docs.is_empty(),
            );
            BidScore {
                bid_id: bid.id,
                bidder_company_id: bid.bidder_company_id,
                price_score: price,
                delivery_score: delivery,
                docs_score: docs,
                weighted_score: scoring::weighted_score(price, delivery, docs),
            }
        })
        .collect();

    let risks = collect_risks(tender, eligible);

    // Stable sort: ties keep submission order.
    let mut ranked: Vec<&BidScore> = scores.iter().collect();
    ranked.sort_by(|a, b| {
        b.weighted_score
            .partial_cmp(&a.weighted_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let ranking: Vec<RankingEntry> = ranked
        .iter()
        .enumerate()
        .map(|(i, score)| RankingEntry {
            position: i + 1,
            bid_id: score.bid_id,
            bidder_company_id: score.bidder_company_id,
            weighted_score: score.weighted_score,
            reason: format!(
                "Weighted score {:.2} (price {:.2}, delivery {:.2}, documentation {:.2})",
                score.weighted_score, score.price_score, score.delivery_score, score.docs_score
            ),
        })
        .collect();

    let amounts: Vec<f64> = eligible.iter().map(|b| b.amount).collect();
    let delivery_days: Vec<i64> = eligible.iter().map(|b| b.delivery_days).collect();
    let stats = statistics::compute(&amounts, &delivery_days, tender.estimated_value);

    let summary = match &stats {
        Some(s) => format!(
            "{} bid(s) evaluated for \"{}\": amounts from {:.2} to {:.2}, average {:.2}. {} risk flag(s) raised.",
            eligible.len(),
            tender.title,
            s.min_amount,
            s.max_amount,
            s.average_amount,
            risks.len()
        ),
        None => format!("No submitted bids to evaluate for \"{}\".", tender.title),
    };

    let recommendation = match ranking.first() {
        Some(top) => {
            let top_risks = risks.iter().filter(|r| r.bid_id == top.bid_id).count();
            if top_risks > 0 {
                format!(
                    "Bid {} from company {} ranks first with weighted score {:.2}, but carries {} risk flag(s); review them before awarding.",
                    top.bid_id, top.bidder_company_id, top.weighted_score, top_risks
                )
            } else {
                format!(
                    "Bid {} from company {} ranks first with weighted score {:.2} and no risk flags.",
                    top.bid_id, top.bidder_company_id, top.weighted_score
                )
            }
        }
        None => "No recommendation: the tender has no submitted bids.".to_string(),
    };

    EvaluationReport {
        summary,
        ranking,
        risks,
        recommendation,
        scores,
        statistics: stats,
        generated_at: now,
        fallback_reason: None,
    }
}

fn collect_risks(tender: &Tender, eligible: &[Bid]) -> Vec<RiskFlag> {
    let mut risks = Vec::new();
    for bid in eligible {
        if let Some(pct) = scoring::pct_below_estimate(tender.estimated_value, bid.amount) {
            if pct >= tender.abnormal_low_threshold_pct {
                risks.push(RiskFlag {
                    bid_id: bid.id,
                    risk: format!("Abnormally low bid: {pct:.1}% below the estimated value"),
                    severity: RiskSeverity::High,
                });
            }
        }
        if bid.technical_docs.is_empty() {
            risks.push(RiskFlag {
                bid_id: bid.id,
                risk: "Technical envelope is empty".to_string(),
                severity: RiskSeverity::Medium,
            });
        }
        if bid.financial_docs.is_empty() {
            risks.push(RiskFlag {
                bid_id: bid.id,
                risk: "Financial envelope is empty".to_string(),
                severity: RiskSeverity::Medium,
            });
        }
    }
    risks
}

/// Overlays narrative text onto the deterministic report. Scores,
/// statistics and deterministic risks always survive.
fn apply_narrative(report: &mut EvaluationReport, narrative: Narrative) {
    report.summary = narrative.summary;
    report.recommendation = narrative.recommendation;
    for reason in narrative.ranking_reasons {
        if let Some(entry) = report.ranking.iter_mut().find(|e| e.bid_id == reason.bid_id) {
            entry.reason = reason.reason;
        }
    }
    for risk in narrative.risks {
        let duplicate = report
            .risks
            .iter()
            .any(|r| r.bid_id == risk.bid_id && r.risk == risk.risk);
        if !duplicate {
            report.risks.push(RiskFlag {
                bid_id: risk.bid_id,
                risk: risk.risk,
                severity: risk.severity,
            });
        }
    }
    report.fallback_reason = None;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, SystemClock};
    use crate::domain::bids::{BidStatus, DocumentRef};
    use crate::domain::tenders::TenderStatus;
    use crate::services::summarizer::{NoopSummarizer, SummarizerError};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn doc(name: &str) -> DocumentRef {
        DocumentRef {
            url: format!("https://files.example.com/{name}"),
            file_id: name.to_string(),
            name: name.to_string(),
        }
    }

    fn tender(estimated_value: f64) -> Tender {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        Tender {
            id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            created_by: Uuid::new_v4(),
            title: "Road resurfacing".to_string(),
            description: "Resurface 4km of arterial road".to_string(),
            category: "civil_works".to_string(),
            status: TenderStatus::Closed,
            estimated_value,
            emd_amount: 5000.0,
            abnormal_low_threshold_pct: 20.0,
            start_date: Some(now),
            end_date: Some(now),
            bid_ids: Vec::new(),
            evaluation: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn bid(tender_id: Uuid, amount: f64, delivery_days: i64, complete_docs: bool) -> Bid {
        let now = Utc.with_ymd_and_hms(2024, 5, 2, 12, 0, 0).unwrap();
        Bid {
            id: Uuid::new_v4(),
            tender_id,
            bidder_company_id: Uuid::new_v4(),
            submitted_by: Uuid::new_v4(),
            amount,
            delivery_days,
            status: BidStatus::Submitted,
            technical_docs: vec![doc("tech.pdf")],
            financial_docs: if complete_docs {
                vec![doc("fin.pdf")]
            } else {
                Vec::new()
            },
            emd_proof: None,
            anomaly_score: None,
            ai_notes: None,
            submitted_at: Some(now),
            withdrawn_at: None,
            withdrawn_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    struct FixedNarrative;

    #[async_trait]
    impl Summarizer for FixedNarrative {
        async fn summarize(
            &self,
            _tender: &Tender,
            _report: &EvaluationReport,
            _bids: &[Bid],
        ) -> Result<Narrative, SummarizerError> {
            Ok(Narrative {
                summary: "Narrative summary".to_string(),
                recommendation: "Narrative recommendation".to_string(),
                ranking_reasons: Vec::new(),
                risks: Vec::new(),
            })
        }
    }

    struct FailingSummarizer;

    #[async_trait]
    impl Summarizer for FailingSummarizer {
        async fn summarize(
            &self,
            _tender: &Tender,
            _report: &EvaluationReport,
            _bids: &[Bid],
        ) -> Result<Narrative, SummarizerError> {
            Err(SummarizerError::Service("connection refused".to_string()))
        }
    }

    #[test]
    fn worked_example_scores_and_ranking() {
        let t = tender(100000.0);
        let a = bid(t.id, 90000.0, 30, true);
        let b = bid(t.id, 65000.0, 10, false);
        let report = deterministic_report(&t, &[a.clone(), b.clone()], Utc::now());

        let score_a = report.scores.iter().find(|s| s.bid_id == a.id).unwrap();
        let score_b = report.scores.iter().find(|s| s.bid_id == b.id).unwrap();
        assert_eq!(score_a.price_score, 72.22);
        assert_eq!(score_b.price_score, 100.0);
        assert_eq!(score_a.delivery_score, 70.0);
        assert_eq!(score_b.delivery_score, 90.0);
        assert_eq!(score_a.docs_score, 100.0);
        assert_eq!(score_b.docs_score, 40.0);
        assert_eq!(score_a.weighted_score, 80.11);
        assert_eq!(score_b.weighted_score, 80.0);

        assert_eq!(report.ranking[0].bid_id, a.id);
        assert_eq!(report.ranking[0].position, 1);
        assert_eq!(report.ranking[1].bid_id, b.id);

        // B carries the abnormally-low flag (35.0%) and the missing
        // financial envelope flag; A carries nothing.
        let b_risks: Vec<_> = report.risks.iter().filter(|r| r.bid_id == b.id).collect();
        assert_eq!(b_risks.len(), 2);
        assert!(b_risks.iter().any(|r| r.risk.contains("35.0%")));
        assert!(b_risks.iter().any(|r| r.risk.contains("Financial envelope")));
        assert!(report.risks.iter().all(|r| r.bid_id != a.id));

        let stats = report.statistics.unwrap();
        assert_eq!(stats.average_amount, 77500.0);
        assert_eq!(stats.median_amount, 77500.0);
        assert_eq!(stats.amount_range, 25000.0);

        // top-ranked bidder is named in the recommendation
        assert!(report.recommendation.contains(&a.id.to_string()));
    }

    #[test]
    fn ten_percent_below_estimate_is_not_flagged() {
        let t = tender(100000.0);
        let a = bid(t.id, 90000.0, 30, true);
        let report = deterministic_report(&t, &[a], Utc::now());
        assert!(report.risks.is_empty());
    }

    #[test]
    fn ties_keep_input_order() {
        let t = tender(0.0);
        let a = bid(t.id, 50000.0, 20, true);
        let b = bid(t.id, 50000.0, 20, true);
        let report = deterministic_report(&t, &[a.clone(), b.clone()], Utc::now());
        assert_eq!(report.ranking[0].bid_id, a.id);
        assert_eq!(report.ranking[1].bid_id, b.id);
    }

    #[test]
    fn drafts_and_withdrawn_bids_are_invisible() {
        let t = tender(100000.0);
        let mut draft = bid(t.id, 10.0, 1, true);
        draft.status = BidStatus::Draft;
        let mut withdrawn = bid(t.id, 20.0, 1, true);
        withdrawn.status = BidStatus::Withdrawn;
        let eligible: Vec<Bid> = [draft, withdrawn]
            .iter()
            .filter(|b| b.status.is_submitted_or_later())
            .cloned()
            .collect();
        let report = deterministic_report(&t, &eligible, Utc::now());
        assert!(report.ranking.is_empty());
        assert!(report.statistics.is_none());
        assert!(report.summary.contains("No submitted bids"));
    }

    #[tokio::test]
    async fn noop_summarizer_sets_fallback_reason() {
        let t = tender(100000.0);
        let bids = vec![bid(t.id, 90000.0, 30, true)];
        let clock = Arc::new(ManualClock::fixed(
            Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
        ));
        let engine = EvaluationEngine::new(Arc::new(NoopSummarizer), clock);
        let report = engine.evaluate(&t, &bids).await;
        assert!(report.fallback_reason.is_some());
        assert!(!report.summary.is_empty());
        assert_eq!(
            report.generated_at,
            Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn narrative_failure_degrades_gracefully() {
        let t = tender(100000.0);
        let bids = vec![bid(t.id, 90000.0, 30, true)];
        let engine = EvaluationEngine::new(Arc::new(FailingSummarizer), Arc::new(SystemClock));
        let report = engine.evaluate(&t, &bids).await;
        assert_eq!(report.ranking.len(), 1);
        assert!(report
            .fallback_reason
            .as_deref()
            .unwrap()
            .contains("connection refused"));
    }

    #[tokio::test]
    async fn narrative_success_overlays_text_only() {
        let t = tender(100000.0);
        let bids = vec![bid(t.id, 65000.0, 10, false)];
        let engine = EvaluationEngine::new(Arc::new(FixedNarrative), Arc::new(SystemClock));
        let report = engine.evaluate(&t, &bids).await;
        assert_eq!(report.summary, "Narrative summary");
        assert_eq!(report.recommendation, "Narrative recommendation");
        assert!(report.fallback_reason.is_none());
        // deterministic scores and risks survive the overlay
        assert_eq!(report.scores.len(), 1);
        assert_eq!(report.risks.len(), 2);
    }

    #[tokio::test]
    async fn empty_bid_set_skips_augmentation() {
        let t = tender(100000.0);
        let engine = EvaluationEngine::new(Arc::new(FailingSummarizer), Arc::new(SystemClock));
        let report = engine.evaluate(&t, &[]).await;
        assert!(report.fallback_reason.is_none());
        assert!(report.summary.contains("No submitted bids"));
    }
}
