//! Domain entities and request/response DTOs.

pub mod bids;
pub mod evaluation;
pub mod tenders;

pub use bids::{Bid, BidStatus, DocumentRef, EmdProof};
pub use evaluation::EvaluationReport;
pub use tenders::{Tender, TenderStatus};
