//! Lifecycle managers.
//!
//! Every workflow operation enters through the manager owning that entity:
//! authorization and validation first, the conditional status write last.
//! The award coordinator pairs a tender transition with the winning and
//! losing bid transitions as one atomic unit.

pub mod award;
pub mod bids;
pub mod sweep;
pub mod tenders;

pub use award::AwardCoordinator;
pub use bids::BidLifecycle;
pub use sweep::ExpirySweeper;
pub use tenders::TenderLifecycle;
