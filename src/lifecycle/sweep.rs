//! Expiry sweep task.
//!
//! A single background task drives the published -> expired transitions.
//! Each pass runs to completion before the next tick is awaited, so two
//! passes can never overlap; tenders are only touched through the store's
//! conditional writes.

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::lifecycle::TenderLifecycle;

pub struct ExpirySweeper {
    tenders: TenderLifecycle,
    interval: Duration,
}

impl ExpirySweeper {
    pub fn new(tenders: TenderLifecycle, interval: Duration) -> Self {
        Self { tenders, interval }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick fires immediately; skip it so startup does not race
            // store initialization.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match self.tenders.run_expiry_pass().await {
                    Ok(0) => debug!("Expiry sweep: nothing due"),
                    Ok(expired) => debug!(expired, "Expiry sweep finished"),
                    Err(e) => warn!(error = %e, "Expiry sweep failed"),
                }
            }
        })
    }
}
