//! Draw coordination shared by every connection.
//!
//! Counts agencies that have finished uploading. Once the count reaches the
//! configured number of agencies the draw is considered performed and polls
//! start receiving winners. The count only ever grows.

use std::sync::{Mutex, PoisonError};
use tracing::info;

pub struct DrawCoordinator {
    /// Agencies that sent a finish request
    finished: Mutex<u32>,
    /// Quorum threshold
    agencies: u32,
}

impl DrawCoordinator {
    pub fn new(agencies: u32) -> Self {
        Self {
            finished: Mutex::new(0),
            agencies,
        }
    }

    /// Record one more finished agency.
    ///
    /// Returns `true` only for the call that brings the count to the quorum
    /// threshold, i.e. the moment the draw becomes visible to pollers.
    /// Repeated finishes from the same agency are not de-duplicated.
    pub fn record_finisher(&self) -> bool {
        let mut finished = self.finished.lock().unwrap_or_else(PoisonError::into_inner);
        *finished = finished.saturating_add(1);

        let drawn = *finished == self.agencies;
        if drawn {
            info!(agencies = self.agencies, "Draw performed");
        }
        drawn
    }

    pub fn quorum_reached(&self) -> bool {
        let finished = self.finished.lock().unwrap_or_else(PoisonError::into_inner);
        *finished >= self.agencies
    }

    pub fn finished(&self) -> u32 {
        *self.finished.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn agencies(&self) -> u32 {
        self.agencies
    }
}
