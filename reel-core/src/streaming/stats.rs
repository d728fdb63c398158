//! Process-wide transfer counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use super::session::TransferOutcome;

/// Lock-free counters shared by every stream session.
#[derive(Debug, Default)]
pub struct StreamStats {
    active: AtomicU64,
    completed: AtomicU64,
    disconnected: AtomicU64,
    failed: AtomicU64,
    bytes_served: AtomicU64,
}

/// Point-in-time copy of [`StreamStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StreamStatsSnapshot {
    pub active_sessions: u64,
    pub completed_sessions: u64,
    pub disconnected_sessions: u64,
    pub failed_sessions: u64,
    pub bytes_served: u64,
}

impl StreamStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn session_started(&self) {
        self.active.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn bytes_sent(&self, count: u64) {
        self.bytes_served.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn session_finished(&self, outcome: TransferOutcome) {
        self.active.fetch_sub(1, Ordering::Relaxed);
        let counter = match outcome {
            TransferOutcome::Complete => &self.completed,
            TransferOutcome::Disconnected => &self.disconnected,
            TransferOutcome::Failed => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Copies the current counter values.
    pub fn snapshot(&self) -> StreamStatsSnapshot {
        StreamStatsSnapshot {
            active_sessions: self.active.load(Ordering::Relaxed),
            completed_sessions: self.completed.load(Ordering::Relaxed),
            disconnected_sessions: self.disconnected.load(Ordering::Relaxed),
            failed_sessions: self.failed.load(Ordering::Relaxed),
            bytes_served: self.bytes_served.load(Ordering::Relaxed),
        }
    }
}
