//! Mutual exclusion for export jobs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Busy flag shared by every export kind. At most one export runs at a
/// time; a concurrent attempt fails fast instead of queueing, since the
/// operator is looking at a progress dialog either way.
#[derive(Clone, Default)]
pub struct ExportGate {
    busy: Arc<AtomicBool>,
}

impl ExportGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the gate if it is free. The ticket releases it on drop, so
    /// early returns and panics cannot leave the gate stuck.
    pub fn try_acquire(&self) -> Option<ExportTicket> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ExportTicket { busy: Arc::clone(&self.busy) })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

#[must_use = "dropping the ticket releases the gate"]
pub struct ExportTicket {
    busy: Arc<AtomicBool>,
}

impl Drop for ExportTicket {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}
