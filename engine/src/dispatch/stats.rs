use std::{
    sync::{
        Arc, Condvar, Mutex, PoisonError,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
    time::Duration,
};

/// Live counters shared between the dispatcher, its workers and the host.
#[derive(Default)]
pub struct DispatcherStats {
    pending: AtomicUsize,
    in_flight: AtomicUsize,
    free_buffers: AtomicUsize,
    scheduled: AtomicU64,
    executed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,

    outstanding: Mutex<usize>,
    idle: Condvar,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DispatcherSnapshot {
    pub buffer_count: usize,
    pub pending: usize,
    pub in_flight: usize,
    pub free_buffers: usize,
    pub scheduled: u64,
    pub executed: u64,
    pub failed: u64,
    pub cancelled: u64,
}

impl DispatcherStats {
    pub fn new(buffer_count: usize) -> Self {
        let stats = DispatcherStats::default();
        stats.free_buffers.store(buffer_count, Ordering::Relaxed);
        stats
    }

    pub(crate) fn set_pending(&self, pending: usize) {
        self.pending.store(pending, Ordering::Relaxed);
    }

    pub(crate) fn set_free_buffers(&self, free: usize) {
        self.free_buffers.store(free, Ordering::Relaxed);
    }

    pub(crate) fn job_scheduled(&self) {
        self.scheduled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn job_started(&self) {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn job_finished(&self, failed: bool) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
        self.executed.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn jobs_cancelled(&self, count: usize) {
        self.cancelled.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn open_ticket(self: &Arc<Self>) -> WorkTicket {
        *self
            .outstanding
            .lock()
            .unwrap_or_else(PoisonError::into_inner) += 1;

        WorkTicket {
            stats: self.clone(),
        }
    }

    /// Returns `false` on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let outstanding = self
            .outstanding
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let (outstanding, _) = self
            .idle
            .wait_timeout_while(outstanding, timeout, |outstanding| *outstanding > 0)
            .unwrap_or_else(PoisonError::into_inner);

        *outstanding == 0
    }

    pub fn snapshot(&self, buffer_count: usize) -> DispatcherSnapshot {
        DispatcherSnapshot {
            buffer_count,
            pending: self.pending.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
            free_buffers: self.free_buffers.load(Ordering::Relaxed),
            scheduled: self.scheduled.load(Ordering::Relaxed),
            executed: self.executed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
        }
    }
}

pub(crate) struct WorkTicket {
    stats: Arc<DispatcherStats>,
}

impl Drop for WorkTicket {
    fn drop(&mut self) {
        let mut outstanding = self
            .stats
            .outstanding
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        *outstanding = outstanding.saturating_sub(1);
        if *outstanding == 0 {
            self.stats.idle.notify_all();
        }
    }
}
