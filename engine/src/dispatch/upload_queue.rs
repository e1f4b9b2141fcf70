use std::{
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use crossbeam::queue::SegQueue;
use log::error;
use thiserror::Error;

use crate::dispatch::panic_message;

pub type UploadTask<C> = Box<dyn FnOnce(&mut C) -> anyhow::Result<()> + Send>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UploadError {
    #[error("the upload queue is closed")]
    Closed,
}

/// Outcome of one [`UploadQueue::drain`] call.
#[derive(Debug, Default)]
pub struct UploadReport {
    pub executed: usize,
    pub failures: Vec<anyhow::Error>,
}

impl UploadReport {
    pub fn attempted(&self) -> usize {
        self.executed + self.failures.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

struct UploadQueueInner<C> {
    tasks: SegQueue<UploadTask<C>>,
    closed: AtomicBool,
}

/// Any thread may enqueue. Only the thread owning `C` drains.
pub struct UploadQueue<C> {
    inner: Arc<UploadQueueInner<C>>,
}

impl<C> Clone for UploadQueue<C> {
    fn clone(&self) -> Self {
        UploadQueue {
            inner: self.inner.clone(),
        }
    }
}

impl<C> Default for UploadQueue<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> UploadQueue<C> {
    pub fn new() -> Self {
        UploadQueue {
            inner: Arc::new(UploadQueueInner {
                tasks: SegQueue::new(),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn enqueue_upload<F>(&self, task: F) -> Result<(), UploadError>
    where
        F: FnOnce(&mut C) -> anyhow::Result<()> + Send + 'static,
    {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(UploadError::Closed);
        }

        self.inner.tasks.push(Box::new(task));
        Ok(())
    }

    /// Runs uploads until the queue is empty, including ones enqueued during
    /// the drain.
    #[profiling::function]
    pub fn drain(&self, context: &mut C) -> UploadReport {
        let mut report = UploadReport::default();

        while let Some(task) = self.inner.tasks.pop() {
            match panic::catch_unwind(AssertUnwindSafe(|| task(&mut *context))) {
                Ok(Ok(())) => report.executed += 1,
                Ok(Err(e)) => {
                    error!("Marker upload failed: {e:#}");
                    report.failures.push(e);
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref()).to_string();
                    error!("Marker upload panicked: {message}");
                    report
                        .failures
                        .push(anyhow::anyhow!("upload task panicked: {message}"));
                }
            }
        }

        report
    }

    /// Stops accepting uploads. Uploads that are already queued can still be
    /// drained.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.inner.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.tasks.is_empty()
    }
}
