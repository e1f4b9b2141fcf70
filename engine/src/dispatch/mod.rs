//! Asynchronous marker geometry pipeline.
//!
//! Jobs are scheduled onto a [`MarkerDispatcher`], which hands each one a pooled
//! [`GeometryBuffer`](crate::geometry::GeometryBuffer) and runs it on a rayon
//! worker pool. Jobs push their finished geometry into the [`UploadQueue`],
//! and the render thread drains that queue once per frame.
//!
//! The pending job set and the buffer pool are owned by a single coordination
//! thread ([`SerialExecutor`]). Every change to them is a message to that
//! thread, including the "job finished, take the buffer back" continuation
//! sent from worker threads.

use std::any::Any;

pub mod dispatcher;
pub mod error;
pub mod job;
pub mod pending_jobs;
pub mod serial_executor;
pub mod stats;
pub mod upload_queue;

pub use dispatcher::MarkerDispatcher;
pub use error::DispatchError;
pub use job::{BoxedJob, FnJob, JobPriority, MarkerJob, job_fn};
pub use pending_jobs::PendingJobs;
pub use serial_executor::{SerialExecutor, SerialHandle};
pub use stats::{DispatcherSnapshot, DispatcherStats};
pub use upload_queue::{UploadError, UploadQueue, UploadReport};

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
