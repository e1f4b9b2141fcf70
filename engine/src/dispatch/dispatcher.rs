use std::{
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    time::Duration,
};

use log::{debug, error, info, trace, warn};
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::{
    config::DispatcherConfig,
    dispatch::{
        error::DispatchError,
        job::{BoxedJob, JobPriority, MarkerJob},
        panic_message,
        pending_jobs::PendingJobs,
        serial_executor::{SerialExecutor, SerialHandle},
        stats::{DispatcherSnapshot, DispatcherStats, WorkTicket},
        upload_queue::{UploadError, UploadQueue, UploadReport},
    },
    geometry::{BufferPool, GeometryBuffer, PoolError},
};

// Dropping a job that never ran cancels it
struct TrackedJob<C: 'static> {
    job: Option<BoxedJob<C>>,
    _ticket: WorkTicket,
}

impl<C: 'static> TrackedJob<C> {
    fn run(&mut self, buffer: &mut GeometryBuffer, uploads: &UploadQueue<C>) -> bool {
        let Some(mut job) = self.job.take() else {
            return false;
        };

        match panic::catch_unwind(AssertUnwindSafe(|| job.execute(buffer, uploads))) {
            Ok(Ok(())) => false,
            Ok(Err(e)) if is_shutdown_rejection(&e) => {
                debug!("Marker job finished after shutdown, its upload was dropped");
                true
            }
            Ok(Err(e)) => {
                error!("Marker job failed: {e:#}");
                true
            }
            Err(payload) => {
                error!("Marker job panicked: {}", panic_message(payload.as_ref()));
                true
            }
        }
    }
}

fn is_shutdown_rejection(error: &anyhow::Error) -> bool {
    matches!(error.downcast_ref::<UploadError>(), Some(UploadError::Closed))
}

impl<C: 'static> Drop for TrackedJob<C> {
    fn drop(&mut self) {
        let Some(mut job) = self.job.take() else {
            return;
        };

        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| job.cancel())) {
            error!(
                "Marker job cancel hook panicked: {}",
                panic_message(payload.as_ref())
            );
        }
    }
}

struct DispatchState<C: 'static> {
    pool: BufferPool,
    pending: PendingJobs<TrackedJob<C>>,
    workers: Arc<ThreadPool>,
    uploads: UploadQueue<C>,
    serial: SerialHandle<DispatchState<C>>,
    stats: Arc<DispatcherStats>,
}

impl<C: 'static> DispatchState<C> {
    fn offer(&mut self, priority: JobPriority, job: TrackedJob<C>) {
        self.stats.job_scheduled();
        if self.pool.is_retired() {
            // Raced with shutdown, dropping cancels it
            self.stats.jobs_cancelled(1);
            drop(job);
            return;
        }

        self.pending.offer(priority, job);
        self.process();
    }

    #[profiling::function]
    fn process(&mut self) {
        while !self.pending.is_empty() {
            let Some(buffer) = self.pool.acquire() else {
                break;
            };

            let Some(job) = self.pending.poll() else {
                self.release(buffer);
                break;
            };

            self.launch(job, buffer);
        }

        if let Some(next) = self.pending.peek_priority() {
            trace!(
                "{} marker jobs waiting for a buffer, next at {:?}",
                self.pending.len(),
                next
            );
        }

        self.stats.set_pending(self.pending.len());
        self.stats.set_free_buffers(self.pool.free_count());
    }

    fn launch(&self, mut job: TrackedJob<C>, mut buffer: GeometryBuffer) {
        let uploads = self.uploads.clone();
        let serial = self.serial.clone();
        let stats = self.stats.clone();

        stats.job_started();
        self.workers.spawn(move || {
            let failed = job.run(&mut buffer, &uploads);
            stats.job_finished(failed);

            if serial
                .enqueue(move |state: &mut DispatchState<C>| state.finish(buffer, job))
                .is_err()
            {
                debug!("Marker dispatcher stopped while a job was running, dropping its buffer");
            }
        });
    }

    fn finish(&mut self, buffer: GeometryBuffer, job: TrackedJob<C>) {
        self.release(buffer);
        self.process();

        // Only counts as done once the buffer is back
        drop(job);
    }

    fn release(&mut self, buffer: GeometryBuffer) {
        match self.pool.release(buffer) {
            Ok(()) => {}
            Err(PoolError::Retired) => {
                debug!("Dropping a marker buffer returned after shutdown");
            }
            Err(e) => {
                error!("Failed to return a marker buffer to the pool: {e}");
            }
        }
    }

    fn cancel_pending(&mut self) -> usize {
        let cancelled = self.pending.drain();
        let count = cancelled.len();

        self.stats.jobs_cancelled(count);
        self.stats.set_pending(0);
        drop(cancelled);

        if count > 0 {
            debug!("Cancelled {count} pending marker jobs");
        }

        count
    }

    fn shut_down(&mut self) {
        if self.pool.is_retired() {
            return;
        }

        let cancelled = self.cancel_pending();
        let in_use = self.pool.checked_out_count();
        let dropped = self.pool.clear();
        self.stats.set_free_buffers(0);

        info!(
            "Marker dispatcher shut down, cancelled {} jobs and dropped {} of {} buffers ({} still in use)",
            cancelled,
            dropped,
            self.pool.capacity(),
            in_use
        );
    }
}

/// Runs marker jobs on a worker pool, handing each one a pooled geometry
/// buffer, and collects their GPU uploads for the render thread.
///
/// `C` is the render-thread context the upload closures receive.
pub struct MarkerDispatcher<C: 'static> {
    serial: SerialExecutor<DispatchState<C>>,
    uploads: UploadQueue<C>,
    stats: Arc<DispatcherStats>,
    buffer_count: usize,
}

impl<C: 'static> MarkerDispatcher<C> {
    pub fn new(workers: Arc<ThreadPool>, config: &DispatcherConfig) -> Result<Self, DispatchError> {
        let buffer_count = config.resolved_buffer_count();
        let buffer_capacity = config.buffer_capacity;
        let uploads = UploadQueue::new();
        let stats = Arc::new(DispatcherStats::new(buffer_count));

        let serial = {
            let uploads = uploads.clone();
            let stats = stats.clone();
            SerialExecutor::spawn("Marker dispatcher", move |serial| DispatchState {
                pool: BufferPool::new(buffer_count, buffer_capacity),
                pending: PendingJobs::new(),
                workers,
                uploads,
                serial,
                stats,
            })?
        };

        info!(
            "Marker dispatcher started with {} buffers of {} vertices",
            buffer_count, buffer_capacity
        );

        Ok(MarkerDispatcher {
            serial,
            uploads,
            stats,
            buffer_count,
        })
    }

    pub fn with_worker_threads(config: &DispatcherConfig) -> Result<Self, DispatchError> {
        let mut builder =
            ThreadPoolBuilder::new().thread_name(|index| format!("Marker worker {index}"));
        if let Some(threads) = config.worker_threads {
            builder = builder.num_threads(threads);
        }

        let workers = builder.build()?;
        Self::new(Arc::new(workers), config)
    }

    /// Never blocks.
    pub fn schedule(&self, job: impl MarkerJob<C>) -> Result<(), DispatchError> {
        self.schedule_boxed(Box::new(job))
    }

    pub fn schedule_boxed(&self, mut job: BoxedJob<C>) -> Result<(), DispatchError> {
        if self.serial.is_closed() {
            warn!("Marker job scheduled after the dispatcher was shut down, cancelling it");
            job.cancel();
            return Err(DispatchError::Closed);
        }

        let priority = job.priority();
        let job = TrackedJob {
            job: Some(job),
            _ticket: self.stats.open_ticket(),
        };

        self.serial
            .enqueue(move |state: &mut DispatchState<C>| state.offer(priority, job))
    }

    /// Call once per frame from the render thread.
    pub fn drain_uploads(&self, context: &mut C) -> UploadReport {
        self.uploads.drain(context)
    }

    pub fn uploads(&self) -> &UploadQueue<C> {
        &self.uploads
    }

    /// Cancels every job that has not started yet. Running jobs finish
    /// normally and the dispatcher keeps accepting new work.
    pub fn stop_updates(&self) {
        if self
            .serial
            .enqueue(|state: &mut DispatchState<C>| {
                state.cancel_pending();
            })
            .is_err()
        {
            debug!("stop_updates called on a marker dispatcher that is already shut down");
        }
    }

    /// Cancels pending jobs, drops the buffer pool and stops the coordination
    /// thread. Jobs that are already running finish, but their uploads are
    /// rejected. Safe to call more than once.
    pub fn kill(&self) {
        if self
            .serial
            .enqueue(|state: &mut DispatchState<C>| state.shut_down())
            .is_ok()
        {
            self.uploads.close();
        }

        // Joins even when another thread got here first
        self.serial.close();
    }

    pub fn is_shut_down(&self) -> bool {
        self.serial.is_closed()
    }

    pub fn buffer_count(&self) -> usize {
        self.buffer_count
    }

    pub fn stats(&self) -> DispatcherSnapshot {
        self.stats.snapshot(self.buffer_count)
    }

    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.stats.wait_idle(timeout)
    }
}

impl<C: 'static> Drop for MarkerDispatcher<C> {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashSet,
        sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
    };

    use crossbeam_channel::{Receiver, Sender};
    use glam::Vec3;

    use super::*;
    use crate::{
        dispatch::job::job_fn,
        geometry::{BufferId, Color},
    };

    type Target = Vec<u32>;

    const TIMEOUT: Duration = Duration::from_secs(10);

    fn dispatcher(buffers: usize, workers: usize) -> MarkerDispatcher<Target> {
        let config = DispatcherConfig {
            buffer_count: Some(buffers),
            worker_threads: Some(workers),
            ..Default::default()
        };
        MarkerDispatcher::with_worker_threads(&config).unwrap()
    }

    // Occupies a buffer until something is sent on the returned channel
    fn schedule_gate(dispatcher: &MarkerDispatcher<Target>) -> Sender<()> {
        let (gate_sender, gate_receiver): (Sender<()>, Receiver<()>) =
            crossbeam_channel::bounded(0);
        dispatcher
            .schedule(job_fn(
                JobPriority::HIGHEST,
                move |_buffer, _uploads: &UploadQueue<Target>| {
                    let _ = gate_receiver.recv();
                    Ok(())
                },
            ))
            .unwrap();
        gate_sender
    }

    fn counting_job(
        priority: u64,
        ran: &Arc<AtomicUsize>,
        cancelled: &Arc<AtomicUsize>,
    ) -> impl MarkerJob<Target> {
        let ran = ran.clone();
        let cancelled = cancelled.clone();
        job_fn(JobPriority(priority), move |_buffer, _uploads: &UploadQueue<Target>| {
            ran.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .on_cancel(move || {
            cancelled.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_jobs_start_in_priority_order() {
        let dispatcher = dispatcher(1, 1);
        let order = Arc::new(Mutex::new(Vec::new()));

        let gate = schedule_gate(&dispatcher);
        for priority in [3, 1, 2] {
            let order = order.clone();
            dispatcher
                .schedule(job_fn(
                    JobPriority(priority),
                    move |_buffer, _uploads: &UploadQueue<Target>| {
                        order.lock().unwrap().push(priority);
                        Ok(())
                    },
                ))
                .unwrap();
        }
        gate.send(()).unwrap();

        assert!(dispatcher.wait_idle(TIMEOUT));
        assert_eq!(*order.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_end_to_end_uploads() {
        let dispatcher = dispatcher(2, 2);
        let log = Arc::new(Mutex::new(Vec::new()));

        for id in 0..5u32 {
            let log = log.clone();
            dispatcher
                .schedule(job_fn(
                    JobPriority(7),
                    move |buffer, uploads: &UploadQueue<Target>| {
                        buffer.push_line(Vec3::ZERO, Vec3::splat(id as f32), Color::WHITE);
                        let mesh = buffer.finish();

                        // Keeps the upload order identical to the log order
                        let mut log = log.lock().unwrap();
                        log.push(id);
                        uploads.enqueue_upload(move |target: &mut Target| {
                            assert_eq!(mesh.vertex_count(), 2);
                            target.push(id);
                            Ok(())
                        })?;
                        Ok(())
                    },
                ))
                .unwrap();
        }

        assert!(dispatcher.wait_idle(TIMEOUT));

        let mut target = Vec::new();
        let report = dispatcher.drain_uploads(&mut target);
        assert_eq!(report.executed, 5);
        assert!(report.is_clean());
        assert_eq!(target, *log.lock().unwrap());

        let mut sorted = target.clone();
        sorted.sort();
        assert_eq!(sorted, vec![0, 1, 2, 3, 4]);

        // A second drain has nothing left to do
        assert_eq!(dispatcher.drain_uploads(&mut target).attempted(), 0);

        let stats = dispatcher.stats();
        assert_eq!(stats.scheduled, 5);
        assert_eq!(stats.executed, 5);
        assert_eq!(stats.in_flight, 0);
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.free_buffers, 2);
    }

    #[test]
    fn test_failing_jobs_release_their_buffer() {
        let dispatcher = dispatcher(1, 1);

        dispatcher
            .schedule(job_fn(
                JobPriority(1),
                |_buffer, _uploads: &UploadQueue<Target>| anyhow::bail!("no geometry"),
            ))
            .unwrap();
        dispatcher
            .schedule(job_fn(
                JobPriority(2),
                |_buffer, _uploads: &UploadQueue<Target>| panic!("job exploded"),
            ))
            .unwrap();
        dispatcher
            .schedule(job_fn(
                JobPriority(3),
                |_buffer, uploads: &UploadQueue<Target>| {
                    uploads.enqueue_upload(|target: &mut Target| {
                        target.push(3);
                        Ok(())
                    })?;
                    Ok(())
                },
            ))
            .unwrap();

        assert!(dispatcher.wait_idle(TIMEOUT));

        let stats = dispatcher.stats();
        assert_eq!(stats.executed, 3);
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.free_buffers, 1);

        let mut target = Vec::new();
        dispatcher.drain_uploads(&mut target);
        assert_eq!(target, vec![3]);
    }

    #[test]
    fn test_kill_cancels_pending_jobs() {
        let dispatcher = dispatcher(1, 1);
        let ran = Arc::new(AtomicUsize::new(0));
        let cancelled = Arc::new(AtomicUsize::new(0));

        let gate = schedule_gate(&dispatcher);
        for priority in 1..=3 {
            dispatcher
                .schedule(counting_job(priority, &ran, &cancelled))
                .unwrap();
        }

        dispatcher.kill();
        dispatcher.kill();
        assert!(dispatcher.is_shut_down());
        assert!(dispatcher.uploads().is_closed());
        assert_eq!(cancelled.load(Ordering::SeqCst), 3);

        let stats = dispatcher.stats();
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.free_buffers, 0);
        assert_eq!(stats.cancelled, 3);

        // Scheduling after kill is rejected and the job is cancelled
        let result = dispatcher.schedule(counting_job(0, &ran, &cancelled));
        assert!(matches!(result, Err(DispatchError::Closed)));
        assert_eq!(cancelled.load(Ordering::SeqCst), 4);

        // The in-flight job still runs to completion
        gate.send(()).unwrap();
        assert!(dispatcher.wait_idle(TIMEOUT));
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert_eq!(dispatcher.stats().executed, 1);
    }

    #[test]
    fn test_job_offered_after_pool_retired_is_cancelled() {
        let dispatcher = dispatcher(1, 1);
        let ran = Arc::new(AtomicUsize::new(0));
        let cancelled = Arc::new(AtomicUsize::new(0));

        // Same state a schedule call sees when it loses the race with kill
        dispatcher
            .serial
            .enqueue(|state: &mut DispatchState<Target>| {
                state.pool.clear();
            })
            .unwrap();
        dispatcher
            .schedule(counting_job(1, &ran, &cancelled))
            .unwrap();

        assert!(dispatcher.wait_idle(TIMEOUT));
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert_eq!(cancelled.load(Ordering::SeqCst), 1);

        let stats = dispatcher.stats();
        assert_eq!(stats.scheduled, 1);
        assert_eq!(stats.cancelled, 1);
        assert_eq!(stats.scheduled - stats.cancelled, stats.executed);
    }

    #[test]
    fn test_concurrent_kill_returns_after_shutdown() {
        let dispatcher = dispatcher(1, 1);
        let ran = Arc::new(AtomicUsize::new(0));
        let cancelled = Arc::new(AtomicUsize::new(0));

        let gate = schedule_gate(&dispatcher);
        for priority in 1..=3 {
            dispatcher
                .schedule(counting_job(priority, &ran, &cancelled))
                .unwrap();
        }

        std::thread::scope(|scope| {
            for _ in 0..2 {
                scope.spawn(|| {
                    dispatcher.kill();
                    assert_eq!(cancelled.load(Ordering::SeqCst), 3);
                    assert!(dispatcher.uploads().is_closed());
                });
            }
        });

        assert_eq!(dispatcher.stats().cancelled, 3);
        gate.send(()).unwrap();
        assert!(dispatcher.wait_idle(TIMEOUT));
    }

    #[test]
    fn test_rejected_upload_after_shutdown_is_recognized() {
        let uploads = UploadQueue::<Target>::new();
        uploads.close();

        let rejected = anyhow::Error::from(
            uploads
                .enqueue_upload(|_: &mut Target| Ok(()))
                .unwrap_err(),
        );
        assert!(is_shutdown_rejection(&rejected));
        assert!(is_shutdown_rejection(&rejected.context("region (0, 0, 0)")));
        assert!(!is_shutdown_rejection(&anyhow::anyhow!("no geometry")));
    }

    #[test]
    fn test_stop_updates_keeps_dispatcher_running() {
        let dispatcher = dispatcher(1, 1);
        let ran = Arc::new(AtomicUsize::new(0));
        let cancelled = Arc::new(AtomicUsize::new(0));

        let gate = schedule_gate(&dispatcher);
        for priority in 1..=3 {
            dispatcher
                .schedule(counting_job(priority, &ran, &cancelled))
                .unwrap();
        }

        dispatcher.stop_updates();
        dispatcher
            .schedule(counting_job(9, &ran, &cancelled))
            .unwrap();
        gate.send(()).unwrap();

        assert!(dispatcher.wait_idle(TIMEOUT));
        assert!(!dispatcher.is_shut_down());
        assert_eq!(cancelled.load(Ordering::SeqCst), 3);
        assert_eq!(ran.load(Ordering::SeqCst), 1);

        let stats = dispatcher.stats();
        assert_eq!(stats.cancelled, 3);
        assert_eq!(stats.executed, 2);
        assert_eq!(stats.free_buffers, 1);
    }

    #[test]
    fn test_drop_cancels_pending_jobs() {
        let ran = Arc::new(AtomicUsize::new(0));
        let cancelled = Arc::new(AtomicUsize::new(0));

        let gate = {
            let dispatcher = dispatcher(1, 1);
            let gate = schedule_gate(&dispatcher);
            dispatcher
                .schedule(counting_job(1, &ran, &cancelled))
                .unwrap();
            gate
        };

        assert_eq!(cancelled.load(Ordering::SeqCst), 1);
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        gate.send(()).unwrap();
    }

    #[test]
    fn test_buffers_are_never_shared() {
        let dispatcher = dispatcher(4, 4);
        let in_use = Arc::new(Mutex::new(HashSet::<BufferId>::new()));
        let runs = Arc::new((0..200).map(|_| AtomicUsize::new(0)).collect::<Vec<_>>());

        for id in 0..200u32 {
            let in_use = in_use.clone();
            let runs = runs.clone();
            dispatcher
                .schedule(job_fn(
                    JobPriority(u64::from(id % 7)),
                    move |buffer, uploads: &UploadQueue<Target>| {
                        assert!(!buffer.is_dirty(), "Buffer was not reset");
                        assert!(
                            in_use.lock().unwrap().insert(buffer.id()),
                            "Buffer handed to two jobs at once"
                        );

                        buffer.push_box_outline(Vec3::ZERO, Vec3::ONE, Color::RED);
                        runs[id as usize].fetch_add(1, Ordering::SeqCst);
                        let mesh = buffer.finish();

                        in_use.lock().unwrap().remove(&buffer.id());
                        uploads.enqueue_upload(move |target: &mut Target| {
                            target.push(mesh.vertex_count() as u32);
                            Ok(())
                        })?;
                        Ok(())
                    },
                ))
                .unwrap();
        }

        assert!(dispatcher.wait_idle(TIMEOUT));

        let stats = dispatcher.stats();
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.executed, 200);
        assert_eq!(stats.free_buffers, 4);
        assert!(
            runs.iter()
                .all(|count| count.load(Ordering::SeqCst) == 1)
        );

        let mut target = Vec::new();
        let report = dispatcher.drain_uploads(&mut target);
        assert_eq!(report.executed, 200);
        assert!(target.iter().all(|&count| count == 24));
    }
}
