use std::marker::PhantomData;

use crate::{dispatch::upload_queue::UploadQueue, geometry::GeometryBuffer};

/// Scheduling key for marker jobs. Lower values run first; jobs with equal
/// priority run in the order they were scheduled.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobPriority(pub u64);

impl JobPriority {
    pub const HIGHEST: JobPriority = JobPriority(0);
    pub const LOWEST: JobPriority = JobPriority(u64::MAX);
}

/// `execute` gets a clean buffer that returns to the pool as soon as it
/// returns, so results must be copied out with [`GeometryBuffer::finish`].
/// Either `execute` or `cancel` is called, never both.
pub trait MarkerJob<C>: Send + 'static {
    fn priority(&self) -> JobPriority;

    fn execute(
        &mut self,
        buffer: &mut GeometryBuffer,
        uploads: &UploadQueue<C>,
    ) -> anyhow::Result<()>;

    fn cancel(&mut self) {}
}

pub type BoxedJob<C> = Box<dyn MarkerJob<C>>;

/// Adapts a closure into a [`MarkerJob`].
pub struct FnJob<C, F> {
    priority: JobPriority,
    run: Option<F>,
    on_cancel: Option<Box<dyn FnOnce() + Send>>,
    _context: PhantomData<fn(&mut C)>,
}

pub fn job_fn<C, F>(priority: JobPriority, run: F) -> FnJob<C, F>
where
    F: FnOnce(&mut GeometryBuffer, &UploadQueue<C>) -> anyhow::Result<()> + Send + 'static,
{
    FnJob {
        priority,
        run: Some(run),
        on_cancel: None,
        _context: PhantomData,
    }
}

impl<C, F> FnJob<C, F> {
    pub fn on_cancel(mut self, on_cancel: impl FnOnce() + Send + 'static) -> Self {
        self.on_cancel = Some(Box::new(on_cancel));
        self
    }
}

impl<C, F> MarkerJob<C> for FnJob<C, F>
where
    C: 'static,
    F: FnOnce(&mut GeometryBuffer, &UploadQueue<C>) -> anyhow::Result<()> + Send + 'static,
{
    fn priority(&self) -> JobPriority {
        self.priority
    }

    fn execute(
        &mut self,
        buffer: &mut GeometryBuffer,
        uploads: &UploadQueue<C>,
    ) -> anyhow::Result<()> {
        let run = self
            .run
            .take()
            .ok_or_else(|| anyhow::anyhow!("marker job was executed twice"))?;
        run(buffer, uploads)
    }

    fn cancel(&mut self) {
        self.run = None;
        if let Some(on_cancel) = self.on_cancel.take() {
            on_cancel();
        }
    }
}
