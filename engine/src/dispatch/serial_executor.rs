use std::{
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle, ThreadId},
};

use crossbeam_channel::{Receiver, Sender};
use log::{debug, error};

use crate::dispatch::{error::DispatchError, panic_message};

pub type SerialTask<S> = Box<dyn FnOnce(&mut S) + Send>;

enum SerialCommand<S> {
    Run(SerialTask<S>),
    Close,
}

/// Cloneable sender side of a [`SerialExecutor`], usable from inside its own
/// tasks.
pub struct SerialHandle<S> {
    sender: Sender<SerialCommand<S>>,
    closed: Arc<AtomicBool>,
}

impl<S> Clone for SerialHandle<S> {
    fn clone(&self) -> Self {
        SerialHandle {
            sender: self.sender.clone(),
            closed: self.closed.clone(),
        }
    }
}

impl<S> SerialHandle<S> {
    /// Fails once the executor is closed, dropping `task` without running it.
    pub fn enqueue<F>(&self, task: F) -> Result<(), DispatchError>
    where
        F: FnOnce(&mut S) + Send + 'static,
    {
        if self.closed.load(Ordering::Acquire) {
            return Err(DispatchError::Closed);
        }

        self.sender
            .send(SerialCommand::Run(Box::new(task)))
            .map_err(|_| DispatchError::Closed)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Runs tasks one at a time, in submission order, on a dedicated thread that
/// exclusively owns the state `S`.
pub struct SerialExecutor<S> {
    name: String,
    handle: SerialHandle<S>,
    thread_id: ThreadId,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl<S: Send + 'static> SerialExecutor<S> {
    /// Starts the executor thread. `init` builds the owned state and receives a
    /// handle so the state can queue follow-up work onto itself.
    pub fn spawn<F>(name: &str, init: F) -> Result<Self, DispatchError>
    where
        F: FnOnce(SerialHandle<S>) -> S,
    {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let handle = SerialHandle {
            sender,
            closed: Arc::new(AtomicBool::new(false)),
        };

        let state = init(handle.clone());
        let thread_name = name.to_string();
        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run_tasks(&thread_name, state, receiver))
            .map_err(|source| DispatchError::SpawnThread {
                name: name.to_string(),
                source,
            })?;

        Ok(SerialExecutor {
            name: name.to_string(),
            handle,
            thread_id: thread.thread().id(),
            thread: Mutex::new(Some(thread)),
        })
    }
}

impl<S> SerialExecutor<S> {
    #[cfg(test)]
    pub(crate) fn handle(&self) -> SerialHandle<S> {
        self.handle.clone()
    }

    pub fn enqueue<F>(&self, task: F) -> Result<(), DispatchError>
    where
        F: FnOnce(&mut S) + Send + 'static,
    {
        self.handle.enqueue(task)
    }

    /// Must not be called from a task on this executor.
    #[cfg(test)]
    pub(crate) fn query<R, F>(&self, query: F) -> Result<R, DispatchError>
    where
        R: Send + 'static,
        F: FnOnce(&mut S) -> R + Send + 'static,
    {
        let (reply_sender, reply_receiver) = crossbeam_channel::bounded(1);
        self.enqueue(move |state| {
            let _ = reply_sender.send(query(state));
        })?;
        reply_receiver.recv().map_err(|_| DispatchError::Closed)
    }

    pub fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }

    /// Rejects new tasks, lets already queued tasks finish and joins the
    /// executor thread. Every caller returns only after the thread has stopped,
    /// except a task closing its own executor.
    pub fn close(&self) {
        if !self.handle.closed.swap(true, Ordering::AcqRel) {
            let _ = self.handle.sender.send(SerialCommand::Close);
        }

        if thread::current().id() == self.thread_id {
            // The loop exits after this task
            return;
        }

        // Held across the join so concurrent callers wait for it too
        let mut thread = self.thread.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(thread) = thread.take()
            && thread.join().is_err()
        {
            error!("The {} executor thread panicked", self.name);
        }
    }
}

impl<S> Drop for SerialExecutor<S> {
    fn drop(&mut self) {
        self.close();
    }
}

fn run_tasks<S>(name: &str, mut state: S, receiver: Receiver<SerialCommand<S>>) {
    for command in receiver.iter() {
        match command {
            SerialCommand::Run(task) => {
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| task(&mut state))) {
                    error!(
                        "Task on the {} executor panicked: {}",
                        name,
                        panic_message(payload.as_ref())
                    );
                }
            }
            SerialCommand::Close => break,
        }
    }

    debug!("{} executor stopped", name);
}
