//! Dedicated background worker: one OS thread per loaded session.
//!
//! Jobs carry the handle-free prompt and parameters; the worker resolves the
//! session through the registry on every job, so a job that arrives after an
//! unload sees a stale handle instead of freed memory.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;

use super::config::GenerationParams;
use super::error::{EngineError, NativeError, NativeErrorCode};
use super::registry::{SessionHandle, SessionRegistry};

/// Per-call cancel flag shared between the waiting side and the worker.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn flag(&self) -> &AtomicBool {
        &self.0
    }
}

pub(crate) struct Job {
    pub prompt: String,
    pub params: GenerationParams,
    pub cancel: CancelToken,
    pub reply: mpsc::Sender<String>,
}

pub(crate) struct SessionWorker {
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl SessionWorker {
    pub(crate) fn spawn(
        registry: Arc<SessionRegistry>,
        handle: SessionHandle,
    ) -> Result<Self, EngineError> {
        let (tx, rx) = mpsc::channel::<Job>();
        let thread = std::thread::Builder::new()
            .name(format!("sentinel-session-{}", handle.slot()))
            .spawn(move || worker_loop(&registry, handle, rx))
            .map_err(|e| EngineError::WorkerSpawn(e.to_string()))?;
        Ok(Self {
            sender: Mutex::new(Some(tx)),
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Queue a job. Returns false if the worker has stopped.
    pub(crate) fn submit(&self, job: Job) -> bool {
        match self.sender.lock().as_ref() {
            Some(tx) => tx.send(job).is_ok(),
            None => false,
        }
    }

    /// Close the job channel. The thread exits after its current job.
    ///
    /// The thread is detached rather than joined: a job stuck in native code
    /// must not block shutdown.
    pub(crate) fn stop(&self) {
        self.sender.lock().take();
        drop(self.thread.lock().take());
    }
}

fn worker_loop(registry: &SessionRegistry, handle: SessionHandle, jobs: mpsc::Receiver<Job>) {
    tracing::debug!(handle = %handle, "session worker started");
    while let Ok(job) = jobs.recv() {
        // A dropped reply sender reads as a dead worker to the caller, so
        // every job gets an answer.
        let reply = if job.cancel.is_cancelled() {
            NativeError::new(NativeErrorCode::Cancelled, "cancelled before start").to_wire()
        } else {
            match registry.lookup(handle) {
                Some(session) => session.execute(&job.prompt, &job.params, job.cancel.flag()),
                None => NativeError::new(NativeErrorCode::StaleHandle, "handle not in registry").to_wire(),
            }
        };
        // Receiver is gone when the caller timed out.
        let _ = job.reply.send(reply);
    }
    tracing::debug!(handle = %handle, "session worker stopped");
}
