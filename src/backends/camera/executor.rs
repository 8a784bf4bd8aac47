// SPDX-License-Identifier: GPL-3.0-only

//! Background worker for hardware callbacks
//!
//! A single named thread draining a FIFO task queue. Hardware callbacks are
//! funnelled through it so they never run on the thread that issues user
//! intents.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

type Task = Box<dyn FnOnce() + Send + 'static>;

/// Executor lifecycle errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutorError {
    /// `start()` on an executor whose worker is still alive
    #[error("executor '{0}' is already running")]
    AlreadyRunning(String),
    /// Submission to an executor that was never started or has been stopped
    #[error("executor '{0}' is not running")]
    NotRunning(String),
    /// A blocking call issued from the worker itself would never return
    #[error("executor '{0}' cannot wait on itself from its own worker thread")]
    CalledFromWorker(String),
    /// The worker thread could not be spawned
    #[error("failed to spawn executor thread: {0}")]
    Spawn(String),
}

struct Worker {
    sender: mpsc::UnboundedSender<Task>,
    handle: JoinHandle<()>,
    thread_id: ThreadId,
}

/// Single-threaded FIFO executor with explicit start/stop
///
/// # Example
///
/// ```ignore
/// let executor = BackgroundExecutor::new("CameraBackground");
/// executor.start()?;
/// executor.submit(|| handle_callback())?;
/// executor.stop()?; // blocks until queued tasks ran and the thread exited
/// ```
pub struct BackgroundExecutor {
    name: String,
    worker: Mutex<Option<Worker>>,
}

impl BackgroundExecutor {
    /// Create a stopped executor; `start()` spawns the worker
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            worker: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, Option<Worker>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawn the worker thread
    ///
    /// Starting a running executor is a usage error; starting a stopped one
    /// spawns a fresh worker.
    pub fn start(&self) -> Result<(), ExecutorError> {
        let mut worker = self.lock();
        if worker.is_some() {
            return Err(ExecutorError::AlreadyRunning(self.name.clone()));
        }

        let (sender, mut receiver) = mpsc::unbounded_channel::<Task>();
        let name = self.name.clone();

        info!(name = %self.name, "Starting background executor");

        let handle = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || {
                debug!(name = %name, "Executor thread started");

                // Returns None once every sender is gone and the queue is empty
                while let Some(task) = receiver.blocking_recv() {
                    task();
                }

                info!(name = %name, "Executor thread exiting");
            })
            .map_err(|e| ExecutorError::Spawn(e.to_string()))?;

        *worker = Some(Worker {
            sender,
            thread_id: handle.thread().id(),
            handle,
        });
        Ok(())
    }

    /// Check if the worker is accepting tasks
    pub fn is_running(&self) -> bool {
        self.lock().is_some()
    }

    /// Check if the calling thread is this executor's worker
    pub fn is_worker_thread(&self) -> bool {
        self.lock()
            .as_ref()
            .is_some_and(|w| w.thread_id == thread::current().id())
    }

    /// Enqueue a task to run on the worker, after every task queued before it
    pub fn submit<F>(&self, task: F) -> Result<(), ExecutorError>
    where
        F: FnOnce() + Send + 'static,
    {
        let worker = self.lock();
        let Some(worker) = worker.as_ref() else {
            return Err(ExecutorError::NotRunning(self.name.clone()));
        };
        worker
            .sender
            .send(Box::new(task))
            .map_err(|_| ExecutorError::NotRunning(self.name.clone()))
    }

    /// Enqueue `task(value)` like [`submit`](Self::submit), but hand `value`
    /// back if the worker cannot take it
    ///
    /// The running check and the enqueue happen under one lock, so a
    /// concurrent `stop()` either sees the task queued or the caller gets
    /// `value` back.
    pub fn submit_with<T, F>(&self, value: T, task: F) -> Result<(), T>
    where
        T: Send + 'static,
        F: FnOnce(T) + Send + 'static,
    {
        let worker = self.lock();
        let Some(worker) = worker.as_ref() else {
            return Err(value);
        };

        let slot = Arc::new(Mutex::new(Some(value)));
        let queued = Arc::clone(&slot);
        let sent = worker.sender.send(Box::new(move || {
            if let Some(value) = take_slot(&queued) {
                task(value);
            }
        }));
        match sent {
            Ok(()) => Ok(()),
            // The worker died; the rejected task still holds its reference
            Err(rejected) => {
                drop(rejected);
                take_slot(&slot).map_or(Ok(()), Err)
            }
        }
    }

    /// Block until every task submitted before this call has run
    pub fn drain(&self) -> Result<(), ExecutorError> {
        if self.is_worker_thread() {
            return Err(ExecutorError::CalledFromWorker(self.name.clone()));
        }

        let (done_tx, done_rx) = oneshot::channel::<()>();
        self.submit(move || {
            let _ = done_tx.send(());
        })?;
        // The worker only drops the marker without running it if it panicked
        done_rx
            .blocking_recv()
            .map_err(|_| ExecutorError::NotRunning(self.name.clone()))
    }

    /// Stop accepting tasks, run the ones already queued, and wait for the
    /// worker thread to exit
    ///
    /// Stopping a stopped executor is a no-op. Must not be called from a task
    /// running on this executor.
    pub fn stop(&self) -> Result<(), ExecutorError> {
        let worker = {
            let mut guard = self.lock();
            let on_worker = match guard.as_ref() {
                None => return Ok(()),
                Some(w) => w.thread_id == thread::current().id(),
            };
            if on_worker {
                return Err(ExecutorError::CalledFromWorker(self.name.clone()));
            }
            guard.take()
        };

        if let Some(Worker { sender, handle, .. }) = worker {
            debug!(name = %self.name, "Stopping background executor");
            // Closing the queue lets the worker drain and fall out of its loop
            drop(sender);
            if let Err(e) = handle.join() {
                warn!(name = %self.name, "Executor thread panicked: {:?}", e);
            } else {
                debug!(name = %self.name, "Executor thread finished");
            }
        }
        Ok(())
    }
}

fn take_slot<T>(slot: &Mutex<Option<T>>) -> Option<T> {
    slot.lock().unwrap_or_else(PoisonError::into_inner).take()
}

impl Drop for BackgroundExecutor {
    fn drop(&mut self) {
        if self.is_running() {
            debug!(name = %self.name, "BackgroundExecutor dropped, stopping worker");
            if let Err(e) = self.stop() {
                warn!(name = %self.name, error = %e, "Executor dropped from its own worker");
            }
        }
    }
}

impl std::fmt::Debug for BackgroundExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundExecutor")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::time::Duration;

    #[test]
    fn test_tasks_run_in_fifo_order() {
        let executor = BackgroundExecutor::new("test-fifo");
        executor.start().unwrap();

        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..20 {
            let order = Arc::clone(&order);
            executor
                .submit(move || order.lock().unwrap().push(i))
                .unwrap();
        }
        executor.drain().unwrap();

        assert_eq!(*order.lock().unwrap(), (0..20).collect::<Vec<_>>());
        executor.stop().unwrap();
    }

    #[test]
    fn test_stop_drains_pending_tasks() {
        let executor = BackgroundExecutor::new("test-drain");
        executor.start().unwrap();

        let counter = Arc::new(AtomicU32::new(0));
        for _ in 0..5 {
            let counter = Arc::clone(&counter);
            executor
                .submit(move || {
                    thread::sleep(Duration::from_millis(10));
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }

        executor.stop().unwrap();
        // stop() returned, so the worker finished everything already queued
        assert_eq!(counter.load(Ordering::SeqCst), 5);
        assert!(!executor.is_running());
    }

    #[test]
    fn test_submit_after_stop_is_rejected() {
        let executor = BackgroundExecutor::new("test-stopped");
        assert!(matches!(
            executor.submit(|| {}),
            Err(ExecutorError::NotRunning(_))
        ));

        executor.start().unwrap();
        executor.stop().unwrap();
        assert!(matches!(
            executor.submit(|| {}),
            Err(ExecutorError::NotRunning(_))
        ));
        // Stopping twice is harmless
        executor.stop().unwrap();
    }

    #[test]
    fn test_rejected_value_is_handed_back() {
        let executor = BackgroundExecutor::new("test-handback");
        assert_eq!(executor.submit_with(7u32, |_| {}), Err(7));

        executor.start().unwrap();
        let seen = Arc::new(AtomicU32::new(0));
        {
            let seen = Arc::clone(&seen);
            executor
                .submit_with(9u32, move |value| seen.store(value, Ordering::SeqCst))
                .unwrap();
        }
        executor.stop().unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 9);

        assert_eq!(executor.submit_with(11u32, |_| {}), Err(11));
    }

    #[test]
    fn test_dead_worker_hands_value_back() {
        let executor = BackgroundExecutor::new("test-dead-worker");
        executor.start().unwrap();
        executor.submit(|| panic!("task panicked")).unwrap();

        // The marker is dropped with the queue once the worker unwinds
        assert!(executor.drain().is_err());
        assert_eq!(executor.submit_with("opened", |_| {}), Err("opened"));
        executor.stop().unwrap();
    }

    #[test]
    fn test_double_start_is_usage_error() {
        let executor = BackgroundExecutor::new("test-double-start");
        executor.start().unwrap();
        assert!(matches!(
            executor.start(),
            Err(ExecutorError::AlreadyRunning(_))
        ));
        executor.stop().unwrap();

        // A stopped executor can be started again
        executor.start().unwrap();
        assert!(executor.is_running());
        executor.stop().unwrap();
    }

    #[test]
    fn test_stop_from_worker_is_rejected() {
        let executor = Arc::new(BackgroundExecutor::new("test-self-stop"));
        executor.start().unwrap();

        let rejected = Arc::new(AtomicBool::new(false));
        {
            let executor_clone = Arc::clone(&executor);
            let rejected = Arc::clone(&rejected);
            executor
                .submit(move || {
                    let result = executor_clone.stop();
                    rejected.store(
                        matches!(result, Err(ExecutorError::CalledFromWorker(_))),
                        Ordering::SeqCst,
                    );
                })
                .unwrap();
        }
        executor.drain().unwrap();

        assert!(rejected.load(Ordering::SeqCst));
        assert!(executor.is_running());
        executor.stop().unwrap();
    }

    #[test]
    fn test_tasks_run_off_the_calling_thread() {
        let executor = BackgroundExecutor::new("CameraBackground");
        executor.start().unwrap();

        let caller = thread::current().id();
        let seen = Arc::new(Mutex::new(None));
        {
            let seen = Arc::clone(&seen);
            executor
                .submit(move || {
                    *seen.lock().unwrap() =
                        Some((thread::current().id(), thread::current().name().map(String::from)));
                })
                .unwrap();
        }
        executor.drain().unwrap();

        let (id, name) = seen.lock().unwrap().clone().unwrap();
        assert_ne!(id, caller);
        assert_eq!(name.as_deref(), Some("CameraBackground"));
        executor.stop().unwrap();
    }
}
