//! Background computation of expensive word counts.
//!
//! Each asynchronous attribute owns one [`BackgroundCount`]: a worker thread,
//! a [`CancelToken`] the worker polls, and a result slot the worker fills
//! exactly once. A shared [`CountTracker`] tallies running workers and emits a
//! [`CountsChanged`] event when one finishes without being cancelled.
//!
//! Dropping a `BackgroundCount` cancels and joins its worker, so no worker
//! outlives the attribute that started it.
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::{self, JoinHandle};

use log::{debug, error};

/// A cloneable cooperative cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Clear the flag so the token can guard another run.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }
}

/// Emitted once per background count that completes without cancellation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountsChanged {
    pub task: String,
}

/// Process-wide tally of running background counts.
#[derive(Debug, Default)]
pub struct CountTracker {
    active: AtomicUsize,
    listener: Mutex<Option<Sender<CountsChanged>>>,
}

impl CountTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of background counts still running.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Replace the current listener and return the receiving end.
    pub fn subscribe(&self) -> Receiver<CountsChanged> {
        let (tx, rx) = mpsc::channel();
        if let Ok(mut listener) = self.listener.lock() {
            *listener = Some(tx);
        }
        rx
    }

    fn begin(&self) {
        self.active.fetch_add(1, Ordering::SeqCst);
    }

    fn finish(&self, event: Option<CountsChanged>) {
        self.active.fetch_sub(1, Ordering::SeqCst);
        let Some(event) = event else { return };
        if let Ok(listener) = self.listener.lock() {
            if let Some(tx) = listener.as_ref() {
                // A dropped receiver just means nobody is listening anymore.
                let _ = tx.send(event);
            }
        }
    }
}

/// Handle to one background count producing a `T`.
#[derive(Debug)]
pub struct BackgroundCount<T> {
    cancel: CancelToken,
    slot: Arc<OnceLock<T>>,
    handle: Option<JoinHandle<()>>,
}

impl<T: Send + Sync + 'static> BackgroundCount<T> {
    /// Start `task` on its own thread. The task receives the cancellation
    /// token and returns `None` when it stopped early.
    pub fn spawn<F>(tracker: &Arc<CountTracker>, name: impl Into<String>, task: F) -> Self
    where
        F: FnOnce(&CancelToken) -> Option<T> + Send + 'static,
    {
        let name = name.into();
        let cancel = CancelToken::new();
        let slot = Arc::new(OnceLock::new());
        tracker.begin();
        debug!("background count started: {}", name);

        let worker_cancel = cancel.clone();
        let worker_slot = Arc::clone(&slot);
        let worker_tracker = Arc::clone(tracker);
        let handle = thread::spawn(move || {
            let event = match task(&worker_cancel) {
                Some(value) if !worker_cancel.is_cancelled() => {
                    let _ = worker_slot.set(value);
                    debug!("background count finished: {}", name);
                    Some(CountsChanged { task: name })
                }
                _ => {
                    debug!("background count cancelled: {}", name);
                    None
                }
            };
            worker_tracker.finish(event);
        });

        Self {
            cancel,
            slot,
            handle: Some(handle),
        }
    }

    /// The computed value, once the worker has stored it.
    pub fn result(&self) -> Option<&T> {
        self.slot.get()
    }

    pub fn is_running(&self) -> bool {
        self.slot.get().is_none() && self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// True until a value is available.
    pub fn is_pending(&self) -> bool {
        self.slot.get().is_none()
    }

    /// Block until the worker exits.
    pub fn wait(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("background count worker panicked");
            }
        }
    }

    /// Signal cancellation and join the worker.
    pub fn stop(&mut self) {
        self.cancel.cancel();
        self.wait();
    }
}

impl<T> Drop for BackgroundCount<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
