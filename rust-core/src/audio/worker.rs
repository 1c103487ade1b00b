//! Producer worker threads with cooperative cancellation
//!
//! std has no `join(timeout)`, so the worker holds the sending end of a
//! channel for its whole lifetime. The channel disconnects on every exit
//! path, panics included, and `join_timeout` waits on that instead.

use crate::error::{Result, ScopeError};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Cancellation flag shared between an engine and one worker
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A spawned producer thread
pub(crate) struct Worker {
    name: String,
    cancel: CancelToken,
    done_rx: Receiver<()>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawn `body` on a named thread with a fresh cancel token
    pub fn spawn<F>(name: &str, body: F) -> Result<Self>
    where
        F: FnOnce(CancelToken) + Send + 'static,
    {
        let cancel = CancelToken::default();
        let token = cancel.clone();
        let (done_tx, done_rx) = bounded::<()>(0);

        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let _done = done_tx;
                body(token);
            })
            .map_err(|e| ScopeError::WorkerSpawn {
                name: name.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            name: name.to_string(),
            cancel,
            done_rx,
            handle: Some(handle),
        })
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// True once the thread body has returned
    pub fn is_finished(&self) -> bool {
        matches!(
            self.done_rx.recv_timeout(Duration::ZERO),
            Err(RecvTimeoutError::Disconnected)
        )
    }

    /// Wait up to `timeout` for the thread to exit.
    ///
    /// On timeout the thread is detached and false is returned.
    pub fn join_timeout(mut self, timeout: Duration) -> bool {
        match self.done_rx.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    "Worker '{}' did not exit within {:?}, detaching",
                    self.name,
                    timeout
                );
                false
            }
            _ => {
                if let Some(handle) = self.handle.take() {
                    if handle.join().is_err() {
                        tracing::error!("Worker '{}' panicked", self.name);
                    }
                }
                true
            }
        }
    }
}
