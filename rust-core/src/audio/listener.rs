//! Frame listener fan-out and error reporting hooks

use super::format::RawFrame;
use crate::error::ScopeError;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Receives raw PCM frames from a producer engine.
///
/// Called synchronously on the producer's worker thread, in production
/// order. Implementations must not block for long.
pub trait FrameListener: Send + Sync {
    fn on_frame(&self, frame: RawFrame);
}

impl<F> FrameListener for F
where
    F: Fn(RawFrame) + Send + Sync,
{
    fn on_frame(&self, frame: RawFrame) {
        self(frame)
    }
}

/// Callback invoked when a worker terminates on an error
pub type ErrorHook = Arc<dyn Fn(&ScopeError) + Send + Sync>;

/// Ordered subscription list owned by a producer
#[derive(Default)]
pub struct ListenerSet {
    listeners: RwLock<Vec<Arc<dyn FrameListener>>>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a listener; it is notified after all earlier ones
    pub fn add(&self, listener: Arc<dyn FrameListener>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    pub fn len(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver an owned copy of `frame` to every listener in order.
    ///
    /// Listeners run without the list locked, so one may register another;
    /// the newcomer is first called on the next frame.
    pub fn notify(&self, frame: &RawFrame) {
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in &listeners {
            listener.on_frame(frame.clone());
        }
    }
}

/// Terminal error slot plus an optional observer hook
#[derive(Default)]
pub(crate) struct ErrorSink {
    hook: RwLock<Option<ErrorHook>>,
    last: Mutex<Option<ScopeError>>,
}

impl ErrorSink {
    pub fn set_hook(&self, hook: Option<ErrorHook>) {
        *self.hook.write().unwrap_or_else(PoisonError::into_inner) = hook;
    }

    pub fn report(&self, err: ScopeError) {
        let hook = self
            .hook
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(hook) = hook {
            hook(&err);
        }
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = Some(err);
    }

    pub fn take_last(&self) -> Option<ScopeError> {
        self.last.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}
