//! Lifecycle events
//!
//! In-process observer hooks fired around job and output saves, job cancellation and
//! proxied uploads. Listeners run synchronously in registration order. Events that
//! implement [`Cancellable`] can be vetoed by any listener setting `is_valid = false`;
//! the caller then abandons the operation.

use std::fmt;
use std::sync::Arc;

use crate::models::{Job, Output};

pub type Listener<E> = Arc<dyn Fn(&mut E) + Send + Sync>;

/// An event that listeners may veto.
pub trait Cancellable {
    fn is_valid(&self) -> bool;
}

/// Ordered list of listeners for one event type.
pub struct Hook<E> {
    listeners: Vec<Listener<E>>,
}

impl<E> Hook<E> {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    pub fn listen<F>(&mut self, listener: F)
    where
        F: Fn(&mut E) + Send + Sync + 'static,
    {
        self.listeners.push(Arc::new(listener));
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn trigger(&self, event: &mut E) {
        for listener in &self.listeners {
            listener(event);
        }
    }
}

impl<E: Cancellable> Hook<E> {
    /// Run every listener, then report whether the event is still valid.
    pub fn trigger_cancellable(&self, event: &mut E) -> bool {
        self.trigger(event);
        event.is_valid()
    }
}

impl<E> Default for Hook<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for Hook<E> {
    fn clone(&self) -> Self {
        Self {
            listeners: self.listeners.clone(),
        }
    }
}

impl<E> fmt::Debug for Hook<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct JobEvent {
    pub job: Job,
    pub is_new: bool,
    pub is_valid: bool,
}

impl JobEvent {
    pub fn new(job: Job, is_new: bool) -> Self {
        Self {
            job,
            is_new,
            is_valid: true,
        }
    }
}

impl Cancellable for JobEvent {
    fn is_valid(&self) -> bool {
        self.is_valid
    }
}

#[derive(Debug, Clone)]
pub struct OutputEvent {
    pub output: Output,
    pub is_new: bool,
    pub is_valid: bool,
}

impl OutputEvent {
    pub fn new(output: Output, is_new: bool) -> Self {
        Self {
            output,
            is_new,
            is_valid: true,
        }
    }
}

impl Cancellable for OutputEvent {
    fn is_valid(&self) -> bool {
        self.is_valid
    }
}

#[derive(Debug, Clone)]
pub struct CancelJobEvent {
    pub job: Job,
    pub is_valid: bool,
}

impl CancelJobEvent {
    pub fn new(job: Job) -> Self {
        Self {
            job,
            is_valid: true,
        }
    }
}

impl Cancellable for CancelJobEvent {
    fn is_valid(&self) -> bool {
        self.is_valid
    }
}

/// A file about to be written through the upload proxy.
#[derive(Debug, Clone)]
pub struct UploadEvent {
    pub volume: String,
    pub path: String,
    pub size: usize,
    pub is_valid: bool,
}

impl UploadEvent {
    pub fn new(volume: impl Into<String>, path: impl Into<String>, size: usize) -> Self {
        Self {
            volume: volume.into(),
            path: path.into(),
            size,
            is_valid: true,
        }
    }
}

impl Cancellable for UploadEvent {
    fn is_valid(&self) -> bool {
        self.is_valid
    }
}

/// All lifecycle hooks of the transcoding service.
#[derive(Debug, Clone, Default)]
pub struct TranscodingEvents {
    pub before_save_job: Hook<JobEvent>,
    pub after_save_job: Hook<JobEvent>,
    pub before_save_output: Hook<OutputEvent>,
    pub after_save_output: Hook<OutputEvent>,
    pub before_cancel_job: Hook<CancelJobEvent>,
    pub after_cancel_job: Hook<CancelJobEvent>,
    pub before_upload: Hook<UploadEvent>,
    pub after_upload: Hook<UploadEvent>,
}

impl TranscodingEvents {
    pub fn new() -> Self {
        Self::default()
    }
}
