//! Correlation of asynchronous create calls with their eventual outcome.
//!
//! A create call registers a handler under a fresh [`CallbackId`] before
//! anything else happens. The fabric and the instance then report on
//! independent channels and either may try to resolve the same id. The
//! registry hands the handler out under its lock exactly once; every later
//! resolution of that id is a no-op.

use std::collections::HashMap;
use std::fmt;

use fleet_core::CallbackId;
use fleet_store::Instance;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::{ControlError, Result};

/// Terminal result of an asynchronous create.
#[derive(Debug, Clone)]
pub enum CreateOutcome {
    /// The instance reported it accepts players.
    Success(Box<Instance>),
    /// The caller gave up waiting.
    Timeout(String),
    /// Provisioning failed.
    Error(String),
}

impl CreateOutcome {
    /// Short label for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::Timeout(_) => "timeout",
            Self::Error(_) => "error",
        }
    }
}

/// Handler invoked with the outcome of a create.
pub type CreateCallback = Box<dyn FnOnce(CreateOutcome) + Send>;

/// Build a handler that forwards the outcome into a channel.
///
/// Callers that want to block until a create finishes await the receiver.
#[must_use]
pub fn channel_callback() -> (CreateCallback, oneshot::Receiver<CreateOutcome>) {
    let (tx, rx) = oneshot::channel();
    let handler: CreateCallback = Box::new(move |outcome| {
        // The receiver may already be gone.
        let _ = tx.send(outcome);
    });
    (handler, rx)
}

/// Registry of pending create callbacks.
#[derive(Default)]
pub struct CallbackRegistry {
    pending: Mutex<HashMap<CallbackId, CreateCallback>>,
}

impl fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("pending", &self.pending.lock().len())
            .finish()
    }
}

impl CallbackRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Produce a fresh correlation id.
    #[must_use]
    pub fn generate_id(&self) -> CallbackId {
        CallbackId::generate()
    }

    /// Store `handler` under `id`.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::CallbackAlreadyRegistered` if `id` is pending.
    pub fn register(&self, id: CallbackId, handler: CreateCallback) -> Result<()> {
        let mut pending = self.pending.lock();
        if pending.contains_key(&id) {
            return Err(ControlError::CallbackAlreadyRegistered(id));
        }
        pending.insert(id, handler);
        Ok(())
    }

    /// Invoke and discard the handler for `id`.
    ///
    /// Returns `false` if nothing was pending under `id`.
    pub fn resolve(&self, id: &CallbackId, outcome: CreateOutcome) -> bool {
        let handler = self.pending.lock().remove(id);

        match handler {
            Some(handler) => {
                tracing::debug!(callback_id = %id, outcome = outcome.kind(), "Resolving create callback");
                handler(outcome);
                true
            }
            None => {
                tracing::debug!(callback_id = %id, outcome = outcome.kind(), "No pending callback");
                false
            }
        }
    }

    /// Whether a handler is waiting under `id`.
    #[must_use]
    pub fn is_pending(&self, id: &CallbackId) -> bool {
        self.pending.lock().contains_key(id)
    }

    /// Number of unresolved callbacks.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }
}
