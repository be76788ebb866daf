//! # Callback Router
//!
//! Routes popped messages to the code waiting for them: completions go to
//! the one-shot callback attached to their request handle, notifications to
//! the handler registered for their message type.

use std::collections::HashMap;

use crate::bridge::PlatformBridge;
use crate::dispatch::RequestHandle;
use crate::message::{Envelope, MessageType};

type Completion = Box<dyn FnOnce(Envelope)>;
type NotificationHandler = Box<dyn FnMut(Envelope)>;

/// Per-frame message router
#[derive(Default)]
pub struct CallbackRouter {
    completions: HashMap<RequestHandle, Completion>,
    notifications: HashMap<MessageType, NotificationHandler>,
}

impl CallbackRouter {
    /// Create a router with nothing registered
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `callback` once when the message for `handle` arrives
    pub fn on_complete(
        &mut self,
        handle: RequestHandle,
        callback: impl FnOnce(Envelope) + 'static,
    ) {
        self.completions.insert(handle, Box::new(callback));
    }

    /// Run `handler` for every notification of `message_type`
    pub fn on_notification(
        &mut self,
        message_type: MessageType,
        handler: impl FnMut(Envelope) + 'static,
    ) {
        self.notifications.insert(message_type, Box::new(handler));
    }

    /// Completion callbacks not yet fired
    pub fn waiting(&self) -> usize {
        self.completions.len()
    }

    /// Drain every ready message, route it, release it.
    ///
    /// Returns the number of messages popped. A message that fails to
    /// decode is logged and released. If its tag is a known completion, the
    /// callback for its handle is dropped without firing; otherwise nothing
    /// registered is touched.
    pub fn run_once(&mut self, bridge: &PlatformBridge) -> usize {
        let mut popped = 0;
        while let Some(message) = bridge.poll() {
            popped += 1;
            let handle = message.request_handle().ok();
            let decoded = message.decode();
            message.release();

            let envelope = match decoded {
                Ok(envelope) => envelope,
                Err(e) => {
                    tracing::warn!(error = %e, code = e.code(), "dropping undecodable message");
                    if let Some(handle) = handle {
                        self.completions.remove(&handle);
                    }
                    continue;
                }
            };

            match envelope.request {
                Some(handle) => match self.completions.remove(&handle) {
                    Some(callback) => callback(envelope),
                    None => tracing::debug!(handle = handle.get(), "completion with no callback"),
                },
                None => match self.notifications.get_mut(&envelope.message_type) {
                    Some(handler) => handler(envelope),
                    None => tracing::debug!(
                        message_type = envelope.message_type.symbol(),
                        "notification with no handler"
                    ),
                },
            }
        }
        popped
    }
}
