//! # Message Queue Poller
//!
//! Non-blocking drain of the native message channel. Each call pops at most
//! one message, advances the poll tick, and clears the correlated request
//! from the pending table. Messages are delivered in native pop order; no
//! ordering relative to dispatch is assumed.

use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::TextPolicy;
use crate::dispatch::PendingTable;
use crate::message::Message;
use crate::native::NativeApi;

/// Pops messages and keeps the pending table in step
pub struct MessagePoller {
    api: Arc<dyn NativeApi>,
    policy: TextPolicy,
    stale_after_polls: u64,
    tick: AtomicU64,
}

impl MessagePoller {
    /// Create a poller over `api`
    pub fn new(api: Arc<dyn NativeApi>, policy: TextPolicy, stale_after_polls: u64) -> Self {
        Self {
            api,
            policy,
            stale_after_polls,
            tick: AtomicU64::new(0),
        }
    }

    /// Number of polls so far
    pub fn tick(&self) -> u64 {
        self.tick.load(Ordering::Acquire)
    }

    /// Pop the next message, if any.
    ///
    /// An empty channel is `None`, not an error. Every poll, empty or not,
    /// counts toward the stale threshold.
    pub fn poll(&self, pending: &PendingTable) -> Option<Message> {
        let now = self.tick.fetch_add(1, Ordering::AcqRel) + 1;
        pending.report_stale(now, self.stale_after_polls);

        let raw = NonNull::new(self.api.pop_message())?;
        // SAFETY: `raw` was just popped from `api` and is owned by nobody else.
        let message = unsafe { Message::from_raw(self.api.clone(), raw, self.policy) };

        // Only request-origin tags correlate; a notification's id is ignored.
        match message.request_handle().ok() {
            Some(handle) => match pending.complete(handle) {
                Some(request) => tracing::debug!(
                    handle = handle.get(),
                    entry = %request.symbol,
                    waited_polls = now.saturating_sub(request.issued_at_tick),
                    "completion popped"
                ),
                None => tracing::debug!(
                    handle = handle.get(),
                    "popped message for an untracked request"
                ),
            },
            None => tracing::debug!(
                tag = message.raw_tag(),
                request_id = message.raw_request_id(),
                "uncorrelated message popped"
            ),
        }
        Some(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{AsyncEntryPoint, PendingRequest, RequestDispatcher, RequestHandle};
    use crate::message::MessageType;
    use crate::sim::{SimMessage, SimulatedPlatform};

    fn setup() -> (Arc<SimulatedPlatform>, MessagePoller, PendingTable) {
        let sim = Arc::new(SimulatedPlatform::new());
        let poller = MessagePoller::new(sim.clone(), TextPolicy::Strict, 3);
        (sim, poller, PendingTable::new())
    }

    #[test]
    fn test_empty_channel_is_none() {
        let (sim, poller, pending) = setup();
        for _ in 0..5 {
            assert!(poller.poll(&pending).is_none());
        }
        assert_eq!(poller.tick(), 5);
        assert_eq!(sim.counters().pops, 5);
    }

    #[test]
    fn test_pop_completes_pending_handle() {
        let (sim, poller, pending) = setup();
        let entry = AsyncEntryPoint::new("Room", "Leave");
        let handle = RequestDispatcher::new(&*sim, "plat", TextPolicy::Strict, &pending)
            .dispatch(&entry, &[], poller.tick())
            .unwrap();
        sim.inject(SimMessage::response(handle, MessageType::RoomLeave));

        let msg = poller.poll(&pending).unwrap();
        assert_eq!(msg.request_handle().unwrap(), handle);
        assert!(pending.is_empty());
    }

    #[test]
    fn test_notification_leaves_pending_untouched() {
        let (sim, poller, pending) = setup();
        let handle = RequestHandle::from_native(9).unwrap();
        pending
            .insert(PendingRequest {
                handle,
                symbol: "plat_Room_Join".into(),
                issued_at_tick: 0,
            })
            .unwrap();
        sim.inject(
            SimMessage::notification(MessageType::NotificationVoipSystemVoipState).text("muted"),
        );
        poller.poll(&pending).unwrap().release();
        assert!(pending.contains(handle));
    }

    #[test]
    fn test_notification_with_colliding_id_keeps_request_pending() {
        let (sim, poller, pending) = setup();
        let entry = AsyncEntryPoint::new("Room", "Leave");
        let handle = RequestDispatcher::new(&*sim, "plat", TextPolicy::Strict, &pending)
            .dispatch(&entry, &[], poller.tick())
            .unwrap();
        sim.inject(SimMessage::raw(MessageType::NotificationRoomUpdate.tag(), handle.get()));

        let msg = poller.poll(&pending).unwrap();
        assert!(msg.request_handle().is_err());
        msg.release();
        assert!(pending.contains(handle));

        sim.inject(SimMessage::response(handle, MessageType::RoomLeave));
        poller.poll(&pending).unwrap().release();
        assert!(pending.is_empty());
    }

    #[test]
    fn test_unknown_tag_leaves_pending_untouched() {
        let (sim, poller, pending) = setup();
        let entry = AsyncEntryPoint::new("Room", "Leave");
        let handle = RequestDispatcher::new(&*sim, "plat", TextPolicy::Strict, &pending)
            .dispatch(&entry, &[], poller.tick())
            .unwrap();
        sim.inject(SimMessage::raw(0x0000_0001, handle.get()));
        poller.poll(&pending).unwrap().release();
        assert!(pending.contains(handle));
    }

    #[test]
    fn test_forgotten_handle_becomes_stale() {
        let (_sim, poller, pending) = setup();
        let handle = RequestHandle::from_native(4).unwrap();
        pending
            .insert(PendingRequest {
                handle,
                symbol: "plat_User_GetUserProof".into(),
                issued_at_tick: poller.tick(),
            })
            .unwrap();
        for _ in 0..3 {
            poller.poll(&pending);
        }
        let stale = pending.stale(poller.tick(), 3);
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].handle, handle);
    }
}
