//! # Platform Bridge
//!
//! The facade application code holds: one native platform, one immutable
//! configuration, one pending table.
//!
//! ## Lifecycle
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        BRIDGE LIFECYCLE                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  1. Build                                                               │
//! │     PlatformBridge::new(api, config) ──► config.validate()              │
//! │            │                                                            │
//! │            ▼                                                            │
//! │  2. Install (optional)                                                  │
//! │     bridge.install() ──► process-wide instance, set once                │
//! │            │                                                            │
//! │            ▼                                                            │
//! │  3. Every frame                                                         │
//! │     dispatch(..) ──► RequestHandle   (recorded as pending)              │
//! │     poll()       ──► Option<Message> (pending entry cleared)            │
//! │     message.decode() / extract() ──► release()                          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::config::BridgeConfig;
use crate::dispatch::{
    Arg, AsyncEntryPoint, PendingRequest, PendingTable, RequestDispatcher, RequestHandle,
    SyncEntryPoint, SyncValue,
};
use crate::error::{Error, Result};
use crate::message::Message;
use crate::native::NativeApi;
use crate::poller::MessagePoller;

/// Process-wide bridge
static BRIDGE_INSTANCE: OnceCell<PlatformBridge> = OnceCell::new();

/// Client-side bridge to the native platform service
pub struct PlatformBridge {
    api: Arc<dyn NativeApi>,
    config: BridgeConfig,
    pending: PendingTable,
    poller: MessagePoller,
}

impl PlatformBridge {
    /// Build a bridge over `api`. The configuration is validated once and
    /// never changes afterwards.
    pub fn new(api: Arc<dyn NativeApi>, config: BridgeConfig) -> Result<Self> {
        config.validate()?;
        tracing::debug!(
            namespace = %config.namespace,
            text_policy = ?config.text_policy,
            stale_after_polls = config.stale_after_polls,
            "platform bridge created"
        );
        let poller = MessagePoller::new(api.clone(), config.text_policy, config.stale_after_polls);
        Ok(Self {
            api,
            config,
            pending: PendingTable::new(),
            poller,
        })
    }

    /// Store this bridge as the process-wide instance
    pub fn install(self) -> Result<&'static PlatformBridge> {
        BRIDGE_INSTANCE
            .set(self)
            .map_err(|_| Error::AlreadyInitialized)?;
        tracing::info!("Platform bridge installed");
        BRIDGE_INSTANCE.get().ok_or(Error::NotInitialized)
    }

    /// Get the process-wide instance
    ///
    /// Returns an error if no bridge has been installed.
    pub fn instance() -> Result<&'static PlatformBridge> {
        BRIDGE_INSTANCE.get().ok_or(Error::NotInitialized)
    }

    /// Check if a process-wide instance exists
    pub fn is_installed() -> bool {
        BRIDGE_INSTANCE.get().is_some()
    }

    /// The configuration this bridge was built with
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    fn dispatcher(&self) -> RequestDispatcher<'_> {
        RequestDispatcher::new(
            &*self.api,
            &self.config.namespace,
            self.config.text_policy,
            &self.pending,
        )
    }

    /// Start an asynchronous native operation
    pub fn dispatch(&self, entry: &AsyncEntryPoint, args: &[Arg<'_>]) -> Result<RequestHandle> {
        self.dispatcher().dispatch(entry, args, self.poller.tick())
    }

    /// Call a synchronous native getter
    pub fn query(&self, entry: &SyncEntryPoint, args: &[Arg<'_>]) -> Result<SyncValue> {
        self.dispatcher().query(entry, args)
    }

    /// Pop the next ready message without blocking
    pub fn poll(&self) -> Option<Message> {
        self.poller.poll(&self.pending)
    }

    /// Stop tracking `handle`; returns whether it was in flight
    pub fn abandon(&self, handle: RequestHandle) -> bool {
        let abandoned = self.pending.abandon(handle);
        if abandoned {
            tracing::debug!(handle = handle.get(), "request abandoned");
        }
        abandoned
    }

    /// Number of requests awaiting their message
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Whether `handle` is still awaiting its message
    pub fn is_pending(&self, handle: RequestHandle) -> bool {
        self.pending.contains(handle)
    }

    /// Requests older than the configured stale threshold
    pub fn stale_requests(&self) -> Vec<PendingRequest> {
        self.pending
            .stale(self.poller.tick(), self.config.stale_after_polls)
    }

    /// Number of polls so far
    pub fn poll_tick(&self) -> u64 {
        self.poller.tick()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TextPolicy;
    use crate::message::{MessageType, Payload};
    use crate::sim::{SimMessage, SimulatedPlatform};

    const GET_PROOF: AsyncEntryPoint = AsyncEntryPoint::new("User", "GetUserProof");
    const CONSUME: AsyncEntryPoint = AsyncEntryPoint::new("Iap", "ConsumePurchase");

    fn bridge_with(config: BridgeConfig) -> (Arc<SimulatedPlatform>, PlatformBridge) {
        let sim = Arc::new(SimulatedPlatform::new());
        let bridge = PlatformBridge::new(sim.clone(), config).unwrap();
        (sim, bridge)
    }

    #[test]
    fn test_invalid_config_rejected() {
        let sim = Arc::new(SimulatedPlatform::new());
        let config = BridgeConfig {
            stale_after_polls: 0,
            ..Default::default()
        };
        assert!(matches!(
            PlatformBridge::new(sim, config),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_dispatch_then_typed_payload() {
        let (sim, bridge) = bridge_with(BridgeConfig::default());
        sim.register_async("plat_User_GetUserProof", |call| {
            Some(
                SimMessage::for_request(call.handle, MessageType::UserGetUserProof)
                    .text("nonce-5"),
            )
        });

        let handle = bridge.dispatch(&GET_PROOF, &[]).unwrap();
        assert!(bridge.is_pending(handle));

        let msg = bridge.poll().unwrap();
        assert_eq!(msg.request_handle().unwrap(), handle);
        assert!(!msg.is_error());
        let proof: String = msg.extract().unwrap();
        assert_eq!(proof, "nonce-5");
        msg.release();

        assert_eq!(sim.counters().message_frees, 1);
        assert_eq!(sim.double_frees(), 0);
        assert_eq!(bridge.pending_count(), 0);
        assert!(bridge.poll().is_none());
    }

    #[test]
    fn test_error_completion_carries_record() {
        let (sim, bridge) = bridge_with(BridgeConfig::default());
        sim.register_async("plat_Iap_ConsumePurchase", |call| {
            Some(
                SimMessage::for_request(call.handle, MessageType::IapConsumePurchase)
                    .error(7, "entitlement missing"),
            )
        });

        let handle = bridge.dispatch(&CONSUME, &[Arg::Str("sku-gold")]).unwrap();
        let msg = bridge.poll().unwrap();
        assert!(msg.is_error());
        let env = msg.decode().unwrap();
        assert_eq!(env.request, Some(handle));
        let record = env.error().unwrap();
        assert_eq!(record.code, 7);
        assert_eq!(record.message, "entitlement missing");
        assert_eq!(sim.counters().payload_reads, 0);
    }

    #[test]
    fn test_poll_is_absent_until_injection() {
        let (sim, bridge) = bridge_with(BridgeConfig::default());
        for _ in 0..10 {
            assert!(bridge.poll().is_none());
        }
        sim.inject(
            SimMessage::notification(MessageType::NotificationRoomInviteAccepted).text("r1"),
        );
        assert!(bridge.poll().is_some());
        assert!(bridge.poll().is_none());
        assert_eq!(sim.live_messages(), 0);
    }

    #[test]
    fn test_completions_in_any_order() {
        let (sim, bridge) = bridge_with(BridgeConfig::default());
        let first = bridge.dispatch(&GET_PROOF, &[]).unwrap();
        let second = bridge.dispatch(&GET_PROOF, &[]).unwrap();
        assert_ne!(first, second);

        sim.inject(SimMessage::response(second, MessageType::UserGetUserProof).text("b"));
        sim.inject(SimMessage::response(first, MessageType::UserGetUserProof).text("a"));

        let m = bridge.poll().unwrap();
        assert_eq!(m.request_handle().unwrap(), second);
        assert!(bridge.is_pending(first));
        drop(m);
        let m = bridge.poll().unwrap();
        assert_eq!(m.decode().unwrap().payload(), Some(&Payload::Text("a".into())));
        assert_eq!(bridge.pending_count(), 0);
    }

    #[test]
    fn test_abandoned_request_still_releases_message() {
        let (sim, bridge) = bridge_with(BridgeConfig::default());
        let handle = bridge.dispatch(&GET_PROOF, &[]).unwrap();
        assert!(bridge.abandon(handle));
        assert!(!bridge.is_pending(handle));

        sim.inject(SimMessage::response(handle, MessageType::UserGetUserProof).text("late"));
        bridge.poll().unwrap().release();
        assert_eq!(sim.live_messages(), 0);
    }

    #[test]
    fn test_stale_requests_observable() {
        let (_sim, bridge) = bridge_with(BridgeConfig {
            stale_after_polls: 2,
            text_policy: TextPolicy::Replace,
            ..Default::default()
        });
        let handle = bridge.dispatch(&GET_PROOF, &[]).unwrap();
        assert!(bridge.stale_requests().is_empty());
        bridge.poll();
        bridge.poll();
        assert_eq!(bridge.poll_tick(), 2);
        let stale = bridge.stale_requests();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].handle, handle);
        assert_eq!(stale[0].symbol, "plat_User_GetUserProof");
    }

    #[test]
    fn test_custom_namespace() {
        let (sim, bridge) = bridge_with(BridgeConfig {
            namespace: "ovr".into(),
            ..Default::default()
        });
        bridge.dispatch(&GET_PROOF, &[]).unwrap();
        assert_eq!(sim.calls()[0].symbol, "ovr_User_GetUserProof");
    }

    #[test]
    fn test_install_once() {
        let (_sim, bridge) = bridge_with(BridgeConfig::default());
        let installed = bridge.install().unwrap();
        assert!(PlatformBridge::is_installed());
        assert!(std::ptr::eq(installed, PlatformBridge::instance().unwrap()));

        let (_sim, again) = bridge_with(BridgeConfig::default());
        assert!(matches!(again.install(), Err(Error::AlreadyInitialized)));
    }
}
