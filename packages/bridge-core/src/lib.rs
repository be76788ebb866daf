//! # Platform Bridge
//!
//! Client-side bridge between application code and a native platform
//! service exposed through a C ABI: invoke native entry points, marshal
//! arguments and results across the boundary, and resolve asynchronous
//! operations that the native side reports later through one polled
//! message channel.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       PLATFORM BRIDGE MODULES                           │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐  ┌──────────────┐   │
//! │  │  Dispatch   │  │   Poller    │  │   Message   │  │  Callbacks   │   │
//! │  │             │  │             │  │             │  │              │   │
//! │  │ - Entry pts │  │ - Pop       │  │ - Tag enum  │  │ - Completion │   │
//! │  │ - Handles   │  │ - Tick      │  │ - Envelope  │  │ - Notify     │   │
//! │  │ - Pending   │  │ - Stale     │  │ - Extract   │  │              │   │
//! │  └──────┬──────┘  └──────┬──────┘  └──────┬──────┘  └──────┬───────┘   │
//! │         │                │                │                │           │
//! │         └────────────────┴────────────────┴────────────────┘           │
//! │                                   │                                     │
//! │  ┌─────────────┐  ┌─────────────┐ │ ┌─────────────────────────────────┐│
//! │  │   Codec     │  │   Guard     │ │ │           Native                ││
//! │  │             │  │             │ │ │                                 ││
//! │  │ - Strings   │  │ - Alloc     │◄┘ │ - NativeApi seam               ││
//! │  │ - Key-value │  │ - Arg scope │   │ - repr(C) raw types            ││
//! │  │ - Time/DS   │  │ - Owned str │   │ - Linked / Simulated           ││
//! │  └─────────────┘  └─────────────┘   └─────────────────────────────────┘│
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Hierarchy
//!
//! - [`error`] - Error types for the entire library
//! - [`config`] - Immutable bridge configuration
//! - [`native`] - The native ABI seam and raw types
//! - [`guard`] - Scoped ownership of native allocations
//! - [`codec`] - Host ⇄ native value conversions
//! - [`dispatch`] - Entry points, request handles, pending table
//! - [`poller`] - Non-blocking message channel drain
//! - [`message`] - Message envelope decoding
//! - [`callbacks`] - Completion and notification routing
//! - [`sim`] - In-process simulated platform
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use platform_bridge::sim::{SimMessage, SimulatedPlatform};
//! use platform_bridge::{AsyncEntryPoint, BridgeConfig, MessageType, PlatformBridge};
//!
//! const GET_TOKEN: AsyncEntryPoint = AsyncEntryPoint::new("User", "GetAccessToken");
//!
//! let sim = Arc::new(SimulatedPlatform::new());
//! sim.register_async("plat_User_GetAccessToken", |call| {
//!     Some(SimMessage::for_request(call.handle, MessageType::UserGetAccessToken).text("tok"))
//! });
//!
//! let bridge = PlatformBridge::new(sim, BridgeConfig::default())?;
//! let handle = bridge.dispatch(&GET_TOKEN, &[])?;
//!
//! let message = bridge.poll().expect("completion queued");
//! assert_eq!(message.request_handle()?, handle);
//! let token: String = message.extract()?;
//! message.release();
//! assert_eq!(token, "tok");
//! # Ok::<(), platform_bridge::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

pub mod bridge;
pub mod callbacks;
pub mod codec;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod guard;
pub mod message;
pub mod native;
pub mod poller;
pub mod sim;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use bridge::PlatformBridge;
pub use callbacks::CallbackRouter;
pub use codec::{DataStore, KeyValue, KeyValueBag};
pub use config::{BridgeConfig, TextPolicy};
pub use dispatch::{
    Arg, AsyncEntryPoint, PendingRequest, RequestHandle, SyncEntryPoint, SyncValue,
};
pub use error::{Error, Result};
pub use message::{Envelope, ErrorRecord, Extract, Message, MessageType, Payload, PayloadShape};
pub use native::NativeApi;

// ============================================================================
// VERSION INFO
// ============================================================================

/// Returns the version of the platform bridge
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
