//! # Message Envelope Decoder
//!
//! A popped native message carries a type tag, an optional request id, an
//! error flag, and a payload that is only reachable through the accessor
//! matching its tag. The decoder reads the tag first and produces the
//! payload variant for that tag, so callers never pick an accessor
//! themselves.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          DECODE FLOW                                    │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Message ──► message_type()  ── unknown tag ──► Error::UnknownMessageType│
//! │                │                                                        │
//! │                ▼                                                        │
//! │           is_error()? ── yes ──► Envelope { outcome: Err(ErrorRecord) } │
//! │                │                 (payload accessors never called)       │
//! │                no                                                       │
//! │                ▼                                                        │
//! │           tag.shape() ──► the one accessor for that shape               │
//! │                │                                                        │
//! │                ▼                                                        │
//! │           Envelope { outcome: Ok(Payload::…) }                          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::codec::{decode_blob, decode_data_store, decode_string, decode_timestamp, DataStore};
use crate::config::TextPolicy;
use crate::dispatch::RequestHandle;
use crate::error::{Error, Result};
use crate::native::sys::RawMessage;
use crate::native::NativeApi;

// ============================================================================
// MESSAGE TYPES
// ============================================================================

/// Payload shape a message type carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadShape {
    /// No payload beyond success/failure
    Empty,
    /// A single string
    Text,
    /// A byte buffer with out-of-band length
    Blob,
    /// A string-to-string data store
    DataStore,
    /// A native timestamp
    Timestamp,
}

impl PayloadShape {
    /// Lowercase name for diagnostics
    pub fn name(self) -> &'static str {
        match self {
            PayloadShape::Empty => "empty",
            PayloadShape::Text => "text",
            PayloadShape::Blob => "blob",
            PayloadShape::DataStore => "data store",
            PayloadShape::Timestamp => "timestamp",
        }
    }
}

/// Where a message comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Origin {
    /// Completion of a request issued through the dispatcher
    Request,
    /// Pushed by the native side; carries no request handle
    Notification,
}

macro_rules! message_types {
    ($( $variant:ident = $tag:literal, $symbol:literal, $shape:ident, $origin:ident; )+) => {
        /// Closed enumeration of native message type tags
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
        pub enum MessageType {
            $(
                #[doc = $symbol]
                $variant,
            )+
        }

        impl MessageType {
            /// Every known message type
            pub const ALL: &'static [MessageType] = &[$(MessageType::$variant),+];

            /// Map a native tag to its message type
            pub fn from_tag(tag: u32) -> Result<Self> {
                match tag {
                    $( $tag => Ok(MessageType::$variant), )+
                    other => Err(Error::UnknownMessageType(other)),
                }
            }

            /// Native tag value
            pub fn tag(self) -> u32 {
                match self {
                    $( MessageType::$variant => $tag, )+
                }
            }

            /// Native `<Noun>_<Verb>` name
            pub fn symbol(self) -> &'static str {
                match self {
                    $( MessageType::$variant => $symbol, )+
                }
            }

            /// Payload shape carried on success
            pub fn shape(self) -> PayloadShape {
                match self {
                    $( MessageType::$variant => PayloadShape::$shape, )+
                }
            }

            /// Request completion or pushed notification
            pub fn origin(self) -> Origin {
                match self {
                    $( MessageType::$variant => Origin::$origin, )+
                }
            }
        }
    };
}

message_types! {
    AchievementsUnlock                = 0x593C_CBDD, "Achievements_Unlock",                 Empty,     Request;
    AchievementsAddCount              = 0x03E7_6231, "Achievements_AddCount",               Empty,     Request;
    ApplicationGetVersion             = 0x68B3_1E51, "Application_GetVersion",              Text,      Request;
    ApplicationLaunchOtherApp         = 0x54E2_D1F8, "Application_LaunchOtherApp",          Text,      Request;
    ChallengesJoin                    = 0x21F6_5768, "Challenges_Join",                     DataStore, Request;
    ChallengesLeave                   = 0x2963_FA0D, "Challenges_Leave",                    Empty,     Request;
    CloudStorageDelete                = 0x2E6D_7F2C, "CloudStorage_Delete",                 Empty,     Request;
    CloudStorageLoad                  = 0x40A2_668F, "CloudStorage_Load",                   Blob,      Request;
    CloudStorageSave                  = 0x4BBB_5C2E, "CloudStorage_Save",                   Empty,     Request;
    EntitlementGetIsViewerEntitled    = 0x186B_58B1, "Entitlement_GetIsViewerEntitled",     Empty,     Request;
    IapConsumePurchase                = 0x1FBB_72D9, "Iap_ConsumePurchase",                 Empty,     Request;
    IapLaunchCheckoutFlow             = 0x3F9B_0D0D, "Iap_LaunchCheckoutFlow",              Text,      Request;
    LeaderboardWriteEntry             = 0x117F_C8FE, "Leaderboard_WriteEntry",              Empty,     Request;
    LivestreamingStartStream          = 0x501B_3A1C, "Livestreaming_StartStream",           Empty,     Request;
    LivestreamingStopStream           = 0x44E4_0DCA, "Livestreaming_StopStream",            Empty,     Request;
    MatchmakingCancel                 = 0x206E_D4A9, "Matchmaking_Cancel",                  Empty,     Request;
    MatchmakingJoinRoom               = 0x4D32_D7FD, "Matchmaking_JoinRoom",                DataStore, Request;
    PlatformGetServerTime             = 0x7A4F_2C10, "Platform_GetServerTime",              Timestamp, Request;
    RoomJoin                          = 0x16CA_8F09, "Room_Join",                           DataStore, Request;
    RoomLeave                         = 0x72C7_20C6, "Room_Leave",                          Empty,     Request;
    RoomUpdateDataStore               = 0x026E_4028, "Room_UpdateDataStore",                DataStore, Request;
    UserGetAccessToken                = 0x06A8_5ABE, "User_GetAccessToken",                 Text,      Request;
    UserGetUserProof                  = 0x22CB_FE90, "User_GetUserProof",                   Text,      Request;
    UserLaunchFriendRequestFlow       = 0x0904_0E2C, "User_LaunchFriendRequestFlow",        Empty,     Request;
    NotificationApplicationLaunchIntentChanged
                                      = 0x04B3_4CA3, "Notification_ApplicationLifecycle_LaunchIntentChanged", Text, Notification;
    NotificationHttpTransferUpdate    = 0x7DD4_6E2F, "Notification_HTTP_Transfer",          Blob,      Notification;
    NotificationLivestreamingStatusChange
                                      = 0x2247_596E, "Notification_Livestreaming_StatusChange", Text, Notification;
    NotificationPartyUpdate           = 0x1D11_8297, "Notification_Party_PartyUpdate",      DataStore, Notification;
    NotificationRoomInviteAccepted    = 0x6D1C_8EA4, "Notification_Room_InviteAccepted",    Text,      Notification;
    NotificationRoomUpdate            = 0x60EC_3C2F, "Notification_Room_RoomUpdate",        DataStore, Notification;
    NotificationServerTimeSync        = 0x3A7E_49F5, "Notification_Platform_ServerTimeSync", Timestamp, Notification;
    NotificationVoipSystemVoipState   = 0x58D2_54A5, "Notification_Voip_SystemVoipState",   Text,      Notification;
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

// ============================================================================
// DECODED VALUES
// ============================================================================

/// Failure details attached to a message whose error flag is set
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorRecord {
    /// Native error code
    pub code: i32,
    /// HTTP status, when the failure came from an HTTP exchange
    pub http_code: Option<i32>,
    /// Machine-oriented message
    pub message: String,
    /// Message suitable for display to a user
    pub display_message: String,
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error {}", self.code)?;
        if let Some(http) = self.http_code {
            write!(f, " (http {})", http)?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Success payload, one variant per [`PayloadShape`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Payload {
    /// Operation succeeded with nothing to return
    Empty,
    /// Text payload
    Text(String),
    /// Binary payload
    Blob(Vec<u8>),
    /// Key-value payload
    DataStore(DataStore),
    /// Timestamp payload
    Timestamp(DateTime<Local>),
}

impl Payload {
    /// Shape of this payload
    pub fn shape(&self) -> PayloadShape {
        match self {
            Payload::Empty => PayloadShape::Empty,
            Payload::Text(_) => PayloadShape::Text,
            Payload::Blob(_) => PayloadShape::Blob,
            Payload::DataStore(_) => PayloadShape::DataStore,
            Payload::Timestamp(_) => PayloadShape::Timestamp,
        }
    }
}

/// Fully decoded message, independent of native memory
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    /// Decoded type tag
    pub message_type: MessageType,
    /// Correlated request; `None` for notifications
    pub request: Option<RequestHandle>,
    /// Payload on success, error record on failure
    pub outcome: std::result::Result<Payload, ErrorRecord>,
}

impl Envelope {
    /// Whether the operation failed
    pub fn is_error(&self) -> bool {
        self.outcome.is_err()
    }

    /// Success payload, if any
    pub fn payload(&self) -> Option<&Payload> {
        self.outcome.as_ref().ok()
    }

    /// Error record, if any
    pub fn error(&self) -> Option<&ErrorRecord> {
        self.outcome.as_ref().err()
    }
}

// ============================================================================
// TYPED EXTRACTION
// ============================================================================

/// A host type that one payload shape decodes into
pub trait Extract: Sized {
    /// Shape this type is extracted from
    const SHAPE: PayloadShape;

    /// Unwrap the matching payload variant
    fn from_payload(payload: Payload) -> Option<Self>;
}

impl Extract for () {
    const SHAPE: PayloadShape = PayloadShape::Empty;

    fn from_payload(payload: Payload) -> Option<Self> {
        matches!(payload, Payload::Empty).then_some(())
    }
}

impl Extract for String {
    const SHAPE: PayloadShape = PayloadShape::Text;

    fn from_payload(payload: Payload) -> Option<Self> {
        match payload {
            Payload::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl Extract for Vec<u8> {
    const SHAPE: PayloadShape = PayloadShape::Blob;

    fn from_payload(payload: Payload) -> Option<Self> {
        match payload {
            Payload::Blob(b) => Some(b),
            _ => None,
        }
    }
}

impl Extract for DataStore {
    const SHAPE: PayloadShape = PayloadShape::DataStore;

    fn from_payload(payload: Payload) -> Option<Self> {
        match payload {
            Payload::DataStore(ds) => Some(ds),
            _ => None,
        }
    }
}

impl Extract for DateTime<Local> {
    const SHAPE: PayloadShape = PayloadShape::Timestamp;

    fn from_payload(payload: Payload) -> Option<Self> {
        match payload {
            Payload::Timestamp(t) => Some(t),
            _ => None,
        }
    }
}

// ============================================================================
// MESSAGE
// ============================================================================

/// One popped native message, exclusively owned
///
/// Released exactly once: explicitly through [`Message::release`], which
/// consumes it, or on drop. A released message cannot be touched again.
pub struct Message {
    api: Arc<dyn NativeApi>,
    raw: NonNull<RawMessage>,
    policy: TextPolicy,
}

impl Message {
    /// # Safety
    /// `raw` must be a message popped from `api` and not yet freed.
    pub(crate) unsafe fn from_raw(
        api: Arc<dyn NativeApi>,
        raw: NonNull<RawMessage>,
        policy: TextPolicy,
    ) -> Self {
        Self { api, raw, policy }
    }

    fn ptr(&self) -> *const RawMessage {
        self.raw.as_ptr()
    }

    /// Raw native tag
    pub fn raw_tag(&self) -> u32 {
        // SAFETY: `raw` is live for as long as `self`.
        unsafe { self.api.message_type(self.ptr()) }
    }

    /// Decoded type tag
    pub fn message_type(&self) -> Result<MessageType> {
        MessageType::from_tag(self.raw_tag())
    }

    pub(crate) fn raw_request_id(&self) -> u64 {
        // SAFETY: `raw` is live for as long as `self`.
        unsafe { self.api.message_request_id(self.ptr()) }
    }

    /// Request this message completes.
    ///
    /// Notifications, and messages without a request id, report
    /// [`Error::NotApplicable`] rather than a placeholder handle.
    pub fn request_handle(&self) -> Result<RequestHandle> {
        let message_type = self.message_type()?;
        if message_type.origin() == Origin::Notification {
            return Err(Error::NotApplicable(format!(
                "{} is a pushed notification without a request handle",
                message_type
            )));
        }
        RequestHandle::from_native(self.raw_request_id()).ok_or_else(|| {
            Error::NotApplicable(format!("{} carries no request id", message_type))
        })
    }

    /// Whether the operation failed
    pub fn is_error(&self) -> bool {
        // SAFETY: `raw` is live for as long as `self`.
        unsafe { self.api.message_is_error(self.ptr()) }
    }

    /// Error record; `Some` exactly when [`Message::is_error`] is true
    pub fn error(&self) -> Result<Option<ErrorRecord>> {
        if !self.is_error() {
            return Ok(None);
        }
        // SAFETY: `raw` is live; the error record and its strings are owned
        // by the message and read before it is freed.
        unsafe {
            let err = self.api.message_error(self.ptr());
            if err.is_null() {
                return Err(Error::NullPayload("error record"));
            }
            let http = self.api.error_http_code(err);
            Ok(Some(ErrorRecord {
                code: self.api.error_code(err),
                http_code: (http > 0).then_some(http),
                message: decode_string(self.api.error_message(err), self.policy)?
                    .unwrap_or_default(),
                display_message: decode_string(self.api.error_display_message(err), self.policy)?
                    .unwrap_or_default(),
            }))
        }
    }

    /// Decode the whole message according to its tag
    pub fn decode(&self) -> Result<Envelope> {
        let message_type = self.message_type()?;
        let request = self.request_handle().ok();
        let outcome = match self.error()? {
            Some(record) => Err(record),
            None => Ok(self.read_payload(message_type.shape())?),
        };
        Ok(Envelope {
            message_type,
            request,
            outcome,
        })
    }

    /// Extract the success payload as `P`, checking the tag first.
    ///
    /// A tag whose shape differs from `P`'s is [`Error::PayloadMismatch`];
    /// a failed operation is [`Error::ErrorMessage`]. In neither case is a
    /// payload accessor called.
    pub fn extract<P: Extract>(&self) -> Result<P> {
        let message_type = self.message_type()?;
        let actual = message_type.shape();
        if actual != P::SHAPE {
            tracing::warn!(
                message_type = message_type.symbol(),
                expected = P::SHAPE.name(),
                actual = actual.name(),
                "rejected mismatched payload extraction"
            );
            return Err(Error::PayloadMismatch {
                message_type: message_type.symbol(),
                expected: P::SHAPE.name(),
                actual: actual.name(),
            });
        }
        if let Some(record) = self.error()? {
            return Err(Error::ErrorMessage {
                code: record.code,
                message: record.message,
            });
        }
        let payload = self.read_payload(actual)?;
        P::from_payload(payload).ok_or_else(|| {
            Error::Internal(format!(
                "{} payload did not decode as {}",
                message_type,
                actual.name()
            ))
        })
    }

    fn read_payload(&self, shape: PayloadShape) -> Result<Payload> {
        let api = &*self.api;
        let msg = self.ptr();
        // SAFETY: `shape` comes from this message's own tag, so the accessor
        // below is the one the native side populated. Everything is copied
        // out before the message can be freed.
        unsafe {
            match shape {
                PayloadShape::Empty => Ok(Payload::Empty),
                PayloadShape::Text => decode_string(api.message_string(msg), self.policy)?
                    .map(Payload::Text)
                    .ok_or(Error::NullPayload("text")),
                PayloadShape::Blob => {
                    let len = api.message_blob_len(msg);
                    decode_blob(api.message_blob(msg), len).map(Payload::Blob)
                }
                PayloadShape::DataStore => {
                    decode_data_store(api, api.message_data_store(msg), self.policy)
                        .map(Payload::DataStore)
                }
                PayloadShape::Timestamp => {
                    decode_timestamp(api.message_timestamp(msg)).map(Payload::Timestamp)
                }
            }
        }
    }

    /// Free the native message. Consumes `self`, so it cannot be used again.
    ///
    /// ```compile_fail
    /// fn release_twice(message: platform_bridge::Message) {
    ///     message.release();
    ///     message.release();
    /// }
    /// ```
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for Message {
    fn drop(&mut self) {
        // SAFETY: `raw` was popped from `api` and this is its only release.
        unsafe { self.api.free_message(self.raw.as_ptr()) };
        tracing::trace!("message released");
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("tag", &format_args!("{:#010x}", self.raw_tag()))
            .field("request_id", &self.raw_request_id())
            .field("is_error", &self.is_error())
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================
