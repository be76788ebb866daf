//! # Native ABI Seam
//!
//! Everything the bridge asks of the native library goes through
//! [`NativeApi`]. The production implementation binds the extern surface
//! (`LinkedPlatform`, feature `linked`); [`crate::sim::SimulatedPlatform`]
//! implements the same contract in-process.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          NATIVE SURFACE                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Memory      alloc / free            (caller-supplied buffers)         │
//! │  Queue       pop_message / free_message                                │
//! │  Envelope    message_type / message_request_id / message_is_error      │
//! │  Error       error_code / error_http_code / error_*message             │
//! │  Payload     message_string / message_blob / message_data_store / ...  │
//! │  DataStore   data_store_len / data_store_key / data_store_value        │
//! │  Calls       invoke_async (→ request id) / invoke_sync (→ value)       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Pointers handed out by message accessors are owned by the message and
//! stay valid until it is freed. Pointers handed out as
//! [`RawValue::OwnedStr`] belong to the caller, who frees them with
//! [`NativeApi::free`].

pub mod sys;

#[cfg(feature = "linked")]
mod linked;

#[cfg(feature = "linked")]
pub use linked::{AsyncThunk, LinkedPlatform, SyncThunk};

use std::os::raw::c_char;

use crate::error::Result;
use sys::{RawDataStore, RawError, RawKeyValuePair, RawMessage};

/// One marshaled argument as the native entry point receives it
#[derive(Debug, Clone, Copy)]
pub enum RawArg {
    /// NUL-terminated string from the native allocator
    Str(*const c_char),
    /// Unsigned 64-bit value (ids, timestamps)
    U64(u64),
    /// Signed 32-bit value
    I32(i32),
    /// Double-precision value
    F64(f64),
    /// Boolean
    Bool(bool),
    /// Array of key-value pairs; null with `len == 0` for an empty bag
    KeyValues {
        /// First pair
        ptr: *const RawKeyValuePair,
        /// Number of pairs
        len: usize,
    },
    /// Byte buffer from the native allocator
    Blob {
        /// First byte
        ptr: *const u8,
        /// Number of bytes
        len: usize,
    },
}

/// Value returned by a synchronous entry point
#[derive(Debug, Clone, Copy)]
pub enum RawValue {
    /// Unsigned 64-bit value
    U64(u64),
    /// Signed 32-bit value
    I32(i32),
    /// Double-precision value
    F64(f64),
    /// Boolean
    Bool(bool),
    /// String owned by a resident native object; must not be freed
    BorrowedStr(*const c_char),
    /// String allocated for the caller; must be freed through [`NativeApi::free`]
    OwnedStr(*mut c_char),
}

/// The native ABI as seen by the bridge
///
/// Implementations must be callable from any thread, but the bridge only
/// drains the queue from one logical consumer.
pub trait NativeApi: Send + Sync {
    /// Allocate `len` bytes, aligned for any scalar type. Null on failure.
    fn alloc(&self, len: usize) -> *mut u8;

    /// Release memory obtained from [`NativeApi::alloc`] or an owned return.
    ///
    /// # Safety
    /// `ptr` must come from this allocator and not have been freed.
    unsafe fn free(&self, ptr: *mut u8);

    /// Pop the next ready message; null when none is pending.
    fn pop_message(&self) -> *mut RawMessage;

    /// Release a popped message.
    ///
    /// # Safety
    /// `msg` must come from [`NativeApi::pop_message`] and be freed once.
    unsafe fn free_message(&self, msg: *mut RawMessage);

    /// # Safety
    /// `msg` must be a live popped message.
    unsafe fn message_type(&self, msg: *const RawMessage) -> u32;

    /// # Safety
    /// `msg` must be a live popped message.
    unsafe fn message_request_id(&self, msg: *const RawMessage) -> u64;

    /// # Safety
    /// `msg` must be a live popped message.
    unsafe fn message_is_error(&self, msg: *const RawMessage) -> bool;

    /// # Safety
    /// `msg` must be a live popped message.
    unsafe fn message_error(&self, msg: *const RawMessage) -> *const RawError;

    /// # Safety
    /// `err` must come from a live message.
    unsafe fn error_code(&self, err: *const RawError) -> i32;

    /// HTTP status, or a value `<= 0` when the failure had none.
    ///
    /// # Safety
    /// `err` must come from a live message.
    unsafe fn error_http_code(&self, err: *const RawError) -> i32;

    /// # Safety
    /// `err` must come from a live message.
    unsafe fn error_message(&self, err: *const RawError) -> *const c_char;

    /// # Safety
    /// `err` must come from a live message.
    unsafe fn error_display_message(&self, err: *const RawError) -> *const c_char;

    /// # Safety
    /// `msg` must be a live popped message whose tag carries text.
    unsafe fn message_string(&self, msg: *const RawMessage) -> *const c_char;

    /// # Safety
    /// `msg` must be a live popped message whose tag carries a blob.
    unsafe fn message_blob(&self, msg: *const RawMessage) -> *const u8;

    /// # Safety
    /// `msg` must be a live popped message whose tag carries a blob.
    unsafe fn message_blob_len(&self, msg: *const RawMessage) -> usize;

    /// # Safety
    /// `msg` must be a live popped message whose tag carries a data store.
    unsafe fn message_data_store(&self, msg: *const RawMessage) -> *const RawDataStore;

    /// # Safety
    /// `msg` must be a live popped message whose tag carries a timestamp.
    unsafe fn message_timestamp(&self, msg: *const RawMessage) -> u64;

    /// # Safety
    /// `ds` must come from a live message.
    unsafe fn data_store_len(&self, ds: *const RawDataStore) -> usize;

    /// # Safety
    /// `ds` must come from a live message and `index < data_store_len(ds)`.
    unsafe fn data_store_key(&self, ds: *const RawDataStore, index: usize) -> *const c_char;

    /// # Safety
    /// `ds` must come from a live message; `key` must be NUL-terminated.
    unsafe fn data_store_value(&self, ds: *const RawDataStore, key: *const c_char)
        -> *const c_char;

    /// Start an asynchronous operation; returns its request id or
    /// [`sys::INVALID_REQUEST`].
    ///
    /// # Safety
    /// Every pointer in `args` must stay valid for the duration of the call.
    unsafe fn invoke_async(&self, symbol: &str, args: &[RawArg]) -> Result<u64>;

    /// Call a synchronous getter.
    ///
    /// # Safety
    /// Every pointer in `args` must stay valid for the duration of the call.
    unsafe fn invoke_sync(&self, symbol: &str, args: &[RawArg]) -> Result<RawValue>;
}
