//! # Raw ABI Types
//!
//! C-compatible layouts and the fixed symbol surface of the native library.
//!
//! The fixed surface is declared once under [`LINKED_NAMESPACE`]. It is
//! resolved by the linker, so [`crate::BridgeConfig::namespace`] cannot
//! rename it; that setting only selects entry point symbols.

use std::os::raw::c_char;

/// Prefix of the fixed symbols in the `extern` block, fixed at build time
pub const LINKED_NAMESPACE: &str = "plat";

/// Request id the native layer returns when a call failed to start
pub const INVALID_REQUEST: u64 = 0;

/// Opaque native message
#[repr(C)]
pub struct RawMessage {
    _private: [u8; 0],
}

/// Opaque native error record, owned by its message
#[repr(C)]
pub struct RawError {
    _private: [u8; 0],
}

/// Opaque native data store, owned by its message
#[repr(C)]
pub struct RawDataStore {
    _private: [u8; 0],
}

/// Discriminant of a [`RawKeyValuePair`]
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyValueType {
    /// `string_value` is meaningful
    String = 0,
    /// `int_value` is meaningful
    Int = 1,
    /// `double_value` is meaningful
    Double = 2,
}

/// One entry of a key-value parameter bag, as the native side reads it
///
/// Exactly one value slot is meaningful, selected by `value_type`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawKeyValuePair {
    /// NUL-terminated key
    pub key: *const c_char,
    /// Which slot below is meaningful
    pub value_type: KeyValueType,
    /// NUL-terminated value when `value_type == String`, otherwise null
    pub string_value: *const c_char,
    /// Value when `value_type == Int`
    pub int_value: i32,
    /// Value when `value_type == Double`
    pub double_value: f64,
}

#[cfg(feature = "linked")]
#[allow(non_snake_case, missing_docs)]
extern "C" {
    pub fn plat_Alloc(len: usize) -> *mut u8;
    pub fn plat_Free(ptr: *mut u8);

    pub fn plat_PopMessage() -> *mut RawMessage;
    pub fn plat_FreeMessage(msg: *mut RawMessage);

    pub fn plat_Message_GetType(msg: *const RawMessage) -> u32;
    pub fn plat_Message_GetRequestID(msg: *const RawMessage) -> u64;
    pub fn plat_Message_IsError(msg: *const RawMessage) -> bool;
    pub fn plat_Message_GetError(msg: *const RawMessage) -> *const RawError;
    pub fn plat_Message_GetString(msg: *const RawMessage) -> *const c_char;
    pub fn plat_Message_GetBlob(msg: *const RawMessage) -> *const u8;
    pub fn plat_Message_GetBlobSize(msg: *const RawMessage) -> usize;
    pub fn plat_Message_GetDataStore(msg: *const RawMessage) -> *const RawDataStore;
    pub fn plat_Message_GetTimestamp(msg: *const RawMessage) -> u64;

    pub fn plat_Error_GetCode(err: *const RawError) -> i32;
    pub fn plat_Error_GetHttpCode(err: *const RawError) -> i32;
    pub fn plat_Error_GetMessage(err: *const RawError) -> *const c_char;
    pub fn plat_Error_GetDisplayableMessage(err: *const RawError) -> *const c_char;

    pub fn plat_DataStore_GetNumKeys(ds: *const RawDataStore) -> usize;
    pub fn plat_DataStore_GetKey(ds: *const RawDataStore, index: usize) -> *const c_char;
    pub fn plat_DataStore_GetValue(ds: *const RawDataStore, key: *const c_char) -> *const c_char;
}
