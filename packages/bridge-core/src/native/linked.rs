//! # Linked Platform
//!
//! [`NativeApi`] over the extern symbols of the native library.
//!
//! The fixed surface (memory, queue, accessors) is bound directly in
//! [`super::sys`] as `plat_*` and does not follow the configured namespace.
//! Run a bridge over this platform with the default namespace, or register
//! entry point thunks under the symbols the configured namespace produces.
//! Entry points have per-function C signatures, so the
//! generated wrappers register a thunk per symbol that unpacks the
//! marshaled [`RawArg`]s and performs the typed extern call.

use std::collections::HashMap;
use std::os::raw::c_char;

use parking_lot::RwLock;

use super::sys::{self, RawDataStore, RawError, RawMessage};
use super::{NativeApi, RawArg, RawValue};
use crate::error::{Error, Result};

/// Adapter for an asynchronous entry point
pub type AsyncThunk = unsafe fn(&[RawArg]) -> u64;

/// Adapter for a synchronous entry point
pub type SyncThunk = unsafe fn(&[RawArg]) -> RawValue;

/// The native library, linked at build time
#[derive(Default)]
pub struct LinkedPlatform {
    async_entries: RwLock<HashMap<String, AsyncThunk>>,
    sync_entries: RwLock<HashMap<String, SyncThunk>>,
}

impl LinkedPlatform {
    /// Create a platform with no entry points bound
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind an asynchronous entry point under its full symbol name
    pub fn register_async(&self, symbol: impl Into<String>, thunk: AsyncThunk) {
        self.async_entries.write().insert(symbol.into(), thunk);
    }

    /// Bind a synchronous entry point under its full symbol name
    pub fn register_sync(&self, symbol: impl Into<String>, thunk: SyncThunk) {
        self.sync_entries.write().insert(symbol.into(), thunk);
    }
}

impl NativeApi for LinkedPlatform {
    fn alloc(&self, len: usize) -> *mut u8 {
        unsafe { sys::plat_Alloc(len) }
    }

    unsafe fn free(&self, ptr: *mut u8) {
        sys::plat_Free(ptr)
    }

    fn pop_message(&self) -> *mut RawMessage {
        unsafe { sys::plat_PopMessage() }
    }

    unsafe fn free_message(&self, msg: *mut RawMessage) {
        sys::plat_FreeMessage(msg)
    }

    unsafe fn message_type(&self, msg: *const RawMessage) -> u32 {
        sys::plat_Message_GetType(msg)
    }

    unsafe fn message_request_id(&self, msg: *const RawMessage) -> u64 {
        sys::plat_Message_GetRequestID(msg)
    }

    unsafe fn message_is_error(&self, msg: *const RawMessage) -> bool {
        sys::plat_Message_IsError(msg)
    }

    unsafe fn message_error(&self, msg: *const RawMessage) -> *const RawError {
        sys::plat_Message_GetError(msg)
    }

    unsafe fn error_code(&self, err: *const RawError) -> i32 {
        sys::plat_Error_GetCode(err)
    }

    unsafe fn error_http_code(&self, err: *const RawError) -> i32 {
        sys::plat_Error_GetHttpCode(err)
    }

    unsafe fn error_message(&self, err: *const RawError) -> *const c_char {
        sys::plat_Error_GetMessage(err)
    }

    unsafe fn error_display_message(&self, err: *const RawError) -> *const c_char {
        sys::plat_Error_GetDisplayableMessage(err)
    }

    unsafe fn message_string(&self, msg: *const RawMessage) -> *const c_char {
        sys::plat_Message_GetString(msg)
    }

    unsafe fn message_blob(&self, msg: *const RawMessage) -> *const u8 {
        sys::plat_Message_GetBlob(msg)
    }

    unsafe fn message_blob_len(&self, msg: *const RawMessage) -> usize {
        sys::plat_Message_GetBlobSize(msg)
    }

    unsafe fn message_data_store(&self, msg: *const RawMessage) -> *const RawDataStore {
        sys::plat_Message_GetDataStore(msg)
    }

    unsafe fn message_timestamp(&self, msg: *const RawMessage) -> u64 {
        sys::plat_Message_GetTimestamp(msg)
    }

    unsafe fn data_store_len(&self, ds: *const RawDataStore) -> usize {
        sys::plat_DataStore_GetNumKeys(ds)
    }

    unsafe fn data_store_key(&self, ds: *const RawDataStore, index: usize) -> *const c_char {
        sys::plat_DataStore_GetKey(ds, index)
    }

    unsafe fn data_store_value(
        &self,
        ds: *const RawDataStore,
        key: *const c_char,
    ) -> *const c_char {
        sys::plat_DataStore_GetValue(ds, key)
    }

    unsafe fn invoke_async(&self, symbol: &str, args: &[RawArg]) -> Result<u64> {
        let thunk = self
            .async_entries
            .read()
            .get(symbol)
            .copied()
            .ok_or_else(|| Error::UnknownEntryPoint(symbol.to_string()))?;
        Ok(thunk(args))
    }

    unsafe fn invoke_sync(&self, symbol: &str, args: &[RawArg]) -> Result<RawValue> {
        let thunk = self
            .sync_entries
            .read()
            .get(symbol)
            .copied()
            .ok_or_else(|| Error::UnknownEntryPoint(symbol.to_string()))?;
        Ok(thunk(args))
    }
}
