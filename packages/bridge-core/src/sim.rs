//! # Simulated Platform
//!
//! An in-process [`NativeApi`] with real heap allocations. Used by the unit
//! tests, the end-to-end scenarios and the probe CLI.
//!
//! ## What It Records
//!
//! | Concern | Query |
//! |---------|-------|
//! | Allocations | [`SimulatedPlatform::live_allocations`], [`SimulatedPlatform::allocation_size`] |
//! | Accessor calls | [`SimulatedPlatform::counters`] |
//! | Messages | [`SimulatedPlatform::live_messages`], [`SimulatedPlatform::queued`], [`SimulatedPlatform::double_frees`] |
//! | Entry points | [`SimulatedPlatform::calls`] |
//!
//! Messages are injected directly or produced by per-symbol handlers
//! registered with [`SimulatedPlatform::register_async`].

use std::alloc::{self, Layout};
use std::collections::{HashMap, HashSet, VecDeque};
use std::ffi::CStr;
use std::os::raw::c_char;
use std::ptr;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::codec::KeyValue;
use crate::dispatch::RequestHandle;
use crate::error::{Error, Result};
use crate::message::MessageType;
use crate::native::sys::{KeyValueType, RawDataStore, RawError, RawMessage, INVALID_REQUEST};
use crate::native::{NativeApi, RawArg, RawValue};

const ALIGN: usize = 16;

// ============================================================================
// RECORDS
// ============================================================================

/// Native call counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimCounters {
    /// Successful allocations
    pub allocs: usize,
    /// Frees of live allocations
    pub frees: usize,
    /// Frees of pointers this allocator never handed out (or already freed)
    pub invalid_frees: usize,
    /// `pop_message` calls, empty or not
    pub pops: usize,
    /// Frees of live messages
    pub message_frees: usize,
    /// Frees of messages already freed
    pub double_frees: usize,
    /// Calls to any success-payload accessor
    pub payload_reads: usize,
    /// `data_store_len` calls
    pub data_store_len_calls: usize,
    /// `data_store_key` calls
    pub data_store_key_calls: usize,
    /// `data_store_value` calls
    pub data_store_value_calls: usize,
}

/// An argument as the simulated entry point received it
#[derive(Debug, Clone, PartialEq)]
pub enum SimArg {
    /// String argument
    Str(String),
    /// Null string pointer
    NullStr,
    /// Unsigned 64-bit value
    U64(u64),
    /// Signed 32-bit value
    I32(i32),
    /// Double-precision value
    F64(f64),
    /// Boolean
    Bool(bool),
    /// Key-value array, empty when absent
    KeyValues(Vec<(String, KeyValue)>),
    /// Byte buffer
    Blob(Vec<u8>),
}

/// One recorded entry point call
#[derive(Debug, Clone, PartialEq)]
pub struct SimCall {
    /// Full symbol name
    pub symbol: String,
    /// Request id returned; `0` for synchronous calls
    pub handle: u64,
    /// Unmarshaled arguments
    pub args: Vec<SimArg>,
}

/// Return value of a simulated synchronous getter
#[derive(Debug, Clone, PartialEq)]
pub enum SimSyncValue {
    /// Unsigned 64-bit value
    U64(u64),
    /// Signed 32-bit value
    I32(i32),
    /// Double-precision value
    F64(f64),
    /// Boolean
    Bool(bool),
    /// String kept resident by the platform
    BorrowedStr(String),
    /// String allocated for the caller
    OwnedStr(String),
    /// Null string
    Null,
}

type AsyncHandler = Arc<dyn Fn(&SimCall) -> Option<SimMessage> + Send + Sync>;
type SyncHandler = Arc<dyn Fn(&SimCall) -> SimSyncValue + Send + Sync>;

// ============================================================================
// MESSAGE BUILDER
// ============================================================================

#[derive(Debug, Clone)]
struct SimError {
    code: i32,
    http_code: i32,
    message: Vec<u8>,
    display_message: Option<Vec<u8>>,
}

/// A native message under construction
#[derive(Debug, Clone)]
pub struct SimMessage {
    tag: u32,
    request_id: u64,
    text: Option<Vec<u8>>,
    blob: Vec<u8>,
    data_store: Vec<(Vec<u8>, Vec<u8>)>,
    timestamp: u64,
    error: Option<SimError>,
    delay_polls: usize,
}

fn nul_terminated(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() + 1);
    out.extend_from_slice(bytes);
    out.push(0);
    out
}

impl SimMessage {
    /// Message with an arbitrary tag and request id
    pub fn raw(tag: u32, request_id: u64) -> Self {
        Self {
            tag,
            request_id,
            text: None,
            blob: Vec::new(),
            data_store: Vec::new(),
            timestamp: 0,
            error: None,
            delay_polls: 0,
        }
    }

    /// Completion of `handle`
    pub fn response(handle: RequestHandle, message_type: MessageType) -> Self {
        Self::raw(message_type.tag(), handle.get())
    }

    /// Completion carrying a raw request id
    pub fn for_request(request_id: u64, message_type: MessageType) -> Self {
        Self::raw(message_type.tag(), request_id)
    }

    /// Pushed notification
    pub fn notification(message_type: MessageType) -> Self {
        Self::raw(message_type.tag(), INVALID_REQUEST)
    }

    /// Text payload
    pub fn text(self, text: &str) -> Self {
        self.raw_text(text.as_bytes())
    }

    /// Text payload from raw bytes, not checked for UTF-8
    pub fn raw_text(mut self, bytes: &[u8]) -> Self {
        self.text = Some(nul_terminated(bytes));
        self
    }

    /// Blob payload
    pub fn blob(mut self, bytes: &[u8]) -> Self {
        self.blob = bytes.to_vec();
        self
    }

    /// Data store payload; pairs keep their order, duplicates included
    pub fn data_store(mut self, pairs: &[(&str, &str)]) -> Self {
        self.data_store = pairs
            .iter()
            .map(|(k, v)| (nul_terminated(k.as_bytes()), nul_terminated(v.as_bytes())))
            .collect();
        self
    }

    /// Timestamp payload, native seconds
    pub fn timestamp(mut self, secs: u64) -> Self {
        self.timestamp = secs;
        self
    }

    /// Set the error flag with `code` and `message`
    pub fn error(mut self, code: i32, message: &str) -> Self {
        self.error = Some(SimError {
            code,
            http_code: 0,
            message: nul_terminated(message.as_bytes()),
            display_message: None,
        });
        self
    }

    /// HTTP status of the error; no effect without [`SimMessage::error`]
    pub fn http_code(mut self, http_code: i32) -> Self {
        if let Some(err) = self.error.as_mut() {
            err.http_code = http_code;
        }
        self
    }

    /// Displayable error message; no effect without [`SimMessage::error`]
    pub fn display_message(mut self, message: &str) -> Self {
        if let Some(err) = self.error.as_mut() {
            err.display_message = Some(nul_terminated(message.as_bytes()));
        }
        self
    }

    /// Hold the message back for `polls` pops
    pub fn after_polls(mut self, polls: usize) -> Self {
        self.delay_polls = polls;
        self
    }
}

// ============================================================================
// PLATFORM
// ============================================================================

struct Scheduled {
    ready_at_pop: usize,
    message: SimMessage,
}

#[derive(Default)]
struct SimState {
    allocations: HashMap<usize, Layout>,
    counters: SimCounters,
    queue: VecDeque<Scheduled>,
    live_messages: HashSet<usize>,
    next_handle: u64,
    forced_handle: Option<u64>,
    fail_next_dispatch: bool,
    calls: Vec<SimCall>,
    async_handlers: HashMap<String, AsyncHandler>,
    sync_handlers: HashMap<String, SyncHandler>,
    resident_strings: HashSet<Vec<u8>>,
}

/// In-process stand-in for the native platform library
#[derive(Default)]
pub struct SimulatedPlatform {
    state: Mutex<SimState>,
}

impl SimulatedPlatform {
    /// Create a platform with an empty queue and no handlers
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------------
    // Scripting
    // ------------------------------------------------------------------------

    /// Queue a message for a later pop
    pub fn inject(&self, message: SimMessage) {
        let mut state = self.state.lock();
        let ready_at_pop = state.counters.pops + message.delay_polls;
        state.queue.push_back(Scheduled {
            ready_at_pop,
            message,
        });
    }

    /// Answer calls to `symbol` with the message `handler` builds, if any.
    ///
    /// Asynchronous symbols without a handler still return a request id.
    pub fn register_async(
        &self,
        symbol: impl Into<String>,
        handler: impl Fn(&SimCall) -> Option<SimMessage> + Send + Sync + 'static,
    ) {
        self.state
            .lock()
            .async_handlers
            .insert(symbol.into(), Arc::new(handler));
    }

    /// Answer calls to the getter `symbol`. Unregistered getters are unknown
    /// entry points.
    pub fn register_sync(
        &self,
        symbol: impl Into<String>,
        handler: impl Fn(&SimCall) -> SimSyncValue + Send + Sync + 'static,
    ) {
        self.state
            .lock()
            .sync_handlers
            .insert(symbol.into(), Arc::new(handler));
    }

    /// Make the next asynchronous call return the invalid-request sentinel
    pub fn fail_next_dispatch(&self) {
        self.state.lock().fail_next_dispatch = true;
    }

    /// Make the next asynchronous call return `id`
    pub fn force_next_handle(&self, id: u64) {
        self.state.lock().forced_handle = Some(id);
    }

    /// Allocate a NUL-terminated copy of `s` as a caller-owned return
    pub fn alloc_owned_string(&self, s: &str) -> *mut c_char {
        self.alloc_owned_bytes(s.as_bytes())
    }

    /// Allocate `bytes` plus a terminator as a caller-owned return
    pub fn alloc_owned_bytes(&self, bytes: &[u8]) -> *mut c_char {
        let ptr = self.alloc(bytes.len() + 1);
        if !ptr.is_null() {
            // SAFETY: `ptr` has room for `bytes.len() + 1` bytes.
            unsafe {
                ptr::copy_nonoverlapping(bytes.as_ptr(), ptr, bytes.len());
                *ptr.add(bytes.len()) = 0;
            }
        }
        ptr.cast::<c_char>()
    }

    // ------------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------------

    /// Allocations not yet freed
    pub fn live_allocations(&self) -> usize {
        self.state.lock().allocations.len()
    }

    /// Size of the live allocation starting at `ptr`
    pub fn allocation_size(&self, ptr: *const u8) -> Option<usize> {
        self.state
            .lock()
            .allocations
            .get(&(ptr as usize))
            .map(Layout::size)
    }

    /// Snapshot of the call counters
    pub fn counters(&self) -> SimCounters {
        self.state.lock().counters
    }

    /// Messages freed more than once
    pub fn double_frees(&self) -> usize {
        self.state.lock().counters.double_frees
    }

    /// Popped messages not yet freed
    pub fn live_messages(&self) -> usize {
        self.state.lock().live_messages.len()
    }

    /// Messages waiting to be popped
    pub fn queued(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Entry point calls in order
    pub fn calls(&self) -> Vec<SimCall> {
        self.state.lock().calls.clone()
    }

    fn count(&self, bump: impl FnOnce(&mut SimCounters)) {
        bump(&mut self.state.lock().counters);
    }
}

/// # Safety
/// `msg` must be a live message popped from a [`SimulatedPlatform`].
unsafe fn sim_message<'m>(msg: *const RawMessage) -> &'m SimMessage {
    &*msg.cast::<SimMessage>()
}

/// # Safety
/// `err` must come from `message_error` on a live message.
unsafe fn sim_error<'m>(err: *const RawError) -> &'m SimError {
    &*err.cast::<SimError>()
}

/// # Safety
/// `ds` must come from `message_data_store` on a live message.
unsafe fn sim_store<'m>(ds: *const RawDataStore) -> &'m [(Vec<u8>, Vec<u8>)] {
    &*ds.cast::<Vec<(Vec<u8>, Vec<u8>)>>()
}

/// # Safety
/// Every pointer in `arg` must be valid as [`RawArg`] documents.
unsafe fn unmarshal(arg: &RawArg) -> SimArg {
    match *arg {
        RawArg::Str(p) if p.is_null() => SimArg::NullStr,
        RawArg::Str(p) => SimArg::Str(CStr::from_ptr(p).to_string_lossy().into_owned()),
        RawArg::U64(v) => SimArg::U64(v),
        RawArg::I32(v) => SimArg::I32(v),
        RawArg::F64(v) => SimArg::F64(v),
        RawArg::Bool(v) => SimArg::Bool(v),
        RawArg::KeyValues { ptr, len } if ptr.is_null() || len == 0 => {
            SimArg::KeyValues(Vec::new())
        }
        RawArg::KeyValues { ptr, len } => SimArg::KeyValues(
            std::slice::from_raw_parts(ptr, len)
                .iter()
                .map(|pair| {
                    let key = CStr::from_ptr(pair.key).to_string_lossy().into_owned();
                    let value = match pair.value_type {
                        KeyValueType::String if pair.string_value.is_null() => {
                            KeyValue::Str(String::new())
                        }
                        KeyValueType::String => KeyValue::Str(
                            CStr::from_ptr(pair.string_value).to_string_lossy().into_owned(),
                        ),
                        KeyValueType::Int => KeyValue::Int(pair.int_value),
                        KeyValueType::Double => KeyValue::Double(pair.double_value),
                    };
                    (key, value)
                })
                .collect(),
        ),
        RawArg::Blob { ptr, len } if ptr.is_null() || len == 0 => SimArg::Blob(Vec::new()),
        RawArg::Blob { ptr, len } => SimArg::Blob(std::slice::from_raw_parts(ptr, len).to_vec()),
    }
}

impl NativeApi for SimulatedPlatform {
    fn alloc(&self, len: usize) -> *mut u8 {
        let Ok(layout) = Layout::from_size_align(len.max(1), ALIGN) else {
            return ptr::null_mut();
        };
        // SAFETY: `layout` has a non-zero size.
        let ptr = unsafe { alloc::alloc(layout) };
        if !ptr.is_null() {
            let mut state = self.state.lock();
            state.allocations.insert(ptr as usize, layout);
            state.counters.allocs += 1;
        }
        ptr
    }

    unsafe fn free(&self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }
        let mut state = self.state.lock();
        match state.allocations.remove(&(ptr as usize)) {
            Some(layout) => {
                state.counters.frees += 1;
                alloc::dealloc(ptr, layout);
            }
            None => {
                state.counters.invalid_frees += 1;
                tracing::error!(
                    ptr = (ptr as usize),
                    "free of a pointer the simulator does not own"
                );
            }
        }
    }

    fn pop_message(&self) -> *mut RawMessage {
        let mut state = self.state.lock();
        state.counters.pops += 1;
        let pops = state.counters.pops;
        let Some(index) = state.queue.iter().position(|s| s.ready_at_pop < pops) else {
            return ptr::null_mut();
        };
        let Some(scheduled) = state.queue.remove(index) else {
            return ptr::null_mut();
        };
        let raw = Box::into_raw(Box::new(scheduled.message));
        state.live_messages.insert(raw as usize);
        raw.cast::<RawMessage>()
    }

    unsafe fn free_message(&self, msg: *mut RawMessage) {
        let mut state = self.state.lock();
        if state.live_messages.remove(&(msg as usize)) {
            state.counters.message_frees += 1;
            drop(Box::from_raw(msg.cast::<SimMessage>()));
        } else {
            state.counters.double_frees += 1;
            tracing::error!(msg = (msg as usize), "message freed twice");
        }
    }

    unsafe fn message_type(&self, msg: *const RawMessage) -> u32 {
        sim_message(msg).tag
    }

    unsafe fn message_request_id(&self, msg: *const RawMessage) -> u64 {
        sim_message(msg).request_id
    }

    unsafe fn message_is_error(&self, msg: *const RawMessage) -> bool {
        sim_message(msg).error.is_some()
    }

    unsafe fn message_error(&self, msg: *const RawMessage) -> *const RawError {
        match &sim_message(msg).error {
            Some(err) => (err as *const SimError).cast::<RawError>(),
            None => ptr::null(),
        }
    }

    unsafe fn error_code(&self, err: *const RawError) -> i32 {
        sim_error(err).code
    }

    unsafe fn error_http_code(&self, err: *const RawError) -> i32 {
        sim_error(err).http_code
    }

    unsafe fn error_message(&self, err: *const RawError) -> *const c_char {
        sim_error(err).message.as_ptr().cast::<c_char>()
    }

    unsafe fn error_display_message(&self, err: *const RawError) -> *const c_char {
        match &sim_error(err).display_message {
            Some(s) => s.as_ptr().cast::<c_char>(),
            None => ptr::null(),
        }
    }

    unsafe fn message_string(&self, msg: *const RawMessage) -> *const c_char {
        self.count(|c| c.payload_reads += 1);
        match &sim_message(msg).text {
            Some(s) => s.as_ptr().cast::<c_char>(),
            None => ptr::null(),
        }
    }

    unsafe fn message_blob(&self, msg: *const RawMessage) -> *const u8 {
        self.count(|c| c.payload_reads += 1);
        sim_message(msg).blob.as_ptr()
    }

    unsafe fn message_blob_len(&self, msg: *const RawMessage) -> usize {
        self.count(|c| c.payload_reads += 1);
        sim_message(msg).blob.len()
    }

    unsafe fn message_data_store(&self, msg: *const RawMessage) -> *const RawDataStore {
        self.count(|c| c.payload_reads += 1);
        (&sim_message(msg).data_store as *const Vec<(Vec<u8>, Vec<u8>)>).cast::<RawDataStore>()
    }

    unsafe fn message_timestamp(&self, msg: *const RawMessage) -> u64 {
        self.count(|c| c.payload_reads += 1);
        sim_message(msg).timestamp
    }

    unsafe fn data_store_len(&self, ds: *const RawDataStore) -> usize {
        self.count(|c| c.data_store_len_calls += 1);
        sim_store(ds).len()
    }

    unsafe fn data_store_key(&self, ds: *const RawDataStore, index: usize) -> *const c_char {
        self.count(|c| c.data_store_key_calls += 1);
        match sim_store(ds).get(index) {
            Some((key, _)) => key.as_ptr().cast::<c_char>(),
            None => ptr::null(),
        }
    }

    unsafe fn data_store_value(
        &self,
        ds: *const RawDataStore,
        key: *const c_char,
    ) -> *const c_char {
        self.count(|c| c.data_store_value_calls += 1);
        if key.is_null() {
            return ptr::null();
        }
        let wanted = CStr::from_ptr(key).to_bytes_with_nul();
        sim_store(ds)
            .iter()
            .find(|(k, _)| k.as_slice() == wanted)
            .map(|(_, v)| v.as_ptr().cast::<c_char>())
            .unwrap_or(ptr::null())
    }

    unsafe fn invoke_async(&self, symbol: &str, args: &[RawArg]) -> Result<u64> {
        let (call, handler) = {
            let mut state = self.state.lock();
            if state.fail_next_dispatch {
                state.fail_next_dispatch = false;
                return Ok(INVALID_REQUEST);
            }
            let handle = match state.forced_handle.take() {
                Some(id) => id,
                None => {
                    state.next_handle += 1;
                    state.next_handle
                }
            };
            let call = SimCall {
                symbol: symbol.to_string(),
                handle,
                args: args.iter().map(|a| unmarshal(a)).collect(),
            };
            state.calls.push(call.clone());
            (call, state.async_handlers.get(symbol).cloned())
        };

        if let Some(message) = handler.and_then(|h| h(&call)) {
            self.inject(message);
        }
        Ok(call.handle)
    }

    unsafe fn invoke_sync(&self, symbol: &str, args: &[RawArg]) -> Result<RawValue> {
        let (call, handler) = {
            let mut state = self.state.lock();
            let handler = state
                .sync_handlers
                .get(symbol)
                .cloned()
                .ok_or_else(|| Error::UnknownEntryPoint(symbol.to_string()))?;
            let call = SimCall {
                symbol: symbol.to_string(),
                handle: 0,
                args: args.iter().map(|a| unmarshal(a)).collect(),
            };
            state.calls.push(call.clone());
            (call, handler)
        };

        Ok(match handler(&call) {
            SimSyncValue::U64(v) => RawValue::U64(v),
            SimSyncValue::I32(v) => RawValue::I32(v),
            SimSyncValue::F64(v) => RawValue::F64(v),
            SimSyncValue::Bool(v) => RawValue::Bool(v),
            SimSyncValue::BorrowedStr(s) => {
                // One resident copy per distinct value; the buffer never moves.
                let bytes = nul_terminated(s.as_bytes());
                let mut state = self.state.lock();
                if !state.resident_strings.contains(&bytes) {
                    state.resident_strings.insert(bytes.clone());
                }
                let ptr = state
                    .resident_strings
                    .get(&bytes)
                    .map(|s| s.as_ptr().cast::<c_char>())
                    .unwrap_or(ptr::null());
                RawValue::BorrowedStr(ptr)
            }
            SimSyncValue::OwnedStr(s) => {
                let ptr = self.alloc_owned_string(&s);
                if ptr.is_null() {
                    return Err(Error::AllocationFailed(s.len() + 1));
                }
                RawValue::OwnedStr(ptr)
            }
            SimSyncValue::Null => RawValue::BorrowedStr(ptr::null()),
        })
    }
}

impl Drop for SimulatedPlatform {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        for addr in state.live_messages.drain() {
            // SAFETY: every live address came from `Box::into_raw` in
            // `pop_message` and was not freed.
            unsafe { drop(Box::from_raw(addr as *mut SimMessage)) };
        }
        for (addr, layout) in state.allocations.drain() {
            // SAFETY: recorded by `alloc` with this exact layout.
            unsafe { alloc::dealloc(addr as *mut u8, layout) };
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocations_are_accounted() {
        let sim = SimulatedPlatform::new();
        let a = sim.alloc(10);
        let b = sim.alloc(0);
        assert_eq!(sim.live_allocations(), 2);
        assert_eq!(sim.allocation_size(a), Some(10));
        assert_eq!(a as usize % ALIGN, 0);
        unsafe {
            sim.free(a);
            sim.free(b);
            sim.free(a);
        }
        let c = sim.counters();
        assert_eq!((c.allocs, c.frees, c.invalid_frees), (2, 2, 1));
        assert_eq!(sim.live_allocations(), 0);
    }

    #[test]
    fn test_double_message_free_detected() {
        let sim = SimulatedPlatform::new();
        sim.inject(SimMessage::notification(MessageType::NotificationRoomUpdate));
        let msg = sim.pop_message();
        assert!(!msg.is_null());
        unsafe {
            sim.free_message(msg);
            sim.free_message(msg);
        }
        assert_eq!(sim.double_frees(), 1);
        assert_eq!(sim.live_messages(), 0);
    }

    #[test]
    fn test_delayed_message() {
        let sim = SimulatedPlatform::new();
        sim.inject(SimMessage::raw(1, 0).after_polls(2));
        assert!(sim.pop_message().is_null());
        assert!(sim.pop_message().is_null());
        let msg = sim.pop_message();
        assert!(!msg.is_null());
        unsafe { sim.free_message(msg) };
        assert_eq!(sim.queued(), 0);
    }

    #[test]
    fn test_handler_reply_is_queued() {
        let sim = SimulatedPlatform::new();
        sim.register_async("plat_Room_Leave", |call| {
            Some(SimMessage::for_request(call.handle, MessageType::RoomLeave))
        });
        let id = unsafe { sim.invoke_async("plat_Room_Leave", &[RawArg::U64(3)]) }.unwrap();
        assert_ne!(id, INVALID_REQUEST);
        assert_eq!(sim.queued(), 1);
        assert_eq!(sim.calls()[0].args, vec![SimArg::U64(3)]);
    }

    #[test]
    fn test_borrowed_getter_string_is_shared() {
        let sim = SimulatedPlatform::new();
        sim.register_sync("plat_Application_Locale", |_| SimSyncValue::BorrowedStr("en_US".into()));
        let mut seen = Vec::new();
        for _ in 0..50 {
            match unsafe { sim.invoke_sync("plat_Application_Locale", &[]) }.unwrap() {
                RawValue::BorrowedStr(ptr) => seen.push(ptr as usize),
                other => panic!("unexpected {:?}", other),
            }
        }
        seen.dedup();
        assert_eq!(seen.len(), 1);
        assert_eq!(sim.state.lock().resident_strings.len(), 1);
        let text = unsafe { CStr::from_ptr(seen[0] as *const c_char) };
        assert_eq!(text.to_str().unwrap(), "en_US");
    }
}
