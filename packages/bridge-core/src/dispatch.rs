//! # Request Dispatcher
//!
//! Invokes native entry points and tracks the asynchronous ones until their
//! completion message is popped.
//!
//! ## Call Shapes
//!
//! | Shape | Type | Symbol | Returns |
//! |-------|------|--------|---------|
//! | Asynchronous | [`AsyncEntryPoint`] | `<ns>_<Noun>_<Verb>` | [`RequestHandle`]; result arrives as a message |
//! | Synchronous | [`SyncEntryPoint`] | `<ns>_<Noun>_Get<Field>` | [`SyncValue`] immediately |
//!
//! The shape is declared by whoever defines the entry point, never inferred
//! from its name.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::num::NonZeroU64;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::codec::{
    decode_string, encode_keyvalues, encode_string, encode_timestamp, take_owned_string,
    KeyValueBag,
};
use crate::config::TextPolicy;
use crate::error::{Error, Result};
use crate::guard::ArgScope;
use crate::native::sys::INVALID_REQUEST;
use crate::native::{NativeApi, RawArg, RawValue};

// ============================================================================
// HANDLES & ENTRY POINTS
// ============================================================================

/// Opaque correlation id of one in-flight asynchronous request
///
/// Only the bridge creates handles, from native return values. The
/// invalid-request sentinel is never a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RequestHandle(NonZeroU64);

impl RequestHandle {
    pub(crate) fn from_native(id: u64) -> Option<Self> {
        NonZeroU64::new(id).map(Self)
    }

    /// Raw 64-bit value, for logging and diagnostics
    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for RequestHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A native function that starts an operation and answers later
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AsyncEntryPoint {
    /// Feature noun, e.g. `User`
    pub noun: &'static str,
    /// Operation verb, e.g. `GetAccessToken`
    pub verb: &'static str,
}

impl AsyncEntryPoint {
    /// Declare an asynchronous entry point
    pub const fn new(noun: &'static str, verb: &'static str) -> Self {
        Self { noun, verb }
    }

    /// Full native symbol under `namespace`
    pub fn symbol(&self, namespace: &str) -> String {
        format!("{}_{}_{}", namespace, self.noun, self.verb)
    }
}

/// A native getter that returns its value directly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SyncEntryPoint {
    /// Feature noun, e.g. `Application`
    pub noun: &'static str,
    /// Field read by the getter, e.g. `Locale`
    pub field: &'static str,
}

impl SyncEntryPoint {
    /// Declare a synchronous getter
    pub const fn new(noun: &'static str, field: &'static str) -> Self {
        Self { noun, field }
    }

    /// Full native symbol under `namespace`
    pub fn symbol(&self, namespace: &str) -> String {
        format!("{}_{}_Get{}", namespace, self.noun, self.field)
    }
}

// ============================================================================
// ARGUMENTS & RETURN VALUES
// ============================================================================

/// One host-side argument, before marshaling
#[derive(Debug, Clone, Copy)]
pub enum Arg<'a> {
    /// Required string
    Str(&'a str),
    /// String the caller may not have; absent strings cannot be encoded
    OptStr(Option<&'a str>),
    /// Unsigned 64-bit value
    U64(u64),
    /// Signed 32-bit value
    I32(i32),
    /// Double-precision value
    F64(f64),
    /// Boolean
    Bool(bool),
    /// Instant, encoded as native seconds
    Time(DateTime<Utc>),
    /// Named-parameter bag
    KeyValues(&'a KeyValueBag),
    /// Byte buffer
    Bytes(&'a [u8]),
}

/// Value returned by a synchronous getter
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SyncValue {
    /// Unsigned 64-bit value
    U64(u64),
    /// Signed 32-bit value
    I32(i32),
    /// Double-precision value
    F64(f64),
    /// Boolean
    Bool(bool),
    /// String; `None` when the native side returned null
    Text(Option<String>),
}

fn marshal<'a>(scope: &mut ArgScope<'a>, args: &[Arg<'_>]) -> Result<Vec<RawArg>> {
    let api = scope.api();
    let mut raw = Vec::with_capacity(args.len());
    for arg in args {
        let value = match *arg {
            Arg::Str(s) => scope.hold_string(encode_string(api, Some(s))?),
            Arg::OptStr(s) => scope.hold_string(encode_string(api, s)?),
            Arg::U64(v) => RawArg::U64(v),
            Arg::I32(v) => RawArg::I32(v),
            Arg::F64(v) => RawArg::F64(v),
            Arg::Bool(v) => RawArg::Bool(v),
            Arg::Time(t) => RawArg::U64(encode_timestamp(&t)?),
            Arg::KeyValues(bag) => scope.hold_array(encode_keyvalues(api, bag)?),
            Arg::Bytes(bytes) => scope.hold_bytes(bytes)?,
        };
        raw.push(value);
    }
    Ok(raw)
}

// ============================================================================
// PENDING TABLE
// ============================================================================

/// One asynchronous request still waiting for its message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingRequest {
    /// Correlation handle
    pub handle: RequestHandle,
    /// Native symbol that issued it
    pub symbol: String,
    /// Poll tick at which it was dispatched
    pub issued_at_tick: u64,
}

#[derive(Default)]
struct PendingState {
    entries: HashMap<RequestHandle, PendingRequest>,
    reported_stale: HashSet<RequestHandle>,
}

/// In-flight requests keyed by handle
#[derive(Default)]
pub struct PendingTable {
    state: Mutex<PendingState>,
}

impl PendingTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a freshly dispatched request
    pub fn insert(&self, request: PendingRequest) -> Result<()> {
        let mut state = self.state.lock();
        if state.entries.contains_key(&request.handle) {
            return Err(Error::DuplicateRequestHandle(request.handle.get()));
        }
        state.entries.insert(request.handle, request);
        Ok(())
    }

    /// Remove a request whose message was consumed
    pub fn complete(&self, handle: RequestHandle) -> Option<PendingRequest> {
        let mut state = self.state.lock();
        state.reported_stale.remove(&handle);
        state.entries.remove(&handle)
    }

    /// Stop tracking a request. The native operation is not cancelled; its
    /// message, if it arrives, is still popped and released normally.
    pub fn abandon(&self, handle: RequestHandle) -> bool {
        self.complete(handle).is_some()
    }

    /// Number of in-flight requests
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Whether nothing is in flight
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `handle` is in flight
    pub fn contains(&self, handle: RequestHandle) -> bool {
        self.state.lock().entries.contains_key(&handle)
    }

    /// Requests issued at least `threshold` polls before `now_tick`, oldest first
    pub fn stale(&self, now_tick: u64, threshold: u64) -> Vec<PendingRequest> {
        let state = self.state.lock();
        let mut stale: Vec<PendingRequest> = state
            .entries
            .values()
            .filter(|p| now_tick.saturating_sub(p.issued_at_tick) >= threshold)
            .cloned()
            .collect();
        stale.sort_by_key(|p| (p.issued_at_tick, p.handle));
        stale
    }

    /// Warn once for each request that has newly crossed the threshold
    pub(crate) fn report_stale(&self, now_tick: u64, threshold: u64) -> usize {
        let mut state = self.state.lock();
        let PendingState {
            entries,
            reported_stale,
        } = &mut *state;
        let mut reported = 0;
        for pending in entries.values() {
            if now_tick.saturating_sub(pending.issued_at_tick) < threshold {
                continue;
            }
            if reported_stale.insert(pending.handle) {
                tracing::warn!(
                    handle = pending.handle.get(),
                    entry = %pending.symbol,
                    age_polls = now_tick.saturating_sub(pending.issued_at_tick),
                    "request has not completed"
                );
                reported += 1;
            }
        }
        reported
    }
}

// ============================================================================
// DISPATCHER
// ============================================================================

/// Marshals arguments, calls native entry points and records handles
pub struct RequestDispatcher<'a> {
    api: &'a dyn NativeApi,
    namespace: &'a str,
    policy: TextPolicy,
    pending: &'a PendingTable,
}

impl<'a> RequestDispatcher<'a> {
    /// Create a dispatcher over `api` that records into `pending`
    pub fn new(
        api: &'a dyn NativeApi,
        namespace: &'a str,
        policy: TextPolicy,
        pending: &'a PendingTable,
    ) -> Self {
        Self {
            api,
            namespace,
            policy,
            pending,
        }
    }

    /// Start an asynchronous operation.
    ///
    /// Never blocks. Every argument allocation is released before this
    /// returns, whether the call started or not.
    pub fn dispatch(
        &self,
        entry: &AsyncEntryPoint,
        args: &[Arg<'_>],
        tick: u64,
    ) -> Result<RequestHandle> {
        let symbol = entry.symbol(self.namespace);
        let id = {
            let mut scope = ArgScope::new(self.api);
            let raw = marshal(&mut scope, args)?;
            // SAFETY: every pointer in `raw` is owned by `scope`, which
            // outlives the call.
            unsafe { self.api.invoke_async(&symbol, &raw) }?
        };

        if id == INVALID_REQUEST {
            tracing::warn!(entry = %symbol, "native call returned the invalid request sentinel");
            return Err(Error::DispatchFailed { entry: symbol });
        }
        let handle = RequestHandle::from_native(id)
            .ok_or_else(|| Error::Internal("non-sentinel id was zero".into()))?;

        self.pending.insert(PendingRequest {
            handle,
            symbol: symbol.clone(),
            issued_at_tick: tick,
        })?;
        tracing::debug!(handle = handle.get(), entry = %symbol, "request dispatched");
        Ok(handle)
    }

    /// Call a synchronous getter. Never touches the pending table.
    pub fn query(&self, entry: &SyncEntryPoint, args: &[Arg<'_>]) -> Result<SyncValue> {
        let symbol = entry.symbol(self.namespace);
        let value = {
            let mut scope = ArgScope::new(self.api);
            let raw = marshal(&mut scope, args)?;
            // SAFETY: every pointer in `raw` is owned by `scope`.
            unsafe { self.api.invoke_sync(&symbol, &raw) }?
        };
        tracing::debug!(entry = %symbol, "sync getter returned");

        Ok(match value {
            RawValue::U64(v) => SyncValue::U64(v),
            RawValue::I32(v) => SyncValue::I32(v),
            RawValue::F64(v) => SyncValue::F64(v),
            RawValue::Bool(v) => SyncValue::Bool(v),
            // SAFETY: borrowed strings live in a resident native object.
            RawValue::BorrowedStr(ptr) => {
                SyncValue::Text(unsafe { decode_string(ptr, self.policy) }?)
            }
            // SAFETY: ownership of the string passes to us with the return.
            RawValue::OwnedStr(ptr) => {
                SyncValue::Text(unsafe { take_owned_string(self.api, ptr, self.policy) }?)
            }
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimArg, SimSyncValue, SimulatedPlatform};

    const GET_TOKEN: AsyncEntryPoint = AsyncEntryPoint::new("User", "GetAccessToken");
    const SAVE: AsyncEntryPoint = AsyncEntryPoint::new("CloudStorage", "Save");
    const LOCALE: SyncEntryPoint = SyncEntryPoint::new("Application", "Locale");

    fn dispatcher<'a>(
        sim: &'a SimulatedPlatform,
        pending: &'a PendingTable,
    ) -> RequestDispatcher<'a> {
        RequestDispatcher::new(sim, "plat", TextPolicy::Strict, pending)
    }

    #[test]
    fn test_symbol_names() {
        assert_eq!(GET_TOKEN.symbol("plat"), "plat_User_GetAccessToken");
        assert_eq!(LOCALE.symbol("ovr"), "ovr_Application_GetLocale");
    }

    #[test]
    fn test_dispatch_records_pending_and_frees_args() {
        let sim = SimulatedPlatform::new();
        let pending = PendingTable::new();
        let d = dispatcher(&sim, &pending);

        let h1 = d.dispatch(&SAVE, &[Arg::Str("slot"), Arg::Bytes(b"data")], 0).unwrap();
        let h2 = d.dispatch(&GET_TOKEN, &[], 0).unwrap();
        assert_ne!(h1, h2);
        assert_eq!(pending.len(), 2);
        assert_eq!(sim.live_allocations(), 0);

        let calls = sim.calls();
        assert_eq!(calls[0].symbol, "plat_CloudStorage_Save");
        assert_eq!(
            calls[0].args,
            vec![SimArg::Str("slot".into()), SimArg::Blob(b"data".to_vec())]
        );
    }

    #[test]
    fn test_sentinel_is_dispatch_failed() {
        let sim = SimulatedPlatform::new();
        let pending = PendingTable::new();
        sim.fail_next_dispatch();
        let out = dispatcher(&sim, &pending).dispatch(&GET_TOKEN, &[Arg::Str("x")], 0);
        assert!(matches!(
            out,
            Err(Error::DispatchFailed { ref entry }) if entry == "plat_User_GetAccessToken"
        ));
        assert!(pending.is_empty());
        assert_eq!(sim.live_allocations(), 0);
    }

    #[test]
    fn test_duplicate_handle_rejected() {
        let sim = SimulatedPlatform::new();
        let pending = PendingTable::new();
        let d = dispatcher(&sim, &pending);
        sim.force_next_handle(77);
        d.dispatch(&GET_TOKEN, &[], 0).unwrap();
        sim.force_next_handle(77);
        assert!(matches!(
            d.dispatch(&GET_TOKEN, &[], 0),
            Err(Error::DuplicateRequestHandle(77))
        ));
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn test_marshal_failure_releases_earlier_args() {
        let sim = SimulatedPlatform::new();
        let pending = PendingTable::new();
        let mut bag = KeyValueBag::new();
        bag.insert("mode", "ranked");
        let out = dispatcher(&sim, &pending).dispatch(
            &SAVE,
            &[Arg::Str("slot"), Arg::KeyValues(&bag), Arg::OptStr(None)],
            0,
        );
        assert!(matches!(out, Err(Error::InvalidArgument(_))));
        assert!(sim.counters().allocs > 0);
        assert_eq!(sim.live_allocations(), 0);
        assert!(sim.calls().is_empty());
    }

    #[test]
    fn test_time_arg_is_utc_seconds() {
        let sim = SimulatedPlatform::new();
        let pending = PendingTable::new();
        let t = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
        dispatcher(&sim, &pending)
            .dispatch(&SAVE, &[Arg::Time(t), Arg::Bool(true), Arg::I32(-4)], 0)
            .unwrap();
        assert_eq!(
            sim.calls()[0].args,
            vec![SimArg::U64(1_700_000_000), SimArg::Bool(true), SimArg::I32(-4)]
        );
    }

    #[test]
    fn test_query_frees_owned_strings() {
        let sim = SimulatedPlatform::new();
        let pending = PendingTable::new();
        sim.register_sync("plat_Application_GetLocale", |_| SimSyncValue::OwnedStr("en_US".into()));
        let value = dispatcher(&sim, &pending).query(&LOCALE, &[]).unwrap();
        assert_eq!(value, SyncValue::Text(Some("en_US".into())));
        assert_eq!(sim.live_allocations(), 0);
        assert!(pending.is_empty());
    }

    #[test]
    fn test_query_borrowed_and_null_strings() {
        const NAME: SyncEntryPoint = SyncEntryPoint::new("User", "LoggedInUserName");
        let sim = SimulatedPlatform::new();
        let pending = PendingTable::new();
        sim.register_sync("plat_Application_GetLocale", |_| {
            SimSyncValue::BorrowedStr("fr_FR".into())
        });
        sim.register_sync("plat_User_GetLoggedInUserName", |_| SimSyncValue::Null);
        let d = dispatcher(&sim, &pending);

        assert_eq!(d.query(&LOCALE, &[]).unwrap(), SyncValue::Text(Some("fr_FR".into())));
        assert_eq!(d.query(&NAME, &[]).unwrap(), SyncValue::Text(None));
        assert_eq!(sim.counters().frees, 0);
        assert_eq!(sim.live_allocations(), 0);
    }

    #[test]
    fn test_query_unknown_entry_point() {
        let sim = SimulatedPlatform::new();
        let pending = PendingTable::new();
        assert!(matches!(
            dispatcher(&sim, &pending).query(&LOCALE, &[]),
            Err(Error::UnknownEntryPoint(_))
        ));
    }

    #[test]
    fn test_stale_reported_once() {
        let sim = SimulatedPlatform::new();
        let pending = PendingTable::new();
        let d = dispatcher(&sim, &pending);
        let old = d.dispatch(&GET_TOKEN, &[], 1).unwrap();
        d.dispatch(&GET_TOKEN, &[], 8).unwrap();

        let stale = pending.stale(10, 5);
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].handle, old);

        assert_eq!(pending.report_stale(10, 5), 1);
        assert_eq!(pending.report_stale(11, 5), 0);
        assert!(pending.abandon(old));
        assert!(!pending.abandon(old));
        assert_eq!(pending.stale(100, 5).len(), 1);
    }
}
