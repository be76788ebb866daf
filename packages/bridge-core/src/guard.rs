//! # Resource Lifetime Guard
//!
//! Scoped ownership for every native allocation the bridge makes or
//! receives. One allocation, one guard, one free, on every exit path
//! (return, `?`, unwinding).
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       ONE NATIVE CALL                                   │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ArgScope::new()                                                        │
//! │     │                                                                   │
//! │     ├── arg 1 ──► NativeString  ──► strings[0]  (guard pushed first)    │
//! │     ├── arg 2 ──► NativeArray   ──► arrays[0]                           │
//! │     ├── arg 3 ──► encode fails  ──► drop(scope) frees both              │
//! │     │                                                                   │
//! │     └── invoke_async(symbol, raw_args)                                  │
//! │                                                                         │
//! │  drop(scope) ──► every held allocation freed exactly once               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Guards borrow the [`NativeApi`] they were allocated from, so no guard can
//! outlive the platform that must free it.

use std::fmt;
use std::os::raw::c_char;
use std::ptr::NonNull;

use crate::codec::keyvalue::NativeArray;
use crate::codec::text::{self, NativeString};
use crate::config::TextPolicy;
use crate::error::{Error, Result};
use crate::native::{NativeApi, RawArg};

// ============================================================================
// SINGLE ALLOCATION
// ============================================================================

/// One block from the native allocator, freed on drop
pub struct NativeAlloc<'a> {
    api: &'a dyn NativeApi,
    ptr: NonNull<u8>,
    len: usize,
}

impl<'a> NativeAlloc<'a> {
    /// Allocate `len` bytes (at least one) from the native allocator
    pub fn new(api: &'a dyn NativeApi, len: usize) -> Result<Self> {
        let size = len.max(1);
        let ptr = NonNull::new(api.alloc(size)).ok_or(Error::AllocationFailed(size))?;
        tracing::trace!(len = size, "native allocation acquired");
        Ok(Self { api, ptr, len })
    }

    /// Start of the block
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    /// Start of the block, writable
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Requested length in bytes
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether zero bytes were requested
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The block as a byte slice
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: the allocator returned at least `len` writable bytes that
        // this guard owns exclusively.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for NativeAlloc<'_> {
    fn drop(&mut self) {
        // SAFETY: `ptr` came from `api.alloc` and is freed only here.
        unsafe { self.api.free(self.ptr.as_ptr()) };
        tracing::trace!(len = self.len, "native allocation released");
    }
}

impl fmt::Debug for NativeAlloc<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeAlloc")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .finish()
    }
}

// ============================================================================
// OWNED RETURN VALUES
// ============================================================================

/// A string the native side allocated for the caller
///
/// Read it, then let the guard hand it back to the native `free`.
pub struct OwnedNativeStr<'a> {
    api: &'a dyn NativeApi,
    ptr: NonNull<c_char>,
}

impl<'a> OwnedNativeStr<'a> {
    /// Take ownership of a native-allocated string; `None` for null.
    ///
    /// # Safety
    /// `ptr` must be null or a NUL-terminated string allocated by `api`
    /// for the caller, not yet freed.
    pub unsafe fn from_raw(api: &'a dyn NativeApi, ptr: *mut c_char) -> Option<Self> {
        NonNull::new(ptr).map(|ptr| Self { api, ptr })
    }

    /// Decode the string
    pub fn read(&self, policy: TextPolicy) -> Result<String> {
        // SAFETY: non-null and NUL-terminated per `from_raw`'s contract.
        unsafe { text::decode_string(self.ptr.as_ptr(), policy) }?
            .ok_or(Error::NullPayload("owned string"))
    }
}

impl Drop for OwnedNativeStr<'_> {
    fn drop(&mut self) {
        // SAFETY: ownership was transferred to us in `from_raw`.
        unsafe { self.api.free(self.ptr.as_ptr().cast::<u8>()) };
    }
}

// ============================================================================
// PER-CALL SCOPE
// ============================================================================

/// Owns every allocation made to marshal the arguments of one native call
///
/// Each guard is pushed as soon as it exists, so an error while marshaling
/// a later argument still frees the earlier ones when the scope drops.
pub struct ArgScope<'a> {
    api: &'a dyn NativeApi,
    strings: Vec<NativeString<'a>>,
    arrays: Vec<NativeArray<'a>>,
    buffers: Vec<NativeAlloc<'a>>,
}

impl<'a> ArgScope<'a> {
    /// Create an empty scope over `api`
    pub fn new(api: &'a dyn NativeApi) -> Self {
        Self {
            api,
            strings: Vec::new(),
            arrays: Vec::new(),
            buffers: Vec::new(),
        }
    }

    /// The platform this scope allocates from
    pub fn api(&self) -> &'a dyn NativeApi {
        self.api
    }

    /// Keep an encoded string alive for the call
    pub fn hold_string(&mut self, s: NativeString<'a>) -> RawArg {
        let raw = RawArg::Str(s.as_ptr());
        self.strings.push(s);
        raw
    }

    /// Keep an encoded key-value array alive for the call
    pub fn hold_array(&mut self, array: Option<NativeArray<'a>>) -> RawArg {
        match array {
            Some(array) => {
                let raw = RawArg::KeyValues {
                    ptr: array.as_ptr(),
                    len: array.len(),
                };
                self.arrays.push(array);
                raw
            }
            None => RawArg::KeyValues {
                ptr: std::ptr::null(),
                len: 0,
            },
        }
    }

    /// Copy `bytes` into a native buffer kept alive for the call
    pub fn hold_bytes(&mut self, bytes: &[u8]) -> Result<RawArg> {
        if bytes.is_empty() {
            return Ok(RawArg::Blob {
                ptr: std::ptr::null(),
                len: 0,
            });
        }
        let mut buf = NativeAlloc::new(self.api, bytes.len())?;
        buf.as_mut_slice().copy_from_slice(bytes);
        let raw = RawArg::Blob {
            ptr: buf.as_ptr(),
            len: bytes.len(),
        };
        self.buffers.push(buf);
        Ok(raw)
    }

    /// Number of live allocations in this scope
    pub fn held(&self) -> usize {
        self.strings.len() + self.arrays.len() + self.buffers.len()
    }
}

// ============================================================================
// TESTS
// ============================================================================
