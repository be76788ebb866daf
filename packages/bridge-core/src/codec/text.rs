//! # String & Blob Codec
//!
//! Native strings are NUL-terminated UTF-8 without a byte-order mark, in
//! both directions. Blobs carry no terminator; their length always comes
//! from a paired accessor.

use std::ffi::CStr;
use std::fmt;
use std::os::raw::c_char;

use crate::config::TextPolicy;
use crate::error::{Error, Result};
use crate::guard::{NativeAlloc, OwnedNativeStr};
use crate::native::NativeApi;

/// Caller-allocated, NUL-terminated string for passing into a native call
pub struct NativeString<'a> {
    buf: NativeAlloc<'a>,
}

impl<'a> NativeString<'a> {
    /// Pointer to the first byte
    pub fn as_ptr(&self) -> *const c_char {
        self.buf.as_ptr().cast::<c_char>()
    }

    /// Encoded length, not counting the terminator
    pub fn len(&self) -> usize {
        self.buf.len() - 1
    }

    /// Whether the encoded string is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Encoded bytes including the terminator
    pub fn as_bytes_with_nul(&self) -> &[u8] {
        // SAFETY: the buffer holds `buf.len()` initialized bytes we wrote.
        unsafe { std::slice::from_raw_parts(self.buf.as_ptr(), self.buf.len()) }
    }
}

impl fmt::Debug for NativeString<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NativeString")
            .field(&String::from_utf8_lossy(&self.as_bytes_with_nul()[..self.len()]))
            .finish()
    }
}

/// Decode a native string; `None` for a null pointer.
///
/// Copies exactly the bytes before the first NUL, then decodes them per
/// `policy`. Never reads past the terminator.
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated buffer that stays valid
/// for the duration of the call.
pub unsafe fn decode_string(ptr: *const c_char, policy: TextPolicy) -> Result<Option<String>> {
    if ptr.is_null() {
        return Ok(None);
    }
    let bytes = CStr::from_ptr(ptr).to_bytes();
    decode_utf8(bytes, policy).map(Some)
}

/// Decode bytes already copied out of native memory
pub fn decode_utf8(bytes: &[u8], policy: TextPolicy) -> Result<String> {
    match policy {
        TextPolicy::Strict => std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|e| Error::InvalidEncoding(e.to_string())),
        TextPolicy::Replace => Ok(String::from_utf8_lossy(bytes).into_owned()),
    }
}

/// Encode a host string into a buffer from the native allocator.
///
/// Allocates exactly `s.len() + 1` bytes. An absent string or one with an
/// interior NUL cannot be represented and is rejected.
pub fn encode_string<'a>(api: &'a dyn NativeApi, s: Option<&str>) -> Result<NativeString<'a>> {
    let s = s.ok_or_else(|| Error::InvalidArgument("cannot encode an absent string".into()))?;
    let bytes = s.as_bytes();
    if let Some(pos) = bytes.iter().position(|&b| b == 0) {
        return Err(Error::InvalidArgument(format!(
            "string contains an interior NUL at byte {}",
            pos
        )));
    }

    let mut buf = NativeAlloc::new(api, bytes.len() + 1)?;
    let dst = buf.as_mut_slice();
    dst[..bytes.len()].copy_from_slice(bytes);
    dst[bytes.len()] = 0;
    Ok(NativeString { buf })
}

/// Copy exactly `len` bytes starting at `ptr`.
///
/// # Safety
/// When `len > 0`, `ptr` must point to at least `len` readable bytes.
pub unsafe fn decode_blob(ptr: *const u8, len: usize) -> Result<Vec<u8>> {
    if len == 0 {
        return Ok(Vec::new());
    }
    if ptr.is_null() {
        return Err(Error::NullPayload("blob"));
    }
    Ok(std::slice::from_raw_parts(ptr, len).to_vec())
}

/// Read a string the native side allocated for the caller, then free it.
///
/// The native buffer is released whether or not decoding succeeds.
///
/// # Safety
/// `ptr` must be null or a caller-owned native string from `api`.
pub unsafe fn take_owned_string(
    api: &dyn NativeApi,
    ptr: *mut c_char,
    policy: TextPolicy,
) -> Result<Option<String>> {
    match OwnedNativeStr::from_raw(api, ptr) {
        Some(owned) => owned.read(policy).map(Some),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimulatedPlatform;

    #[test]
    fn test_null_decodes_to_none() {
        let out = unsafe { decode_string(std::ptr::null(), TextPolicy::Strict) }.unwrap();
        assert_eq!(out, None);
    }

    #[test]
    fn test_round_trip() {
        let sim = SimulatedPlatform::new();
        for s in ["", "hello", "日本語テキスト", "emoji 🎮 ok", "\u{feff}kept"] {
            let native = encode_string(&sim, Some(s)).unwrap();
            assert_eq!(native.len(), s.len());
            let back = unsafe { decode_string(native.as_ptr(), TextPolicy::Strict) }.unwrap();
            assert_eq!(back.as_deref(), Some(s));
        }
        assert_eq!(sim.live_allocations(), 0);
    }

    #[test]
    fn test_encode_allocates_len_plus_one() {
        let sim = SimulatedPlatform::new();
        let native = encode_string(&sim, Some("abc")).unwrap();
        assert_eq!(native.as_bytes_with_nul(), b"abc\0");
        assert_eq!(sim.allocation_size(native.as_ptr().cast()), Some(4));
    }

    #[test]
    fn test_encode_rejects_absent_and_interior_nul() {
        let sim = SimulatedPlatform::new();
        assert!(matches!(encode_string(&sim, None), Err(Error::InvalidArgument(_))));
        assert!(matches!(encode_string(&sim, Some("a\0b")), Err(Error::InvalidArgument(_))));
        assert_eq!(sim.counters().allocs, 0);
    }

    #[test]
    fn test_decode_stops_at_terminator() {
        let raw = b"room\0garbage-after";
        let s = unsafe { decode_string(raw.as_ptr().cast(), TextPolicy::Strict) }.unwrap();
        assert_eq!(s.as_deref(), Some("room"));
    }

    #[test]
    fn test_invalid_utf8_policy() {
        let raw = b"ab\xffcd\0";
        let strict = unsafe { decode_string(raw.as_ptr().cast(), TextPolicy::Strict) };
        assert!(matches!(strict, Err(Error::InvalidEncoding(_))));

        let lossy = unsafe { decode_string(raw.as_ptr().cast(), TextPolicy::Replace) }.unwrap();
        assert_eq!(lossy.as_deref(), Some("ab\u{fffd}cd"));
    }

    #[test]
    fn test_decode_blob_copies_exact_length() {
        let data = [1u8, 0, 2, 0, 3];
        let out = unsafe { decode_blob(data.as_ptr(), 4) }.unwrap();
        assert_eq!(out, vec![1, 0, 2, 0]);
        assert!(unsafe { decode_blob(std::ptr::null(), 0) }.unwrap().is_empty());
        assert!(matches!(
            unsafe { decode_blob(std::ptr::null(), 3) },
            Err(Error::NullPayload(_))
        ));
    }

    #[test]
    fn test_take_owned_frees_even_on_decode_error() {
        let sim = SimulatedPlatform::new();
        let ptr = sim.alloc_owned_bytes(b"\xfe\xfe");
        let out = unsafe { take_owned_string(&sim, ptr, TextPolicy::Strict) };
        assert!(out.is_err());
        assert_eq!(sim.live_allocations(), 0);
    }
}
