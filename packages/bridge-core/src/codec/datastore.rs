//! # Data Store Reconstruction
//!
//! The native side exposes no "enumerate pairs" primitive for a data store,
//! only a key count, an indexed key accessor and a value-by-key accessor.
//! Reconstruction issues exactly `1 + N + N` native calls: the count, every
//! key, then every value. The native object is only read.

use std::collections::HashSet;
use std::os::raw::c_char;

use serde::Serialize;

use super::text::decode_string;
use crate::config::TextPolicy;
use crate::error::{Error, Result};
use crate::native::sys::RawDataStore;
use crate::native::NativeApi;

/// Ordered string-to-string mapping rebuilt from a native data store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DataStore {
    entries: Vec<(String, String)>,
}

impl DataStore {
    /// Number of keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store has no keys
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Value for `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Whether `key` is present
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Keys in native enumeration order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Pairs in native enumeration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl IntoIterator for DataStore {
    type Item = (String, String);
    type IntoIter = std::vec::IntoIter<(String, String)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Rebuild a data store from its native handle.
///
/// A null key, a null value, or a repeated key is a malformed store.
///
/// # Safety
/// `ds` must be null or a data store owned by a live message of `api`.
pub unsafe fn decode_data_store(
    api: &dyn NativeApi,
    ds: *const RawDataStore,
    policy: TextPolicy,
) -> Result<DataStore> {
    if ds.is_null() {
        return Err(Error::NullPayload("data store"));
    }

    let count = api.data_store_len(ds);

    let mut raw_keys: Vec<*const c_char> = Vec::with_capacity(count);
    let mut keys = Vec::with_capacity(count);
    let mut seen = HashSet::with_capacity(count);
    for index in 0..count {
        let raw = api.data_store_key(ds, index);
        let key = decode_string(raw, policy)?
            .ok_or_else(|| Error::MalformedDataStore(format!("null key at index {}", index)))?;
        if !seen.insert(key.clone()) {
            return Err(Error::MalformedDataStore(format!("duplicate key '{}'", key)));
        }
        raw_keys.push(raw);
        keys.push(key);
    }

    let mut entries = Vec::with_capacity(count);
    for (raw, key) in raw_keys.into_iter().zip(keys) {
        let value = decode_string(api.data_store_value(ds, raw), policy)?
            .ok_or_else(|| Error::MalformedDataStore(format!("null value for key '{}'", key)))?;
        entries.push((key, value));
    }

    Ok(DataStore { entries })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimMessage, SimulatedPlatform};
    use crate::MessageType;

    fn popped_store(
        sim: &SimulatedPlatform,
        pairs: &[(&str, &str)],
    ) -> *mut crate::native::sys::RawMessage {
        sim.inject(SimMessage::notification(MessageType::NotificationRoomUpdate).data_store(pairs));
        sim.pop_message()
    }

    #[test]
    fn test_reconstruction_call_count() {
        let sim = SimulatedPlatform::new();
        let msg = popped_store(&sim, &[("map", "dunes"), ("mode", "ctf"), ("round", "3")]);
        let store = unsafe {
            let ds = sim.message_data_store(msg);
            decode_data_store(&sim, ds, TextPolicy::Strict)
        }
        .unwrap();

        let counters = sim.counters();
        assert_eq!(counters.data_store_len_calls, 1);
        assert_eq!(counters.data_store_key_calls, 3);
        assert_eq!(counters.data_store_value_calls, 3);

        assert_eq!(store.len(), 3);
        assert_eq!(store.keys().collect::<Vec<_>>(), vec!["map", "mode", "round"]);
        assert_eq!(store.get("mode"), Some("ctf"));
        assert!(!store.contains_key("missing"));

        unsafe { sim.free_message(msg) };
    }

    #[test]
    fn test_empty_store() {
        let sim = SimulatedPlatform::new();
        let msg = popped_store(&sim, &[]);
        let store =
            unsafe { decode_data_store(&sim, sim.message_data_store(msg), TextPolicy::Strict) }
                .unwrap();
        assert!(store.is_empty());
        assert_eq!(sim.counters().data_store_key_calls, 0);
        unsafe { sim.free_message(msg) };
    }

    #[test]
    fn test_duplicate_keys_rejected() {
        let sim = SimulatedPlatform::new();
        let msg = popped_store(&sim, &[("a", "1"), ("a", "2")]);
        let out =
            unsafe { decode_data_store(&sim, sim.message_data_store(msg), TextPolicy::Strict) };
        assert!(matches!(out, Err(Error::MalformedDataStore(_))));
        unsafe { sim.free_message(msg) };
    }

    #[test]
    fn test_null_store_rejected() {
        let sim = SimulatedPlatform::new();
        let out = unsafe { decode_data_store(&sim, std::ptr::null(), TextPolicy::Strict) };
        assert!(matches!(out, Err(Error::NullPayload(_))));
    }
}
