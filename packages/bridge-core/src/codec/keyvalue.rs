//! # Key-Value Codec
//!
//! Named-parameter bags cross the boundary as an array of tagged
//! [`RawKeyValuePair`]s. The tag is always written explicitly from the host
//! variant; it is never inferred from which slots hold non-zero values.

use std::fmt;
use std::mem;
use std::ptr;

use serde_json::{Map, Value};

use super::text::{encode_string, NativeString};
use crate::error::{Error, Result};
use crate::guard::NativeAlloc;
use crate::native::sys::{KeyValueType, RawKeyValuePair};
use crate::native::NativeApi;

/// One value of a key-value bag
#[derive(Debug, Clone, PartialEq)]
pub enum KeyValue {
    /// String value
    Str(String),
    /// 32-bit integer value
    Int(i32),
    /// Double-precision value
    Double(f64),
}

impl KeyValue {
    /// Native discriminant for this value
    pub fn value_type(&self) -> KeyValueType {
        match self {
            KeyValue::Str(_) => KeyValueType::String,
            KeyValue::Int(_) => KeyValueType::Int,
            KeyValue::Double(_) => KeyValueType::Double,
        }
    }
}

impl From<&str> for KeyValue {
    fn from(s: &str) -> Self {
        KeyValue::Str(s.to_string())
    }
}

impl From<String> for KeyValue {
    fn from(s: String) -> Self {
        KeyValue::Str(s)
    }
}

impl From<i32> for KeyValue {
    fn from(v: i32) -> Self {
        KeyValue::Int(v)
    }
}

impl From<f64> for KeyValue {
    fn from(v: f64) -> Self {
        KeyValue::Double(v)
    }
}

/// Ordered named-parameter bag
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyValueBag {
    entries: Vec<(String, KeyValue)>,
}

impl KeyValueBag {
    /// Create an empty bag
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key`, replacing an earlier value in place
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<KeyValue>) -> &mut Self {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key, value)),
        }
        self
    }

    /// Value for `key`
    pub fn get(&self, key: &str) -> Option<&KeyValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the bag is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &KeyValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Build a bag from a dynamically typed host map.
    ///
    /// Only strings, integers that fit in `i32`, and floats are accepted;
    /// anything else is a [`Error::TypeError`] naming the key. Nothing is
    /// allocated natively here, so a rejected map leaves no native state.
    pub fn from_json(map: &Map<String, Value>) -> Result<Self> {
        let mut bag = Self::new();
        for (key, value) in map {
            let kv = match value {
                Value::String(s) => KeyValue::Str(s.clone()),
                Value::Number(n) => {
                    if let Some(i) = n.as_i64() {
                        KeyValue::Int(i32::try_from(i).map_err(|_| Error::TypeError {
                            key: key.clone(),
                            found: "integer outside the 32-bit range",
                        })?)
                    } else if n.is_u64() {
                        return Err(Error::TypeError {
                            key: key.clone(),
                            found: "integer outside the 32-bit range",
                        });
                    } else {
                        let f = n.as_f64().ok_or_else(|| Error::TypeError {
                            key: key.clone(),
                            found: "number",
                        })?;
                        KeyValue::Double(f)
                    }
                }
                Value::Bool(_) => return Err(type_error(key, "bool")),
                Value::Null => return Err(type_error(key, "null")),
                Value::Array(_) => return Err(type_error(key, "array")),
                Value::Object(_) => return Err(type_error(key, "object")),
            };
            bag.insert(key.clone(), kv);
        }
        Ok(bag)
    }
}

fn type_error(key: &str, found: &'static str) -> Error {
    Error::TypeError {
        key: key.to_string(),
        found,
    }
}

impl<K: Into<String>, V: Into<KeyValue>> FromIterator<(K, V)> for KeyValueBag {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut bag = Self::new();
        for (k, v) in iter {
            bag.insert(k, v);
        }
        bag
    }
}

/// Native pair array plus the strings its entries point into
pub struct NativeArray<'a> {
    block: NativeAlloc<'a>,
    len: usize,
    // Pointed to by `block`; dropped after it.
    _strings: Vec<NativeString<'a>>,
}

impl<'a> NativeArray<'a> {
    /// First pair
    pub fn as_ptr(&self) -> *const RawKeyValuePair {
        self.block.as_ptr().cast::<RawKeyValuePair>()
    }

    /// Number of pairs
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the array has no pairs
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The pairs as written
    pub fn pairs(&self) -> &[RawKeyValuePair] {
        // SAFETY: `block` holds `len` initialized pairs written in
        // `encode_keyvalues`, aligned by the native allocator.
        unsafe { std::slice::from_raw_parts(self.as_ptr(), self.len) }
    }
}

impl fmt::Debug for NativeArray<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeArray").field("len", &self.len).finish()
    }
}

/// Encode a bag into a native pair array.
///
/// An empty bag encodes to `None` (absent array). On any failure every
/// allocation made so far is released before the error is returned.
pub fn encode_keyvalues<'a>(
    api: &'a dyn NativeApi,
    bag: &KeyValueBag,
) -> Result<Option<NativeArray<'a>>> {
    if bag.is_empty() {
        return Ok(None);
    }

    let mut strings = Vec::with_capacity(bag.len() * 2);
    let mut pairs = Vec::with_capacity(bag.len());
    for (key, value) in bag.iter() {
        let native_key = encode_string(api, Some(key))?;
        let mut pair = RawKeyValuePair {
            key: native_key.as_ptr(),
            value_type: value.value_type(),
            string_value: ptr::null(),
            int_value: 0,
            double_value: 0.0,
        };
        strings.push(native_key);

        match value {
            KeyValue::Str(s) => {
                let native_value = encode_string(api, Some(s))?;
                pair.string_value = native_value.as_ptr();
                strings.push(native_value);
            }
            KeyValue::Int(i) => pair.int_value = *i,
            KeyValue::Double(d) => pair.double_value = *d,
        }
        pairs.push(pair);
    }

    let mut block = NativeAlloc::new(api, mem::size_of::<RawKeyValuePair>() * pairs.len())?;
    // SAFETY: `block` is large enough for `pairs.len()` pairs and the
    // native allocator aligns for any scalar type.
    unsafe {
        ptr::copy_nonoverlapping(
            pairs.as_ptr(),
            block.as_mut_ptr().cast::<RawKeyValuePair>(),
            pairs.len(),
        );
    }
    tracing::trace!(pairs = pairs.len(), "key-value array encoded");

    Ok(Some(NativeArray {
        block,
        len: pairs.len(),
        _strings: strings,
    }))
}

/// Check and encode a dynamically typed host map in one step
pub fn encode_json_keyvalues<'a>(
    api: &'a dyn NativeApi,
    map: &Map<String, Value>,
) -> Result<Option<NativeArray<'a>>> {
    let bag = KeyValueBag::from_json(map)?;
    encode_keyvalues(api, &bag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::text::decode_string;
    use crate::config::TextPolicy;
    use crate::sim::SimulatedPlatform;
    use serde_json::json;

    #[test]
    fn test_encode_writes_explicit_tags() {
        let sim = SimulatedPlatform::new();
        let bag: KeyValueBag = [
            ("name", KeyValue::from("arena")),
            ("zero", KeyValue::Int(0)),
            ("ratio", KeyValue::Double(0.5)),
        ]
        .into_iter()
        .collect();

        let array = encode_keyvalues(&sim, &bag).unwrap().unwrap();
        let pairs = array.pairs();
        assert_eq!(pairs.len(), 3);

        assert_eq!(pairs[0].value_type, KeyValueType::String);
        let value = unsafe { decode_string(pairs[0].string_value, TextPolicy::Strict) }.unwrap();
        assert_eq!(value.as_deref(), Some("arena"));

        // A zero integer is still tagged Int, not inferred from empty slots.
        assert_eq!(pairs[1].value_type, KeyValueType::Int);
        assert_eq!(pairs[1].int_value, 0);
        assert!(pairs[1].string_value.is_null());

        assert_eq!(pairs[2].value_type, KeyValueType::Double);
        assert_eq!(pairs[2].double_value, 0.5);

        // 3 keys, 1 string value, 1 pair block
        assert_eq!(sim.live_allocations(), 5);
        drop(array);
        assert_eq!(sim.live_allocations(), 0);
    }

    #[test]
    fn test_empty_bag_is_absent() {
        let sim = SimulatedPlatform::new();
        assert!(encode_keyvalues(&sim, &KeyValueBag::new()).unwrap().is_none());
        assert_eq!(sim.counters().allocs, 0);
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let mut bag = KeyValueBag::new();
        bag.insert("a", 1).insert("b", 2).insert("a", "x");
        assert_eq!(bag.len(), 2);
        assert_eq!(bag.iter().next().unwrap(), ("a", &KeyValue::from("x")));
    }

    #[test]
    fn test_json_accepts_supported_types() {
        let map = json!({"level": 12, "score": 99.5, "name": "ana"});
        let bag = KeyValueBag::from_json(map.as_object().unwrap()).unwrap();
        assert_eq!(bag.get("level"), Some(&KeyValue::Int(12)));
        assert_eq!(bag.get("score"), Some(&KeyValue::Double(99.5)));
        assert_eq!(bag.get("name"), Some(&KeyValue::from("ana")));
    }

    #[test]
    fn test_json_type_error_is_all_or_nothing() {
        let sim = SimulatedPlatform::new();
        for bad in [
            json!({"a": "ok", "flag": true}),
            json!({"a": "ok", "none": null}),
            json!({"a": "ok", "list": [1, 2]}),
            json!({"a": "ok", "obj": {"x": 1}}),
            json!({"a": "ok", "big": 4_000_000_000i64}),
            json!({"a": "ok", "huge": u64::MAX}),
        ] {
            let out = encode_json_keyvalues(&sim, bad.as_object().unwrap());
            assert!(matches!(out, Err(Error::TypeError { .. })), "{bad}");
        }
        assert_eq!(sim.counters().allocs, 0);
        assert_eq!(sim.live_allocations(), 0);
    }

    #[test]
    fn test_encoding_failure_mid_bag_releases_everything() {
        let sim = SimulatedPlatform::new();
        let mut bag = KeyValueBag::new();
        bag.insert("first", "fine").insert("second", "bad\0value");
        let out = encode_keyvalues(&sim, &bag);
        assert!(matches!(out, Err(Error::InvalidArgument(_))));
        assert!(sim.counters().allocs > 0);
        assert_eq!(sim.live_allocations(), 0);
    }
}
