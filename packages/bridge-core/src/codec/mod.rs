//! # Codecs
//!
//! Conversions between host values and the native ABI's raw forms.
//!
//! | Module | Host | Native |
//! |--------|------|--------|
//! | [`text`] | `String`, `Vec<u8>` | NUL-terminated UTF-8, pointer + length |
//! | [`datastore`] | [`DataStore`] | count / key-at / value-for accessors |
//! | [`keyvalue`] | [`KeyValueBag`] | `RawKeyValuePair` array |
//! | [`time`] | `DateTime` | `u64` seconds since epoch, UTC |

pub mod datastore;
pub mod keyvalue;
pub mod text;
pub mod time;

pub use datastore::{decode_data_store, DataStore};
pub use keyvalue::{encode_json_keyvalues, encode_keyvalues, KeyValue, KeyValueBag, NativeArray};
pub use text::{decode_blob, decode_string, encode_string, take_owned_string, NativeString};
pub use time::{decode_timestamp, encode_timestamp};
