//! Session item collection and its binary body encoding.
//!
//! A body is written as:
//!
//! ```text
//! version:u8 | count:u32 | count × (key:str, value)
//! ```
//!
//! Strings are a `u32` byte length followed by UTF-8. Values carry a one-byte
//! type tag so numbers, strings, booleans, lists and maps come back as the
//! same JSON type they went in as. All integers are little-endian.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Number, Value};

const BODY_VERSION: u8 = 1;
const MAX_DEPTH: usize = 64;

const TAG_NULL: u8 = 0;
const TAG_FALSE: u8 = 1;
const TAG_TRUE: u8 = 2;
const TAG_I64: u8 = 3;
const TAG_U64: u8 = 4;
const TAG_F64: u8 = 5;
const TAG_STRING: u8 = 6;
const TAG_ARRAY: u8 = 7;
const TAG_OBJECT: u8 = 8;

/// Ordered collection of named session values.
///
/// Keys keep their insertion order; replacing a value keeps its position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionItems {
    entries: Vec<(String, Value)>,
}

impl SessionItems {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up a value by key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Look up a value and deserialize it into `T`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Insert or replace a value, returning the previous one.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    /// Serialize `value` and insert it under `key`.
    pub fn insert_as<T: Serialize>(
        &mut self,
        key: impl Into<String>,
        value: &T,
    ) -> serde_json::Result<Option<Value>> {
        Ok(self.insert(key, serde_json::to_value(value)?))
    }

    /// Remove a value by key.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let idx = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(idx).1)
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Encode into the body wire format.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(64);
        out.push(BODY_VERSION);
        put_len(&mut out, self.entries.len());
        for (key, value) in &self.entries {
            put_str(&mut out, key);
            put_value(&mut out, value);
        }
        out
    }

    /// Decode from the body wire format.
    pub fn decode(bytes: &[u8]) -> Result<Self, String> {
        let mut reader = Reader { buf: bytes, pos: 0 };
        let version = reader.u8()?;
        if version != BODY_VERSION {
            return Err(format!("unsupported body version {version}"));
        }
        let count = reader.len()?;
        let mut items = SessionItems::new();
        for _ in 0..count {
            let key = reader.string()?;
            let value = reader.value(0)?;
            items.entries.push((key, value));
        }
        if reader.pos != bytes.len() {
            return Err(format!("{} trailing bytes", bytes.len() - reader.pos));
        }
        Ok(items)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for SessionItems {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut items = SessionItems::new();
        for (k, v) in iter {
            items.insert(k, v);
        }
        items
    }
}

fn put_len(out: &mut Vec<u8>, len: usize) {
    out.extend_from_slice(&(len as u32).to_le_bytes());
}

fn put_str(out: &mut Vec<u8>, s: &str) {
    put_len(out, s.len());
    out.extend_from_slice(s.as_bytes());
}

fn put_value(out: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Null => out.push(TAG_NULL),
        Value::Bool(false) => out.push(TAG_FALSE),
        Value::Bool(true) => out.push(TAG_TRUE),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                out.push(TAG_I64);
                out.extend_from_slice(&i.to_le_bytes());
            } else if let Some(u) = n.as_u64() {
                out.push(TAG_U64);
                out.extend_from_slice(&u.to_le_bytes());
            } else {
                out.push(TAG_F64);
                out.extend_from_slice(&n.as_f64().unwrap_or_default().to_le_bytes());
            }
        }
        Value::String(s) => {
            out.push(TAG_STRING);
            put_str(out, s);
        }
        Value::Array(values) => {
            out.push(TAG_ARRAY);
            put_len(out, values.len());
            for v in values {
                put_value(out, v);
            }
        }
        Value::Object(map) => {
            out.push(TAG_OBJECT);
            put_len(out, map.len());
            for (k, v) in map {
                put_str(out, k);
                put_value(out, v);
            }
        }
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl Reader<'_> {
    fn take(&mut self, n: usize) -> Result<&[u8], String> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| format!("truncated at byte {}", self.pos))?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, String> {
        Ok(self.take(1)?[0])
    }

    fn array8(&mut self) -> Result<[u8; 8], String> {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(self.take(8)?);
        Ok(bytes)
    }

    fn len(&mut self) -> Result<usize, String> {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(bytes) as usize)
    }

    fn string(&mut self) -> Result<String, String> {
        let len = self.len()?;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|e| e.to_string())
    }

    fn value(&mut self, depth: usize) -> Result<Value, String> {
        if depth > MAX_DEPTH {
            return Err("value nesting too deep".to_string());
        }
        let value = match self.u8()? {
            TAG_NULL => Value::Null,
            TAG_FALSE => Value::Bool(false),
            TAG_TRUE => Value::Bool(true),
            TAG_I64 => Value::from(i64::from_le_bytes(self.array8()?)),
            TAG_U64 => Value::from(u64::from_le_bytes(self.array8()?)),
            TAG_F64 => {
                let f = f64::from_le_bytes(self.array8()?);
                Number::from_f64(f)
                    .map(Value::Number)
                    .ok_or_else(|| "non-finite float".to_string())?
            }
            TAG_STRING => Value::String(self.string()?),
            TAG_ARRAY => {
                let count = self.len()?;
                let mut values = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    values.push(self.value(depth + 1)?);
                }
                Value::Array(values)
            }
            TAG_OBJECT => {
                let count = self.len()?;
                let mut map = Map::new();
                for _ in 0..count {
                    let key = self.string()?;
                    map.insert(key, self.value(depth + 1)?);
                }
                Value::Object(map)
            }
            tag => return Err(format!("unknown value tag {tag}")),
        };
        Ok(value)
    }
}
