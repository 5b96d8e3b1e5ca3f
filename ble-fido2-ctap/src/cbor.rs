//! CBOR encoding and decoding for the CTAP2 subset
//!
//! Supports unsigned and negative integers, byte and text strings, arrays,
//! maps with homogeneous integer or text keys, booleans, null, and single or
//! double precision floats. Tags, undefined, half floats and indefinite
//! length strings are rejected.
//!
//! Encoding always produces definite lengths and shortest-form integers, so
//! `encode(decode(b)) == b` holds for any `b` this module produced.

use crate::error::{Error, Result};

use core::cmp::Ordering;

const MAJOR_UNSIGNED: u8 = 0;
const MAJOR_NEGATIVE: u8 = 1;
const MAJOR_BYTES: u8 = 2;
const MAJOR_TEXT: u8 = 3;
const MAJOR_ARRAY: u8 = 4;
const MAJOR_MAP: u8 = 5;
const MAJOR_TAG: u8 = 6;
const MAJOR_SIMPLE: u8 = 7;

const SIMPLE_FALSE: u8 = 20;
const SIMPLE_TRUE: u8 = 21;
const SIMPLE_NULL: u8 = 22;
const FLOAT_32: u8 = 26;
const FLOAT_64: u8 = 27;
const INDEFINITE: u8 = 31;
const BREAK: u8 = 0xFF;

/// Maximum container nesting accepted by the decoder
pub const MAX_DEPTH: usize = 32;

/// Smallest encodable integer (-2^64)
const MIN_INTEGER: i128 = -(1i128 << 64);

/// Largest encodable integer (2^64 - 1)
const MAX_INTEGER: i128 = u64::MAX as i128;

/// Map key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MapKey {
    Int(i64),
    Text(String),
}

impl MapKey {
    fn kind(&self) -> KeyKind {
        match self {
            MapKey::Int(_) => KeyKind::Int,
            MapKey::Text(_) => KeyKind::Text,
        }
    }
}

impl From<i64> for MapKey {
    fn from(value: i64) -> Self {
        MapKey::Int(value)
    }
}

impl From<i32> for MapKey {
    fn from(value: i32) -> Self {
        MapKey::Int(value as i64)
    }
}

impl From<&str> for MapKey {
    fn from(value: &str) -> Self {
        MapKey::Text(value.to_string())
    }
}

impl From<String> for MapKey {
    fn from(value: String) -> Self {
        MapKey::Text(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyKind {
    Int,
    Text,
}

/// Decoded CBOR value
///
/// Maps keep their entries in encounter (or insertion) order.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(i128),
    Bytes(Vec<u8>),
    Text(String),
    Array(Vec<Value>),
    Map(Vec<(MapKey, Value)>),
    Bool(bool),
    Null,
    Float32(f32),
    Float64(f64),
}

impl Value {
    /// Build a map value from entries, keeping their order
    pub fn map<K: Into<MapKey>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Value::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn as_integer(&self) -> Option<i128> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Integer value narrowed to `i64`
    pub fn as_i64(&self) -> Option<i64> {
        self.as_integer().and_then(|i| i64::try_from(i).ok())
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&[(MapKey, Value)]> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Look up a map entry by key
    pub fn get(&self, key: &MapKey) -> Option<&Value> {
        self.as_map()?
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Look up an integer-keyed map entry
    pub fn get_int(&self, key: i64) -> Option<&Value> {
        self.get(&MapKey::Int(key))
    }

    /// Look up a text-keyed map entry
    pub fn get_text(&self, key: &str) -> Option<&Value> {
        self.as_map()?
            .iter()
            .find(|(k, _)| matches!(k, MapKey::Text(t) if t == key))
            .map(|(_, v)| v)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value as i128)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(value as i128)
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Value::Integer(value as i128)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Integer(value as i128)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Bytes(value)
    }
}

impl From<&[u8]> for Value {
    fn from(value: &[u8]) -> Self {
        Value::Bytes(value.to_vec())
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::Array(value)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Value::Float32(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float64(value)
    }
}

/// Encode a value to CBOR bytes
pub fn encode(value: &Value) -> Result<Vec<u8>> {
    let mut writer = Writer::new();
    writer.put_value(value)?;
    Ok(writer.into_bytes())
}

/// Decode exactly one CBOR value
///
/// Trailing bytes after the first item are rejected.
pub fn decode(bytes: &[u8]) -> Result<Value> {
    let mut reader = Reader::new(bytes);
    let value = reader.read_any()?;
    if reader.rest_size() != 0 {
        return Err(Error::malformed(format!(
            "{} trailing bytes",
            reader.rest_size()
        )));
    }
    Ok(value)
}

/// Item header: major type plus argument, `None` for indefinite length
struct Header {
    major: u8,
    info: u8,
    argument: Option<u64>,
}

/// Sequential CBOR reader over a byte slice
pub struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            pos: 0,
            depth: 0,
        }
    }

    /// Number of bytes consumed so far
    pub fn read_size(&self) -> usize {
        self.pos
    }

    /// Number of bytes not yet consumed
    pub fn rest_size(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn peek(&self) -> Result<u8> {
        self.bytes
            .get(self.pos)
            .copied()
            .ok_or_else(|| Error::malformed("unexpected end of input"))
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.rest_size() {
            return Err(Error::malformed("unexpected end of input"));
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn read_header(&mut self) -> Result<Header> {
        let initial = self.take(1)?[0];
        let major = initial >> 5;
        let info = initial & 0x1F;

        let argument = match info {
            0..=23 => Some(info as u64),
            24 => Some(self.take(1)?[0] as u64),
            25 => {
                let b = self.take(2)?;
                Some(u16::from_be_bytes([b[0], b[1]]) as u64)
            }
            26 => {
                let b = self.take(4)?;
                Some(u32::from_be_bytes([b[0], b[1], b[2], b[3]]) as u64)
            }
            27 => {
                let b = self.take(8)?;
                let mut raw = [0u8; 8];
                raw.copy_from_slice(b);
                Some(u64::from_be_bytes(raw))
            }
            INDEFINITE => None,
            _ => return Err(Error::malformed("reserved additional info")),
        };

        Ok(Header {
            major,
            info,
            argument,
        })
    }

    fn expect_major(&mut self, major: u8) -> Result<Header> {
        let header = self.read_header()?;
        if header.major != major {
            return Err(Error::malformed(format!(
                "expected major type {}, found {}",
                major, header.major
            )));
        }
        Ok(header)
    }

    /// Length argument of a definite-length string
    fn definite_len(&self, header: &Header) -> Result<usize> {
        let len = header
            .argument
            .ok_or_else(|| Error::malformed("indefinite length string"))?;
        let len = usize::try_from(len).map_err(|_| Error::malformed("length overflow"))?;
        if len > self.rest_size() {
            return Err(Error::malformed("declared length exceeds input"));
        }
        Ok(len)
    }

    /// Element count of a container, `None` when indefinite
    fn container_len(&self, header: &Header) -> Result<Option<usize>> {
        match header.argument {
            None => Ok(None),
            Some(count) => {
                let count =
                    usize::try_from(count).map_err(|_| Error::malformed("length overflow"))?;
                // Every element occupies at least one byte
                if count > self.rest_size() {
                    return Err(Error::malformed("declared count exceeds input"));
                }
                Ok(Some(count))
            }
        }
    }

    fn at_break(&mut self) -> Result<bool> {
        if self.peek()? == BREAK {
            self.pos += 1;
            return Ok(true);
        }
        Ok(false)
    }

    fn enter(&mut self) -> Result<()> {
        if self.depth >= MAX_DEPTH {
            return Err(Error::malformed("nesting too deep"));
        }
        self.depth += 1;
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    /// Read an unsigned or negative integer
    pub fn read_number(&mut self) -> Result<i128> {
        let header = self.read_header()?;
        let argument = header
            .argument
            .ok_or_else(|| Error::malformed("indefinite integer"))?;
        match header.major {
            MAJOR_UNSIGNED => Ok(argument as i128),
            MAJOR_NEGATIVE => Ok(-1 - argument as i128),
            other => Err(Error::malformed(format!(
                "expected integer, found major type {}",
                other
            ))),
        }
    }

    /// Read a byte string
    pub fn read_byte_string(&mut self) -> Result<Vec<u8>> {
        let header = self.expect_major(MAJOR_BYTES)?;
        let len = self.definite_len(&header)?;
        Ok(self.take(len)?.to_vec())
    }

    /// Read a UTF-8 text string
    pub fn read_string(&mut self) -> Result<String> {
        let header = self.expect_major(MAJOR_TEXT)?;
        let len = self.definite_len(&header)?;
        let raw = self.take(len)?;
        core::str::from_utf8(raw)
            .map(str::to_string)
            .map_err(|_| Error::malformed("invalid UTF-8 in text string"))
    }

    fn read_simple(&mut self) -> Result<Header> {
        let header = self.expect_major(MAJOR_SIMPLE)?;
        if header.argument.is_none() {
            return Err(Error::malformed("unexpected break"));
        }
        Ok(header)
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        match self.read_simple()?.info {
            SIMPLE_FALSE => Ok(false),
            SIMPLE_TRUE => Ok(true),
            _ => Err(Error::malformed("expected boolean")),
        }
    }

    pub fn read_null(&mut self) -> Result<()> {
        match self.read_simple()?.info {
            SIMPLE_NULL => Ok(()),
            _ => Err(Error::malformed("expected null")),
        }
    }

    /// Read a single precision float
    pub fn read_float(&mut self) -> Result<f32> {
        let header = self.read_simple()?;
        match (header.info, header.argument) {
            (FLOAT_32, Some(bits)) => Ok(f32::from_bits(bits as u32)),
            _ => Err(Error::malformed("expected single precision float")),
        }
    }

    /// Read a double precision float
    pub fn read_double(&mut self) -> Result<f64> {
        let header = self.read_simple()?;
        match (header.info, header.argument) {
            (FLOAT_64, Some(bits)) => Ok(f64::from_bits(bits)),
            _ => Err(Error::malformed("expected double precision float")),
        }
    }

    /// Read an array of arbitrary values
    pub fn read_array(&mut self) -> Result<Vec<Value>> {
        let header = self.expect_major(MAJOR_ARRAY)?;
        self.read_array_body(&header)
    }

    fn read_array_body(&mut self, header: &Header) -> Result<Vec<Value>> {
        let count = self.container_len(header)?;
        self.enter()?;
        let mut items = Vec::with_capacity(count.unwrap_or(0));
        match count {
            Some(count) => {
                for _ in 0..count {
                    items.push(self.read_any()?);
                }
            }
            None => {
                while !self.at_break()? {
                    items.push(self.read_any()?);
                }
            }
        }
        self.leave();
        Ok(items)
    }

    fn read_key(&mut self) -> Result<MapKey> {
        match self.peek()? >> 5 {
            MAJOR_UNSIGNED | MAJOR_NEGATIVE => {
                let key = self.read_number()?;
                i64::try_from(key)
                    .map(MapKey::Int)
                    .map_err(|_| Error::malformed("map key out of range"))
            }
            MAJOR_TEXT => self.read_string().map(MapKey::Text),
            other => Err(Error::malformed(format!(
                "unsupported map key major type {}",
                other
            ))),
        }
    }

    fn read_map_body(&mut self, header: &Header) -> Result<Vec<(MapKey, Value)>> {
        let count = self.container_len(header)?;
        self.enter()?;
        let mut entries: Vec<(MapKey, Value)> = Vec::with_capacity(count.unwrap_or(0));
        let mut kind = None;
        let mut remaining = count;
        loop {
            match remaining.as_mut() {
                Some(0) => break,
                Some(n) => *n -= 1,
                None => {
                    if self.at_break()? {
                        break;
                    }
                }
            }
            let key = self.read_key()?;
            match kind {
                None => kind = Some(key.kind()),
                Some(k) if k != key.kind() => {
                    return Err(Error::malformed("map keys are not homogeneous"));
                }
                Some(_) => {}
            }
            let value = self.read_any()?;
            entries.push((key, value));
        }
        self.leave();
        Ok(entries)
    }

    /// Read a map whose keys are all integers
    pub fn read_int_key_map(&mut self) -> Result<Vec<(i64, Value)>> {
        let header = self.expect_major(MAJOR_MAP)?;
        self.read_map_body(&header)?
            .into_iter()
            .map(|(k, v)| match k {
                MapKey::Int(i) => Ok((i, v)),
                MapKey::Text(_) => Err(Error::malformed("expected integer map key")),
            })
            .collect()
    }

    /// Read a map whose keys are all text strings
    pub fn read_string_key_map(&mut self) -> Result<Vec<(String, Value)>> {
        let header = self.expect_major(MAJOR_MAP)?;
        self.read_map_body(&header)?
            .into_iter()
            .map(|(k, v)| match k {
                MapKey::Text(s) => Ok((s, v)),
                MapKey::Int(_) => Err(Error::malformed("expected text map key")),
            })
            .collect()
    }

    /// Read any supported value
    pub fn read_any(&mut self) -> Result<Value> {
        match self.peek()? >> 5 {
            MAJOR_UNSIGNED | MAJOR_NEGATIVE => self.read_number().map(Value::Integer),
            MAJOR_BYTES => self.read_byte_string().map(Value::Bytes),
            MAJOR_TEXT => self.read_string().map(Value::Text),
            MAJOR_ARRAY => {
                let header = self.read_header()?;
                self.read_array_body(&header).map(Value::Array)
            }
            MAJOR_MAP => {
                let header = self.read_header()?;
                self.read_map_body(&header).map(Value::Map)
            }
            MAJOR_TAG => Err(Error::malformed("tags are not supported")),
            _ => {
                let header = self.read_simple()?;
                match (header.info, header.argument) {
                    (SIMPLE_FALSE, _) => Ok(Value::Bool(false)),
                    (SIMPLE_TRUE, _) => Ok(Value::Bool(true)),
                    (SIMPLE_NULL, _) => Ok(Value::Null),
                    (FLOAT_32, Some(bits)) => Ok(Value::Float32(f32::from_bits(bits as u32))),
                    (FLOAT_64, Some(bits)) => Ok(Value::Float64(f64::from_bits(bits))),
                    _ => Err(Error::malformed("unsupported simple value")),
                }
            }
        }
    }
}

/// CBOR writer producing definite lengths and shortest-form integers
///
/// `start_array`/`start_map` open an indefinite container closed by `end`;
/// they exist for streaming callers and are never used by [`encode`].
#[derive(Debug, Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    fn put_header(&mut self, major: u8, argument: u64) {
        let major = major << 5;
        if argument < 24 {
            self.buf.push(major | argument as u8);
        } else if argument <= u8::MAX as u64 {
            self.buf.push(major | 24);
            self.buf.push(argument as u8);
        } else if argument <= u16::MAX as u64 {
            self.buf.push(major | 25);
            self.buf.extend_from_slice(&(argument as u16).to_be_bytes());
        } else if argument <= u32::MAX as u64 {
            self.buf.push(major | 26);
            self.buf.extend_from_slice(&(argument as u32).to_be_bytes());
        } else {
            self.buf.push(major | 27);
            self.buf.extend_from_slice(&argument.to_be_bytes());
        }
    }

    pub fn put_number(&mut self, value: i64) -> &mut Self {
        if value >= 0 {
            self.put_header(MAJOR_UNSIGNED, value as u64);
        } else {
            // -1 - value, computed without overflow for i64::MIN
            self.put_header(MAJOR_NEGATIVE, !(value as u64));
        }
        self
    }

    pub fn put_unsigned(&mut self, value: u64) -> &mut Self {
        self.put_header(MAJOR_UNSIGNED, value);
        self
    }

    /// Put an integer in the full CBOR range [-2^64, 2^64 - 1]
    pub fn put_integer(&mut self, value: i128) -> Result<&mut Self> {
        if !(MIN_INTEGER..=MAX_INTEGER).contains(&value) {
            return Err(Error::EncodingFailed);
        }
        if value >= 0 {
            self.put_header(MAJOR_UNSIGNED, value as u64);
        } else {
            self.put_header(MAJOR_NEGATIVE, (-1 - value) as u64);
        }
        Ok(self)
    }

    pub fn put_byte_string(&mut self, bytes: &[u8]) -> &mut Self {
        self.put_header(MAJOR_BYTES, bytes.len() as u64);
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn put_string(&mut self, text: &str) -> &mut Self {
        self.put_header(MAJOR_TEXT, text.len() as u64);
        self.buf.extend_from_slice(text.as_bytes());
        self
    }

    pub fn put_bool(&mut self, value: bool) -> &mut Self {
        let info = if value { SIMPLE_TRUE } else { SIMPLE_FALSE };
        self.buf.push((MAJOR_SIMPLE << 5) | info);
        self
    }

    pub fn put_null(&mut self) -> &mut Self {
        self.buf.push((MAJOR_SIMPLE << 5) | SIMPLE_NULL);
        self
    }

    pub fn put_float(&mut self, value: f32) -> &mut Self {
        self.buf.push((MAJOR_SIMPLE << 5) | FLOAT_32);
        self.buf.extend_from_slice(&value.to_bits().to_be_bytes());
        self
    }

    pub fn put_double(&mut self, value: f64) -> &mut Self {
        self.buf.push((MAJOR_SIMPLE << 5) | FLOAT_64);
        self.buf.extend_from_slice(&value.to_bits().to_be_bytes());
        self
    }

    pub fn put_array(&mut self, items: &[Value]) -> Result<&mut Self> {
        self.put_header(MAJOR_ARRAY, items.len() as u64);
        for item in items {
            self.put_value(item)?;
        }
        Ok(self)
    }

    pub fn put_int_key_map(&mut self, entries: &[(i64, Value)]) -> Result<&mut Self> {
        self.put_header(MAJOR_MAP, entries.len() as u64);
        for (key, value) in entries {
            self.put_number(*key);
            self.put_value(value)?;
        }
        Ok(self)
    }

    pub fn put_string_key_map(&mut self, entries: &[(String, Value)]) -> Result<&mut Self> {
        self.put_header(MAJOR_MAP, entries.len() as u64);
        for (key, value) in entries {
            self.put_string(key);
            self.put_value(value)?;
        }
        Ok(self)
    }

    fn put_map(&mut self, entries: &[(MapKey, Value)]) -> Result<&mut Self> {
        if let Some((first, _)) = entries.first() {
            let kind = first.kind();
            if entries.iter().any(|(k, _)| k.kind() != kind) {
                return Err(Error::EncodingFailed);
            }
        }
        self.put_header(MAJOR_MAP, entries.len() as u64);
        for (key, value) in entries {
            match key {
                MapKey::Int(i) => self.put_number(*i),
                MapKey::Text(s) => self.put_string(s),
            };
            self.put_value(value)?;
        }
        Ok(self)
    }

    /// Open an indefinite-length array
    pub fn start_array(&mut self) -> &mut Self {
        self.buf.push((MAJOR_ARRAY << 5) | INDEFINITE);
        self
    }

    /// Open an indefinite-length map
    pub fn start_map(&mut self) -> &mut Self {
        self.buf.push((MAJOR_MAP << 5) | INDEFINITE);
        self
    }

    /// Close the innermost indefinite container
    pub fn end(&mut self) -> &mut Self {
        self.buf.push(BREAK);
        self
    }

    /// Put any value
    pub fn put_value(&mut self, value: &Value) -> Result<&mut Self> {
        match value {
            Value::Integer(i) => return self.put_integer(*i),
            Value::Bytes(b) => self.put_byte_string(b),
            Value::Text(s) => self.put_string(s),
            Value::Array(items) => return self.put_array(items),
            Value::Map(entries) => return self.put_map(entries),
            Value::Bool(b) => self.put_bool(*b),
            Value::Null => self.put_null(),
            Value::Float32(f) => self.put_float(*f),
            Value::Float64(f) => self.put_double(*f),
        };
        Ok(self)
    }

    /// Bytes written so far
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Compare keys by their CTAP2 canonical encoding: shorter encodings sort
/// first, equal lengths sort bytewise.
fn canonical_cmp(a: &MapKey, b: &MapKey) -> Ordering {
    let encode_key = |key: &MapKey| {
        let mut w = Writer::new();
        match key {
            MapKey::Int(i) => w.put_number(*i),
            MapKey::Text(s) => w.put_string(s),
        };
        w.into_bytes()
    };
    let (ea, eb) = (encode_key(a), encode_key(b));
    ea.len().cmp(&eb.len()).then_with(|| ea.cmp(&eb))
}

/// Builder for CBOR maps with CTAP2 canonical key ordering
///
/// Integer keys come out as `1, 2, 3, ..., -1, -2, -3, ...` for the small
/// keys used by CTAP and COSE structures.
#[derive(Debug, Default)]
pub struct MapBuilder {
    entries: Vec<(MapKey, Value)>,
}

impl MapBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value; a repeated key replaces the earlier value
    pub fn insert(mut self, key: impl Into<MapKey>, value: impl Into<Value>) -> Self {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
        self
    }

    /// Insert an optional value (skipped if None)
    pub fn insert_opt(self, key: impl Into<MapKey>, value: Option<impl Into<Value>>) -> Self {
        match value {
            Some(v) => self.insert(key, v),
            None => self,
        }
    }

    /// Insert a byte string
    pub fn insert_bytes(self, key: impl Into<MapKey>, bytes: &[u8]) -> Self {
        self.insert(key, Value::Bytes(bytes.to_vec()))
    }

    /// Build the map value in canonical order
    pub fn build_value(mut self) -> Value {
        self.entries.sort_by(|(a, _), (b, _)| canonical_cmp(a, b));
        Value::Map(self.entries)
    }

    /// Build and encode the map
    pub fn build(self) -> Result<Vec<u8>> {
        encode(&self.build_value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shortest_form_integers() {
        let cases: &[(i64, &[u8])] = &[
            (0, &[0x00]),
            (23, &[0x17]),
            (24, &[0x18, 0x18]),
            (255, &[0x18, 0xFF]),
            (256, &[0x19, 0x01, 0x00]),
            (65536, &[0x1A, 0x00, 0x01, 0x00, 0x00]),
            (-1, &[0x20]),
            (-24, &[0x37]),
            (-25, &[0x38, 0x18]),
            (-257, &[0x39, 0x01, 0x00]),
        ];

        for (value, expected) in cases {
            let mut w = Writer::new();
            w.put_number(*value);
            assert_eq!(w.as_bytes(), *expected, "encoding of {}", value);
            assert_eq!(Reader::new(expected).read_number().unwrap(), *value as i128);
        }
    }

    #[test]
    fn test_integer_extremes() {
        let max = encode(&Value::Integer(u64::MAX as i128)).unwrap();
        assert_eq!(max[0], 0x1B);
        assert_eq!(decode(&max).unwrap(), Value::Integer(u64::MAX as i128));

        let min = encode(&Value::Integer(-(1i128 << 64))).unwrap();
        assert_eq!(min, vec![0x3B, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(decode(&min).unwrap(), Value::Integer(-(1i128 << 64)));

        let mut w = Writer::new();
        w.put_number(i64::MIN);
        assert_eq!(
            Reader::new(w.as_bytes()).read_number().unwrap(),
            i64::MIN as i128
        );

        assert_eq!(
            encode(&Value::Integer(1i128 << 64)),
            Err(Error::EncodingFailed)
        );
    }

    #[test]
    fn test_text_and_bytes() {
        let mut w = Writer::new();
        w.put_string("fmt").put_byte_string(&[1, 2, 3]);
        assert_eq!(
            w.as_bytes(),
            &[0x63, b'f', b'm', b't', 0x43, 0x01, 0x02, 0x03]
        );

        let mut r = Reader::new(w.as_bytes());
        assert_eq!(r.read_string().unwrap(), "fmt");
        assert_eq!(r.read_size(), 4);
        assert_eq!(r.read_byte_string().unwrap(), vec![1, 2, 3]);
        assert_eq!(r.rest_size(), 0);
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        let bytes = [0x62, 0xC3, 0x28];
        assert!(matches!(
            Reader::new(&bytes).read_string(),
            Err(Error::MalformedEncoding(_))
        ));
    }

    #[test]
    fn test_simple_values_and_floats() {
        let mut w = Writer::new();
        w.put_bool(true)
            .put_bool(false)
            .put_null()
            .put_float(1.5)
            .put_double(-2.25);

        let mut r = Reader::new(w.as_bytes());
        assert!(r.read_bool().unwrap());
        assert!(!r.read_bool().unwrap());
        r.read_null().unwrap();
        assert_eq!(r.read_float().unwrap(), 1.5);
        assert_eq!(r.read_double().unwrap(), -2.25);
        assert_eq!(r.rest_size(), 0);
    }

    #[test]
    fn test_nested_round_trip() {
        let value = Value::map([
            (
                "fmt",
                Value::from("packed"),
            ),
            (
                "attStmt",
                Value::map([(
                    "x5c",
                    Value::Array(vec![Value::Bytes(vec![0xAA; 300]), Value::Bytes(vec![])]),
                )]),
            ),
            ("authData", Value::Bytes(vec![0x55; 37])),
        ]);

        let bytes = encode(&value).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, value);
        assert_eq!(encode(&decoded).unwrap(), bytes);
    }

    #[test]
    fn test_map_order_preserved() {
        let bytes = encode(&Value::map([("b", Value::from(1)), ("a", Value::from(2))])).unwrap();
        let entries = Reader::new(&bytes).read_string_key_map().unwrap();
        assert_eq!(entries[0].0, "b");
        assert_eq!(entries[1].0, "a");
    }

    #[test]
    fn test_mixed_map_keys_rejected() {
        // {1: 0, "a": 0}
        let bytes = [0xA2, 0x01, 0x00, 0x61, b'a', 0x00];
        assert!(matches!(decode(&bytes), Err(Error::MalformedEncoding(_))));

        let mixed = Value::Map(vec![
            (MapKey::Int(1), Value::Null),
            (MapKey::Text("a".into()), Value::Null),
        ]);
        assert_eq!(encode(&mixed), Err(Error::EncodingFailed));
    }

    #[test]
    fn test_int_key_map_rejects_text_keys() {
        let bytes = encode(&Value::map([("rp", Value::Null)])).unwrap();
        assert!(Reader::new(&bytes).read_int_key_map().is_err());
        assert!(Reader::new(&bytes).read_string_key_map().is_ok());
    }

    #[test]
    fn test_indefinite_containers() {
        let mut w = Writer::new();
        w.start_map()
            .put_number(1)
            .start_array()
            .put_number(7)
            .put_string("x")
            .end()
            .end();

        let value = decode(w.as_bytes()).unwrap();
        let inner = value.get_int(1).unwrap().as_array().unwrap();
        assert_eq!(inner.len(), 2);
        assert_eq!(inner[0].as_i64(), Some(7));

        // Re-encoding produces definite lengths
        assert_eq!(encode(&value).unwrap(), vec![0xA1, 0x01, 0x82, 0x07, 0x61, b'x']);
    }

    #[test]
    fn test_truncated_input_rejected() {
        assert!(decode(&[]).is_err());
        assert!(decode(&[0x19, 0x01]).is_err());
        assert!(decode(&[0x45, 0x01, 0x02]).is_err());
        assert!(decode(&[0x82, 0x01]).is_err());
        assert!(decode(&[0x9F, 0x01]).is_err());
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        assert!(matches!(
            decode(&[0x01, 0x02]),
            Err(Error::MalformedEncoding(_))
        ));
    }

    #[test]
    fn test_unsupported_items_rejected() {
        // Tag 24
        assert!(decode(&[0xD8, 0x18, 0x40]).is_err());
        // Undefined
        assert!(decode(&[0xF7]).is_err());
        // Half float
        assert!(decode(&[0xF9, 0x3C, 0x00]).is_err());
        // Indefinite byte string
        assert!(decode(&[0x5F, 0x41, 0x00, 0xFF]).is_err());
        // Lone break
        assert!(decode(&[0xFF]).is_err());
        // Reserved additional info
        assert!(decode(&[0x1C]).is_err());
    }

    #[test]
    fn test_huge_declared_length_rejected() {
        assert!(decode(&[0x5B, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]).is_err());
        assert!(decode(&[0x9A, 0x7F, 0xFF, 0xFF, 0xFF]).is_err());
    }

    #[test]
    fn test_nesting_limit() {
        let mut bytes = vec![0x81; MAX_DEPTH + 1];
        bytes.push(0x00);
        assert!(matches!(decode(&bytes), Err(Error::MalformedEncoding(_))));

        let mut ok = vec![0x81; MAX_DEPTH];
        ok.push(0x00);
        assert!(decode(&ok).is_ok());
    }

    #[test]
    fn test_map_builder_canonical_ordering() {
        let bytes = MapBuilder::new()
            .insert(-2, Value::Bytes(vec![0x02]))
            .insert(3, -7)
            .insert(-1, 1)
            .insert(1, 2)
            .insert(-3, Value::Bytes(vec![0x03]))
            .build()
            .unwrap();

        let keys: Vec<i64> = Reader::new(&bytes)
            .read_int_key_map()
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec![1, 3, -1, -2, -3]);
    }

    #[test]
    fn test_map_builder_length_first_text_keys() {
        let value = MapBuilder::new()
            .insert("authData", Value::Null)
            .insert("fmt", Value::Null)
            .insert("attStmt", Value::Null)
            .build_value();

        let keys: Vec<&MapKey> = value.as_map().unwrap().iter().map(|(k, _)| k).collect();
        assert_eq!(
            keys,
            vec![
                &MapKey::from("fmt"),
                &MapKey::from("attStmt"),
                &MapKey::from("authData")
            ]
        );
    }

    #[test]
    fn test_map_builder_insert_opt_and_replace() {
        let value = MapBuilder::new()
            .insert(1, 10)
            .insert_opt(2, None::<i32>)
            .insert_opt(3, Some(true))
            .insert(1, 11)
            .build_value();

        assert_eq!(value.as_map().unwrap().len(), 2);
        assert_eq!(value.get_int(1).unwrap().as_i64(), Some(11));
        assert!(value.get_int(2).is_none());
        assert_eq!(value.get_int(3).unwrap().as_bool(), Some(true));
    }
}
