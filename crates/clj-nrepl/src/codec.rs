// Copyright (C) 2025 Tom Waddington
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

/// Bencode codec for nREPL messages
///
/// Bencode format:
/// - Strings: `<length>:<string>` (e.g., "4:spam")
/// - Integers: `i<number>e` (e.g., "i42e")
/// - Lists: `l<items>e` (e.g., "l4:spam4:eggse")
/// - Dictionaries: `d<key><value>...e` (e.g., "d3:cow3:moo4:spam4:eggse")
///
/// Encoding goes through `serde_bencode`. Decoding is a cursor-based
/// recursive descent that tells apart a buffer that simply ends too early
/// (more bytes will arrive) from one that can never become valid.
use crate::error::{NReplError, Result};
use crate::message::Request;
use serde::ser::{Serialize, Serializer};
use std::collections::BTreeMap;

/// Maximum allowed length for a single bencode string (100MB)
/// This prevents malicious servers from causing OOM by sending extremely large length values
const MAX_STRING_LENGTH: usize = 100 * 1024 * 1024;

/// Maximum nesting of lists/dicts before input is rejected.
const MAX_DEPTH: usize = 256;

/// A decoded (or to-be-encoded) bencode value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BencodeValue {
    Bytes(Vec<u8>),
    Int(i64),
    List(Vec<BencodeValue>),
    Dict(BTreeMap<String, BencodeValue>),
}

impl BencodeValue {
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            BencodeValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Byte string contents, when they are valid UTF-8
    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            BencodeValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[BencodeValue]> {
        match self {
            BencodeValue::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&BTreeMap<String, BencodeValue>> {
        match self {
            BencodeValue::Dict(d) => Some(d),
            _ => None,
        }
    }

    /// Look up a key when this value is a dictionary
    pub fn get(&self, key: &str) -> Option<&BencodeValue> {
        self.as_dict().and_then(|d| d.get(key))
    }

    /// Human-readable rendering, used when printing structured replies
    /// (e.g. `info` maps from cider-nrepl).
    pub fn to_string_repr(&self) -> String {
        match self {
            BencodeValue::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
            BencodeValue::Int(i) => i.to_string(),
            BencodeValue::List(list) => {
                let items: Vec<String> = list.iter().map(|v| v.to_string_repr()).collect();
                format!("[{}]", items.join(", "))
            }
            BencodeValue::Dict(dict) => {
                let items: Vec<String> = dict
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k, v.to_string_repr()))
                    .collect();
                format!("{{{}}}", items.join(", "))
            }
        }
    }
}

impl From<&str> for BencodeValue {
    fn from(s: &str) -> Self {
        BencodeValue::Bytes(s.as_bytes().to_vec())
    }
}

impl From<String> for BencodeValue {
    fn from(s: String) -> Self {
        BencodeValue::Bytes(s.into_bytes())
    }
}

impl From<i64> for BencodeValue {
    fn from(i: i64) -> Self {
        BencodeValue::Int(i)
    }
}

impl From<Vec<BencodeValue>> for BencodeValue {
    fn from(list: Vec<BencodeValue>) -> Self {
        BencodeValue::List(list)
    }
}

impl From<BTreeMap<String, BencodeValue>> for BencodeValue {
    fn from(dict: BTreeMap<String, BencodeValue>) -> Self {
        BencodeValue::Dict(dict)
    }
}

impl Serialize for BencodeValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            BencodeValue::Bytes(b) => serializer.serialize_bytes(b),
            BencodeValue::Int(i) => serializer.serialize_i64(*i),
            BencodeValue::List(list) => list.serialize(serializer),
            BencodeValue::Dict(dict) => dict.serialize(serializer),
        }
    }
}

/// Outcome of a single decode pass over a buffer
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DecodeResult {
    /// Complete top-level values, in wire order
    pub objects: Vec<BencodeValue>,
    /// Trailing bytes that do not (yet) form a complete value
    pub rest: Vec<u8>,
    /// Number of input bytes covered by `objects`
    pub consumed: usize,
}

/// Why a value could not be parsed at the cursor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The buffer ends inside a value that is valid so far.
    Incomplete,
    /// No continuation of these bytes is valid bencode.
    Malformed { message: String, position: usize },
}

fn malformed(message: impl Into<String>, position: usize) -> DecodeError {
    DecodeError::Malformed {
        message: message.into(),
        position,
    }
}

pub fn encode(value: &BencodeValue) -> Result<Vec<u8>> {
    serde_bencode::to_bytes(value).map_err(|e| NReplError::codec(e.to_string(), 0))
}

pub fn encode_request(request: &Request) -> Result<Vec<u8>> {
    serde_bencode::to_bytes(request).map_err(|e| NReplError::codec(e.to_string(), 0))
}

/// Split `buffer` into every complete top-level value it starts with, plus
/// the unparsed remainder.
///
/// A buffer that ends part-way through a value is not an error: the partial
/// bytes come back in `rest`. Only bytes that can never be valid bencode
/// produce `NReplError::Codec`.
pub fn decode(buffer: &[u8]) -> Result<DecodeResult> {
    let mut objects = Vec::new();
    let mut pos = 0;

    while pos < buffer.len() {
        match parse_value(buffer, pos, 0) {
            Ok((value, end)) => {
                objects.push(value);
                pos = end;
            }
            Err(DecodeError::Incomplete) => break,
            Err(DecodeError::Malformed { message, position }) => {
                return Err(NReplError::codec_with_preview(
                    message,
                    position,
                    &buffer[pos..],
                ));
            }
        }
    }

    Ok(DecodeResult {
        objects,
        rest: buffer[pos..].to_vec(),
        consumed: pos,
    })
}

/// Parse one value starting at `pos`, returning it and the offset just past it
pub fn parse_value(
    data: &[u8],
    start: usize,
    depth: usize,
) -> std::result::Result<(BencodeValue, usize), DecodeError> {
    let mut pos = start;

    if pos >= data.len() {
        return Err(DecodeError::Incomplete);
    }
    if depth > MAX_DEPTH {
        return Err(malformed(
            format!("Nesting deeper than {} levels", MAX_DEPTH),
            pos,
        ));
    }

    match data[pos] {
        b'i' => parse_integer(data, pos),
        b'l' => {
            // List: l<items>e
            pos += 1;
            let mut items = Vec::new();
            loop {
                match data.get(pos) {
                    None => return Err(DecodeError::Incomplete),
                    Some(b'e') => return Ok((BencodeValue::List(items), pos + 1)),
                    Some(_) => {
                        let (item, next) = parse_value(data, pos, depth + 1)?;
                        items.push(item);
                        pos = next;
                    }
                }
            }
        }
        b'd' => {
            // Dict: d<key><value>...e
            pos += 1;
            let mut entries = BTreeMap::new();
            loop {
                match data.get(pos) {
                    None => return Err(DecodeError::Incomplete),
                    Some(b'e') => return Ok((BencodeValue::Dict(entries), pos + 1)),
                    Some(b'0'..=b'9') => {
                        let key_pos = pos;
                        let (key, next) = parse_bytes(data, pos)?;
                        let key = String::from_utf8(key)
                            .map_err(|_| malformed("Dictionary key is not valid UTF-8", key_pos))?;
                        let (value, next) = parse_value(data, next, depth + 1)?;
                        entries.insert(key, value);
                        pos = next;
                    }
                    Some(b) => {
                        return Err(malformed(
                            format!("Dictionary key must be a byte string, found 0x{:02x}", b),
                            pos,
                        ));
                    }
                }
            }
        }
        b'0'..=b'9' => {
            let (bytes, end) = parse_bytes(data, pos)?;
            Ok((BencodeValue::Bytes(bytes), end))
        }
        b => Err(malformed(format!("Invalid bencode byte: 0x{:02x}", b), pos)),
    }
}

/// Integer: i<number>e
fn parse_integer(
    data: &[u8],
    start: usize,
) -> std::result::Result<(BencodeValue, usize), DecodeError> {
    let digits_start = start + 1;
    let mut pos = digits_start;

    while let Some(&b) = data.get(pos) {
        match b {
            b'e' => break,
            b'-' if pos == digits_start => {}
            b'0'..=b'9' => {}
            other => {
                return Err(malformed(
                    format!("Invalid byte 0x{:02x} in integer", other),
                    pos,
                ));
            }
        }
        pos += 1;
    }

    let digits = &data[digits_start..pos];

    // Reject non-canonical forms as soon as they are visible, even before 'e'
    let unsigned = digits.strip_prefix(b"-").unwrap_or(digits);
    if unsigned.len() > 1 && unsigned[0] == b'0' {
        return Err(malformed("Integer has a leading zero", digits_start));
    }
    if digits == b"-0" {
        return Err(malformed("Negative zero is not a valid integer", digits_start));
    }

    if pos >= data.len() {
        return Err(DecodeError::Incomplete);
    }
    if unsigned.is_empty() {
        return Err(malformed("Integer has no digits", digits_start));
    }

    let value = std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| malformed("Integer does not fit in 64 bits", digits_start))?;

    Ok((BencodeValue::Int(value), pos + 1))
}

/// String: <length>:<data>
fn parse_bytes(data: &[u8], start: usize) -> std::result::Result<(Vec<u8>, usize), DecodeError> {
    let mut pos = start;

    while let Some(&b) = data.get(pos) {
        match b {
            b':' => break,
            b'0'..=b'9' => pos += 1,
            other => {
                return Err(malformed(
                    format!("Invalid byte 0x{:02x} in string length", other),
                    pos,
                ));
            }
        }
    }

    let len_digits = &data[start..pos];
    // usize::MAX has 20 decimal digits
    if len_digits.len() > 20 {
        return Err(malformed("Invalid string length value", start));
    }
    if pos >= data.len() {
        return Err(DecodeError::Incomplete);
    }
    pos += 1; // Skip ':'

    let len = std::str::from_utf8(len_digits)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or_else(|| malformed("Invalid string length value", start))?;

    // Check maximum string length to prevent OOM from malicious servers
    if len > MAX_STRING_LENGTH {
        return Err(malformed(
            format!(
                "String length {} exceeds maximum allowed size of {} bytes ({} MB)",
                len,
                MAX_STRING_LENGTH,
                MAX_STRING_LENGTH / (1024 * 1024)
            ),
            start,
        ));
    }

    let end_pos = pos.checked_add(len).ok_or_else(|| {
        malformed(
            format!(
                "String length {} would cause integer overflow at position {}",
                len, pos
            ),
            start,
        )
    })?;

    if end_pos > data.len() {
        return Err(DecodeError::Incomplete);
    }

    Ok((data[pos..end_pos].to_vec(), end_pos))
}
