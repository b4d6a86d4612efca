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

//! Response boundary detection
//!
//! nREPL does not announce how many frames a request will produce. The
//! exchange asks a `FrameBoundary` where the bytes received so far contain a
//! completion point, decodes up to there and decides whether it is done.

use crate::codec::{self, BencodeValue, DecodeError};
use std::fmt::Debug;

/// Bencoded tail of a frame whose last (sorted) key is `status` and whose
/// final status flag is `done`: `...6:statusl4:doneee`.
pub const DEFAULT_SENTINEL: &str = "doneee";

pub trait FrameBoundary: Send + Sync + Debug {
    /// End offset (exclusive) of the last completion point in `buffer`.
    ///
    /// `from` is how far `buffer` was already searched without a hit;
    /// implementations may skip that part.
    fn find_end(&self, buffer: &[u8], from: usize) -> Option<usize>;
}

/// Scans raw bytes for a literal token.
///
/// The token must not occur inside legitimate payload text. Evaluated output
/// that happens to contain it ends the response early.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentinelBoundary {
    token: Vec<u8>,
}

impl SentinelBoundary {
    pub fn new(token: impl Into<Vec<u8>>) -> Self {
        Self {
            token: token.into(),
        }
    }

    pub fn token(&self) -> &[u8] {
        &self.token
    }
}

impl Default for SentinelBoundary {
    fn default() -> Self {
        Self::new(DEFAULT_SENTINEL)
    }
}

impl FrameBoundary for SentinelBoundary {
    fn find_end(&self, buffer: &[u8], from: usize) -> Option<usize> {
        let len = self.token.len();
        if len == 0 || buffer.len() < len {
            return None;
        }
        // Back off so a token split across two reads is still found
        let start = from.saturating_sub(len - 1);
        buffer[start..]
            .windows(len)
            .rposition(|window| window == self.token.as_slice())
            .map(|offset| start + offset + len)
    }
}

/// Walks complete frames and stops after the last one whose `status`
/// contains `done`. Immune to sentinel collisions, at the cost of parsing
/// the buffer on every read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusDoneBoundary;

fn is_done_frame(frame: &BencodeValue) -> bool {
    frame
        .get("status")
        .and_then(BencodeValue::as_list)
        .is_some_and(|flags| flags.iter().any(|f| f.as_str() == Some("done")))
}

impl FrameBoundary for StatusDoneBoundary {
    fn find_end(&self, buffer: &[u8], _from: usize) -> Option<usize> {
        let mut pos = 0;
        let mut last_done = None;
        while pos < buffer.len() {
            match codec::parse_value(buffer, pos, 0) {
                Ok((frame, end)) => {
                    if is_done_frame(&frame) {
                        last_done = Some(end);
                    }
                    pos = end;
                }
                Err(DecodeError::Incomplete) => break,
                // Hand everything to the decoder so it reports the error
                Err(DecodeError::Malformed { .. }) => return Some(buffer.len()),
            }
        }
        last_done
    }
}
