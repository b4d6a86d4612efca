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

//! One request/response round trip over a byte stream
//!
//! `Connecting -> Sending -> AwaitingFrames -> (Completed | Failed)`
//!
//! The socket is owned by the caller (see `NReplClient`); this module only
//! needs something that reads and writes bytes, which keeps it testable
//! against mock streams.

use crate::boundary::FrameBoundary;
use crate::codec;
use crate::error::{NReplError, Result};
use crate::message::Response;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Connecting,
    Sending,
    AwaitingFrames,
    Completed,
    Failed,
}

/// In-flight state for one socket round trip
#[derive(Debug)]
pub struct PendingRequest<'a> {
    boundary: &'a dyn FrameBoundary,
    expect_value: bool,
    phase: Phase,
    buffer: Vec<u8>,
    // Prefix of `buffer` already searched for a boundary without success
    scanned: usize,
    saw_value: bool,
    responses: Vec<Response>,
}

impl<'a> PendingRequest<'a> {
    /// `expect_value` keeps the request open past completion markers until
    /// a frame with a value, output or error text has been seen.
    pub fn new(boundary: &'a dyn FrameBoundary, expect_value: bool) -> Self {
        Self {
            boundary,
            expect_value,
            phase: Phase::Connecting,
            buffer: Vec::new(),
            scanned: 0,
            saw_value: false,
            responses: Vec::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub(crate) fn transition(&mut self, next: Phase) {
        trace!(from = ?self.phase, to = ?next, "exchange phase");
        self.phase = next;
    }

    /// Responses decoded so far, in arrival order
    pub fn responses(&self) -> &[Response] {
        &self.responses
    }

    /// Bytes received but not yet decoded
    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_responses(self) -> Vec<Response> {
        self.responses
    }

    /// Take one inbound chunk. Returns `true` once the request has completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<bool> {
        self.buffer.extend_from_slice(chunk);

        let Some(end) = self.boundary.find_end(&self.buffer, self.scanned) else {
            self.scanned = self.buffer.len();
            return Ok(false);
        };

        let decoded = codec::decode(&self.buffer[..end])?;
        for object in decoded.objects {
            let response = Response::from_value(object)?;
            self.saw_value |= response.is_value_bearing();
            self.responses.push(response);
        }
        debug!(
            frames = self.responses.len(),
            value_seen = self.saw_value,
            "completion marker received"
        );

        if !self.expect_value || self.saw_value {
            self.transition(Phase::Completed);
            return Ok(true);
        }

        // Intermediate done frame without a payload: keep only what was not
        // decoded and carry on waiting
        self.buffer.drain(..decoded.consumed);
        self.scanned = end - decoded.consumed;
        Ok(false)
    }
}

/// Write `payload` and read until `pending` completes.
///
/// EOF before completion is a transport error; nothing partial is returned.
pub async fn exchange<S>(
    stream: &mut S,
    payload: &[u8],
    pending: &mut PendingRequest<'_>,
    read_buffer_size: usize,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let result = run(stream, payload, pending, read_buffer_size).await;
    if result.is_err() {
        pending.transition(Phase::Failed);
    }
    result
}

async fn run<S>(
    stream: &mut S,
    payload: &[u8],
    pending: &mut PendingRequest<'_>,
    read_buffer_size: usize,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pending.transition(Phase::Sending);
    stream.write_all(payload).await?;
    stream.flush().await?;

    pending.transition(Phase::AwaitingFrames);
    let mut chunk = vec![0u8; read_buffer_size.max(1)];
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(NReplError::Transport(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed before the response completed",
            )));
        }
        trace!(bytes = n, "received chunk");

        if pending.feed(&chunk[..n])? {
            return Ok(());
        }
    }
}
