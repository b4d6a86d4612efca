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

use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, NReplError>;

#[derive(Debug, Error)]
pub enum NReplError {
    /// The OS refused the TCP connection. Stored connection state is torn down
    /// when this comes back from a managed client.
    #[error("Connection refused by {address}")]
    ConnectionRefused {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// Any other socket-level failure (reset, unreachable host, DNS, EOF).
    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// Bytes that can never be a prefix of a valid bencode value.
    #[error("Codec error at byte {position}: {message}{}", .buffer_preview.as_deref().unwrap_or(""))]
    Codec {
        message: String,
        position: usize,
        buffer_preview: Option<String>,
    },

    #[error("Protocol error: {message}{}", .response.as_deref().unwrap_or(""))]
    Protocol {
        message: String,
        response: Option<String>,
    },

    #[error(transparent)]
    RemoteEval(#[from] RemoteEvalError),

    #[error("No connection found.")]
    NoConnection,

    #[error("Already connected to nREPL at {0}. Disconnect first.")]
    AlreadyConnected(String),

    #[error("Already starting a nREPL. Disconnect first.")]
    LocalStartInProgress,

    #[error("Can't connect to the nREPL at {address}")]
    ProbeFailed { address: String },

    #[error("Operation failed: {0}")]
    OperationFailed(String),

    #[error("Timeout after {duration:?} while {operation}")]
    Timeout { operation: String, duration: Duration },

    #[error("Cancelled while {operation}")]
    Cancelled { operation: String },
}

/// An exception raised on the remote side during evaluation.
///
/// Responses carrying `ex`/`err` are returned as ordinary data by the
/// transport; this type exists for callers that choose to fail on them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEvalError {
    pub ex: Option<String>,
    pub err: Option<String>,
}

impl RemoteEvalError {
    /// The remote message, verbatim. Prefers `err` (the printed trace) over
    /// the exception class in `ex`.
    pub fn message(&self) -> &str {
        self.err
            .as_deref()
            .or(self.ex.as_deref())
            .unwrap_or("unknown error")
    }
}

impl std::fmt::Display for RemoteEvalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Evaluation error: {}", self.message())
    }
}

impl std::error::Error for RemoteEvalError {}

impl NReplError {
    /// Create a codec error with context
    pub fn codec(message: impl Into<String>, position: usize) -> Self {
        Self::Codec {
            message: message.into(),
            position,
            buffer_preview: None,
        }
    }

    /// Create a codec error with buffer preview for debugging
    pub fn codec_with_preview(
        message: impl Into<String>,
        position: usize,
        buffer: &[u8],
    ) -> Self {
        let preview_len = buffer.len().min(100);
        let hex_preview = buffer[..preview_len]
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect::<Vec<_>>()
            .join(" ");

        Self::Codec {
            message: message.into(),
            position,
            buffer_preview: Some(format!(" (buffer preview: {})", hex_preview)),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
            response: None,
        }
    }

    /// Create a protocol error with response data for debugging
    pub fn protocol_with_response(message: impl Into<String>, response: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
            response: Some(format!(" (response: {})", response.into())),
        }
    }

    /// Classify a failed `connect()`.
    pub(crate) fn from_connect(address: &str, error: std::io::Error) -> Self {
        if error.kind() == std::io::ErrorKind::ConnectionRefused {
            Self::ConnectionRefused {
                address: address.to_string(),
                source: error,
            }
        } else {
            Self::Transport(error)
        }
    }

    pub fn is_connection_refused(&self) -> bool {
        matches!(self, Self::ConnectionRefused { .. })
    }
}
