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

//! Per-client tuning knobs

use crate::boundary::{FrameBoundary, SentinelBoundary};
use std::sync::Arc;
use std::time::Duration;

/// Default size of each socket read
pub const DEFAULT_READ_BUFFER_SIZE: usize = 4096;

#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Deadline for one round trip, connect included. `None` waits forever.
    pub timeout: Option<Duration>,
    pub read_buffer_size: usize,
    pub boundary: Arc<dyn FrameBoundary>,
}

impl ClientOptions {
    pub fn new() -> Self {
        Self {
            timeout: None,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            boundary: Arc::new(SentinelBoundary::default()),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.max(1);
        self
    }

    pub fn with_boundary(mut self, boundary: impl FrameBoundary + 'static) -> Self {
        self.boundary = Arc::new(boundary);
        self
    }
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::new()
    }
}
