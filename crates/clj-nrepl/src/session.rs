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

/// Represents an nREPL session
///
/// A session scopes evaluation state (current namespace, dynamic bindings)
/// on the server. Ids are opaque and always server-assigned:
/// - `NReplClient::clone_session()` - Creates a new session on the server
/// - `Session::from_id()` - Re-wraps an id the server handed out earlier
///   (e.g. one listed by `ls-sessions`)
///
/// `Deserialize` is not implemented; persisted ids go through `from_id` so
/// every construction site is explicit.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
pub struct Session {
    id: String,
}

impl Session {
    pub(crate) fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn from_id(id: impl Into<String>) -> Self {
        Self::new(id)
    }

    /// Get the session ID
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl std::fmt::Display for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.id)
    }
}
