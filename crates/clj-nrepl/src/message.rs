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

use crate::codec::BencodeValue;
use crate::error::{NReplError, RemoteEvalError, Result};
use serde::Serialize;
use std::collections::BTreeMap;

/// An outbound nREPL message. Absent fields are never put on the wire.
#[derive(Debug, Clone, Serialize)]
pub struct Request {
    pub(crate) op: String,
    pub(crate) id: String,
    // Common to many operations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) session: Option<String>,

    // eval operation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) code: Option<String>,

    // load-file operation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "file-path")]
    pub(crate) file_path: Option<String>,

    // complete / info operations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) ns: Option<String>,
}

impl Request {
    pub(crate) fn new(op: &str, id: String) -> Self {
        Self {
            op: op.to_string(),
            id,
            session: None,
            code: None,
            file: None,
            file_path: None,
            symbol: None,
            ns: None,
        }
    }

    pub fn op(&self) -> &str {
        &self.op
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Replace the generated message id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

/// One decoded response frame (a top-level bencode dictionary)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    fields: BTreeMap<String, BencodeValue>,
}

impl Response {
    /// Wrap a decoded value; nREPL frames are always dictionaries
    pub fn from_value(value: BencodeValue) -> Result<Self> {
        match value {
            BencodeValue::Dict(fields) => Ok(Self { fields }),
            other => Err(NReplError::protocol_with_response(
                "Response frame is not a dictionary",
                other.to_string_repr(),
            )),
        }
    }

    pub fn fields(&self) -> &BTreeMap<String, BencodeValue> {
        &self.fields
    }

    pub fn get(&self, key: &str) -> Option<&BencodeValue> {
        self.fields.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// A string-valued field
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(BencodeValue::as_str)
    }

    pub fn id(&self) -> Option<&str> {
        self.str_field("id")
    }

    pub fn value(&self) -> Option<&str> {
        self.str_field("value")
    }

    pub fn out(&self) -> Option<&str> {
        self.str_field("out")
    }

    pub fn err(&self) -> Option<&str> {
        self.str_field("err")
    }

    pub fn ex(&self) -> Option<&str> {
        self.str_field("ex")
    }

    pub fn root_ex(&self) -> Option<&str> {
        self.str_field("root-ex")
    }

    pub fn ns(&self) -> Option<&str> {
        self.str_field("ns")
    }

    pub fn session(&self) -> Option<&str> {
        self.str_field("session")
    }

    pub fn new_session(&self) -> Option<&str> {
        self.str_field("new-session")
    }

    /// Status flags such as `done`, `eval-error`, `session-closed`
    pub fn status(&self) -> Vec<&str> {
        self.get("status")
            .and_then(BencodeValue::as_list)
            .map(|items| items.iter().filter_map(BencodeValue::as_str).collect())
            .unwrap_or_default()
    }

    pub fn has_status(&self, flag: &str) -> bool {
        self.status().contains(&flag)
    }

    /// Session ids from an `ls-sessions` reply
    pub fn sessions(&self) -> Option<Vec<String>> {
        self.get("sessions").and_then(BencodeValue::as_list).map(|items| {
            items
                .iter()
                .filter_map(BencodeValue::as_str)
                .map(str::to_string)
                .collect()
        })
    }

    /// Carries an evaluation result, printed output or error text.
    ///
    /// A `value` of `nil` counts as a result. Skipping it would leave an
    /// eval that returns nil and prints nothing waiting for a value frame
    /// the server never sends.
    pub fn is_value_bearing(&self) -> bool {
        self.contains("value") || self.contains("out") || self.contains("err")
    }

    /// The remote exception this frame reports, if any
    pub fn remote_error(&self) -> Option<RemoteEvalError> {
        if self.contains("ex") || self.contains("err") {
            Some(RemoteEvalError {
                ex: self.ex().map(str::to_string),
                err: self.err().map(str::to_string),
            })
        } else {
            None
        }
    }
}

/// Aggregated view of the frames an `eval` produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalResult {
    pub value: Option<String>,
    pub output: Vec<String>,
    pub error: Vec<String>,
    pub ns: Option<String>,
    pub ex: Option<String>,
}

impl EvalResult {
    pub fn new() -> Self {
        Self {
            value: None,
            output: Vec::new(),
            error: Vec::new(),
            ns: None,
            ex: None,
        }
    }

    /// Fold frames in order; the last `value` wins, output and errors accumulate
    pub fn from_responses(responses: &[Response]) -> Self {
        let mut result = Self::new();
        for response in responses {
            if let Some(value) = response.value() {
                result.value = Some(value.to_string());
            }
            if let Some(out) = response.out() {
                result.output.push(out.to_string());
            }
            if let Some(err) = response.err() {
                result.error.push(err.to_string());
            }
            if let Some(ns) = response.ns() {
                result.ns = Some(ns.to_string());
            }
            if let Some(ex) = response.ex() {
                result.ex = Some(ex.to_string());
            }
        }
        result
    }

    pub fn is_error(&self) -> bool {
        self.ex.is_some() || !self.error.is_empty()
    }

    /// Fail with the remote exception, if the evaluation raised one
    pub fn into_result(self) -> Result<Self> {
        if self.is_error() {
            let err = if self.error.is_empty() {
                None
            } else {
                Some(self.error.concat())
            };
            return Err(RemoteEvalError { ex: self.ex, err }.into());
        }
        Ok(self)
    }
}

impl Default for EvalResult {
    fn default() -> Self {
        Self::new()
    }
}
