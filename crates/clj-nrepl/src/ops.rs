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

/// nREPL operation builders
use crate::message::Request;
use uuid::Uuid;

fn request(op: &str) -> Request {
    Request::new(op, Uuid::new_v4().to_string())
}

/// `clone`, optionally deriving from an existing session
pub fn clone_request(session: Option<&str>) -> Request {
    Request {
        session: session.map(str::to_string),
        ..request("clone")
    }
}

pub fn eval_request(session: &str, code: impl Into<String>) -> Request {
    Request {
        session: Some(session.to_string()),
        code: Some(code.into()),
        ..request("eval")
    }
}

pub fn load_file_request(
    session: &str,
    file: impl Into<String>,
    file_path: Option<&str>,
) -> Request {
    Request {
        session: Some(session.to_string()),
        file: Some(file.into()),
        file_path: file_path.map(str::to_string),
        ..request("load-file")
    }
}

pub fn close_request(session: &str) -> Request {
    Request {
        session: Some(session.to_string()),
        ..request("close")
    }
}

pub fn stacktrace_request(session: &str) -> Request {
    Request {
        session: Some(session.to_string()),
        ..request("stacktrace")
    }
}

pub fn ls_sessions_request() -> Request {
    request("ls-sessions")
}

pub fn complete_request(symbol: impl Into<String>, ns: Option<&str>) -> Request {
    Request {
        symbol: Some(symbol.into()),
        ns: ns.map(str::to_string),
        ..request("complete")
    }
}

pub fn info_request(symbol: impl Into<String>, ns: &str, session: Option<&str>) -> Request {
    Request {
        symbol: Some(symbol.into()),
        ns: Some(ns.to_string()),
        session: session.map(str::to_string),
        ..request("info")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_request_gets_a_fresh_id() {
        let a = ls_sessions_request();
        let b = ls_sessions_request();
        assert_ne!(a.id(), b.id());
        assert!(Uuid::parse_str(a.id()).is_ok());
    }

    #[test]
    fn clone_without_session_leaves_it_absent() {
        let req = clone_request(None);
        assert_eq!(req.op(), "clone");
        assert!(req.session.is_none());

        let req = clone_request(Some("parent"));
        assert_eq!(req.session.as_deref(), Some("parent"));
    }

    #[test]
    fn complete_and_info_fields() {
        let req = complete_request("ma", None);
        assert_eq!(req.op(), "complete");
        assert_eq!(req.symbol.as_deref(), Some("ma"));
        assert!(req.ns.is_none());

        let req = info_request("map", "clojure.core", Some("s1"));
        assert_eq!(req.op(), "info");
        assert_eq!(req.ns.as_deref(), Some("clojure.core"));
        assert_eq!(req.session.as_deref(), Some("s1"));
    }

    #[test]
    fn load_file_carries_contents_and_path() {
        let req = load_file_request("s1", "(ns a.core)", Some("/src/a/core.clj"));
        assert_eq!(req.op(), "load-file");
        assert_eq!(req.file.as_deref(), Some("(ns a.core)"));
        assert_eq!(req.file_path.as_deref(), Some("/src/a/core.clj"));
        assert!(req.code.is_none());
    }
}
