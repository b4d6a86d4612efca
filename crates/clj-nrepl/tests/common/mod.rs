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

//! Loopback fake nREPL server for scenario tests

#![allow(dead_code)]

use clj_nrepl::codec::{self, BencodeValue};
use clj_nrepl::ConnectionInfo;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// What the server does with one request
pub enum Reply {
    /// Write each frame as its own write, then wait for the client to hang up
    Frames(Vec<Vec<u8>>),
    /// Write raw bytes and close the socket
    Hangup(Vec<u8>),
    /// Never answer
    Silent,
}

pub struct FakeServer {
    pub info: ConnectionInfo,
    requests: Arc<Mutex<Vec<BencodeValue>>>,
}

impl FakeServer {
    pub async fn spawn<F>(handler: F) -> Self
    where
        F: Fn(&BencodeValue) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind failed");
        let port = listener.local_addr().expect("no local addr").port();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let handler = Arc::new(handler);

        let seen = Arc::clone(&requests);
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let handler = Arc::clone(&handler);
                let seen = Arc::clone(&seen);
                tokio::spawn(async move {
                    serve(socket, handler.as_ref(), &seen).await;
                });
            }
        });

        Self {
            info: ConnectionInfo::local(port),
            requests,
        }
    }

    /// A server speaking enough nREPL for the client operations
    pub async fn nrepl() -> Self {
        let sessions = AtomicUsize::new(0);
        Self::spawn(move |request| nrepl_reply(request, &sessions)).await
    }

    pub fn requests(&self) -> Vec<BencodeValue> {
        self.requests.lock().unwrap().clone()
    }

    pub fn ops(&self) -> Vec<String> {
        self.requests()
            .iter()
            .filter_map(|r| r.get("op").and_then(BencodeValue::as_str).map(str::to_string))
            .collect()
    }
}

async fn serve<F>(mut socket: TcpStream, handler: &F, seen: &Mutex<Vec<BencodeValue>>)
where
    F: Fn(&BencodeValue) -> Reply,
{
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 1024];

    let request = loop {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buffer.extend_from_slice(&chunk[..n]),
        }
        if let Ok(decoded) = codec::decode(&buffer) {
            if let Some(request) = decoded.objects.into_iter().next() {
                break request;
            }
        }
    };
    seen.lock().unwrap().push(request.clone());

    match handler(&request) {
        Reply::Frames(frames) => {
            for frame in frames {
                if socket.write_all(&frame).await.is_err() {
                    return;
                }
                let _ = socket.flush().await;
            }
            drain(&mut socket).await;
        }
        Reply::Hangup(bytes) => {
            let _ = socket.write_all(&bytes).await;
            let _ = socket.shutdown().await;
        }
        Reply::Silent => drain(&mut socket).await,
    }
}

async fn drain(socket: &mut TcpStream) {
    let mut sink = [0u8; 256];
    while let Ok(n) = socket.read(&mut sink).await {
        if n == 0 {
            break;
        }
    }
}

pub fn str_of<'a>(request: &'a BencodeValue, key: &str) -> Option<&'a str> {
    request.get(key).and_then(BencodeValue::as_str)
}

/// Encode one response frame
pub fn frame(fields: &[(&str, BencodeValue)]) -> Vec<u8> {
    let dict: BTreeMap<String, BencodeValue> = fields
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();
    codec::encode(&BencodeValue::Dict(dict)).expect("encode failed")
}

pub fn status(flags: &[&str]) -> BencodeValue {
    BencodeValue::List(flags.iter().map(|f| BencodeValue::from(*f)).collect())
}

pub fn done_frame(request: &BencodeValue) -> Vec<u8> {
    let mut fields = echo(request);
    fields.push(("status", status(&["done"])));
    frame(&fields)
}

/// `id` and `session` copied from the request
pub fn echo(request: &BencodeValue) -> Vec<(&'static str, BencodeValue)> {
    let mut fields = Vec::new();
    if let Some(id) = str_of(request, "id") {
        fields.push(("id", BencodeValue::from(id)));
    }
    if let Some(session) = str_of(request, "session") {
        fields.push(("session", BencodeValue::from(session)));
    }
    fields
}

fn with(request: &BencodeValue, extra: &[(&'static str, BencodeValue)]) -> Vec<u8> {
    let mut fields = echo(request);
    fields.extend(extra.iter().cloned());
    frame(&fields)
}

pub fn nrepl_reply(request: &BencodeValue, sessions: &AtomicUsize) -> Reply {
    match str_of(request, "op") {
        Some("clone") => {
            let n = sessions.fetch_add(1, Ordering::SeqCst) + 1;
            Reply::Frames(vec![with(
                request,
                &[
                    ("new-session", BencodeValue::from(format!("session-{}", n))),
                    ("status", status(&["done"])),
                ],
            )])
        }
        Some("eval") => eval_reply(request),
        Some("load-file") => Reply::Frames(vec![
            with(request, &[("value", BencodeValue::from("#'a.core/f"))]),
            done_frame(request),
        ]),
        Some("ls-sessions") => Reply::Frames(vec![with(
            request,
            &[
                (
                    "sessions",
                    BencodeValue::List(vec!["session-1".into(), "session-2".into()]),
                ),
                ("status", status(&["done"])),
            ],
        )]),
        Some("close") => Reply::Frames(vec![with(
            request,
            &[("status", status(&["session-closed", "done"]))],
        )]),
        Some("complete") => Reply::Frames(vec![with(
            request,
            &[
                (
                    "completions",
                    BencodeValue::List(vec![completion("map"), completion("mapcat")]),
                ),
                ("status", status(&["done"])),
            ],
        )]),
        Some("info") => Reply::Frames(vec![with(
            request,
            &[
                ("doc", BencodeValue::from("Returns a lazy sequence")),
                ("name", BencodeValue::from("map")),
                ("ns", BencodeValue::from("clojure.core")),
                ("status", status(&["done"])),
            ],
        )]),
        Some("stacktrace") => Reply::Frames(vec![
            with(
                request,
                &[
                    ("class", BencodeValue::from("java.lang.ArithmeticException")),
                    ("message", BencodeValue::from("Divide by zero")),
                ],
            ),
            with(request, &[("status", status(&["done"]))]),
        ]),
        _ => Reply::Frames(vec![with(
            request,
            &[("status", status(&["unknown-op", "error", "done"]))],
        )]),
    }
}

fn completion(candidate: &str) -> BencodeValue {
    let mut dict = BTreeMap::new();
    dict.insert("candidate".to_string(), BencodeValue::from(candidate));
    dict.insert("type".to_string(), BencodeValue::from("function"));
    BencodeValue::Dict(dict)
}

fn eval_reply(request: &BencodeValue) -> Reply {
    match str_of(request, "code") {
        Some("(+ 1 2)") => Reply::Frames(vec![
            with(
                request,
                &[
                    ("ns", BencodeValue::from("user")),
                    ("value", BencodeValue::from("3")),
                ],
            ),
            done_frame(request),
        ]),
        Some("(/ 1 0)") => Reply::Frames(vec![
            with(
                request,
                &[
                    ("ex", BencodeValue::from("class java.lang.ArithmeticException")),
                    ("root-ex", BencodeValue::from("class java.lang.ArithmeticException")),
                    ("status", status(&["eval-error"])),
                ],
            ),
            with(
                request,
                &[("err", BencodeValue::from("Execution error (ArithmeticException)\n"))],
            ),
            done_frame(request),
        ]),
        Some("(println \"hi\")") => Reply::Frames(vec![
            with(request, &[("out", BencodeValue::from("hi\n"))]),
            with(request, &[("value", BencodeValue::from("nil"))]),
            done_frame(request),
        ]),
        // A middleware acknowledges before the evaluation itself finishes
        Some("(early-done)") => Reply::Frames(vec![
            done_frame(request),
            with(request, &[("value", BencodeValue::from(":late"))]),
            done_frame(request),
        ]),
        Some("(hang)") => Reply::Silent,
        Some("(truncate)") => {
            let value = with(request, &[("value", BencodeValue::from("1"))]);
            Reply::Hangup(value[..value.len() - 3].to_vec())
        }
        _ => Reply::Frames(vec![
            with(request, &[("value", BencodeValue::from("nil"))]),
            done_frame(request),
        ]),
    }
}
