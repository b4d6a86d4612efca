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

//! # clj-nrepl
//!
//! An async nREPL wire client for Clojure editor integrations.
//!
//! Each call opens its own TCP connection, sends one bencoded request and
//! reassembles response frames until the server signals completion.
//! [`ConnectionManager`] keeps track of the workspace's current server.
//!
//! ## Example
//!
//! ```no_run
//! use clj_nrepl::{ClientOptions, ConnectionInfo, EvalResult, NReplClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = NReplClient::new(ConnectionInfo::local(7888), ClientOptions::default());
//!     let responses = client.evaluate("(+ 1 2)", None).await?;
//!     let result = EvalResult::from_responses(&responses);
//!     println!("Result: {:?}", result.value);
//!     Ok(())
//! }
//! ```

pub mod boundary;
mod client;
pub mod codec;
mod config;
mod connection;
mod discovery;
mod error;
pub mod exchange;
mod message;
pub mod ops;
mod session;

pub use boundary::{DEFAULT_SENTINEL, FrameBoundary, SentinelBoundary, StatusDoneBoundary};
pub use client::{NReplClient, RefusalHook};
pub use codec::{BencodeValue, DecodeResult};
pub use config::{ClientOptions, DEFAULT_READ_BUFFER_SIZE};
pub use connection::{
    ConnectionInfo, ConnectionManager, ConnectionStore, DEFAULT_LOCAL_HOST, LocalRepl,
    MemoryStore, NoopNotifier, Notifier, PortDiscovery, StartFuture, is_local_host,
};
pub use discovery::{LEIN_PORT_FILE, PROJECT_PORT_FILE, PortFileDiscovery, read_port_file};
pub use error::{NReplError, RemoteEvalError, Result};
pub use message::{EvalResult, Request, Response};
pub use session::Session;
