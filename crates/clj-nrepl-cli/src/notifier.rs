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

use clj_nrepl::{ConnectionInfo, Notifier};
use std::io::Write;
use parking_lot::Mutex;

/// Status line shown while connected
pub fn status_text(info: &ConnectionInfo) -> String {
    format!("⚡nrepl://{}:{}", info.host, info.port)
}

/// Writes connection messages to a terminal stream
pub struct ConsoleNotifier<W> {
    out: Mutex<W>,
}

impl ConsoleNotifier<std::io::Stderr> {
    pub fn stderr() -> Self {
        Self::new(std::io::stderr())
    }
}

impl<W: Write> ConsoleNotifier<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }

    fn line(&self, message: &str) {
        let mut out = self.out.lock();
        let _ = writeln!(out, "{}", message);
    }
}

impl<W: Write + Send> Notifier for ConsoleNotifier<W> {
    fn connected(&self, info: &ConnectionInfo) {
        self.line(&status_text(info));
        self.line("Connected to nREPL.");
    }

    fn disconnected(&self, show_message: bool) {
        if show_message {
            self.line("Disconnected from nREPL.");
        }
    }

    fn connection_refused(&self, info: &ConnectionInfo) {
        self.line(&format!("nREPL at {} refused the connection.", info));
    }

    fn starting_local(&self) {
        self.line("⚡Starting nREPL...");
    }
}
