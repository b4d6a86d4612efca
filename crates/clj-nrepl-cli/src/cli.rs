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

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "cljrepl")]
#[command(about = "Talk to a Clojure nREPL server from the command line")]
pub struct Cli {
    /// Run in verbose mode
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Workspace the connection belongs to (defaults to the current directory)
    #[arg(long, global = true)]
    pub workspace: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Probe a server and make it this workspace's connection
    Connect {
        #[arg(long)]
        host: Option<String>,

        /// Falls back to .nrepl-port or ~/.lein/repl-port for local hosts
        #[arg(long)]
        port: Option<u16>,
    },

    /// Forget the current connection
    Disconnect,

    /// Show the current connection
    Status,

    /// Evaluate code
    Eval {
        code: String,

        /// Evaluate in this session instead of a fresh clone
        #[arg(long)]
        session: Option<String>,
    },

    /// Load a source file
    LoadFile { path: PathBuf },

    /// List server sessions
    Sessions,

    /// Close a server session
    Close { session: String },

    /// Completion candidates for a symbol prefix
    Complete {
        symbol: String,

        #[arg(long)]
        ns: Option<String>,
    },

    /// Documentation for a symbol
    Info {
        symbol: String,

        #[arg(long)]
        ns: String,
    },
}
