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

//! `cljrepl`: editor-style nREPL connection handling from a terminal

pub mod cli;
pub mod commands;
pub mod config;
pub mod notifier;
pub mod store;

use clj_nrepl::{ConnectionManager, PortFileDiscovery};
use config::Config;
use notifier::ConsoleNotifier;
use std::path::Path;
use std::sync::Arc;
use store::FileStore;

/// Manager for `workspace`, wired to the on-disk store, stderr messages and
/// port-file discovery
pub fn workspace_manager(workspace: &Path, config: &Config) -> ConnectionManager {
    ConnectionManager::new(Arc::new(FileStore::for_workspace(workspace)))
        .with_notifier(Arc::new(ConsoleNotifier::stderr()))
        .with_discovery(Arc::new(PortFileDiscovery::from_env(Some(
            workspace.to_path_buf(),
        ))))
        .with_options(config.client_options())
}
