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

//! Port files left behind by locally running REPLs

use crate::connection::PortDiscovery;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Written by nREPL servers into the project root
pub const PROJECT_PORT_FILE: &str = ".nrepl-port";

/// Written by Leiningen under the user's home directory
pub const LEIN_PORT_FILE: &str = ".lein/repl-port";

/// Looks in `<project>/.nrepl-port`, then `<home>/.lein/repl-port`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortFileDiscovery {
    pub project_dir: Option<PathBuf>,
    pub home_dir: Option<PathBuf>,
}

impl PortFileDiscovery {
    pub fn new(project_dir: Option<PathBuf>, home_dir: Option<PathBuf>) -> Self {
        Self {
            project_dir,
            home_dir,
        }
    }

    /// Use the current user's home directory
    pub fn from_env(project_dir: Option<PathBuf>) -> Self {
        Self::new(project_dir, dirs::home_dir())
    }

    fn candidates(&self) -> impl Iterator<Item = PathBuf> + '_ {
        let project = self.project_dir.iter().map(|dir| dir.join(PROJECT_PORT_FILE));
        let home = self.home_dir.iter().map(|dir| dir.join(LEIN_PORT_FILE));
        project.chain(home)
    }
}

impl PortDiscovery for PortFileDiscovery {
    fn local_port(&self) -> Option<u16> {
        self.candidates().find_map(|path| read_port_file(&path))
    }
}

/// Port number stored in `path`, if it exists and parses
pub fn read_port_file(path: &Path) -> Option<u16> {
    let contents = std::fs::read_to_string(path).ok()?;
    match contents.trim().parse::<u16>() {
        Ok(port) => {
            debug!(path = %path.display(), port, "found nREPL port file");
            Some(port)
        }
        Err(e) => {
            debug!(path = %path.display(), error = %e, "ignoring unreadable port file");
            None
        }
    }
}
