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

//! Workspace-scoped connection state on disk

use clj_nrepl::{ConnectionInfo, ConnectionStore};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const STATE_DIR: &str = ".cljrepl";
pub const STATE_FILE: &str = "connection.json";

/// Keeps the current connection in `<workspace>/.cljrepl/connection.json`
///
/// Storage failures are logged and otherwise ignored; a missing or corrupt
/// file reads as "not connected".
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    // Serialises writers within this process
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn for_workspace(workspace: &Path) -> Self {
        Self::new(workspace.join(STATE_DIR).join(STATE_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, info: &ConnectionInfo) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(info).map_err(std::io::Error::other)?;
        std::fs::write(&self.path, json)
    }

    fn remove(&self) -> std::io::Result<()> {
        match std::fs::remove_file(&self.path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

impl ConnectionStore for FileStore {
    fn get(&self) -> Option<ConnectionInfo> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "cannot read connection state");
                return None;
            }
        };
        match serde_json::from_str(&contents) {
            Ok(info) => Some(info),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "ignoring corrupt connection state");
                None
            }
        }
    }

    fn set(&self, info: Option<ConnectionInfo>) {
        let _guard = self.lock.lock();
        let result = match &info {
            Some(info) => self.write(info),
            None => self.remove(),
        };
        if let Err(e) = result {
            warn!(path = %self.path.display(), error = %e, "cannot save connection state");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn persists_across_instances() {
        let workspace = TempDir::new().unwrap();
        let info = ConnectionInfo::new("localhost", 7888);

        FileStore::for_workspace(workspace.path()).set(Some(info.clone()));

        let reopened = FileStore::for_workspace(workspace.path());
        assert_eq!(reopened.get(), Some(info));
        assert!(workspace.path().join(".cljrepl/connection.json").exists());
    }

    #[test]
    fn clearing_removes_the_file() {
        let workspace = TempDir::new().unwrap();
        let store = FileStore::for_workspace(workspace.path());

        store.set(Some(ConnectionInfo::local(7888)));
        store.set(None);
        assert!(store.get().is_none());
        assert!(!store.path().exists());

        // Clearing twice is fine
        store.set(None);
    }

    #[test]
    fn corrupt_file_reads_as_disconnected() {
        let workspace = TempDir::new().unwrap();
        let store = FileStore::for_workspace(workspace.path());
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), "{ not json").unwrap();

        assert!(store.get().is_none());
    }
}
