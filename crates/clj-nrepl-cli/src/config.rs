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

//! Configuration with layered resolution using figment.
//!
//! Resolution order (highest priority last):
//! 1. User config: `<config_dir>/cljrepl/config.toml` (e.g. `~/.config/cljrepl/config.toml`)
//! 2. Project config: `.cljrepl.toml` in the workspace
//! 3. Environment variables: `CLJREPL_*` (e.g. `CLJREPL_TIMEOUT_MS=0`)
//!
//! ```toml
//! timeout_ms = 30000        # 0 waits forever
//! read_buffer_size = 8192
//! boundary = "status-done"  # or "sentinel"
//! sentinel = "doneee"
//! default_host = "127.0.0.1"
//! ```
//!
//! Missing files are skipped; a file that exists but does not parse is an
//! error.

use clj_nrepl::{
    ClientOptions, DEFAULT_LOCAL_HOST, DEFAULT_READ_BUFFER_SIZE, DEFAULT_SENTINEL,
    SentinelBoundary, StatusDoneBoundary,
};
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const PROJECT_CONFIG_FILE: &str = ".cljrepl.toml";

pub const ENV_PREFIX: &str = "CLJREPL_";

const DEFAULT_TIMEOUT_MS: u64 = 60_000;

/// Boxed figment::Error, keeping `Result<Config, _>` small
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ConfigError(Box<figment::Error>);

impl Deref for ConfigError {
    type Target = figment::Error;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self(Box::new(err))
    }
}

/// How the end of a response is detected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BoundaryKind {
    #[default]
    Sentinel,
    StatusDone,
}

/// Keys as they appear in files and the environment
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct Settings {
    timeout_ms: u64,
    read_buffer_size: usize,
    sentinel: String,
    boundary: BoundaryKind,
    default_host: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            sentinel: DEFAULT_SENTINEL.to_string(),
            boundary: BoundaryKind::default(),
            default_host: DEFAULT_LOCAL_HOST.to_string(),
        }
    }
}

impl From<Settings> for Config {
    fn from(settings: Settings) -> Self {
        Self {
            timeout: (settings.timeout_ms > 0).then(|| Duration::from_millis(settings.timeout_ms)),
            read_buffer_size: settings.read_buffer_size,
            sentinel: settings.sentinel,
            boundary: settings.boundary,
            default_host: settings.default_host,
        }
    }
}

/// Resolved configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub timeout: Option<Duration>,
    pub read_buffer_size: usize,
    pub sentinel: String,
    pub boundary: BoundaryKind,
    pub default_host: String,
}

impl Default for Config {
    fn default() -> Self {
        Settings::default().into()
    }
}

impl Config {
    /// Load config with layered resolution (user → project → env).
    pub fn load(workspace: &Path) -> Result<Self, ConfigError> {
        let mut paths = Vec::new();
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("cljrepl").join("config.toml"));
        }
        paths.push(workspace.join(PROJECT_CONFIG_FILE));
        Self::from_paths(&paths)
    }

    /// Layer the files in order, then the environment
    pub fn from_paths(paths: &[PathBuf]) -> Result<Self, ConfigError> {
        let figment = paths
            .iter()
            .fold(Figment::new(), |figment, path| figment.merge(Toml::file(path)))
            .merge(Env::prefixed(ENV_PREFIX));
        Self::from_figment(&figment)
    }

    pub fn from_figment(figment: &Figment) -> Result<Self, ConfigError> {
        let settings: Settings = figment.extract()?;
        tracing::debug!(?settings, "resolved config");
        Ok(settings.into())
    }

    pub fn client_options(&self) -> ClientOptions {
        let options = ClientOptions::new().with_read_buffer_size(self.read_buffer_size);
        let options = match self.timeout {
            Some(timeout) => options.with_timeout(timeout),
            None => options,
        };
        match self.boundary {
            BoundaryKind::Sentinel => {
                options.with_boundary(SentinelBoundary::new(self.sentinel.as_bytes()))
            }
            BoundaryKind::StatusDone => options.with_boundary(StatusDoneBoundary),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.timeout, Some(Duration::from_secs(60)));
        assert_eq!(config.boundary, BoundaryKind::Sentinel);
        assert_eq!(config.sentinel, "doneee");
        assert_eq!(config.default_host, "127.0.0.1");
    }

    #[test]
    fn project_overrides_user() {
        Jail::expect_with(|jail| {
            jail.create_file("user.toml", "timeout_ms = 1000\ndefault_host = \"repl.local\"\n")?;
            jail.create_file("project.toml", "timeout_ms = 0\nboundary = \"status-done\"\n")?;

            let paths = [PathBuf::from("user.toml"), PathBuf::from("project.toml")];
            let config = Config::from_paths(&paths).expect("config loads");
            assert_eq!(config.timeout, None, "0 disables the deadline");
            assert_eq!(config.boundary, BoundaryKind::StatusDone);
            assert_eq!(config.default_host, "repl.local");
            assert_eq!(config.read_buffer_size, DEFAULT_READ_BUFFER_SIZE);
            Ok(())
        });
    }

    #[test]
    fn environment_overrides_files() {
        Jail::expect_with(|jail| {
            jail.create_file(PROJECT_CONFIG_FILE, "timeout_ms = 1000\nsentinel = \"END\"\n")?;
            jail.set_env("CLJREPL_TIMEOUT_MS", "0");
            jail.set_env("CLJREPL_BOUNDARY", "status-done");

            let config =
                Config::from_paths(&[PathBuf::from(PROJECT_CONFIG_FILE)]).expect("config loads");
            assert_eq!(config.timeout, None);
            assert_eq!(config.boundary, BoundaryKind::StatusDone);
            assert_eq!(config.sentinel, "END");
            Ok(())
        });
    }

    #[test]
    fn missing_files_are_skipped() {
        Jail::expect_with(|_jail| {
            let config = Config::from_paths(&[PathBuf::from("nope.toml")]).expect("config loads");
            assert_eq!(config, Config::default());
            Ok(())
        });
    }

    #[test]
    fn unknown_keys_are_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file(PROJECT_CONFIG_FILE, "timeout = 5\n")?;

            let err = Config::from_paths(&[PathBuf::from(PROJECT_CONFIG_FILE)])
                .expect_err("typo must be reported");
            assert!(err.to_string().contains("timeout"), "got: {}", err);
            Ok(())
        });
    }

    #[test]
    fn client_options_follow_config() {
        let config = Config {
            timeout: None,
            read_buffer_size: 64,
            sentinel: "END".to_string(),
            ..Config::default()
        };
        let options = config.client_options();
        assert!(options.timeout.is_none());
        assert_eq!(options.read_buffer_size, 64);
        assert_eq!(options.boundary.find_end(b"abcEND", 0), Some(6));
    }
}
