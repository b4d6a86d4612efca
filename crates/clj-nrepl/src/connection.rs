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

//! The "current connection" of a workspace and its lifecycle
//!
//! `ConnectionManager` is an explicit context object. Persistence, user
//! feedback, port discovery and the local REPL process are collaborators
//! injected through the traits below; the manager itself never touches the
//! filesystem or a UI.

use crate::client::NReplClient;
use crate::config::ClientOptions;
use crate::error::{NReplError, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

pub const DEFAULT_LOCAL_HOST: &str = "127.0.0.1";

/// Where an nREPL server listens
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub host: String,
    pub port: u16,
}

impl ConnectionInfo {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn local(port: u16) -> Self {
        Self::new(DEFAULT_LOCAL_HOST, port)
    }

    pub fn is_local(&self) -> bool {
        is_local_host(&self.host)
    }
}

impl std::fmt::Display for ConnectionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

pub fn is_local_host(host: &str) -> bool {
    host == DEFAULT_LOCAL_HOST || host.eq_ignore_ascii_case("localhost")
}

/// Workspace-scoped persistence of the current connection
pub trait ConnectionStore: Send + Sync {
    fn get(&self) -> Option<ConnectionInfo>;
    fn set(&self, info: Option<ConnectionInfo>);
}

/// In-process store
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Option<ConnectionInfo>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConnectionStore for MemoryStore {
    fn get(&self) -> Option<ConnectionInfo> {
        self.inner
            .lock()
            .clone()
    }

    fn set(&self, info: Option<ConnectionInfo>) {
        *self.inner.lock() = info;
    }
}

/// Observer for connection state changes
pub trait Notifier: Send + Sync {
    fn connected(&self, _info: &ConnectionInfo) {}

    fn disconnected(&self, _show_message: bool) {}

    /// The server at `info` refused a connection and stored state was dropped
    fn connection_refused(&self, _info: &ConnectionInfo) {}

    fn starting_local(&self) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {}

/// Finds the port of a REPL running on this machine
pub trait PortDiscovery: Send + Sync {
    fn local_port(&self) -> Option<u16>;
}

impl<F> PortDiscovery for F
where
    F: Fn() -> Option<u16> + Send + Sync,
{
    fn local_port(&self) -> Option<u16> {
        self()
    }
}

pub type StartFuture<'a> = Pin<Box<dyn Future<Output = Result<ConnectionInfo>> + Send + 'a>>;

/// A REPL process this program launches and owns
pub trait LocalRepl: Send {
    /// Launch the process and resolve with where it listens
    fn start(&mut self) -> StartFuture<'_>;

    /// Stop the process. Must be safe to call when it is not running.
    fn stop(&mut self);
}

type SharedLocal = Arc<Mutex<Option<Box<dyn LocalRepl>>>>;

pub struct ConnectionManager {
    store: Arc<dyn ConnectionStore>,
    notifier: Arc<dyn Notifier>,
    discovery: Option<Arc<dyn PortDiscovery>>,
    options: ClientOptions,
    starting: AtomicBool,
    local: SharedLocal,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("current", &self.current())
            .field("starting", &self.is_starting())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    pub fn new(store: Arc<dyn ConnectionStore>) -> Self {
        Self {
            store,
            notifier: Arc::new(NoopNotifier),
            discovery: None,
            options: ClientOptions::default(),
            starting: AtomicBool::new(false),
            local: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_discovery(mut self, discovery: Arc<dyn PortDiscovery>) -> Self {
        self.discovery = Some(discovery);
        self
    }

    pub fn with_options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn current(&self) -> Option<ConnectionInfo> {
        self.store.get()
    }

    pub fn is_connected(&self) -> bool {
        self.current().is_some()
    }

    pub fn is_starting(&self) -> bool {
        self.starting.load(Ordering::SeqCst)
    }

    /// A client for the stored connection.
    ///
    /// If the server refuses a later call, stored state is torn down and the
    /// notifier is told before the error reaches the caller.
    pub fn client(&self) -> Result<NReplClient> {
        let target = self.current().ok_or(NReplError::NoConnection)?;

        let store = Arc::clone(&self.store);
        let notifier = Arc::clone(&self.notifier);
        let local = Arc::clone(&self.local);
        let client = NReplClient::new(target, self.options.clone()).with_refusal_hook(Arc::new(
            move |info: &ConnectionInfo| {
                warn!(address = %info, "nREPL refused connection; dropping stored state");
                stop_local(&local);
                store.set(None);
                notifier.connection_refused(info);
                notifier.disconnected(true);
            },
        ));
        Ok(client)
    }

    fn ensure_idle(&self) -> Result<()> {
        if self.is_starting() {
            return Err(NReplError::LocalStartInProgress);
        }
        if let Some(current) = self.current() {
            return Err(NReplError::AlreadyConnected(current.to_string()));
        }
        Ok(())
    }

    /// Probe `info` and make it the current connection
    pub async fn connect(&self, info: ConnectionInfo) -> Result<()> {
        self.ensure_idle()?;

        NReplClient::test(&info, &self.options).await?;
        self.save(info);
        Ok(())
    }

    /// Port of a local REPL, when `host` is this machine
    pub fn suggest_port(&self, host: &str) -> Option<u16> {
        if !is_local_host(host) {
            return None;
        }
        self.discovery.as_ref().and_then(|d| d.local_port())
    }

    /// Launch `repl`, probe it and make it the current connection.
    ///
    /// On failure the process is stopped and state cleared before the error
    /// is returned.
    pub async fn start_local(&self, mut repl: Box<dyn LocalRepl>) -> Result<ConnectionInfo> {
        self.ensure_idle()?;
        if self.starting.swap(true, Ordering::SeqCst) {
            return Err(NReplError::LocalStartInProgress);
        }
        self.notifier.starting_local();

        let started = match repl.start().await {
            Ok(info) => NReplClient::test(&info, &self.options).await.map(|()| info),
            Err(e) => Err(e),
        };

        // The process is owned from here on, so disconnect can stop it
        *self.local.lock() = Some(repl);
        let still_starting = self.starting.swap(false, Ordering::SeqCst);

        match started {
            Ok(info) if still_starting => {
                self.save(info.clone());
                Ok(info)
            }
            Ok(info) => {
                // Disconnected while the process was coming up
                stop_local(&self.local);
                Err(NReplError::OperationFailed(format!(
                    "local nREPL at {} was abandoned by a disconnect",
                    info
                )))
            }
            Err(e) => {
                warn!(error = %e, "local nREPL failed to start");
                stop_local(&self.local);
                self.clear(false);
                Err(e)
            }
        }
    }

    /// Forget the current connection and stop any local REPL
    pub fn disconnect(&self, show_message: bool) -> Result<()> {
        let starting = self.starting.swap(false, Ordering::SeqCst);
        if !self.is_connected() && !starting {
            return Err(NReplError::NoConnection);
        }
        stop_local(&self.local);
        self.clear(show_message);
        Ok(())
    }

    fn save(&self, info: ConnectionInfo) {
        info!(address = %info, "connected to nREPL");
        self.store.set(Some(info.clone()));
        self.notifier.connected(&info);
    }

    fn clear(&self, show_message: bool) {
        info!("disconnected from nREPL");
        self.store.set(None);
        self.notifier.disconnected(show_message);
    }
}

fn stop_local(local: &SharedLocal) {
    if let Some(mut repl) = local.lock().take() {
        repl.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn events(&self) -> Vec<String> {
            self.events.lock().clone()
        }
    }

    impl Notifier for Recorder {
        fn connected(&self, info: &ConnectionInfo) {
            self.events.lock().push(format!("connected {}", info));
        }

        fn disconnected(&self, show_message: bool) {
            self.events
                .lock()
                .push(format!("disconnected {}", show_message));
        }

        fn connection_refused(&self, info: &ConnectionInfo) {
            self.events.lock().push(format!("refused {}", info));
        }

        fn starting_local(&self) {
            self.events.lock().push("starting".to_string());
        }
    }

    struct FailingRepl {
        stops: Arc<AtomicUsize>,
    }

    impl LocalRepl for FailingRepl {
        fn start(&mut self) -> StartFuture<'_> {
            Box::pin(async {
                Err::<ConnectionInfo, _>(NReplError::OperationFailed("lein not found".to_string()))
            })
        }

        fn stop(&mut self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn manager_with(store: Arc<MemoryStore>, recorder: Arc<Recorder>) -> ConnectionManager {
        ConnectionManager::new(store).with_notifier(recorder)
    }

    #[test]
    fn connection_info_display_and_locality() {
        let info = ConnectionInfo::new("localhost", 7888);
        assert_eq!(info.to_string(), "localhost:7888");
        assert!(info.is_local());
        assert!(ConnectionInfo::local(1).is_local());
        assert!(!ConnectionInfo::new("10.0.0.2", 7888).is_local());
    }

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryStore::new();
        assert!(store.get().is_none());

        store.set(Some(ConnectionInfo::local(7888)));
        assert_eq!(store.get(), Some(ConnectionInfo::local(7888)));

        store.set(None);
        assert!(store.get().is_none());
    }

    #[test]
    fn client_without_connection() {
        let manager = ConnectionManager::new(Arc::new(MemoryStore::new()));
        let err = manager.client().expect_err("nothing stored");
        assert!(matches!(err, NReplError::NoConnection));
        assert_eq!(err.to_string(), "No connection found.");
    }

    #[test]
    fn disconnect_clears_and_notifies() {
        let store = Arc::new(MemoryStore::new());
        let recorder = Arc::new(Recorder::default());
        store.set(Some(ConnectionInfo::local(7888)));
        let manager = manager_with(Arc::clone(&store), Arc::clone(&recorder));

        manager.disconnect(true).expect("was connected");
        assert!(!manager.is_connected());
        assert_eq!(recorder.events(), vec!["disconnected true"]);

        let err = manager.disconnect(true).expect_err("already disconnected");
        assert!(matches!(err, NReplError::NoConnection));
    }

    #[tokio::test]
    async fn connect_refuses_when_already_connected() {
        let store = Arc::new(MemoryStore::new());
        store.set(Some(ConnectionInfo::local(7888)));
        let manager = ConnectionManager::new(store);

        let err = manager
            .connect(ConnectionInfo::local(7999))
            .await
            .expect_err("must disconnect first");
        match err {
            NReplError::AlreadyConnected(address) => assert_eq!(address, "127.0.0.1:7888"),
            other => panic!("Expected AlreadyConnected, got: {:?}", other),
        }
    }

    #[test]
    fn suggest_port_only_for_local_hosts() {
        let discovery = || Some(7888u16);
        let manager = ConnectionManager::new(Arc::new(MemoryStore::new()))
            .with_discovery(Arc::new(discovery));

        assert_eq!(manager.suggest_port("127.0.0.1"), Some(7888));
        assert_eq!(manager.suggest_port("LOCALHOST"), Some(7888));
        assert_eq!(manager.suggest_port("repl.example.com"), None);

        let bare = ConnectionManager::new(Arc::new(MemoryStore::new()));
        assert_eq!(bare.suggest_port("localhost"), None);
    }

    #[tokio::test]
    async fn failed_local_start_stops_and_clears() {
        let store = Arc::new(MemoryStore::new());
        let recorder = Arc::new(Recorder::default());
        let manager = manager_with(Arc::clone(&store), Arc::clone(&recorder));
        let stops = Arc::new(AtomicUsize::new(0));

        let err = manager
            .start_local(Box::new(FailingRepl {
                stops: Arc::clone(&stops),
            }))
            .await
            .expect_err("start fails");

        assert!(matches!(err, NReplError::OperationFailed(_)));
        assert_eq!(stops.load(Ordering::SeqCst), 1);
        assert!(!manager.is_starting());
        assert!(store.get().is_none());
        assert_eq!(recorder.events(), vec!["starting", "disconnected false"]);
    }
}
