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

//! nREPL client connection and operations

use crate::codec::encode_request;
use crate::config::ClientOptions;
use crate::connection::ConnectionInfo;
use crate::error::{NReplError, Result};
use crate::exchange::{Phase, PendingRequest, exchange};
use crate::message::{Request, Response};
use crate::ops;
use crate::session::Session;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Called with the target when the server refuses a TCP connection
pub type RefusalHook = Arc<dyn Fn(&ConnectionInfo) + Send + Sync>;

/// nREPL client bound to one server address
///
/// Every call opens its own socket, sends one request and closes the socket
/// once the response is complete. Calls share no mutable state, so a client
/// can be cloned freely and used from several tasks at once; concurrent calls
/// may complete in any order.
#[derive(Clone)]
pub struct NReplClient {
    target: ConnectionInfo,
    options: ClientOptions,
    on_refused: Option<RefusalHook>,
    cancel: Option<CancellationToken>,
}

impl std::fmt::Debug for NReplClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NReplClient")
            .field("target", &self.target)
            .field("options", &self.options)
            .field("on_refused", &self.on_refused.is_some())
            .field("cancel", &self.cancel)
            .finish()
    }
}

impl NReplClient {
    pub fn new(target: ConnectionInfo, options: ClientOptions) -> Self {
        Self {
            target,
            options,
            on_refused: None,
            cancel: None,
        }
    }

    pub fn with_refusal_hook(mut self, hook: RefusalHook) -> Self {
        self.on_refused = Some(hook);
        self
    }

    /// Abort in-flight calls when `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn target(&self) -> &ConnectionInfo {
        &self.target
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Send one request and collect every response frame up to completion.
    ///
    /// With `expect_value`, completion markers are ignored until a frame
    /// carrying `value`, `out` or `err` has arrived.
    pub async fn send(&self, request: &Request, expect_value: bool) -> Result<Vec<Response>> {
        let payload = encode_request(request)?;
        let operation = format!("waiting for {} on {}", request.op(), self.target);
        debug!(
            op = request.op(),
            id = request.id(),
            address = %self.target,
            expect_value,
            "sending nREPL request"
        );

        let round_trip = async {
            let call = self.round_trip(&payload, expect_value);
            match self.options.timeout {
                Some(duration) => match tokio::time::timeout(duration, call).await {
                    Ok(result) => result,
                    Err(_) => Err(NReplError::Timeout {
                        operation: operation.clone(),
                        duration,
                    }),
                },
                None => call.await,
            }
        };

        let responses = match &self.cancel {
            Some(token) => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => Err(NReplError::Cancelled {
                        operation: operation.clone(),
                    }),
                    result = round_trip => result,
                }
            }
            None => round_trip.await,
        }?;

        debug!(
            op = request.op(),
            id = request.id(),
            frames = responses.len(),
            "nREPL request completed"
        );
        Ok(responses)
    }

    async fn round_trip(&self, payload: &[u8], expect_value: bool) -> Result<Vec<Response>> {
        let boundary = self.options.boundary.as_ref();
        let mut pending = PendingRequest::new(boundary, expect_value);
        let address = self.target.to_string();

        let mut stream = match TcpStream::connect(address.as_str()).await {
            Ok(stream) => stream,
            Err(e) => {
                pending.transition(Phase::Failed);
                let err = NReplError::from_connect(&address, e);
                if err.is_connection_refused() {
                    warn!(address = %address, "nREPL connection refused");
                    if let Some(hook) = &self.on_refused {
                        hook(&self.target);
                    }
                }
                return Err(err);
            }
        };

        exchange(
            &mut stream,
            payload,
            &mut pending,
            self.options.read_buffer_size,
        )
        .await?;

        // The response is already complete; a failed shutdown changes nothing
        if let Err(e) = stream.shutdown().await {
            debug!(address = %address, error = %e, "socket shutdown failed");
        }
        Ok(pending.into_responses())
    }

    /// Create a session, optionally derived from `from`
    pub async fn clone_session(&self, from: Option<&Session>) -> Result<Session> {
        let request = ops::clone_request(from.map(Session::id));
        let responses = self.send(&request, false).await?;

        let first = responses
            .first()
            .ok_or_else(|| NReplError::protocol("No response to clone"))?;
        first
            .new_session()
            .map(Session::new)
            .ok_or_else(|| {
                NReplError::protocol_with_response(
                    "clone response has no new-session",
                    format!("{:?}", first.fields()),
                )
            })
    }

    /// Evaluate `code` in a freshly cloned session.
    ///
    /// `session`, when given, is the parent of the clone; it is never
    /// evaluated in directly. Use [`NReplClient::evaluate_in`] to thread one
    /// session through several calls.
    pub async fn evaluate(&self, code: &str, session: Option<&Session>) -> Result<Vec<Response>> {
        let session = self.clone_session(session).await?;
        self.evaluate_in(code, &session).await
    }

    /// Evaluate `code` in an existing session
    pub async fn evaluate_in(&self, code: &str, session: &Session) -> Result<Vec<Response>> {
        self.send(&ops::eval_request(session.id(), code), true).await
    }

    /// Load a file's contents in a freshly cloned session
    pub async fn evaluate_file(
        &self,
        code: &str,
        file_path: Option<&str>,
        session: Option<&Session>,
    ) -> Result<Vec<Response>> {
        let session = self.clone_session(session).await?;
        let request = ops::load_file_request(session.id(), code, file_path);
        self.send(&request, false).await
    }

    /// Liveness probe against a candidate server.
    ///
    /// Runs without a refusal hook, so probing never touches stored state.
    pub async fn test(target: &ConnectionInfo, options: &ClientOptions) -> Result<()> {
        let client = Self::new(target.clone(), options.clone());
        let responses = client.send(&ops::clone_request(None), false).await?;

        match responses.first() {
            Some(response) if response.new_session().is_some() => Ok(()),
            _ => Err(NReplError::ProbeFailed {
                address: target.to_string(),
            }),
        }
    }

    pub async fn list_sessions(&self) -> Result<Vec<String>> {
        let responses = self.send(&ops::ls_sessions_request(), false).await?;

        match responses.first() {
            Some(response) if response.has_status("done") => {
                Ok(response.sessions().unwrap_or_default())
            }
            Some(response) => Err(NReplError::OperationFailed(format!(
                "ls-sessions did not complete (status: {:?})",
                response.status()
            ))),
            None => Err(NReplError::OperationFailed(
                "ls-sessions returned no response".to_string(),
            )),
        }
    }

    pub async fn close_session(&self, session: &Session) -> Result<Vec<Response>> {
        self.send(&ops::close_request(session.id()), false).await
    }

    pub async fn stacktrace(&self, session: &Session) -> Result<Vec<Response>> {
        self.send(&ops::stacktrace_request(session.id()), false).await
    }

    /// Completion candidates for `symbol`
    pub async fn complete(&self, symbol: &str, ns: Option<&str>) -> Result<Response> {
        let responses = self.send(&ops::complete_request(symbol, ns), false).await?;
        first_response(responses, "complete")
    }

    /// Documentation and source location for `symbol` in `ns`
    pub async fn info(&self, symbol: &str, ns: &str, session: Option<&Session>) -> Result<Response> {
        let request = ops::info_request(symbol, ns, session.map(Session::id));
        let responses = self.send(&request, false).await?;
        first_response(responses, "info")
    }
}

fn first_response(responses: Vec<Response>, op: &str) -> Result<Response> {
    responses
        .into_iter()
        .next()
        .ok_or_else(|| NReplError::protocol(format!("No response to {}", op)))
}
