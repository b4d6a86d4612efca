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

//! Subcommand handlers

use crate::cli::Command;
use crate::config::Config;
use crate::notifier::status_text;
use anyhow::{Context, Result, bail};
use clj_nrepl::{
    BencodeValue, ConnectionInfo, ConnectionManager, EvalResult, NReplError, Response, Session,
};
use std::io::Write;
use std::path::Path;

pub async fn run<W: Write>(
    command: Command,
    manager: &ConnectionManager,
    config: &Config,
    out: &mut W,
) -> Result<()> {
    match command {
        Command::Connect { host, port } => {
            let host = host.unwrap_or_else(|| config.default_host.clone());
            let port = match port.or_else(|| manager.suggest_port(&host)) {
                Some(port) => port,
                None => bail!("Port number must be informed."),
            };
            manager.connect(ConnectionInfo::new(host, port)).await?;
        }
        Command::Disconnect => match manager.disconnect(true) {
            Err(NReplError::NoConnection) => writeln!(out, "Not connected to any nREPL.")?,
            other => other?,
        },
        Command::Status => match manager.current() {
            Some(info) => writeln!(out, "{}", status_text(&info))?,
            None => writeln!(out, "Not connected to any nREPL.")?,
        },
        Command::Eval { code, session } => {
            let client = manager.client()?;
            let responses = match session {
                Some(id) => client.evaluate_in(&code, &Session::from_id(id)).await?,
                None => client.evaluate(&code, None).await?,
            };
            print_eval(&responses, out)?;
        }
        Command::LoadFile { path } => {
            let client = manager.client()?;
            let contents = read_source(&path).await?;
            let file_path = path.to_string_lossy();
            let responses = client
                .evaluate_file(&contents, Some(file_path.as_ref()), None)
                .await?;
            print_eval(&responses, out)?;
        }
        Command::Sessions => {
            for id in manager.client()?.list_sessions().await? {
                writeln!(out, "{}", id)?;
            }
        }
        Command::Close { session } => {
            let responses = manager
                .client()?
                .close_session(&Session::from_id(session))
                .await?;
            if !responses.iter().any(|r| r.has_status("session-closed")) {
                bail!("Server did not confirm the session was closed");
            }
        }
        Command::Complete { symbol, ns } => {
            let response = manager.client()?.complete(&symbol, ns.as_deref()).await?;
            for candidate in completions(&response) {
                writeln!(out, "{}", candidate)?;
            }
        }
        Command::Info { symbol, ns } => {
            let response = manager.client()?.info(&symbol, &ns, None).await?;
            print_info(&symbol, &response, out)?;
        }
    }
    Ok(())
}

async fn read_source(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}

/// Printed output and values in arrival order; a remote exception becomes
/// the command's error
pub fn print_eval<W: Write>(responses: &[Response], out: &mut W) -> Result<()> {
    for response in responses {
        if let Some(text) = response.out() {
            write!(out, "{}", text)?;
        }
        if let Some(value) = response.value() {
            writeln!(out, "{}", value)?;
        }
    }
    EvalResult::from_responses(responses).into_result()?;
    Ok(())
}

pub fn completions(response: &Response) -> Vec<&str> {
    response
        .get("completions")
        .and_then(BencodeValue::as_list)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("candidate").and_then(BencodeValue::as_str))
                .collect()
        })
        .unwrap_or_default()
}

pub fn print_info<W: Write>(symbol: &str, response: &Response, out: &mut W) -> Result<()> {
    if response.has_status("no-info") {
        bail!("No info for {}", symbol);
    }
    match (response.ns(), response.str_field("name")) {
        (Some(ns), Some(name)) => writeln!(out, "{}/{}", ns, name)?,
        _ => writeln!(out, "{}", symbol)?,
    }
    if let Some(arglists) = response.str_field("arglists-str") {
        writeln!(out, "{}", arglists)?;
    }
    if let Some(doc) = response.str_field("doc") {
        writeln!(out, "  {}", doc)?;
    }
    Ok(())
}
