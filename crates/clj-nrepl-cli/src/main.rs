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

use anyhow::Context;
use clap::Parser;
use clj_nrepl_cli::cli::Cli;
use clj_nrepl_cli::config::Config;
use clj_nrepl_cli::{commands, workspace_manager};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let workspace = match cli.workspace {
        Some(dir) => dir,
        None => std::env::current_dir().context("Cannot determine the current directory")?,
    };
    let config = Config::load(&workspace)?;
    tracing::debug!(workspace = %workspace.display(), ?config, "starting");

    let manager = workspace_manager(&workspace, &config);
    let mut stdout = std::io::stdout().lock();
    commands::run(cli.command, &manager, &config, &mut stdout).await
}
