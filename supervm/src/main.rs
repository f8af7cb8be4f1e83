/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! SuperVM control-plane binary: load settings, start the facade, serve
//! the control API until interrupted.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use supervm::api;
use supervm::config::Config;
use supervm::provider::StaticNodeProvider;
use supervm::vm::SuperVm;
use supervm::worker::HttpWorkerClient;

/// SuperVM – distributed task scheduler control plane.
#[derive(Parser)]
#[command(name = "supervm", version, about)]
struct Cli {
    /// Path to the YAML settings file (defaults apply when omitted).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address for the control API.
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    /// Port for the control API.
    #[arg(short, long, default_value_t = 7070)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match &cli.config {
        Some(path) => Config::load_from_file(path)?,
        None => Config::default(),
    };

    let provider = Arc::new(StaticNodeProvider::new(config.static_nodes.clone()));
    let worker = Arc::new(HttpWorkerClient::new());
    let vm = SuperVm::new(config.scheduler, provider, worker);
    vm.start().await.context("super vm bootstrap failed")?;

    let addr = format!("{}:{}", cli.bind, cli.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("cannot bind control API to {addr}"))?;
    info!(%addr, "control API listening");

    axum::serve(listener, api::router(vm.clone()))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
        .context("control API server failed")?;

    vm.stop().await;
    Ok(())
}
