/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Reads a task YAML and submits each entry to a running control plane.
//!
//! Expected YAML structure:
//!
//! ```yaml
//! tasks:
//!   - kind: process
//!     body:
//!       inputData: [5, 2, 8, 1, 9]
//!       operation: sort
//!   - kind: render
//!     body:
//!       sceneFile: "/scenes/demo.blend"
//!       frameStart: 1
//!       frameEnd: 10
//! ```
//!
//! `kind` selects the endpoint (`render`, `process`, `browser`, `sync`);
//! `body` is forwarded verbatim.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Deserialize;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// SuperVM task submitter.
#[derive(Parser)]
#[command(name = "task-sim", about)]
struct Cli {
    /// Base URL of the control API.
    #[arg(short, long, default_value = "http://127.0.0.1:7070")]
    api: String,

    /// Path to the task YAML file.
    #[arg(short, long)]
    file: PathBuf,
}

#[derive(Debug, Deserialize)]
struct TaskFile {
    tasks: Vec<TaskEntry>,
}

#[derive(Debug, Deserialize)]
struct TaskEntry {
    kind: String,
    body: serde_json::Value,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let content = std::fs::read_to_string(&cli.file)
        .with_context(|| format!("cannot open task file: {}", cli.file.display()))?;
    let file: TaskFile = serde_yaml::from_str(&content)
        .with_context(|| format!("failed to parse task file: {}", cli.file.display()))?;
    if file.tasks.is_empty() {
        bail!("task file contains no tasks");
    }

    let client = reqwest::Client::new();
    let base = cli.api.trim_end_matches('/');

    for (i, entry) in file.tasks.iter().enumerate() {
        let endpoint = match entry.kind.as_str() {
            "render" => "render",
            "process" => "process",
            "browser" => "browser",
            "sync" => "sync",
            other => bail!("task {i}: unknown kind '{other}'"),
        };
        let url = format!("{base}/api/super-vm/{endpoint}");
        info!(task = i, kind = %entry.kind, %url, "submitting");

        let response = client
            .post(&url)
            .json(&entry.body)
            .send()
            .await
            .with_context(|| format!("task {i}: request failed"))?;
        let status = response.status();
        let body: serde_json::Value = response
            .json()
            .await
            .with_context(|| format!("task {i}: response was not JSON"))?;

        if status.is_success() {
            info!(
                task = i,
                success = body["success"].as_bool().unwrap_or(false),
                nodes_used = body["nodesUsed"].as_u64().unwrap_or(0),
                elapsed_ms = body["executionTime"].as_u64().unwrap_or(0),
                "outcome"
            );
        } else {
            error!(
                task = i,
                %status,
                kind = body["kind"].as_str().unwrap_or("unknown"),
                error = body["error"].as_str().unwrap_or(""),
                "submission failed"
            );
        }
        println!("{}", serde_json::to_string_pretty(&body)?);
    }

    Ok(())
}
