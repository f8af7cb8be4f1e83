/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! The worker-execution seam.
//!
//! [`WorkerClient`] is how the scheduler talks to one worker node.  The
//! contract is two calls: execute a sub-task under a deadline, and probe
//! health under a short timeout.  Implementations must keep transport
//! failures distinct from worker-reported failures; retry is never the
//! client's decision (the scheduler dispatches at most once per
//! partition).
//!
//! [`HttpWorkerClient`] is the production implementation speaking JSON
//! over HTTP:
//!
//! | Call | Wire |
//! |---|---|
//! | `execute` | `POST {addr}/execute` with [`ExecuteRequest`] |
//! | `health`  | `GET {addr}/health` returning [`WorkerHealth`] |

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::task::{SubTaskSpec, WorkerOutput};

// ── Errors ────────────────────────────────────────────────────────────────────

/// Failure of one worker call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WorkerCallError {
    /// The worker could not be reached (connect, DNS, broken stream).
    #[error("transport failure: {0}")]
    Transport(String),

    /// The worker answered with a structured failure.
    #[error("worker failure: {0}")]
    Worker(String),

    /// The supplied deadline or timeout elapsed.
    #[error("worker call timed out")]
    Timeout,
}

// ── Wire types ────────────────────────────────────────────────────────────────

/// Body of an execute call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequest {
    pub task_id: String,
    pub partition_id: usize,
    pub spec: SubTaskSpec,
}

/// Body of an execute response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<WorkerOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Body of a health response.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerHealth {
    pub ok: bool,
    pub load_pct: f64,
}

// ── Trait ─────────────────────────────────────────────────────────────────────

/// Network operations against one worker node.
#[async_trait]
pub trait WorkerClient: Send + Sync {
    /// Run one sub-task to completion on the worker at `addr`.
    async fn execute(
        &self,
        addr: &str,
        request: &ExecuteRequest,
        deadline: Duration,
    ) -> Result<WorkerOutput, WorkerCallError>;

    /// Probe the worker at `addr`.
    async fn health(&self, addr: &str, timeout: Duration)
        -> Result<WorkerHealth, WorkerCallError>;
}

// ── HTTP implementation ───────────────────────────────────────────────────────

/// JSON-over-HTTP worker client.
pub struct HttpWorkerClient {
    client: reqwest::Client,
}

impl HttpWorkerClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpWorkerClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Join a worker base address and a route, tolerating trailing slashes.
fn endpoint(addr: &str, route: &str) -> String {
    format!("{}/{}", addr.trim_end_matches('/'), route)
}

fn map_reqwest_error(err: reqwest::Error) -> WorkerCallError {
    if err.is_timeout() {
        WorkerCallError::Timeout
    } else {
        WorkerCallError::Transport(err.to_string())
    }
}

#[async_trait]
impl WorkerClient for HttpWorkerClient {
    async fn execute(
        &self,
        addr: &str,
        request: &ExecuteRequest,
        deadline: Duration,
    ) -> Result<WorkerOutput, WorkerCallError> {
        let response = self
            .client
            .post(endpoint(addr, "execute"))
            .timeout(deadline)
            .json(request)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WorkerCallError::Worker(format!(
                "worker returned HTTP {status}: {body}"
            )));
        }

        let body: ExecuteResponse = response.json().await.map_err(map_reqwest_error)?;
        match (body.ok, body.output) {
            (true, Some(output)) => Ok(output),
            (true, None) => Err(WorkerCallError::Worker(String::from(
                "worker reported success without an output payload",
            ))),
            (false, _) => Err(WorkerCallError::Worker(
                body.error.unwrap_or_else(|| String::from("unspecified worker failure")),
            )),
        }
    }

    async fn health(
        &self,
        addr: &str,
        timeout: Duration,
    ) -> Result<WorkerHealth, WorkerCallError> {
        let response = self
            .client
            .get(endpoint(addr, "health"))
            .timeout(timeout)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(WorkerCallError::Worker(format!(
                "health endpoint returned HTTP {status}"
            )));
        }

        response.json().await.map_err(map_reqwest_error)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
