/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Simulates a fleet of worker nodes for manual control-plane testing.
//!
//! Each simulated worker serves the worker wire contract on its own port:
//! `GET /health` reports a load that tracks in-flight executions, and
//! `POST /execute` runs compute kernels for real (via the `supervm`
//! crate) and fabricates placeholder frames for render sub-tasks.
//!
//! Point a statically configured control plane at the spawned ports:
//!
//! ```yaml
//! nodes:
//!   sim-00: { addr: "http://127.0.0.1:7071", cpu_cores: 4, memory_mb: 8192 }
//!   sim-01: { addr: "http://127.0.0.1:7072", cpu_cores: 4, memory_mb: 8192 }
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use supervm::compute;
use supervm::task::{RenderedFrame, SubTaskSpec, WorkerOutput};
use supervm::worker::{ExecuteRequest, ExecuteResponse, WorkerHealth};

/// SuperVM worker simulator.
#[derive(Parser)]
#[command(name = "worker-sim", about)]
struct Cli {
    /// First port to listen on.
    #[arg(short, long, default_value_t = 7071)]
    port: u16,

    /// Number of workers to simulate (ports are consecutive).
    #[arg(short, long, default_value_t = 1)]
    count: u16,

    /// Baseline load every worker reports.
    #[arg(long, default_value_t = 5.0)]
    base_load: f64,

    /// Artificial latency per execute call, in milliseconds.
    #[arg(long, default_value_t = 0)]
    latency_ms: u64,
}

struct SimWorker {
    name: String,
    base_load: f64,
    latency: Duration,
    in_flight: AtomicUsize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut handles = Vec::new();
    for i in 0..cli.count {
        let port = cli.port + i;
        let worker = Arc::new(SimWorker {
            name: format!("sim-{i:02}"),
            base_load: cli.base_load,
            latency: Duration::from_millis(cli.latency_ms),
            in_flight: AtomicUsize::new(0),
        });

        let app = Router::new()
            .route("/health", get(health))
            .route("/execute", post(execute))
            .with_state(worker.clone());

        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
            .await
            .with_context(|| format!("cannot bind worker {} to port {port}", worker.name))?;
        info!(worker = %worker.name, port, "worker listening");
        handles.push(tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        }));
    }

    for handle in handles {
        let _ = handle.await;
    }
    Ok(())
}

async fn health(State(worker): State<Arc<SimWorker>>) -> Json<WorkerHealth> {
    // each in-flight execution costs a notional 10% of the machine
    let load = worker.base_load + worker.in_flight.load(Ordering::Relaxed) as f64 * 10.0;
    Json(WorkerHealth {
        ok: true,
        load_pct: load.min(100.0),
    })
}

async fn execute(
    State(worker): State<Arc<SimWorker>>,
    Json(request): Json<ExecuteRequest>,
) -> Json<ExecuteResponse> {
    worker.in_flight.fetch_add(1, Ordering::Relaxed);
    if !worker.latency.is_zero() {
        tokio::time::sleep(worker.latency).await;
    }

    let output = match &request.spec {
        SubTaskSpec::Compute {
            data, operation, ..
        } => WorkerOutput::Compute {
            processed_data: compute::apply(operation, data),
        },
        SubTaskSpec::Render {
            frame_start,
            frame_end,
            scene_file,
            ..
        } => {
            info!(
                worker = %worker.name,
                task = %request.task_id,
                scene = %scene_file,
                frames = format!("{frame_start}..={frame_end}"),
                "rendering"
            );
            WorkerOutput::Render {
                frames: (*frame_start..=*frame_end)
                    .map(|n| RenderedFrame {
                        frame_number: n,
                        content_type: String::from("image/png"),
                        // placeholder artifact body ("frame")
                        data: String::from("ZnJhbWU="),
                    })
                    .collect(),
            }
        }
        SubTaskSpec::Browser { .. } => WorkerOutput::Raw {
            content_type: String::from("application/json"),
            // {"visited": true}
            data: String::from("eyJ2aXNpdGVkIjogdHJ1ZX0="),
        },
        SubTaskSpec::FileSync { .. } => WorkerOutput::Raw {
            content_type: String::from("text/plain"),
            // "synced"
            data: String::from("c3luY2Vk"),
        },
    };

    worker.in_flight.fetch_sub(1, Ordering::Relaxed);
    info!(
        worker = %worker.name,
        task = %request.task_id,
        partition = request.partition_id,
        "sub-task done"
    );
    Json(ExecuteResponse {
        ok: true,
        output: Some(output),
        error: None,
    })
}
