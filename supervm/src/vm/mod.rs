/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! The SuperVM facade: one logical machine over a fleet of workers.
//!
//! `SuperVm` is a constructed value with an explicit lifecycle; nothing in
//! this crate is a process-wide singleton.  Tests build their own instance
//! over fake providers and workers.
//!
//! ```text
//! new(cfg, provider, worker)
//!   └─ start()   Initializing → Starting → Ready | Error
//!        ├─ provider.list_nodes() → registry
//!        ├─ initial health sweep
//!        └─ spawn monitor loop + journal sweeper (cancellable)
//!   └─ submit()  partition → dispatch → aggregate → journal
//!   └─ scale()   asynchronous provider create requests
//!   └─ status()  mode + pool + metrics snapshot
//!   └─ stop()    cancel background activities, drain handles
//! ```
//!
//! Submission is synchronous end to end: the call returns once every
//! partition has settled against the task deadline.  Two concurrent
//! submits interleave freely; capacity decisions are linearised by the
//! registry's reservation gate.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::aggregate;
use crate::config::SchedulerConfig;
use crate::dispatch::Dispatcher;
use crate::error::SchedulerError;
use crate::monitor::{HealthMonitor, MonitorConfig};
use crate::node::{Node, NodeSpec, ResourceRequirement};
use crate::partition::{self, Chunk};
use crate::pool::{self, ResourcePoolSnapshot};
use crate::provider::NodeProvider;
use crate::registry::NodeRegistry;
use crate::store::{TaskRecord, TaskStore};
use crate::task::{
    AggregateOutcome, FailureDetail, PartitionOutcome, Task, TaskId, TaskPayload, TaskResult,
    TaskStatus,
};
use crate::worker::WorkerClient;

// ── Public snapshots ──────────────────────────────────────────────────────────

/// Lifecycle mode of the facade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VmMode {
    Initializing,
    Starting,
    Ready,
    Error,
    Stopped,
}

/// Rolled-up performance counters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    /// Submits that have run to completion (successful or failed).
    pub total_tasks: u64,
    pub average_elapsed_ms: f64,
    /// Sum of per-partition worker time across all tasks.
    pub total_compute_ms: u64,
    pub uptime_ms: u64,
    /// `total_compute_ms / uptime_ms`; exceeds 100 when the fleet works
    /// in parallel, which is the whole point of the super VM.
    pub efficiency_pct: f64,
}

/// Full status snapshot returned by [`SuperVm::status`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VmStatus {
    pub mode: VmMode,
    pub total_nodes: usize,
    pub active_nodes: usize,
    pub active_tasks: usize,
    pub resources: ResourcePoolSnapshot,
    pub metrics: MetricsSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Result of one submit, as returned to the API caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskOutcome {
    pub task_id: TaskId,
    pub success: bool,
    pub result: TaskResult,
    /// Wall-clock submit duration in milliseconds.
    #[serde(rename = "executionTime")]
    pub execution_time: u64,
    pub nodes_used: usize,
    pub failures: Vec<FailureDetail>,
}

#[derive(Debug, Default, Clone, Copy)]
struct MetricsCounters {
    total_tasks: u64,
    total_elapsed_ms: u64,
    total_compute_ms: u64,
}

// ── SuperVm ───────────────────────────────────────────────────────────────────

/// Top-level orchestration facade.
pub struct SuperVm {
    cfg: SchedulerConfig,
    registry: Arc<NodeRegistry>,
    provider: Arc<dyn NodeProvider>,
    store: Arc<TaskStore>,
    monitor: Arc<HealthMonitor>,
    dispatcher: Dispatcher,
    mode: RwLock<VmMode>,
    last_error: Arc<RwLock<Option<String>>>,
    metrics: RwLock<MetricsCounters>,
    started_at: Instant,
    cancel: CancellationToken,
    handles: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl SuperVm {
    /// Build a stopped facade over the given collaborators.  Call
    /// [`start`](Self::start) before submitting.
    pub fn new(
        cfg: SchedulerConfig,
        provider: Arc<dyn NodeProvider>,
        worker: Arc<dyn WorkerClient>,
    ) -> Arc<Self> {
        let registry = Arc::new(NodeRegistry::new(cfg.max_load_pct));
        let store = Arc::new(TaskStore::new(cfg.retention()));
        let monitor = Arc::new(HealthMonitor::new(
            registry.clone(),
            worker.clone(),
            MonitorConfig {
                probe_interval: cfg.probe_interval(),
                probe_timeout: cfg.probe_timeout(),
                grace_window: cfg.grace_window(),
                evict_window: cfg.evict_window(),
            },
        ));
        let dispatcher = Dispatcher::new(registry.clone(), worker, cfg.reserve_delta_pct);

        Arc::new(Self {
            registry,
            provider,
            store,
            monitor,
            dispatcher,
            mode: RwLock::new(VmMode::Initializing),
            last_error: Arc::new(RwLock::new(None)),
            metrics: RwLock::new(MetricsCounters::default()),
            started_at: Instant::now(),
            cancel: CancellationToken::new(),
            handles: std::sync::Mutex::new(Vec::new()),
            cfg,
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.cfg
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<TaskStore> {
        &self.store
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    /// Bootstrap the fleet and start the background activities.
    ///
    /// Provider failures here leave the facade in `Error` mode and are
    /// returned to the caller; everything else transitions to `Ready`.
    pub async fn start(&self) -> Result<(), SchedulerError> {
        *self.mode.write().await = VmMode::Starting;
        info!("super vm starting");

        match self.provider.list_nodes().await {
            Ok(descriptors) => {
                info!(nodes = descriptors.len(), "provider inventory loaded");
                for desc in descriptors {
                    self.registry.upsert(desc).await;
                }
            }
            Err(err) => {
                error!(%err, "provider bootstrap failed");
                *self.last_error.write().await = Some(err.to_string());
                *self.mode.write().await = VmMode::Error;
                return Err(err.into());
            }
        }

        if self.registry.is_empty().await && self.cfg.bootstrap_node_on_empty {
            info!("no nodes known, requesting one from the provider");
            match self.provider.create_node(&NodeSpec::default()).await {
                Ok(desc) => self.registry.upsert(desc).await,
                Err(err) => {
                    warn!(%err, "bootstrap node creation failed");
                    *self.last_error.write().await = Some(err.to_string());
                }
            }
        }

        // First sweep inline so statically known nodes are schedulable the
        // moment start() returns.
        self.monitor.sweep().await;

        let monitor = self.monitor.clone();
        let monitor_cancel = self.cancel.child_token();
        let store = self.store.clone();
        let sweep_interval = self.cfg.sweep_interval();
        let sweeper_cancel = self.cancel.child_token();
        let mut handles = self.handles.lock().expect("handle list poisoned");
        handles.push(tokio::spawn(async move {
            monitor.run(monitor_cancel).await;
        }));
        handles.push(tokio::spawn(async move {
            store.run_sweeper(sweep_interval, sweeper_cancel).await;
        }));
        drop(handles);

        *self.mode.write().await = VmMode::Ready;
        info!("super vm ready");
        Ok(())
    }

    /// Cancel the background activities and drain their handles.
    /// In-flight submits settle against their own deadlines.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let handles: Vec<JoinHandle<()>> = {
            let mut guard = self.handles.lock().expect("handle list poisoned");
            guard.drain(..).collect()
        };
        for handle in handles {
            let _ = handle.await;
        }
        *self.mode.write().await = VmMode::Stopped;
        info!("super vm stopped");
    }

    pub async fn mode(&self) -> VmMode {
        *self.mode.read().await
    }

    // ── Submission ────────────────────────────────────────────────────────────

    /// Run one task: partition over the current eligible snapshot, fan
    /// out, aggregate, journal.
    ///
    /// Whole-task failures (no partition succeeded) are returned as the
    /// dominant [`SchedulerError`]; partial success is an `Ok` outcome
    /// with a populated `failures` list.
    pub async fn submit(&self, task: Task) -> Result<TaskOutcome, SchedulerError> {
        if *self.mode.read().await != VmMode::Ready {
            return Err(SchedulerError::NotReady);
        }

        let started = Instant::now();
        self.store
            .insert(TaskRecord::new(
                task.id.clone(),
                task.kind,
                task.priority,
                task.submitted_at,
            ))
            .await;
        self.store.mark_running(&task.id, Utc::now()).await;

        let candidates = self.eligible_candidates(&task.requirement).await;
        if candidates.is_empty() {
            let err = SchedulerError::NoEligibleNodes;
            warn!(task = %task.id, kind = task.kind.as_str(), "no eligible nodes");
            self.store
                .set_error(&task.id, err.kind(), err.to_string(), elapsed_ms(started))
                .await;
            self.record_metrics(elapsed_ms(started), 0).await;
            return Err(err);
        }

        info!(
            task = %task.id,
            kind = task.kind.as_str(),
            candidates = candidates.len(),
            "=== submit ==="
        );

        let plan = partition::partition_task(&task, &candidates);
        if plan.partitions.is_empty() {
            let err = SchedulerError::Validation(String::from("task produced no partitions"));
            self.store
                .set_error(&task.id, err.kind(), err.to_string(), elapsed_ms(started))
                .await;
            self.record_metrics(elapsed_ms(started), 0).await;
            return Err(err);
        }

        let mut outcomes = self
            .dispatcher
            .dispatch(&task.id, task.deadline, plan.partitions)
            .await;
        let unscheduled = self
            .run_exhaustive_rounds(&task, plan.leftover_chunks, &mut outcomes)
            .await;

        let agg = aggregate::aggregate(&task, &outcomes, unscheduled);
        let elapsed = elapsed_ms(started);
        let compute_ms: u64 = outcomes.iter().map(|o| o.elapsed_ms).sum();
        self.record_metrics(elapsed, compute_ms).await;

        info!(
            task = %task.id,
            success = agg.success,
            nodes_used = agg.nodes_used,
            failures = agg.failures.len(),
            elapsed_ms = elapsed,
            "=== submit settled ==="
        );

        if agg.success {
            let outcome = TaskOutcome {
                task_id: task.id.clone(),
                success: true,
                result: agg.result.clone(),
                execution_time: elapsed,
                nodes_used: agg.nodes_used,
                failures: agg.failures.clone(),
            };
            self.store.set_result(&task.id, agg, elapsed).await;
            Ok(outcome)
        } else {
            let err = derive_task_error(&agg);
            self.store.set_result(&task.id, agg, elapsed).await;
            Err(err)
        }
    }

    /// Dispatch leftover compute chunks in follow-up rounds when the task
    /// asked for exhaustive processing.  Returns the count of chunks that
    /// stayed unscheduled.
    async fn run_exhaustive_rounds(
        &self,
        task: &Task,
        mut leftover: Vec<Chunk>,
        outcomes: &mut Vec<PartitionOutcome>,
    ) -> usize {
        let TaskPayload::Compute(spec) = &task.payload else {
            return 0;
        };
        if !spec.exhaustive {
            return leftover.len();
        }

        let mut index_base = outcomes.len();
        while !leftover.is_empty() {
            let candidates = self.eligible_candidates(&task.requirement).await;
            if candidates.is_empty() {
                warn!(
                    task = %task.id,
                    remaining = leftover.len(),
                    "candidates exhausted before chunks"
                );
                break;
            }
            let (partitions, rest) =
                partition::assign_chunks(&spec.operation, leftover, &candidates, index_base);
            leftover = rest;
            index_base += partitions.len();
            let round = self
                .dispatcher
                .dispatch(&task.id, task.deadline, partitions)
                .await;
            outcomes.extend(round);
        }
        leftover.len()
    }

    /// Current snapshot of schedulable nodes: running, under the load
    /// ceiling, big enough for the requirement; ordered ascending by load
    /// then id; capped at the fan-out ceiling.
    async fn eligible_candidates(&self, req: &ResourceRequirement) -> Vec<Node> {
        let eligible: Vec<Node> = self
            .registry
            .list()
            .await
            .into_iter()
            .filter(|n| n.is_eligible(self.cfg.max_load_pct, req))
            .collect();
        let mut ordered = partition::order_candidates(eligible);
        ordered.truncate(self.cfg.max_fan_out.max(1));
        ordered
    }

    // ── Scaling ───────────────────────────────────────────────────────────────

    /// Request `count` node creations from the provider, asynchronously.
    /// Callers poll [`status`](Self::status) to watch the fleet grow.
    pub async fn scale(&self, count: u32) -> Result<(), SchedulerError> {
        let mode = *self.mode.read().await;
        if matches!(mode, VmMode::Initializing | VmMode::Stopped) {
            return Err(SchedulerError::NotReady);
        }
        info!(count, "scale requested");
        for i in 0..count {
            let provider = self.provider.clone();
            let registry = self.registry.clone();
            let last_error = self.last_error.clone();
            tokio::spawn(async move {
                let spec = NodeSpec {
                    label: format!("worker-{}", uuid::Uuid::new_v4()),
                    ..NodeSpec::default()
                };
                match provider.create_node(&spec).await {
                    Ok(desc) => {
                        info!(node = %desc.id, ordinal = i, "node created");
                        registry.upsert(desc).await;
                    }
                    Err(err) => {
                        warn!(%err, ordinal = i, "node creation failed");
                        *last_error.write().await = Some(err.to_string());
                    }
                }
            });
        }
        Ok(())
    }

    // ── Introspection ─────────────────────────────────────────────────────────

    pub async fn resources(&self) -> ResourcePoolSnapshot {
        pool::aggregate(&self.registry.list().await)
    }

    pub async fn metrics(&self) -> MetricsSnapshot {
        let counters = *self.metrics.read().await;
        let uptime_ms = self.started_at.elapsed().as_millis() as u64;
        MetricsSnapshot {
            total_tasks: counters.total_tasks,
            average_elapsed_ms: if counters.total_tasks == 0 {
                0.0
            } else {
                counters.total_elapsed_ms as f64 / counters.total_tasks as f64
            },
            total_compute_ms: counters.total_compute_ms,
            uptime_ms,
            efficiency_pct: if uptime_ms == 0 {
                0.0
            } else {
                counters.total_compute_ms as f64 / uptime_ms as f64 * 100.0
            },
        }
    }

    pub async fn status(&self) -> VmStatus {
        let nodes = self.registry.list().await;
        let active_nodes = nodes
            .iter()
            .filter(|n| n.status == crate::node::NodeStatus::Running)
            .count();
        VmStatus {
            mode: *self.mode.read().await,
            total_nodes: nodes.len(),
            active_nodes,
            active_tasks: self.store.count_by_status(TaskStatus::Running).await,
            resources: pool::aggregate(&nodes),
            metrics: self.metrics().await,
            last_error: self.last_error.read().await.clone(),
        }
    }

    async fn record_metrics(&self, elapsed: u64, compute_ms: u64) {
        let mut counters = self.metrics.write().await;
        counters.total_tasks += 1;
        counters.total_elapsed_ms += elapsed;
        counters.total_compute_ms += compute_ms;
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

/// Colour a whole-task failure with the dominant per-partition reason.
fn derive_task_error(agg: &AggregateOutcome) -> SchedulerError {
    if agg.failures.is_empty() {
        return SchedulerError::Worker(String::from("workers returned no output"));
    }
    if agg.failures.iter().all(|f| f.reason == "NoCapacity") {
        return SchedulerError::NoCapacity;
    }
    if agg.failures.iter().all(|f| f.reason == "Timeout") {
        return SchedulerError::Timeout;
    }
    let first = agg
        .failures
        .iter()
        .find(|f| f.reason != "NoCapacity")
        .expect("non-NoCapacity failure present");
    match first.reason.as_str() {
        "Transport" => SchedulerError::Transport(first.message.clone()),
        "Timeout" => SchedulerError::Timeout,
        _ => SchedulerError::Worker(first.message.clone()),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
