/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Core task data structures for the SuperVM control plane.
//!
//! The types model the scheduling pipeline left to right:
//!
//! ```text
//! API request ──► Task ──(Partitioner)──► Partition ──(Dispatcher)──► PartitionOutcome
//!                 ↑ validated input         ↑ one node, one sub-task     ↑ per-node result
//!                                                └──(Aggregator)──► AggregateOutcome
//! ```
//!
//! # Ownership model
//! A [`Task`] is built once at the API boundary and borrowed read-only by
//! the partitioner and aggregator.  [`Partition`]s are moved into the
//! dispatcher; [`PartitionOutcome`]s are moved into the aggregator.  Nothing
//! in this pipeline is mutated in place after construction.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::compute::ComputeOp;
use crate::error::FailureReason;
use crate::node::{NodeId, ResourceRequirement};

/// Task identifier: a UUID string, generated at submit time when the
/// client does not supply one.
pub type TaskId = String;

// ── Kind / priority / status ──────────────────────────────────────────────────

/// The four workload kinds the scheduler partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskKind {
    Render,
    Compute,
    Browser,
    FileSync,
}

impl TaskKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::Render => "render",
            TaskKind::Compute => "compute",
            TaskKind::Browser => "browser",
            TaskKind::FileSync => "fileSync",
        }
    }
}

/// Scheduling priority.  Recorded and reported; the core does not reorder
/// submissions by priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    #[default]
    Normal,
    High,
}

/// Lifecycle status of a task.
///
/// Transitions: `Pending` → `Running` (first dispatch) → `Completed` |
/// `Failed` (terminal).  `Cancelled` is reserved; no core transition emits
/// it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Terminal tasks are retained for the configured window, then evicted.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

// ── Payloads ──────────────────────────────────────────────────────────────────

/// Free-form options passed through to the worker untouched.
pub type Options = serde_json::Map<String, Value>;

/// Render workload: a scene file and an inclusive frame range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderSpec {
    pub scene_file: String,
    pub frame_start: i64,
    pub frame_end: i64,
    #[serde(default)]
    pub options: Options,
}

impl RenderSpec {
    /// Number of frames in the inclusive range.
    pub fn frame_count(&self) -> u64 {
        (self.frame_end - self.frame_start + 1).max(0) as u64
    }
}

/// Compute workload: numeric data plus one closed-set operation.
///
/// `chunk_size` arrives resolved (request value or the configured
/// default); the partitioner never consults configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputeSpec {
    pub input_data: Vec<Value>,
    pub operation: ComputeOp,
    pub chunk_size: usize,
    /// When set, surplus chunks are dispatched in follow-up rounds instead
    /// of being reported as unscheduled.
    pub exhaustive: bool,
}

/// Browser-automation workload.  Actions are opaque to the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserSpec {
    pub url: String,
    #[serde(default)]
    pub actions: Vec<Value>,
    #[serde(default)]
    pub options: Options,
}

/// File-distribution workload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSpec {
    pub operation: String,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub options: Options,
}

/// Kind-specific payload of a task.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskPayload {
    Render(RenderSpec),
    Compute(ComputeSpec),
    Browser(BrowserSpec),
    FileSync(SyncSpec),
}

impl TaskPayload {
    pub fn kind(&self) -> TaskKind {
        match self {
            TaskPayload::Render(_) => TaskKind::Render,
            TaskPayload::Compute(_) => TaskKind::Compute,
            TaskPayload::Browser(_) => TaskKind::Browser,
            TaskPayload::FileSync(_) => TaskKind::FileSync,
        }
    }
}

// ── Task ──────────────────────────────────────────────────────────────────────

/// A validated task, ready for partitioning.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    pub kind: TaskKind,
    pub priority: TaskPriority,
    pub requirement: ResourceRequirement,
    pub payload: TaskPayload,
    /// Whole-task deadline; also the per-partition deadline.
    pub deadline: Duration,
    pub submitted_at: DateTime<Utc>,
}

impl Task {
    /// Build a task from a validated payload, generating a fresh id.
    pub fn new(
        payload: TaskPayload,
        priority: TaskPriority,
        requirement: ResourceRequirement,
        deadline: Duration,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind: payload.kind(),
            priority,
            requirement,
            payload,
            deadline,
            submitted_at: Utc::now(),
        }
    }
}

// ── Partitions (dispatch input) ───────────────────────────────────────────────

/// Wire-ready sub-task carried to exactly one worker.
///
/// Tagged (`kind`) so the worker protocol is self-describing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SubTaskSpec {
    #[serde(rename_all = "camelCase")]
    Render {
        scene_file: String,
        frame_start: i64,
        frame_end: i64,
        #[serde(default)]
        options: Options,
    },
    #[serde(rename_all = "camelCase")]
    Compute {
        /// Position of this chunk in the original input; the aggregation
        /// ordering key.
        chunk_index: usize,
        data: Vec<Value>,
        operation: ComputeOp,
    },
    #[serde(rename_all = "camelCase")]
    Browser {
        url: String,
        #[serde(default)]
        actions: Vec<Value>,
        #[serde(default)]
        options: Options,
    },
    #[serde(rename_all = "camelCase")]
    FileSync {
        operation: String,
        #[serde(default)]
        files: Vec<String>,
        #[serde(default)]
        options: Options,
    },
}

/// One sub-task targeted at one node.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    /// Position within the task's partition list (observability only).
    pub index: usize,
    pub node_id: NodeId,
    pub node_addr: String,
    pub spec: SubTaskSpec,
}

impl Partition {
    /// Ordering key used by order-sensitive aggregation: the chunk index
    /// for compute partitions, the partition index otherwise.
    pub fn order_key(&self) -> usize {
        match &self.spec {
            SubTaskSpec::Compute { chunk_index, .. } => *chunk_index,
            _ => self.index,
        }
    }
}

// ── Worker results (dispatch output) ──────────────────────────────────────────

/// One rendered frame.  The artifact body is an opaque blob; the scheduler
/// only reads `frame_number`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedFrame {
    pub frame_number: i64,
    pub content_type: String,
    /// Base64-encoded artifact body.
    pub data: String,
}

/// Structured result a worker returns for one sub-task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WorkerOutput {
    #[serde(rename_all = "camelCase")]
    Render { frames: Vec<RenderedFrame> },
    #[serde(rename_all = "camelCase")]
    Compute { processed_data: Vec<Value> },
    /// Opaque result body used by browser, file-sync, and any future kind.
    #[serde(rename_all = "camelCase")]
    Raw { content_type: String, data: String },
}

/// Settled result of one partition dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionOutcome {
    pub partition_index: usize,
    /// Copied from [`Partition::order_key`] before dispatch.
    pub order_key: usize,
    pub node_id: NodeId,
    pub elapsed_ms: u64,
    pub result: Result<WorkerOutput, FailureReason>,
}

impl PartitionOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

// ── Aggregate results ─────────────────────────────────────────────────────────

/// Per-kind combined result, serialised with a `type` tag for the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TaskResult {
    #[serde(rename_all = "camelCase")]
    Render {
        frames: Vec<RenderedFrame>,
        total_frames: u64,
    },
    #[serde(rename_all = "camelCase")]
    Compute {
        processed_data: Vec<Value>,
        total_processed: u64,
        unscheduled_chunks: u64,
    },
    #[serde(rename_all = "camelCase")]
    Browser { payload: Option<WorkerOutput> },
    #[serde(rename_all = "camelCase")]
    FileSync { payload: Option<WorkerOutput> },
}

/// One failed partition as reported in the aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureDetail {
    pub node_id: NodeId,
    /// Stable reason identifier: `Timeout`, `Transport`, `WorkerError`,
    /// or `NoCapacity`.
    pub reason: String,
    pub message: String,
}

/// Per-node timing entry included in every aggregate for observability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeReport {
    pub node_id: NodeId,
    pub elapsed_ms: u64,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The aggregator's final product for one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateOutcome {
    pub success: bool,
    pub result: TaskResult,
    pub failures: Vec<FailureDetail>,
    pub node_reports: Vec<NodeReport>,
    /// Distinct nodes that contributed a successful partition.
    pub nodes_used: usize,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
