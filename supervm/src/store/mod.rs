/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! In-memory task journal with TTL eviction.
//!
//! Records are keyed by task id; writes to one record always come from the
//! single submit call driving that task, so transitions are linearisable
//! per id.  Reads may trail a concurrent write by one update.  Terminal
//! records are retained for the configured window, then evicted by the
//! background sweeper.  The store is deliberately not durable (restart
//! forgets history); a persistent journal would layer below this interface
//! without touching the scheduler core.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::task::{AggregateOutcome, TaskId, TaskKind, TaskPriority, TaskStatus};

// ── Records ───────────────────────────────────────────────────────────────────

/// Terminal error recorded for a failed task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskError {
    pub kind: String,
    pub message: String,
}

/// Full journal entry for one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub id: TaskId,
    pub kind: TaskKind,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    pub submitted_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<AggregateOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
}

impl TaskRecord {
    pub fn new(
        id: TaskId,
        kind: TaskKind,
        priority: TaskPriority,
        submitted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            kind,
            priority,
            status: TaskStatus::Pending,
            submitted_at,
            started_at: None,
            ended_at: None,
            elapsed_ms: None,
            result: None,
            error: None,
        }
    }
}

/// Listing row: enough for the tasks endpoint without payload bodies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSummary {
    pub id: TaskId,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub submitted_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
}

// ── Store ─────────────────────────────────────────────────────────────────────

/// Concurrent-safe task journal.
#[derive(Debug)]
pub struct TaskStore {
    tasks: RwLock<HashMap<TaskId, TaskRecord>>,
    retention: Duration,
}

impl TaskStore {
    pub fn new(retention: Duration) -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            retention,
        }
    }

    /// Insert a fresh `Pending` record.
    pub async fn insert(&self, record: TaskRecord) {
        self.tasks.write().await.insert(record.id.clone(), record);
    }

    /// Move a task to `Running` and stamp its start time.
    pub async fn mark_running(&self, id: &str, at: DateTime<Utc>) {
        if let Some(rec) = self.tasks.write().await.get_mut(id) {
            rec.status = TaskStatus::Running;
            rec.started_at = Some(at);
        }
    }

    /// Record the aggregate outcome and close the task as `Completed` or
    /// `Failed` depending on aggregate success.
    pub async fn set_result(&self, id: &str, outcome: AggregateOutcome, elapsed_ms: u64) {
        if let Some(rec) = self.tasks.write().await.get_mut(id) {
            rec.status = if outcome.success {
                TaskStatus::Completed
            } else {
                TaskStatus::Failed
            };
            rec.ended_at = Some(Utc::now());
            rec.elapsed_ms = Some(elapsed_ms);
            rec.result = Some(outcome);
        }
    }

    /// Close the task as `Failed` with a structured error and no result.
    pub async fn set_error(&self, id: &str, kind: &str, message: String, elapsed_ms: u64) {
        if let Some(rec) = self.tasks.write().await.get_mut(id) {
            rec.status = TaskStatus::Failed;
            rec.ended_at = Some(Utc::now());
            rec.elapsed_ms = Some(elapsed_ms);
            rec.error = Some(TaskError {
                kind: kind.to_string(),
                message,
            });
        }
    }

    /// Copy of one full record.
    pub async fn get(&self, id: &str) -> Option<TaskRecord> {
        self.tasks.read().await.get(id).cloned()
    }

    /// Snapshot summaries, newest submission first.
    pub async fn list(&self) -> Vec<TaskSummary> {
        let mut rows: Vec<TaskSummary> = self
            .tasks
            .read()
            .await
            .values()
            .map(|rec| TaskSummary {
                id: rec.id.clone(),
                kind: rec.kind,
                status: rec.status,
                submitted_at: rec.submitted_at,
                elapsed_ms: rec.elapsed_ms,
            })
            .collect();
        rows.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        rows
    }

    /// Number of tasks currently in a given status.
    pub async fn count_by_status(&self, status: TaskStatus) -> usize {
        self.tasks
            .read()
            .await
            .values()
            .filter(|rec| rec.status == status)
            .count()
    }

    /// Evict terminal records older than the retention window, measured
    /// from `now` against each record's end timestamp.  Returns the number
    /// evicted.
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> usize {
        let retention =
            chrono::Duration::from_std(self.retention).unwrap_or(chrono::Duration::MAX);
        let mut tasks = self.tasks.write().await;
        let before = tasks.len();
        tasks.retain(|_, rec| {
            if !rec.status.is_terminal() {
                return true;
            }
            match rec.ended_at {
                Some(ended) => now - ended <= retention,
                None => true,
            }
        });
        let evicted = before - tasks.len();
        if evicted > 0 {
            debug!(evicted, "task journal swept");
        }
        evicted
    }

    /// Run the eviction sweeper until cancelled.
    pub async fn run_sweeper(&self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.sweep_once(Utc::now()).await;
                }
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
