/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Structured error types for the SuperVM control plane.
//!
//! Two error layers model the two failure scopes:
//!
//! * [`ReserveRefusal`] and [`FailureReason`] describe why a single
//!   partition could not run on a specific node (low-level, carries exact
//!   load values).
//! * [`SchedulerError`] is the task-level taxonomy returned from the
//!   `SuperVm` facade and mapped to HTTP statuses at the API boundary:
//!
//! | Variant | HTTP status |
//! |---|---|
//! | `NotReady` | 503 |
//! | `Validation` | 400 |
//! | `NoEligibleNodes` | 500 |
//! | `NoCapacity` | 500 |
//! | `Transport` / `Worker` / `Timeout` | 500 |
//! | `Provider` | 500 |
//!
//! Per-partition failures are recovered locally (recorded in the aggregate,
//! reservation released, sibling partitions continue); only whole-task
//! failures surface as `SchedulerError`.  Do not collapse these to
//! `anyhow::Error` on production paths; the structured variants are
//! intentional.

use thiserror::Error;

use crate::node::{NodeId, NodeStatus};
use crate::provider::ProviderError;

// ── Reservation refusals ──────────────────────────────────────────────────────

/// Typed refusal returned by `NodeRegistry::try_reserve`.
///
/// Carried inside [`FailureReason::NoCapacity`] so the aggregate always
/// records both *which* node refused and *why*.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReserveRefusal {
    /// The node exists but its status is not `Running`.
    #[error("node '{node}' is not running (status: {status:?})")]
    NotRunning { node: NodeId, status: NodeStatus },

    /// Accepting the reservation would push the node past the load ceiling.
    #[error(
        "node '{node}' load {current:.1}% + {delta:.1}% would exceed the {max:.0}% ceiling"
    )]
    Overloaded {
        node: NodeId,
        current: f64,
        delta: f64,
        max: f64,
    },

    /// The node id is not present in the registry.
    #[error("node '{node}' is not in the registry")]
    Unknown { node: NodeId },
}

// ── Per-partition failures ────────────────────────────────────────────────────

/// Why one partition failed.  Mirrors the wire `reason` values
/// `Timeout | Transport | WorkerError | NoCapacity`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FailureReason {
    /// The per-partition deadline elapsed before the worker answered.
    #[error("partition deadline exceeded")]
    Timeout,

    /// The worker could not be reached or the connection broke mid-call.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The worker answered with a structured failure of its own.
    #[error("worker failure: {0}")]
    Worker(String),

    /// Reservation was refused; the partition was never dispatched.
    #[error("no capacity: {0}")]
    NoCapacity(ReserveRefusal),
}

impl FailureReason {
    /// Stable wire identifier for the reason, used in aggregate results.
    pub fn kind(&self) -> &'static str {
        match self {
            FailureReason::Timeout => "Timeout",
            FailureReason::Transport(_) => "Transport",
            FailureReason::Worker(_) => "WorkerError",
            FailureReason::NoCapacity(_) => "NoCapacity",
        }
    }
}

// ── Task-level errors ─────────────────────────────────────────────────────────

/// Top-level error taxonomy returned by the `SuperVm` facade.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// An operation was invoked before initialisation completed.
    #[error("scheduler is not ready")]
    NotReady,

    /// The eligible candidate set was empty at submit time.  The task is
    /// recorded as failed; the scheduler does not queue for future nodes.
    #[error("no eligible nodes available for this task")]
    NoEligibleNodes,

    /// Every partition's reservation was refused.
    #[error("no node had capacity for any partition")]
    NoCapacity,

    /// Every partition failed at the transport layer.
    #[error("worker transport failure: {0}")]
    Transport(String),

    /// Every partition failed with a worker-reported error.
    #[error("worker failure: {0}")]
    Worker(String),

    /// The whole-task deadline elapsed with no partition succeeding.
    #[error("task deadline exceeded")]
    Timeout,

    /// Malformed input, rejected before any scheduling work.
    #[error("{0}")]
    Validation(String),

    /// The node provider failed (surfaced on scale and during initialise).
    #[error("node provider failure: {0}")]
    Provider(#[from] ProviderError),
}

impl SchedulerError {
    /// Stable wire identifier, returned as the `kind` field of API errors.
    pub fn kind(&self) -> &'static str {
        match self {
            SchedulerError::NotReady => "NotReady",
            SchedulerError::NoEligibleNodes => "NoEligibleNodes",
            SchedulerError::NoCapacity => "NoCapacity",
            SchedulerError::Transport(_) => "Transport",
            SchedulerError::Worker(_) => "WorkerError",
            SchedulerError::Timeout => "Timeout",
            SchedulerError::Validation(_) => "Validation",
            SchedulerError::Provider(_) => "ProviderError",
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
