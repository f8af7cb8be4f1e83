/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Core node data structures for the SuperVM control plane.
//!
//! Two distinct types model the two sides of the node pipeline:
//!
//! ```text
//! NodeProvider ──(NodeDescriptor)──► NodeRegistry ──(Node)──► scheduling / API
//!                 ↑ identity + capacity              ↑ live health + load
//! ```
//!
//! A [`NodeDescriptor`] is what the provisioning layer knows about a worker
//! (identity, address, declared capacity).  A [`Node`] is the registry's live
//! record: descriptor fields plus measured load, liveness status, and the
//! last successful probe timestamp.  Health fields are owned exclusively by
//! the `HealthMonitor` and the `Dispatcher` (load only).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque node identifier assigned by the `NodeProvider`.
pub type NodeId = String;

// ── Status ────────────────────────────────────────────────────────────────────

/// Liveness state of a worker node.
///
/// Transitions: `Pending` → `Running` (first successful probe) →
/// `Unreachable` (probe failure) → `Running` (recovery).  `Draining` is
/// reserved for cooperative scale-down and is never set by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    /// Reported by the provider, not yet probed successfully.
    #[default]
    Pending,
    /// Last probe succeeded; eligible for scheduling.
    Running,
    /// Last probe failed; ineligible until a probe succeeds again.
    Unreachable,
    /// Marked for removal by an external collaborator; ineligible.
    Draining,
}

// ── Capacity and requirements ─────────────────────────────────────────────────

/// Declared hardware capacity of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeCapacity {
    /// Number of CPU cores.  Always at least 1.
    pub cpu_cores: u32,
    /// Memory in megabytes.
    pub memory_mb: u64,
    /// Number of GPUs.  Zero for CPU-only nodes.
    pub gpu_count: u32,
}

impl Default for NodeCapacity {
    fn default() -> Self {
        Self {
            cpu_cores: 1,
            memory_mb: 0,
            gpu_count: 0,
        }
    }
}

impl NodeCapacity {
    /// Returns `true` if this capacity can satisfy `req` at all, ignoring
    /// current load.
    pub fn satisfies(&self, req: &ResourceRequirement) -> bool {
        self.cpu_cores >= req.min_cpu_cores
            && self.memory_mb >= req.min_memory_mb
            && self.gpu_count >= req.min_gpus
    }
}

/// Minimum per-partition resource requirement carried by a task.
///
/// The all-zero default means "any node".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceRequirement {
    pub min_cpu_cores: u32,
    pub min_memory_mb: u64,
    pub min_gpus: u32,
}

// ── Provider-side types ───────────────────────────────────────────────────────

/// What the provisioning layer reports about one worker instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDescriptor {
    pub id: NodeId,
    pub label: String,
    /// Reachable base URL of the worker, e.g. `http://10.0.0.7:7071`.
    pub addr: String,
    pub capacity: NodeCapacity,
    /// `false` while the instance is still being provisioned.
    pub confirmed: bool,
}

/// Requested shape of a new worker instance, passed to
/// [`NodeProvider::create_node`](crate::provider::NodeProvider::create_node).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSpec {
    pub label: String,
    pub capacity: NodeCapacity,
}

impl Default for NodeSpec {
    fn default() -> Self {
        Self {
            label: String::from("worker"),
            capacity: NodeCapacity {
                cpu_cores: 4,
                memory_mb: 8192,
                gpu_count: 0,
            },
        }
    }
}

// ── Node (registry record) ────────────────────────────────────────────────────

/// Live registry record for one worker node.
///
/// `load_pct` is a percentage in `0..=100` combining the last measured load
/// and any advisory reservations currently held by the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: NodeId,
    pub label: String,
    pub addr: String,
    pub capacity: NodeCapacity,
    pub load_pct: f64,
    pub status: NodeStatus,
    /// Timestamp of the last successful health probe.  `None` until the
    /// first probe succeeds.  Probe failures never clear this.
    pub last_seen: Option<DateTime<Utc>>,
}

impl Node {
    /// Build a fresh (never probed) record from a provider descriptor.
    pub fn from_descriptor(desc: NodeDescriptor) -> Self {
        Self {
            id: desc.id,
            label: desc.label,
            addr: desc.addr,
            capacity: desc.capacity,
            load_pct: 0.0,
            status: NodeStatus::Pending,
            last_seen: None,
        }
    }

    /// CPU cores still available given the current load, clamped at zero.
    pub fn available_cpu_cores(&self) -> f64 {
        (f64::from(self.capacity.cpu_cores) * (1.0 - self.load_pct / 100.0)).max(0.0)
    }

    /// Memory still available given the current load, clamped at zero.
    pub fn available_memory_mb(&self) -> f64 {
        (self.capacity.memory_mb as f64 * (1.0 - self.load_pct / 100.0)).max(0.0)
    }

    /// GPUs still available given the current load, clamped at zero.
    pub fn available_gpus(&self) -> f64 {
        (f64::from(self.capacity.gpu_count) * (1.0 - self.load_pct / 100.0)).max(0.0)
    }

    /// Eligibility gate used at submit time: the node must be running, under
    /// the load ceiling, and declare enough capacity for the requirement.
    pub fn is_eligible(&self, max_load_pct: f64, req: &ResourceRequirement) -> bool {
        self.status == NodeStatus::Running
            && self.load_pct < max_load_pct
            && self.capacity.satisfies(req)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
