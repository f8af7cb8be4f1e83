/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Derived, read-only aggregate of the resource pool.
//!
//! Totals count `Running` nodes only, so the pool never reports more
//! available capacity than the healthy fleet actually has.

use serde::{Deserialize, Serialize};

use crate::node::{Node, NodeStatus};

/// Point-in-time aggregate across the fleet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourcePoolSnapshot {
    pub total_cpu_cores: u64,
    pub total_memory_mb: u64,
    pub total_gpus: u64,
    pub available_cpu_cores: f64,
    pub available_memory_mb: f64,
    pub available_gpus: f64,
    pub running_nodes: usize,
    pub total_nodes: usize,
    /// CPU-weighted utilisation of the running fleet, 0..=100.
    pub utilization_pct: f64,
}

/// Aggregate a registry snapshot into a pool view.
pub fn aggregate(nodes: &[Node]) -> ResourcePoolSnapshot {
    let mut snap = ResourcePoolSnapshot {
        total_cpu_cores: 0,
        total_memory_mb: 0,
        total_gpus: 0,
        available_cpu_cores: 0.0,
        available_memory_mb: 0.0,
        available_gpus: 0.0,
        running_nodes: 0,
        total_nodes: nodes.len(),
        utilization_pct: 0.0,
    };

    for node in nodes {
        if node.status != NodeStatus::Running {
            continue;
        }
        snap.running_nodes += 1;
        snap.total_cpu_cores += u64::from(node.capacity.cpu_cores);
        snap.total_memory_mb += node.capacity.memory_mb;
        snap.total_gpus += u64::from(node.capacity.gpu_count);
        snap.available_cpu_cores += node.available_cpu_cores();
        snap.available_memory_mb += node.available_memory_mb();
        snap.available_gpus += node.available_gpus();
    }

    if snap.total_cpu_cores > 0 {
        snap.utilization_pct =
            (1.0 - snap.available_cpu_cores / snap.total_cpu_cores as f64) * 100.0;
    }

    snap
}

// ── Tests ─────────────────────────────────────────────────────────────────────
