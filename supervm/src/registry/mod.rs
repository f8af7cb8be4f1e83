/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! The node registry: canonical mapping of node id to live node record.
//!
//! The registry is the only mutable shared state in the scheduler.  All
//! mutations serialise on one lock; reads return defensive copies so no
//! caller ever observes a half-applied update.  `try_reserve` and
//! `release` are atomic with respect to each other, which is what
//! linearises capacity decisions across concurrent submits.
//!
//! `BTreeMap` (not `HashMap`) so listing order is always stable by node
//! id; tie-breaking in the partitioner depends on it.

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use std::collections::BTreeMap;

use crate::error::ReserveRefusal;
use crate::node::{Node, NodeDescriptor, NodeId, NodeStatus};

/// Concurrent-safe node table.
#[derive(Debug)]
pub struct NodeRegistry {
    nodes: RwLock<BTreeMap<NodeId, Node>>,
    max_load_pct: f64,
}

impl NodeRegistry {
    /// Create an empty registry with the given reservation ceiling.
    pub fn new(max_load_pct: f64) -> Self {
        Self {
            nodes: RwLock::new(BTreeMap::new()),
            max_load_pct,
        }
    }

    /// Insert or refresh a node from a provider descriptor.
    ///
    /// Identity fields (label, address, capacity) always follow the
    /// descriptor; live health fields (load, status, last_seen) are owned
    /// by the monitor and are preserved on refresh.
    pub async fn upsert(&self, desc: NodeDescriptor) {
        let mut nodes = self.nodes.write().await;
        match nodes.get_mut(&desc.id) {
            Some(existing) => {
                existing.label = desc.label;
                existing.addr = desc.addr;
                existing.capacity = desc.capacity;
            }
            None => {
                debug!(node = %desc.id, addr = %desc.addr, "node registered");
                nodes.insert(desc.id.clone(), Node::from_descriptor(desc));
            }
        }
    }

    /// Remove a node.  Returns the final record if it existed.
    pub async fn remove(&self, id: &str) -> Option<Node> {
        self.nodes.write().await.remove(id)
    }

    /// Copy of one node record.
    pub async fn get(&self, id: &str) -> Option<Node> {
        self.nodes.read().await.get(id).cloned()
    }

    /// Snapshot of every node, ordered by id.
    pub async fn list(&self) -> Vec<Node> {
        self.nodes.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.nodes.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.nodes.read().await.is_empty()
    }

    /// Apply a health-probe result: measured load, new status, and the
    /// probe timestamp.  Returns `false` for unknown nodes.
    pub async fn update_health(
        &self,
        id: &str,
        load_pct: f64,
        status: NodeStatus,
        timestamp: DateTime<Utc>,
    ) -> bool {
        let mut nodes = self.nodes.write().await;
        let Some(node) = nodes.get_mut(id) else {
            return false;
        };
        node.load_pct = load_pct.clamp(0.0, 100.0);
        node.status = status;
        node.last_seen = Some(timestamp);
        true
    }

    /// Mark a node unreachable after a failed probe.  `last_seen` keeps
    /// the timestamp of the last *successful* probe.  Returns `false` for
    /// unknown nodes.
    pub async fn mark_unreachable(&self, id: &str) -> bool {
        let mut nodes = self.nodes.write().await;
        let Some(node) = nodes.get_mut(id) else {
            return false;
        };
        node.status = NodeStatus::Unreachable;
        true
    }

    /// Atomically reserve `delta_pct` of load on a node.
    ///
    /// Succeeds only when the node is `Running` and the post-reservation
    /// load stays at or under the ceiling.  The refusal carries exact
    /// values so the caller can record them without further lookups.
    pub async fn try_reserve(&self, id: &str, delta_pct: f64) -> Result<(), ReserveRefusal> {
        let mut nodes = self.nodes.write().await;
        let Some(node) = nodes.get_mut(id) else {
            return Err(ReserveRefusal::Unknown { node: id.to_string() });
        };
        if node.status != NodeStatus::Running {
            return Err(ReserveRefusal::NotRunning {
                node: node.id.clone(),
                status: node.status,
            });
        }
        if node.load_pct + delta_pct > self.max_load_pct {
            return Err(ReserveRefusal::Overloaded {
                node: node.id.clone(),
                current: node.load_pct,
                delta: delta_pct,
                max: self.max_load_pct,
            });
        }
        node.load_pct += delta_pct;
        debug!(node = %node.id, load_pct = node.load_pct, "reservation taken");
        Ok(())
    }

    /// Undo a reservation.  Total: unknown nodes are a no-op and negative
    /// results clamp to zero, so release can always be called from every
    /// completion path.
    pub async fn release(&self, id: &str, delta_pct: f64) {
        let mut nodes = self.nodes.write().await;
        if let Some(node) = nodes.get_mut(id) {
            node.load_pct = (node.load_pct - delta_pct).max(0.0);
            debug!(node = %node.id, load_pct = node.load_pct, "reservation released");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
