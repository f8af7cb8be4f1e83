/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Background health monitoring.
//!
//! One long-lived activity sweeps the fleet on a fixed cadence.  Each
//! sweep probes every known node concurrently (no probe blocks another)
//! with a short per-probe timeout:
//!
//! * probe success: load and `Running` status are written back, and the
//!   probe timestamp becomes the node's `last_seen`;
//! * probe failure: the node is marked `Unreachable`; `last_seen` keeps
//!   the last *successful* probe time.
//!
//! A single missed probe never removes a node.  Nodes that stay
//! unreachable past the eviction window are dropped from the registry;
//! within the shorter scheduling grace window an unreachable node is
//! merely ineligible (its status is not `Running`) but still listed.
//!
//! Probe failures never propagate; they only mutate node status.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::node::{Node, NodeStatus};
use crate::registry::NodeRegistry;
use crate::worker::WorkerClient;

/// Monitor cadence and windows, resolved from the scheduler config.
#[derive(Debug, Clone, Copy)]
pub struct MonitorConfig {
    pub probe_interval: Duration,
    pub probe_timeout: Duration,
    /// Informational: elapsed since last success after which a node no
    /// longer counts as recently seen.
    pub grace_window: Duration,
    /// Elapsed since last success after which an unreachable node is
    /// evicted from the registry.
    pub evict_window: Duration,
}

/// Periodic fleet prober.
pub struct HealthMonitor {
    registry: Arc<NodeRegistry>,
    worker: Arc<dyn WorkerClient>,
    cfg: MonitorConfig,
}

impl HealthMonitor {
    pub fn new(
        registry: Arc<NodeRegistry>,
        worker: Arc<dyn WorkerClient>,
        cfg: MonitorConfig,
    ) -> Self {
        Self {
            registry,
            worker,
            cfg,
        }
    }

    /// Run sweeps on the configured cadence until cancelled.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.cfg.probe_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(
            interval_secs = self.cfg.probe_interval.as_secs(),
            "health monitor started"
        );
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("health monitor stopped");
                    break;
                }
                _ = ticker.tick() => {
                    self.sweep().await;
                }
            }
        }
    }

    /// One full sweep: probe every node concurrently, then evict nodes
    /// unreachable past the eviction window.
    pub async fn sweep(&self) {
        let nodes = self.registry.list().await;
        if nodes.is_empty() {
            return;
        }
        join_all(nodes.into_iter().map(|node| self.probe(node))).await;
        self.evict_stale().await;
    }

    async fn probe(&self, node: Node) {
        let result =
            tokio::time::timeout(self.cfg.probe_timeout, self.worker.health(&node.addr, self.cfg.probe_timeout))
                .await;

        match result {
            Ok(Ok(health)) if health.ok => {
                debug!(node = %node.id, load_pct = health.load_pct, "probe ok");
                self.registry
                    .update_health(&node.id, health.load_pct, NodeStatus::Running, Utc::now())
                    .await;
            }
            Ok(Ok(_)) => {
                warn!(node = %node.id, "worker reported unhealthy");
                self.registry.mark_unreachable(&node.id).await;
            }
            Ok(Err(err)) => {
                warn!(node = %node.id, %err, "probe failed");
                self.registry.mark_unreachable(&node.id).await;
            }
            Err(_) => {
                warn!(
                    node = %node.id,
                    timeout_secs = self.cfg.probe_timeout.as_secs(),
                    "probe timed out"
                );
                self.registry.mark_unreachable(&node.id).await;
            }
        }
    }

    async fn evict_stale(&self) {
        let Ok(evict_window) = chrono::Duration::from_std(self.cfg.evict_window) else {
            return;
        };
        let now = Utc::now();
        for node in self.registry.list().await {
            if node.status != NodeStatus::Unreachable {
                continue;
            }
            let Some(last_seen) = node.last_seen else {
                // never successfully probed; the provider still owns it
                continue;
            };
            if now - last_seen > evict_window {
                warn!(
                    node = %node.id,
                    last_seen = %last_seen,
                    "evicting persistently unreachable node"
                );
                self.registry.remove(&node.id).await;
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
