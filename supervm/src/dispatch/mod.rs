/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Partition dispatch: reserve, fan out, collect.
//!
//! For every partition the dispatcher takes an advisory load reservation
//! on the target node, runs the worker call under the task deadline, and
//! releases the reservation when the call settles.  The release sits on
//! the caller side of the timeout wrapper, so it runs on success, worker
//! failure, transport failure, and deadline expiry alike; every
//! reservation is paired with exactly one release.
//!
//! Fan-out is structured: all partition futures are siblings awaited by
//! one `join_all`, so `dispatch` returns only when every partition has
//! settled, in partition order.  A reservation refusal fails that
//! partition fast with `NoCapacity` and is never retried within the task.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tracing::{debug, warn};

use crate::error::FailureReason;
use crate::registry::NodeRegistry;
use crate::task::{Partition, PartitionOutcome};
use crate::worker::{ExecuteRequest, WorkerCallError, WorkerClient};

/// Fans sub-tasks out to workers with paired reserve/release bookkeeping.
pub struct Dispatcher {
    registry: Arc<NodeRegistry>,
    worker: Arc<dyn WorkerClient>,
    reserve_delta_pct: f64,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<NodeRegistry>,
        worker: Arc<dyn WorkerClient>,
        reserve_delta_pct: f64,
    ) -> Self {
        Self {
            registry,
            worker,
            reserve_delta_pct,
        }
    }

    /// Dispatch every partition concurrently and return the settled
    /// outcomes in partition order.
    pub async fn dispatch(
        &self,
        task_id: &str,
        deadline: Duration,
        partitions: Vec<Partition>,
    ) -> Vec<PartitionOutcome> {
        let futures = partitions
            .into_iter()
            .map(|p| self.dispatch_one(task_id, deadline, p));
        join_all(futures).await
    }

    async fn dispatch_one(
        &self,
        task_id: &str,
        deadline: Duration,
        partition: Partition,
    ) -> PartitionOutcome {
        let order_key = partition.order_key();
        let node_id = partition.node_id.clone();

        if let Err(refusal) = self
            .registry
            .try_reserve(&node_id, self.reserve_delta_pct)
            .await
        {
            warn!(
                task = %task_id,
                partition = partition.index,
                node = %node_id,
                %refusal,
                "reservation refused"
            );
            return PartitionOutcome {
                partition_index: partition.index,
                order_key,
                node_id,
                elapsed_ms: 0,
                result: Err(FailureReason::NoCapacity(refusal)),
            };
        }

        let request = ExecuteRequest {
            task_id: task_id.to_string(),
            partition_id: partition.index,
            spec: partition.spec,
        };

        let started = Instant::now();
        let call = self
            .worker
            .execute(&partition.node_addr, &request, deadline);
        let settled = tokio::time::timeout(deadline, call).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        // Paired release: runs after the call settles or the deadline
        // cancels it.
        self.registry
            .release(&node_id, self.reserve_delta_pct)
            .await;

        let result = match settled {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(WorkerCallError::Timeout)) | Err(_) => Err(FailureReason::Timeout),
            Ok(Err(WorkerCallError::Transport(msg))) => Err(FailureReason::Transport(msg)),
            Ok(Err(WorkerCallError::Worker(msg))) => Err(FailureReason::Worker(msg)),
        };

        match &result {
            Ok(_) => debug!(
                task = %task_id,
                partition = partition.index,
                node = %node_id,
                elapsed_ms,
                "partition completed"
            ),
            Err(reason) => warn!(
                task = %task_id,
                partition = partition.index,
                node = %node_id,
                elapsed_ms,
                reason = reason.kind(),
                "partition failed"
            ),
        }

        PartitionOutcome {
            partition_index: partition.index,
            order_key,
            node_id,
            elapsed_ms,
            result,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::ComputeOp;
    use crate::node::{NodeCapacity, NodeDescriptor, NodeStatus};
    use crate::task::{SubTaskSpec, WorkerOutput};
    use crate::worker::WorkerHealth;
    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::json;
    use std::collections::HashMap;

    // ── Fake worker ───────────────────────────────────────────────────────────

    /// Scripted worker: per-address behaviour, defaulting to success.
    #[derive(Default)]
    struct ScriptedWorker {
        failures: HashMap<String, WorkerCallError>,
        delay: Option<Duration>,
    }

    impl ScriptedWorker {
        fn failing(addr: &str, err: WorkerCallError) -> Self {
            let mut failures = HashMap::new();
            failures.insert(addr.to_string(), err);
            Self {
                failures,
                delay: None,
            }
        }
    }

    #[async_trait]
    impl WorkerClient for ScriptedWorker {
        async fn execute(
            &self,
            addr: &str,
            request: &ExecuteRequest,
            _deadline: Duration,
        ) -> Result<WorkerOutput, WorkerCallError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(err) = self.failures.get(addr) {
                return Err(err.clone());
            }
            match &request.spec {
                SubTaskSpec::Compute {
                    data, operation, ..
                } => Ok(WorkerOutput::Compute {
                    processed_data: crate::compute::apply(operation, data),
                }),
                _ => Ok(WorkerOutput::Raw {
                    content_type: "text/plain".into(),
                    data: "b2s=".into(),
                }),
            }
        }

        async fn health(
            &self,
            _addr: &str,
            _timeout: Duration,
        ) -> Result<WorkerHealth, WorkerCallError> {
            Ok(WorkerHealth {
                ok: true,
                load_pct: 0.0,
            })
        }
    }

    // ── Helpers ───────────────────────────────────────────────────────────────

    async fn registry_with(nodes: &[(&str, f64)]) -> Arc<NodeRegistry> {
        let reg = Arc::new(NodeRegistry::new(90.0));
        for (id, load) in nodes {
            reg.upsert(NodeDescriptor {
                id: (*id).into(),
                label: (*id).into(),
                addr: format!("http://{id}:7071"),
                capacity: NodeCapacity {
                    cpu_cores: 4,
                    memory_mb: 4096,
                    gpu_count: 0,
                },
                confirmed: true,
            })
            .await;
            reg.update_health(id, *load, NodeStatus::Running, Utc::now())
                .await;
        }
        reg
    }

    fn compute_partition(index: usize, node: &str, data: Vec<i64>) -> Partition {
        Partition {
            index,
            node_id: node.into(),
            node_addr: format!("http://{node}:7071"),
            spec: SubTaskSpec::Compute {
                chunk_index: index,
                data: data.into_iter().map(|v| json!(v)).collect(),
                operation: ComputeOp::Sort,
            },
        }
    }

    const DEADLINE: Duration = Duration::from_secs(5);

    // ── Happy path ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn successful_dispatch_returns_output_and_restores_load() {
        let registry = registry_with(&[("a", 10.0)]).await;
        let dispatcher = Dispatcher::new(registry.clone(), Arc::new(ScriptedWorker::default()), 20.0);

        let outcomes = dispatcher
            .dispatch("t1", DEADLINE, vec![compute_partition(0, "a", vec![3, 1, 2])])
            .await;

        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].is_ok());
        match outcomes[0].result.as_ref().unwrap() {
            WorkerOutput::Compute { processed_data } => {
                assert_eq!(processed_data, &vec![json!(1), json!(2), json!(3)]);
            }
            other => panic!("expected compute output, got {other:?}"),
        }
        // net load delta is zero after the paired release
        assert_eq!(registry.get("a").await.unwrap().load_pct, 10.0);
    }

    #[tokio::test]
    async fn outcomes_preserve_partition_order() {
        let registry = registry_with(&[("a", 0.0), ("b", 0.0), ("c", 0.0)]).await;
        let dispatcher = Dispatcher::new(registry, Arc::new(ScriptedWorker::default()), 10.0);

        let partitions = vec![
            compute_partition(0, "c", vec![1]),
            compute_partition(1, "a", vec![2]),
            compute_partition(2, "b", vec![3]),
        ];
        let outcomes = dispatcher.dispatch("t1", DEADLINE, partitions).await;
        let indices: Vec<_> = outcomes.iter().map(|o| o.partition_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    // ── Failure paths ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn transport_failure_does_not_abort_siblings() {
        let registry = registry_with(&[("a", 0.0), ("b", 0.0)]).await;
        let worker = ScriptedWorker::failing(
            "http://b:7071",
            WorkerCallError::Transport("connection refused".into()),
        );
        let dispatcher = Dispatcher::new(registry.clone(), Arc::new(worker), 20.0);

        let outcomes = dispatcher
            .dispatch(
                "t1",
                DEADLINE,
                vec![
                    compute_partition(0, "a", vec![2, 1]),
                    compute_partition(1, "b", vec![4, 3]),
                ],
            )
            .await;

        assert!(outcomes[0].is_ok(), "sibling must complete");
        assert!(matches!(
            outcomes[1].result,
            Err(FailureReason::Transport(_))
        ));
        // both reservations released regardless of outcome
        assert_eq!(registry.get("a").await.unwrap().load_pct, 0.0);
        assert_eq!(registry.get("b").await.unwrap().load_pct, 0.0);
    }

    #[tokio::test]
    async fn reservation_refusal_fails_fast_without_worker_call() {
        let registry = registry_with(&[("a", 85.0)]).await;
        let dispatcher = Dispatcher::new(registry.clone(), Arc::new(ScriptedWorker::default()), 20.0);

        let outcomes = dispatcher
            .dispatch("t1", DEADLINE, vec![compute_partition(0, "a", vec![1])])
            .await;

        match &outcomes[0].result {
            Err(FailureReason::NoCapacity(refusal)) => {
                assert!(matches!(
                    refusal,
                    crate::error::ReserveRefusal::Overloaded { .. }
                ));
            }
            other => panic!("expected NoCapacity, got {other:?}"),
        }
        assert_eq!(outcomes[0].elapsed_ms, 0);
        assert_eq!(registry.get("a").await.unwrap().load_pct, 85.0);
    }

    #[tokio::test]
    async fn worker_reported_failure_maps_to_worker_error() {
        let registry = registry_with(&[("a", 0.0)]).await;
        let worker =
            ScriptedWorker::failing("http://a:7071", WorkerCallError::Worker("bad scene".into()));
        let dispatcher = Dispatcher::new(registry.clone(), Arc::new(worker), 20.0);

        let outcomes = dispatcher
            .dispatch("t1", DEADLINE, vec![compute_partition(0, "a", vec![1])])
            .await;
        assert!(matches!(outcomes[0].result, Err(FailureReason::Worker(_))));
        assert_eq!(registry.get("a").await.unwrap().load_pct, 0.0);
    }

    #[tokio::test]
    async fn slow_worker_times_out_and_releases() {
        let registry = registry_with(&[("a", 0.0)]).await;
        let worker = ScriptedWorker {
            failures: HashMap::new(),
            delay: Some(Duration::from_secs(60)),
        };
        let dispatcher = Dispatcher::new(registry.clone(), Arc::new(worker), 20.0);

        let outcomes = dispatcher
            .dispatch(
                "t1",
                Duration::from_millis(50),
                vec![compute_partition(0, "a", vec![1])],
            )
            .await;
        assert!(matches!(outcomes[0].result, Err(FailureReason::Timeout)));
        assert_eq!(
            registry.get("a").await.unwrap().load_pct,
            0.0,
            "timed-out partition must still release its reservation"
        );
    }

    #[tokio::test]
    async fn concurrent_partitions_share_a_node_up_to_the_ceiling() {
        // Four 20% slices fit under 90%; the fifth is refused.  The worker
        // delay keeps every sibling's reservation held at the same time.
        let registry = registry_with(&[("a", 0.0)]).await;
        let worker = ScriptedWorker {
            failures: HashMap::new(),
            delay: Some(Duration::from_millis(20)),
        };
        let dispatcher = Dispatcher::new(registry.clone(), Arc::new(worker), 20.0);

        let partitions: Vec<_> = (0..5)
            .map(|i| compute_partition(i, "a", vec![i as i64]))
            .collect();
        let outcomes = dispatcher.dispatch("t1", DEADLINE, partitions).await;

        let refused = outcomes
            .iter()
            .filter(|o| matches!(o.result, Err(FailureReason::NoCapacity(_))))
            .count();
        assert_eq!(refused, 1, "exactly one partition should be refused");
        assert_eq!(registry.get("a").await.unwrap().load_pct, 0.0);
    }
}
