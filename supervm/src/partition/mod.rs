//! Task partitioning.
//!
//! [`partition_task`] carves one task into per-node sub-tasks.  It is a
//! pure function of `(task, ordered candidate node list)`: no clocks, no
//! registry access, no interior state.  Determinism matters because a
//! submit replayed against the same snapshot must produce the same plan.
//!
//! Per task kind:
//!
//! * **Render** - the inclusive frame range is split into
//!   `N = min(|candidates|, frames)` contiguous sub-ranges, as evenly as
//!   possible; the first `frames mod N` sub-ranges carry one extra frame.
//! * **Compute** - the input is cut into `chunk_size` chunks, assigned one
//!   chunk per node in input order until nodes or chunks run out.  Surplus
//!   chunks are returned as leftovers; the facade dispatches them in
//!   follow-up rounds when the task asks for exhaustive processing,
//!   otherwise reports them unscheduled.
//! * **Browser / FileSync** - single-node assignment: first candidate,
//!   whole payload.
//!
//! Candidate ordering (ascending load, then node id) is the caller's job
//! via [`order_candidates`]; the tie-break on id keeps plans stable when
//! loads are equal.

use serde_json::Value;

use crate::compute::ComputeOp;
use crate::node::Node;
use crate::task::{Partition, SubTaskSpec, Task, TaskPayload};

/// A numbered chunk of compute input: `(chunk_index, data)`.
pub type Chunk = (usize, Vec<Value>);

/// Output of one partitioning pass.
#[derive(Debug, Clone, Default)]
pub struct PartitionPlan {
    pub partitions: Vec<Partition>,
    /// Compute chunks that did not fit this round, in input order.
    pub leftover_chunks: Vec<Chunk>,
}

// ── Candidate ordering ────────────────────────────────────────────────────────

/// Order candidates ascending by current load, then by node id.
pub fn order_candidates(mut nodes: Vec<Node>) -> Vec<Node> {
    nodes.sort_by(|a, b| {
        a.load_pct
            .partial_cmp(&b.load_pct)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    nodes
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Carve `task` into partitions over the ordered `candidates`.
///
/// An empty candidate list yields an empty plan; the facade treats that as
/// `NoEligibleNodes` before ever calling here, so the empty return is a
/// defensive backstop, not an error path.
pub fn partition_task(task: &Task, candidates: &[Node]) -> PartitionPlan {
    if candidates.is_empty() {
        return PartitionPlan::default();
    }

    match &task.payload {
        TaskPayload::Render(spec) => {
            let total = spec.frame_count();
            if total == 0 {
                return PartitionPlan::default();
            }
            let n = candidates.len().min(total as usize);
            let base = total / n as u64;
            let extra = (total % n as u64) as usize;

            let mut partitions = Vec::with_capacity(n);
            let mut next_start = spec.frame_start;
            for (i, node) in candidates.iter().take(n).enumerate() {
                let len = base + u64::from(i < extra);
                let frame_end = next_start + len as i64 - 1;
                partitions.push(Partition {
                    index: i,
                    node_id: node.id.clone(),
                    node_addr: node.addr.clone(),
                    spec: SubTaskSpec::Render {
                        scene_file: spec.scene_file.clone(),
                        frame_start: next_start,
                        frame_end,
                        options: spec.options.clone(),
                    },
                });
                next_start = frame_end + 1;
            }
            PartitionPlan {
                partitions,
                leftover_chunks: Vec::new(),
            }
        }

        TaskPayload::Compute(spec) => {
            let chunk_size = spec.chunk_size.max(1);
            let chunks: Vec<Chunk> = spec
                .input_data
                .chunks(chunk_size)
                .enumerate()
                .map(|(i, c)| (i, c.to_vec()))
                .collect();
            let (partitions, leftover_chunks) =
                assign_chunks(&spec.operation, chunks, candidates, 0);
            PartitionPlan {
                partitions,
                leftover_chunks,
            }
        }

        TaskPayload::Browser(spec) => single_node_plan(
            candidates,
            SubTaskSpec::Browser {
                url: spec.url.clone(),
                actions: spec.actions.clone(),
                options: spec.options.clone(),
            },
        ),

        TaskPayload::FileSync(spec) => single_node_plan(
            candidates,
            SubTaskSpec::FileSync {
                operation: spec.operation.clone(),
                files: spec.files.clone(),
                options: spec.options.clone(),
            },
        ),
    }
}

/// Assign up to one chunk per candidate, in input order.
///
/// Used for the first round by [`partition_task`] and for follow-up
/// exhaustive rounds by the facade, which passes the previous round's
/// leftovers and a fresh candidate snapshot.  `index_base` keeps partition
/// indices unique across rounds.
pub fn assign_chunks(
    operation: &ComputeOp,
    mut chunks: Vec<Chunk>,
    candidates: &[Node],
    index_base: usize,
) -> (Vec<Partition>, Vec<Chunk>) {
    let take = chunks.len().min(candidates.len());
    let leftover = chunks.split_off(take);

    let partitions = chunks
        .into_iter()
        .zip(candidates)
        .enumerate()
        .map(|(i, ((chunk_index, data), node))| Partition {
            index: index_base + i,
            node_id: node.id.clone(),
            node_addr: node.addr.clone(),
            spec: SubTaskSpec::Compute {
                chunk_index,
                data,
                operation: operation.clone(),
            },
        })
        .collect();

    (partitions, leftover)
}

fn single_node_plan(candidates: &[Node], spec: SubTaskSpec) -> PartitionPlan {
    let node = &candidates[0];
    PartitionPlan {
        partitions: vec![Partition {
            index: 0,
            node_id: node.id.clone(),
            node_addr: node.addr.clone(),
            spec,
        }],
        leftover_chunks: Vec::new(),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
