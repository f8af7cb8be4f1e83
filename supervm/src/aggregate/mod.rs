/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Result aggregation: per-partition outcomes into one task result.
//!
//! Aggregation never mutates partition outputs; it reorders and counts.
//! Ordering rules:
//!
//! * **Render** - successful frames sorted ascending by frame number.
//! * **Compute** - successful chunks concatenated by original chunk index.
//!   `sort` stays partition-level: the aggregate is sorted chunks
//!   concatenated in input order, not a global merge.
//! * **Browser / FileSync** - first successful payload wins.
//!
//! Every aggregate carries a per-node report (elapsed, ok/error) and the
//! list of failed partitions, whatever the kind.

use crate::task::{
    AggregateOutcome, FailureDetail, NodeReport, PartitionOutcome, Task, TaskKind, TaskResult,
    WorkerOutput,
};

/// Combine settled outcomes into the task's aggregate result.
///
/// `unscheduled_chunks` is non-zero only for non-exhaustive compute tasks
/// whose input outnumbered the candidate set.
pub fn aggregate(
    task: &Task,
    outcomes: &[PartitionOutcome],
    unscheduled_chunks: usize,
) -> AggregateOutcome {
    let node_reports: Vec<NodeReport> = outcomes
        .iter()
        .map(|o| NodeReport {
            node_id: o.node_id.clone(),
            elapsed_ms: o.elapsed_ms,
            ok: o.is_ok(),
            error: o.result.as_ref().err().map(|e| e.to_string()),
        })
        .collect();

    let failures: Vec<FailureDetail> = outcomes
        .iter()
        .filter_map(|o| {
            o.result.as_ref().err().map(|reason| FailureDetail {
                node_id: o.node_id.clone(),
                reason: reason.kind().to_string(),
                message: reason.to_string(),
            })
        })
        .collect();

    let mut used: Vec<&str> = outcomes
        .iter()
        .filter(|o| o.is_ok())
        .map(|o| o.node_id.as_str())
        .collect();
    used.sort_unstable();
    used.dedup();
    let nodes_used = used.len();

    let (success, result) = match task.kind {
        TaskKind::Render => {
            let mut frames: Vec<_> = outcomes
                .iter()
                .filter_map(|o| match &o.result {
                    Ok(WorkerOutput::Render { frames }) => Some(frames.clone()),
                    _ => None,
                })
                .flatten()
                .collect();
            frames.sort_by_key(|f| f.frame_number);
            let total_frames = frames.len() as u64;
            (
                total_frames > 0,
                TaskResult::Render {
                    frames,
                    total_frames,
                },
            )
        }

        TaskKind::Compute => {
            let mut chunks: Vec<(usize, Vec<serde_json::Value>)> = outcomes
                .iter()
                .filter_map(|o| match &o.result {
                    Ok(WorkerOutput::Compute { processed_data }) => {
                        Some((o.order_key, processed_data.clone()))
                    }
                    _ => None,
                })
                .collect();
            chunks.sort_by_key(|(order, _)| *order);
            let processed_data: Vec<_> = chunks.into_iter().flat_map(|(_, data)| data).collect();
            let total_processed = processed_data.len() as u64;
            (
                total_processed > 0,
                TaskResult::Compute {
                    processed_data,
                    total_processed,
                    unscheduled_chunks: unscheduled_chunks as u64,
                },
            )
        }

        TaskKind::Browser | TaskKind::FileSync => {
            let payload = outcomes
                .iter()
                .find_map(|o| o.result.as_ref().ok().cloned());
            let success = payload.is_some();
            let result = match task.kind {
                TaskKind::Browser => TaskResult::Browser { payload },
                _ => TaskResult::FileSync { payload },
            };
            (success, result)
        }
    };

    AggregateOutcome {
        success,
        result,
        failures,
        node_reports,
        nodes_used,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
