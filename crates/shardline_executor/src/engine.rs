//! Execution stage: run groups concurrently, units within a group in order.
//!
//! One pool job per group. Each job reports every unit outcome over a
//! channel tagged with the unit's route position; the calling thread
//! collects them into a position-indexed vector, so output order never
//! depends on which group finishes first.
//!
//! Failure policy comes from the call's `ExecutionContext`:
//! - `rethrow_immediately = true`: the first failure received is returned
//!   at once. A shared abort flag makes units that have not started yet
//!   skip their backend call; calls already running are left to finish and
//!   their outcomes are discarded.
//! - `rethrow_immediately = false`: every unit runs. The lowest-positioned
//!   failure is returned wrapped in `ExecutionError::Aggregate`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;

use shardline_common::config::ExecutorConfig;
use shardline_common::context::ExecutionContext;
use shardline_common::error::{ExecutionError, ShardlineError, ShardlineResult};

use crate::callback::UnitCallback;
use crate::pool::{PoolStats, WorkerPool};
use crate::unit::ExecutionGroup;

enum UnitReport<T> {
    Done {
        position: usize,
        outcome: Result<T, ExecutionError>,
    },
    Skipped {
        position: usize,
    },
}

/// Shared execution engine; one per process or per sharding data source.
pub struct ExecuteEngine {
    pool: WorkerPool,
}

impl ExecuteEngine {
    pub fn new(threads: usize) -> ShardlineResult<Self> {
        Ok(Self {
            pool: WorkerPool::new(threads)?,
        })
    }

    /// Pool sized to `executor_threads`, but never below the connection
    /// cap, so every group of one statement can run at the same time.
    pub fn from_config(config: &ExecutorConfig) -> ShardlineResult<Self> {
        Self::new(
            config
                .effective_threads()
                .max(config.max_connections_per_query),
        )
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Run `groups` with `callback`. The result has one slot per unit in
    /// route order; a slot is `None` only for units that were skipped.
    pub fn execute_groups<C: UnitCallback>(
        &self,
        groups: Vec<ExecutionGroup>,
        callback: Arc<C>,
        ctx: Arc<ExecutionContext>,
    ) -> ShardlineResult<Vec<Option<C::Output>>> {
        let total: usize = groups.iter().map(ExecutionGroup::len).sum();
        if total == 0 {
            return Ok(Vec::new());
        }

        let (tx, rx) = mpsc::channel::<UnitReport<C::Output>>();
        let abort = Arc::new(AtomicBool::new(false));
        let group_count = groups.len();

        for group in groups {
            let tx = tx.clone();
            let callback = Arc::clone(&callback);
            let ctx = Arc::clone(&ctx);
            let abort = Arc::clone(&abort);
            self.pool
                .submit(move || run_group(group, callback.as_ref(), &ctx, &abort, &tx))?;
        }
        // Only jobs hold senders now; a job that dies early disconnects.
        drop(tx);

        tracing::debug!(
            query_id = ctx.query_id,
            groups = group_count,
            units = total,
            rethrow_immediately = ctx.rethrow_immediately,
            "groups submitted"
        );

        let mut slots: Vec<Option<C::Output>> = (0..total).map(|_| None).collect();
        let mut first_failure: Option<(usize, ExecutionError)> = None;
        let mut failed = 0usize;
        let mut received = 0usize;

        while received < total {
            let report = match rx.recv() {
                Ok(r) => r,
                Err(_) => {
                    return Err(ShardlineError::internal_bug(
                        "E-EXEC-001",
                        "worker stopped before reporting every unit",
                        format!(
                            "query_id={}, received={}, expected={}",
                            ctx.query_id, received, total
                        ),
                    ))
                }
            };
            received += 1;

            match report {
                UnitReport::Done {
                    position,
                    outcome: Ok(value),
                } => match slots.get_mut(position) {
                    Some(slot) => *slot = Some(value),
                    None => {
                        return Err(ShardlineError::internal_bug(
                            "E-EXEC-002",
                            "unit position out of range",
                            format!("position={}, units={}", position, total),
                        ))
                    }
                },
                UnitReport::Done {
                    position,
                    outcome: Err(e),
                } => {
                    if ctx.rethrow_immediately {
                        tracing::debug!(
                            query_id = ctx.query_id,
                            unit_index = position,
                            outstanding = total - received,
                            "fail-fast: surfacing first failure"
                        );
                        return Err(e.into());
                    }
                    failed += 1;
                    let earlier = first_failure
                        .as_ref()
                        .map_or(true, |(first, _)| position < *first);
                    if earlier {
                        first_failure = Some((position, e));
                    }
                }
                UnitReport::Skipped { .. } => {}
            }
        }

        if let Some((_, first)) = first_failure {
            return Err(ExecutionError::Aggregate {
                first: Box::new(first),
                failed,
            }
            .into());
        }
        Ok(slots)
    }
}

fn run_group<C: UnitCallback>(
    group: ExecutionGroup,
    callback: &C,
    ctx: &ExecutionContext,
    abort: &AtomicBool,
    tx: &mpsc::Sender<UnitReport<C::Output>>,
) {
    let group_index = group.index;
    let mut units = group.units.into_iter();
    while let Some(pu) = units.next() {
        if ctx.rethrow_immediately && abort.load(Ordering::Acquire) {
            tracing::debug!(
                query_id = ctx.query_id,
                group_index,
                unit_index = pu.position,
                "skipping unit after failure"
            );
            if tx.send(UnitReport::Skipped { position: pu.position }).is_err() {
                return;
            }
            continue;
        }

        let outcome = callback.run_unit(pu.position, &pu.unit, ctx);
        let failed = outcome.is_err();
        if failed && ctx.rethrow_immediately {
            abort.store(true, Ordering::Release);
        }
        let report = UnitReport::Done {
            position: pu.position,
            outcome,
        };
        if tx.send(report).is_err() {
            // Collector already returned; nobody wants the rest.
            return;
        }
        if failed && ctx.rethrow_immediately {
            // The group's connection stays with a unit that failed; the rest
            // of the group is reported as skipped.
            for rest in units.by_ref() {
                if tx.send(UnitReport::Skipped { position: rest.position }).is_err() {
                    return;
                }
            }
        }
    }
}
