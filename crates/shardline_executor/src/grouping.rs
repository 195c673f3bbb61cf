//! Grouping stage: turn route units into connection-scoped execution groups.
//!
//! Route units are bucketed by target in first-appearance order. While the
//! number of distinct targets fits under `max_connections_per_query`, every
//! target gets its own connection and group. Above the cap, targets are
//! packed onto shared connections with balanced contiguous chunking:
//! `n` targets over `k` connections yields `k` chunks, the first `n % k`
//! of which hold one extra target. A group holding more than one target is
//! `MemoryStrict`.

use std::collections::HashMap;

use shardline_common::error::{ConnectionError, ShardlineResult, StatementError};

use crate::backend::ConnectionHandle;
use crate::connection_mode::ConnectionMode;
use crate::route::RouteUnit;
use crate::unit::{ExecutionGroup, ExecutionUnit, PositionedUnit};

/// Collaborators consumed while building groups.
pub trait PrepareCallback {
    fn get_connection(&self, target: &str) -> Result<ConnectionHandle, ConnectionError>;

    /// Connection for a group packing several targets. Defaults to the
    /// lead (first) target's connection.
    fn get_shared_connection(&self, targets: &[&str]) -> Result<ConnectionHandle, ConnectionError> {
        match targets.first() {
            Some(lead) => self.get_connection(lead),
            None => Err(ConnectionError::UnknownTarget(String::new())),
        }
    }

    fn create_execution_unit(
        &self,
        connection: &ConnectionHandle,
        route_unit: &RouteUnit,
        mode: ConnectionMode,
    ) -> Result<ExecutionUnit, StatementError>;
}

/// Builds execution groups under a per-statement connection cap.
#[derive(Debug, Clone, Copy)]
pub struct GroupingEngine {
    max_connections_per_query: usize,
}

impl GroupingEngine {
    /// A cap of 0 is treated as 1.
    pub fn new(max_connections_per_query: usize) -> Self {
        Self {
            max_connections_per_query: max_connections_per_query.max(1),
        }
    }

    pub fn max_connections_per_query(&self) -> usize {
        self.max_connections_per_query
    }

    /// Build groups for `route_units`. Any collaborator failure aborts
    /// before a single unit runs; groups built so far are dropped, which
    /// hands their connections back to the provider.
    pub fn group<C: PrepareCallback + ?Sized>(
        &self,
        route_units: &[RouteUnit],
        callback: &C,
    ) -> ShardlineResult<Vec<ExecutionGroup>> {
        if route_units.is_empty() {
            return Ok(Vec::new());
        }

        let buckets = bucket_by_target(route_units);
        let chunks = pack_targets(buckets.len(), self.max_connections_per_query);
        let mut groups = Vec::with_capacity(chunks.len());

        for (group_index, chunk) in chunks.into_iter().enumerate() {
            let members = &buckets[chunk];
            let targets: Vec<&str> = members.iter().map(|(t, _)| *t).collect();
            let mode = ConnectionMode::for_group(targets.len());

            let connection = if targets.len() == 1 {
                callback.get_connection(targets[0])
            } else {
                callback.get_shared_connection(&targets)
            };
            let connection = match connection {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(
                        group_index,
                        targets = ?targets,
                        released_groups = groups.len(),
                        "grouping aborted: connection acquisition failed: {}",
                        e
                    );
                    return Err(e.into());
                }
            };

            let mut units = Vec::with_capacity(members.iter().map(|(_, p)| p.len()).sum());
            for (_, positions) in members {
                for &position in positions {
                    let unit = callback
                        .create_execution_unit(&connection, &route_units[position], mode)
                        .map_err(|e| {
                            tracing::warn!(
                                group_index,
                                unit_index = position,
                                target = route_units[position].target(),
                                "grouping aborted: statement creation failed: {}",
                                e
                            );
                            e
                        })?;
                    units.push(PositionedUnit { position, unit });
                }
            }

            tracing::debug!(
                group_index,
                targets = ?targets,
                units = units.len(),
                mode = %mode,
                "execution group built"
            );
            groups.push(ExecutionGroup {
                index: group_index,
                connection,
                mode,
                targets: targets.iter().map(|t| t.to_string()).collect(),
                units,
            });
        }

        Ok(groups)
    }
}

/// Bucket route unit positions by target, preserving first appearance.
fn bucket_by_target(route_units: &[RouteUnit]) -> Vec<(&str, Vec<usize>)> {
    let mut slots: HashMap<&str, usize> = HashMap::new();
    let mut buckets: Vec<(&str, Vec<usize>)> = Vec::new();
    for (position, ru) in route_units.iter().enumerate() {
        let target = ru.target();
        match slots.get(target) {
            Some(&slot) => buckets[slot].1.push(position),
            None => {
                slots.insert(target, buckets.len());
                buckets.push((target, vec![position]));
            }
        }
    }
    buckets
}

/// Split `targets` bucket indices into at most `cap` contiguous ranges
/// whose sizes differ by at most one.
fn pack_targets(targets: usize, cap: usize) -> Vec<std::ops::Range<usize>> {
    if targets <= cap {
        return (0..targets).map(|i| i..i + 1).collect();
    }
    let base = targets / cap;
    let extra = targets % cap;
    let mut ranges = Vec::with_capacity(cap);
    let mut start = 0;
    for i in 0..cap {
        let len = base + usize::from(i < extra);
        ranges.push(start..start + len);
        start += len;
    }
    ranges
}
