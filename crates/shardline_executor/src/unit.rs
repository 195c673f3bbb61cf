use crate::backend::{ConnectionHandle, StatementHandle};
use crate::connection_mode::ConnectionMode;
use crate::route::RouteUnit;

/// A route unit bound to a prepared statement and its connection mode.
/// `connection` is the group connection the statement was prepared on.
pub struct ExecutionUnit {
    pub route_unit: RouteUnit,
    pub connection: ConnectionHandle,
    pub statement: StatementHandle,
    pub mode: ConnectionMode,
}

impl ExecutionUnit {
    pub fn new(
        route_unit: RouteUnit,
        connection: ConnectionHandle,
        statement: StatementHandle,
        mode: ConnectionMode,
    ) -> Self {
        Self {
            route_unit,
            connection,
            statement,
            mode,
        }
    }

    pub fn target(&self) -> &str {
        self.route_unit.target()
    }
}

impl std::fmt::Debug for ExecutionUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionUnit")
            .field("route_unit", &self.route_unit)
            .field("connection", &self.connection.target())
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

/// An execution unit tagged with its position in the original route order.
#[derive(Debug)]
pub struct PositionedUnit {
    pub position: usize,
    pub unit: ExecutionUnit,
}

/// Units sharing one physical connection. Units run in order, one at a time;
/// different groups run concurrently.
pub struct ExecutionGroup {
    pub index: usize,
    pub connection: ConnectionHandle,
    pub mode: ConnectionMode,
    /// Distinct targets served by this group, in route order.
    pub targets: Vec<String>,
    pub units: Vec<PositionedUnit>,
}

impl ExecutionGroup {
    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// True when units of more than one target share this connection.
    pub fn is_packed(&self) -> bool {
        self.targets.len() > 1
    }
}

impl std::fmt::Debug for ExecutionGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionGroup")
            .field("index", &self.index)
            .field("connection", &self.connection.target())
            .field("mode", &self.mode)
            .field("targets", &self.targets)
            .field("units", &self.units)
            .finish()
    }
}
