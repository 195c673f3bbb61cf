//! Connection mode classification.
//!
//! A unit whose group owns its connection outright may keep a live cursor
//! open and stream rows to the caller later. A unit sharing its connection
//! with units of other targets must drain its rows before the next unit in
//! the group runs.

use std::fmt;

/// Result consumption policy for one execution unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionMode {
    /// Dedicated connection; results may stream lazily.
    PerConnectionStrict,
    /// Shared connection; results are fully buffered immediately.
    MemoryStrict,
}

impl ConnectionMode {
    /// Classify a group by how many distinct targets it packs onto one
    /// connection.
    pub fn for_group(targets_in_group: usize) -> Self {
        if targets_in_group <= 1 {
            ConnectionMode::PerConnectionStrict
        } else {
            ConnectionMode::MemoryStrict
        }
    }

    pub fn is_streaming(self) -> bool {
        matches!(self, ConnectionMode::PerConnectionStrict)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionMode::PerConnectionStrict => "per_connection_strict",
            ConnectionMode::MemoryStrict => "memory_strict",
        }
    }
}

impl fmt::Display for ConnectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
