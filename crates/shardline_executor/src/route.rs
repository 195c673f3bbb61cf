//! Route units: the (target, statement) pairs handed over by the router.

use std::fmt;

use shardline_common::datum::Datum;

/// Statement category of the logical SQL, used for events and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlType {
    Dql,
    Dml,
    Ddl,
    Dcl,
    Dal,
    Tcl,
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlType::Dql => write!(f, "DQL"),
            SqlType::Dml => write!(f, "DML"),
            SqlType::Ddl => write!(f, "DDL"),
            SqlType::Dcl => write!(f, "DCL"),
            SqlType::Dal => write!(f, "DAL"),
            SqlType::Tcl => write!(f, "TCL"),
        }
    }
}

/// Rewritten SQL text plus its positional parameters for one target.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlUnit {
    pub sql: String,
    pub parameters: Vec<Datum>,
}

impl SqlUnit {
    pub fn new(sql: impl Into<String>, parameters: Vec<Datum>) -> Self {
        Self {
            sql: sql.into(),
            parameters,
        }
    }
}

/// Immutable output of routing: which physical target runs which statement.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteUnit {
    pub target: String,
    pub sql_unit: SqlUnit,
}

impl RouteUnit {
    pub fn new(target: impl Into<String>, sql_unit: SqlUnit) -> Self {
        Self {
            target: target.into(),
            sql_unit,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn sql(&self) -> &str {
        &self.sql_unit.sql
    }
}
