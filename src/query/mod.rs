//! Query construction and execution.
//!
//! - `operation`: the closed set of named aggregate operations
//! - `params`: parameter schemas, parsing and validation
//! - `builder`: renders an operation over a scope into SQL
//! - `executor`: runs built queries with partial-availability handling
//! - `result`: tagged execution outcomes

pub mod builder;
pub mod executor;
pub mod operation;
pub mod params;
pub mod result;

pub use builder::{BuiltQuery, QueryBuilder, ScanTarget};
pub use executor::{ExecutorConfig, QueryExecutor};
pub use operation::Operation;
pub use params::{ParamKind, ParamSpec, ParamValue, Params};
pub use result::{DropReason, DroppedPartition, ExecutionFailure, FailureCause, QueryResult, ResultTable};
