//! Aggregate queries over date-partitioned OpenStreetMap changeset files.
//!
//! The dataset lives remotely as one Parquet file per calendar unit. A
//! [`QueryCore`] resolves a time scope into partition locations, renders one
//! of a closed set of operations into SQL, runs it on an embedded DuckDB that
//! reads the files in place, and caches the outcome. Missing partitions
//! degrade a result to [`QueryResult::Partial`] instead of failing it.

pub mod cache;
pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod partition;
pub mod query;
pub mod storage;
pub mod utils;

// Re-export commonly used types
pub use crate::cache::{CacheKey, CacheStats, ResultCache};
pub use crate::config::CoreConfig;
pub use crate::core::{PeriodComparison, QueryCore, QueryPlan, QueryRequest};
pub use crate::error::{Error, QueryError, Result};
pub use crate::partition::{Granularity, PartitionKey, PartitionLocator, PartitionUri, QueryScope, ScopeSpec};
pub use crate::query::{FailureCause, Operation, Params, QueryResult, ResultTable};
