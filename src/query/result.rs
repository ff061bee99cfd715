use crate::partition::{PartitionKey, PartitionUri};
use duckdb::arrow::array::RecordBatch;
use duckdb::arrow::datatypes::{DataType, SchemaRef};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Rows produced by one successful execution
#[derive(Debug, Clone, PartialEq)]
pub struct ResultTable {
    pub schema: SchemaRef,
    pub batches: Vec<RecordBatch>,
    pub row_count: usize,
    /// Partitions the engine actually scanned, in order
    pub partitions_read: Vec<PartitionKey>,
    /// SQL text that produced the rows
    pub sql: String,
}

impl ResultTable {
    pub fn new(
        schema: SchemaRef,
        batches: Vec<RecordBatch>,
        partitions_read: Vec<PartitionKey>,
        sql: String,
    ) -> Self {
        let row_count = batches.iter().map(RecordBatch::num_rows).sum();
        Self { schema, batches, row_count, partitions_read, sql }
    }

    /// Ordered column names and types
    pub fn columns(&self) -> Vec<(String, DataType)> {
        self.schema
            .fields()
            .iter()
            .map(|f| (f.name().clone(), f.data_type().clone()))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }
}

/// Why a partition did not contribute to a result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// The location template could not be rendered for the partition
    Unrenderable(String),
    /// The engine could not read the partition
    Unreachable(String),
    /// Older than the configured lookback window
    OutsideWindow,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::Unrenderable(reason) => write!(f, "no location: {reason}"),
            DropReason::Unreachable(reason) => write!(f, "unreachable: {reason}"),
            DropReason::OutsideWindow => f.write_str("outside the lookback window"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedPartition {
    pub key: PartitionKey,
    pub uri: Option<PartitionUri>,
    pub reason: DropReason,
}

impl fmt::Display for DroppedPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.uri {
            Some(uri) => write!(f, "{} ({uri}): {}", self.key, self.reason),
            None => write!(f, "{}: {}", self.key, self.reason),
        }
    }
}

/// Why an execution produced no rows at all
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureCause {
    /// The engine refused the statement; retrying cannot help
    #[error("query rejected by engine: {message}")]
    Rejected { message: String },

    #[error("none of the {} partitions in scope could be read", .dropped.len())]
    NoReachablePartitions { dropped: Vec<DroppedPartition> },

    #[error("deadline of {timeout:?} exceeded")]
    DeadlineExceeded { timeout: Duration },

    /// A scan error that could not be attributed to individual partitions,
    /// or that persisted after excluding the unreachable ones
    #[error("scan failed: {message}")]
    ScanFailed { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("operation '{operation}' failed: {cause}")]
pub struct ExecutionFailure {
    pub operation: String,
    pub cause: FailureCause,
}

/// Outcome of executing one query
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    /// Every partition in scope contributed
    Complete(ResultTable),
    /// Some partitions were excluded; the table covers the rest
    Partial {
        table: ResultTable,
        dropped: Vec<DroppedPartition>,
    },
    Failed(ExecutionFailure),
}

impl QueryResult {
    pub fn table(&self) -> Option<&ResultTable> {
        match self {
            QueryResult::Complete(table) | QueryResult::Partial { table, .. } => Some(table),
            QueryResult::Failed(_) => None,
        }
    }

    pub fn dropped(&self) -> &[DroppedPartition] {
        match self {
            QueryResult::Partial { dropped, .. } => dropped,
            QueryResult::Failed(ExecutionFailure {
                cause: FailureCause::NoReachablePartitions { dropped },
                ..
            }) => dropped,
            _ => &[],
        }
    }

    pub fn failure(&self) -> Option<&ExecutionFailure> {
        match self {
            QueryResult::Failed(failure) => Some(failure),
            _ => None,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, QueryResult::Complete(_))
    }

    pub fn is_partial(&self) -> bool {
        matches!(self, QueryResult::Partial { .. })
    }

    /// Whether the outcome is stable enough to serve again.
    ///
    /// Unreachable partitions, deadlines and scan errors may clear up on
    /// the next attempt and are never cached.
    pub fn is_cacheable(&self) -> bool {
        match self {
            QueryResult::Complete(_) | QueryResult::Partial { .. } => true,
            QueryResult::Failed(failure) => matches!(failure.cause, FailureCause::Rejected { .. }),
        }
    }

    /// Record partitions that were excluded before execution, e.g. because
    /// no location could be rendered. A complete result becomes partial.
    pub fn with_unavailable(self, unavailable: Vec<DroppedPartition>) -> Self {
        if unavailable.is_empty() {
            return self;
        }
        match self {
            QueryResult::Complete(table) => QueryResult::Partial { table, dropped: unavailable },
            QueryResult::Partial { table, mut dropped } => {
                dropped.extend(unavailable);
                dropped.sort_by_key(|d| d.key);
                QueryResult::Partial { table, dropped }
            }
            QueryResult::Failed(mut failure) => {
                if let FailureCause::NoReachablePartitions { dropped } = &mut failure.cause {
                    dropped.extend(unavailable);
                    dropped.sort_by_key(|d| d.key);
                }
                QueryResult::Failed(failure)
            }
        }
    }
}
