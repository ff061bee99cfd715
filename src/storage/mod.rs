//! Scan engines that execute rendered SQL against partition files.
//!
//! - `duckdb`: embedded DuckDB reading local or remote Parquet directly
//!
//! Engines implement the `ScanEngine` trait so the executor can be driven by
//! a different engine in tests.

pub mod duckdb;

pub use self::duckdb::DuckDbEngine;

use crate::partition::PartitionUri;
use ::duckdb::arrow::array::RecordBatch;
use ::duckdb::arrow::datatypes::SchemaRef;
use async_trait::async_trait;
use thiserror::Error;

/// Batches returned by one statement
#[derive(Debug, Clone)]
pub struct EngineOutput {
    pub schema: SchemaRef,
    pub batches: Vec<RecordBatch>,
}

/// Engine failures, classified by whether the input files are to blame
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Reading one or more files failed (I/O, HTTP, missing object)
    #[error("scan error: {0}")]
    Scan(String),

    /// The statement itself is invalid
    #[error("rejected: {0}")]
    Rejected(String),

    /// A single probed file could not be read
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// The engine could not run the statement at all
    #[error("internal engine error: {0}")]
    Internal(String),
}

/// Engine executing read-only SQL over partition files.
#[async_trait]
pub trait ScanEngine: Send + Sync + 'static {
    /// Run `sql` to completion and collect every batch
    async fn query(&self, sql: &str) -> Result<EngineOutput, EngineError>;

    /// Check that one partition file can be opened
    async fn probe(&self, uri: &PartitionUri) -> Result<(), EngineError>;
}
