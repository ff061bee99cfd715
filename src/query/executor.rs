use super::builder::{BuiltQuery, ScanTarget};
use super::result::{DropReason, DroppedPartition, ExecutionFailure, FailureCause, QueryResult, ResultTable};
use crate::config::EngineSettings;
use crate::storage::{EngineError, EngineOutput, ScanEngine};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

/// Configuration for the executor
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Deadline for one execution, partition retry included
    pub timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
        }
    }
}

impl From<&EngineSettings> for ExecutorConfig {
    fn from(settings: &EngineSettings) -> Self {
        Self { timeout: settings.timeout() }
    }
}

/// Runs built queries on a scan engine, degrading to a partial result when
/// some partitions cannot be read.
#[derive(Clone)]
pub struct QueryExecutor {
    engine: Arc<dyn ScanEngine>,
    config: ExecutorConfig,
}

impl QueryExecutor {
    pub fn new(engine: Arc<dyn ScanEngine>, config: ExecutorConfig) -> Self {
        debug!(timeout = ?config.timeout, "Creating query executor");
        Self { engine, config }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Execute `query` within the configured deadline.
    ///
    /// On a scan failure every target is probed; unreachable ones are
    /// excluded and the query is retried once over the rest.
    #[instrument(skip(self, query), fields(operation = %query.operation(), partitions = query.targets().len()))]
    pub async fn execute(&self, query: &BuiltQuery) -> QueryResult {
        let timeout = self.config.timeout;
        match tokio::time::timeout(timeout, self.execute_inner(query)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout = ?timeout, "Query deadline exceeded");
                failed(query, FailureCause::DeadlineExceeded { timeout })
            }
        }
    }

    async fn execute_inner(&self, query: &BuiltQuery) -> QueryResult {
        let message = match self.engine.query(query.sql()).await {
            Ok(output) => {
                let table = table_from(output, query);
                info!(rows = table.row_count, "Query execution completed");
                return QueryResult::Complete(table);
            }
            Err(EngineError::Scan(message)) => message,
            Err(EngineError::Rejected(message)) => {
                warn!(error = %message, "Query rejected by engine");
                return failed(query, FailureCause::Rejected { message });
            }
            Err(e @ (EngineError::Unavailable(_) | EngineError::Internal(_))) => {
                return failed(query, FailureCause::ScanFailed { message: e.to_string() });
            }
        };

        debug!(error = %message, "Scan failed, probing partitions");
        let dropped = self.probe_targets(query.targets()).await;

        if dropped.is_empty() {
            warn!(error = %message, "Scan failed but every partition is reachable");
            return failed(query, FailureCause::ScanFailed { message });
        }

        let retry = query.restricted_to(|t| !dropped.iter().any(|d| d.key == t.key));
        let Some(retry) = retry else {
            warn!(dropped = dropped.len(), "No partition in scope is reachable");
            return failed(query, FailureCause::NoReachablePartitions { dropped });
        };

        info!(
            dropped = dropped.len(),
            remaining = retry.targets().len(),
            "Retrying without unreachable partitions"
        );
        match self.engine.query(retry.sql()).await {
            Ok(output) => QueryResult::Partial {
                table: table_from(output, &retry),
                dropped,
            },
            Err(e) => {
                // A rejection here can stem from the excluded files (a column
                // only they carry), so it is not definitive.
                warn!(error = %e, "Retry over remaining partitions failed");
                failed(query, FailureCause::ScanFailed { message: e.to_string() })
            }
        }
    }

    /// Probe every target concurrently and return the unreachable ones in
    /// partition order
    async fn probe_targets(&self, targets: &[ScanTarget]) -> Vec<DroppedPartition> {
        let mut probes = JoinSet::new();
        for target in targets {
            let engine = Arc::clone(&self.engine);
            let target = target.clone();
            probes.spawn(async move {
                let outcome = engine.probe(&target.uri).await;
                (target, outcome)
            });
        }

        let mut dropped = Vec::new();
        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((target, Err(e))) => {
                    debug!(partition = %target.key, error = %e, "Partition unreachable");
                    dropped.push(DroppedPartition {
                        key: target.key,
                        uri: Some(target.uri),
                        reason: DropReason::Unreachable(e.to_string()),
                    });
                }
                Err(e) => warn!(error = %e, "Partition probe task failed"),
            }
        }
        dropped.sort_by_key(|d| d.key);
        dropped
    }
}

fn table_from(output: EngineOutput, query: &BuiltQuery) -> ResultTable {
    ResultTable::new(
        output.schema,
        output.batches,
        query.targets().iter().map(|t| t.key).collect(),
        query.sql().to_owned(),
    )
}

fn failed(query: &BuiltQuery, cause: FailureCause) -> QueryResult {
    QueryResult::Failed(ExecutionFailure {
        operation: query.operation().id().to_owned(),
        cause,
    })
}
