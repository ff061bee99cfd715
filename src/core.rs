//! The query core: one entry point from a named operation and a scope to a
//! result.
//!
//! Validation (operation name, parameters, scope) happens before any remote
//! read, and failures there are returned as [`QueryError`]. Everything that
//! can only be learned by scanning is reported inside [`QueryResult`].

use crate::cache::{CacheKey, ResultCache};
use crate::config::CoreConfig;
use crate::error::{QueryError, Result};
use crate::partition::{Availability, PartitionLocator, QueryScope, ScopeSpec};
use crate::query::{
    BuiltQuery, DropReason, DroppedPartition, ExecutorConfig, Operation, Params, QueryBuilder,
    QueryExecutor, QueryResult, ResultTable,
};
use duckdb::arrow::array::{Array, Int64Array};
use crate::storage::DuckDbEngine;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// A validated operation bound to a resolved scope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    pub operation: Operation,
    /// Normalized parameters
    pub params: Params,
    pub scope: QueryScope,
}

impl QueryRequest {
    /// Cache identity: only partitions that can actually be read take part,
    /// so unrenderable ones never split otherwise identical entries.
    pub fn cache_key(&self) -> CacheKey {
        CacheKey {
            operation: self.operation,
            params: self.params.clone(),
            partitions: self
                .scope
                .available()
                .map(|(key, uri)| (key, uri.clone()))
                .collect(),
            range: self.scope.range(),
        }
    }

    /// Partitions excluded before execution: no location could be rendered
    /// or they lie beyond the lookback window
    pub fn unavailable(&self) -> Vec<DroppedPartition> {
        self.scope
            .unavailable()
            .filter_map(|(key, availability)| {
                let reason = match availability {
                    Availability::Unavailable { reason } => DropReason::Unrenderable(reason.clone()),
                    Availability::OutsideWindow => DropReason::OutsideWindow,
                    Availability::Available { .. } => return None,
                };
                Some(DroppedPartition { key, uri: None, reason })
            })
            .collect()
    }
}

/// A request together with the query that would run for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPlan {
    pub request: QueryRequest,
    pub query: BuiltQuery,
}

/// Period totals beside the same period one year earlier
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodComparison {
    pub current: QueryResult,
    /// `None` when the earlier period has no partitions
    pub previous: Option<QueryResult>,
}

impl PeriodComparison {
    /// Signed change of an integer column against the earlier period, or
    /// `None` when either side has no value
    pub fn delta(&self, column: &str) -> Option<i64> {
        let current = first_int(self.current.table()?, column)?;
        let previous = first_int(self.previous.as_ref()?.table()?, column)?;
        current.checked_sub(previous)
    }
}

fn first_int(table: &ResultTable, column: &str) -> Option<i64> {
    let batch = table.batches.iter().find(|b| b.num_rows() > 0)?;
    let values = batch.column_by_name(column)?.as_any().downcast_ref::<Int64Array>()?;
    values.is_valid(0).then(|| values.value(0))
}

/// Shared entry point for running operations. `Send + Sync`; wrap in an
/// `Arc` to share between sessions.
#[derive(Clone)]
pub struct QueryCore {
    locator: PartitionLocator,
    executor: QueryExecutor,
    cache: Arc<ResultCache>,
}

impl QueryCore {
    /// Build a core backed by DuckDB. Configuration problems, including a
    /// malformed partition template, fail here.
    pub fn new(config: &CoreConfig) -> Result<Self> {
        let locator = PartitionLocator::new(&config.partitions)?;
        let engine = DuckDbEngine::open(&config.engine)?;
        let executor = QueryExecutor::new(Arc::new(engine), ExecutorConfig::from(&config.engine));
        let cache = Arc::new(ResultCache::new(&config.cache));
        info!(
            template = %locator.template(),
            granularity = %locator.granularity(),
            "Query core ready"
        );
        Ok(Self::with_parts(locator, executor, cache))
    }

    pub fn with_parts(locator: PartitionLocator, executor: QueryExecutor, cache: Arc<ResultCache>) -> Self {
        Self { locator, executor, cache }
    }

    pub fn operations(&self) -> &'static [Operation] {
        &Operation::ALL
    }

    pub fn locator(&self) -> &PartitionLocator {
        &self.locator
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    /// Resolve and build without executing
    pub fn plan(&self, operation: &str, params: &Params, scope: &ScopeSpec) -> std::result::Result<QueryPlan, QueryError> {
        let operation: Operation = operation.parse()?;
        let params = operation.validate(params)?;
        let scope = self.locator.resolve(scope)?;
        let query = QueryBuilder::build(operation, &params, &scope)?;
        Ok(QueryPlan {
            request: QueryRequest { operation, params, scope },
            query,
        })
    }

    /// Run `operation` over `scope`, serving from the cache when possible.
    #[instrument(skip(self, params), fields(params = %params))]
    pub async fn run(
        &self,
        operation: &str,
        params: &Params,
        scope: &ScopeSpec,
    ) -> std::result::Result<QueryResult, QueryError> {
        let QueryPlan { request, query } = self.plan(operation, params, scope)?;
        let key = request.cache_key();
        let result = self
            .cache
            .get_or_compute(&key, || self.executor.execute(&query))
            .await;
        Ok(result.with_unavailable(request.unavailable()))
    }

    /// Run `period-summary` over `scope` and over the same range one year
    /// earlier. An earlier period outside the dataset yields no comparison
    /// rather than an error.
    #[instrument(skip(self))]
    pub async fn compare_with_previous_year(
        &self,
        scope: &ScopeSpec,
    ) -> std::result::Result<PeriodComparison, QueryError> {
        let operation = Operation::PeriodSummary.id();
        let current = self.run(operation, &Params::new(), scope).await?;
        let previous = match scope.year_before() {
            Some(earlier) => match self.run(operation, &Params::new(), &earlier).await {
                Ok(result) => Some(result),
                Err(e @ (QueryError::EmptyScope(_) | QueryError::NoAvailableData { .. })) => {
                    debug!(scope = %earlier, error = %e, "No earlier period to compare with");
                    None
                }
                Err(e) => return Err(e),
            },
            None => None,
        };
        Ok(PeriodComparison { current, previous })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheSettings, PartitionSettings};
    use crate::partition::Granularity;
    use crate::storage::testing::FakeEngine;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn core_with(engine: Arc<FakeEngine>, template: &str, granularity: Granularity) -> QueryCore {
        let locator = PartitionLocator::new(&PartitionSettings {
            template: template.to_owned(),
            granularity,
            earliest: date(2005, 1, 1),
            latest: Some(date(2023, 12, 31)),
            max_lookback: 400,
        })
        .unwrap();
        QueryCore::with_parts(
            locator,
            QueryExecutor::new(engine, ExecutorConfig::default()),
            Arc::new(ResultCache::new(&CacheSettings::default())),
        )
    }

    fn daily(engine: Arc<FakeEngine>) -> QueryCore {
        core_with(engine, "/data/{year}/{month:02d}/{day:02d}.parquet", Granularity::Day)
    }

    #[tokio::test]
    async fn test_cached_run_skips_engine() {
        let engine = Arc::new(FakeEngine::new());
        let core = daily(engine.clone());
        let scope = ScopeSpec::range(date(2023, 1, 1), date(2023, 1, 3));

        let first = core.run("changes-per-day", &Params::new(), &scope).await.unwrap();
        let second = core.run("changes-per-day", &Params::new(), &scope).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(engine.queries(), 1);
        assert_eq!(core.cache().stats().hits, 1);
    }

    #[tokio::test]
    async fn test_equivalent_params_share_cache_entry() {
        let engine = Arc::new(FakeEngine::new());
        let core = daily(engine.clone());
        let scope = ScopeSpec::on(date(2023, 1, 1));

        core.run("count-by-user", &Params::new(), &scope).await.unwrap();
        core.run("count-by-user", &Params::new().with("limit", "25"), &scope)
            .await
            .unwrap();
        assert_eq!(engine.queries(), 1);
    }

    #[tokio::test]
    async fn test_request_errors_never_reach_engine() {
        let engine = Arc::new(FakeEngine::new());
        let core = daily(engine.clone());
        let scope = ScopeSpec::on(date(2023, 1, 1));

        let err = core.run("edits-per-planet", &Params::new(), &scope).await.unwrap_err();
        assert!(matches!(err, QueryError::InvalidRequest(_)));

        let err = core
            .run("count-by-user", &Params::new().with("limit", "0"), &scope)
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::InvalidRequest(_)));

        let err = core
            .run("changes-per-day", &Params::new(), &ScopeSpec::range(date(2023, 2, 1), date(2023, 1, 1)))
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::EmptyScope(_)));

        assert_eq!(engine.queries(), 0);
        assert!(core.cache().is_empty());
    }

    #[tokio::test]
    async fn test_failed_run_is_recomputed_after_recovery() {
        let engine = Arc::new(FakeEngine::new().with_unreachable(["/data/2023/01/01.parquet"]));
        let core = daily(engine.clone());
        let scope = ScopeSpec::on(date(2023, 1, 1));

        let result = core.run("period-summary", &Params::new(), &scope).await.unwrap();
        assert!(result.failure().is_some());
        assert!(core.cache().is_empty());

        engine.set_reachable("/data/2023/01/01.parquet");
        let result = core.run("period-summary", &Params::new(), &scope).await.unwrap();
        assert!(result.is_complete());
        assert_eq!(engine.queries(), 2);
    }

    #[tokio::test]
    async fn test_unrenderable_partitions_are_reported() {
        let engine = Arc::new(FakeEngine::new());
        let core = core_with(engine.clone(), "/data/{year}/{month:02}/{day:02}.parquet", Granularity::Month);

        let err = core
            .run("period-summary", &Params::new(), &ScopeSpec::range(date(2023, 1, 1), date(2023, 2, 28)))
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::NoAvailableData { .. }));
        assert_eq!(engine.queries(), 0);
    }

    #[tokio::test]
    async fn test_range_past_lookback_is_partial() {
        let engine = Arc::new(FakeEngine::new());
        let locator = PartitionLocator::new(&PartitionSettings {
            template: "/data/{year}/{month:02d}/{day:02d}.parquet".to_owned(),
            granularity: Granularity::Day,
            earliest: date(2005, 1, 1),
            latest: Some(date(2023, 12, 31)),
            max_lookback: 30,
        })
        .unwrap();
        let core = QueryCore::with_parts(
            locator,
            QueryExecutor::new(engine.clone(), ExecutorConfig::default()),
            Arc::new(ResultCache::new(&CacheSettings::default())),
        );

        let result = core
            .run("changes-per-day", &Params::new(), &ScopeSpec::range(date(2023, 1, 1), date(2023, 12, 31)))
            .await
            .unwrap();
        let QueryResult::Partial { table, dropped } = &result else {
            panic!("expected partial result, got {result:?}");
        };
        assert_eq!(table.partitions_read.len(), 30);
        assert_eq!(dropped.len(), 335);
        assert!(dropped.iter().all(|d| d.reason == DropReason::OutsideWindow));
        assert_eq!(dropped[0].key.to_string(), "2023-01-01");
        assert_eq!(dropped[334].key.to_string(), "2023-12-01");
    }

    #[tokio::test]
    async fn test_compare_with_previous_year() {
        let engine = Arc::new(FakeEngine::new());
        let core = core_with(engine.clone(), "/data/{year}.parquet", Granularity::Year);

        let comparison = core
            .compare_with_previous_year(&ScopeSpec::range(date(2022, 1, 1), date(2023, 12, 31)))
            .await
            .unwrap();
        assert!(comparison.current.is_complete());
        // Two files now against two files a year earlier
        assert_eq!(comparison.delta("files"), Some(0));
        assert_eq!(comparison.delta("missing"), None);
        assert_eq!(engine.queries(), 2);

        let comparison = core
            .compare_with_previous_year(&ScopeSpec::range(date(2005, 1, 1), date(2005, 12, 31)))
            .await
            .unwrap();
        assert!(comparison.previous.is_none());
        assert_eq!(comparison.delta("files"), None);
    }

    #[test]
    fn test_plan_exposes_sql() {
        let core = daily(Arc::new(FakeEngine::new()));
        let plan = core
            .plan("user-activity", &Params::new().with("user", "alice"), &ScopeSpec::on(date(2023, 1, 2)))
            .unwrap();
        assert_eq!(plan.request.scope.len(), 1);
        assert!(plan.query.sql().contains("'/data/2023/01/02.parquet'"));
        assert!(plan.query.sql().contains("\"user\" = 'alice'"));
    }
}
